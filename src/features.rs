//! Feature engineering for one (student, subject) pair.
//!
//! The vector layout is fixed: 7 student performance fields, 7 prerequisite
//! fields, 4 cohort fields, 3 encoded categoricals, the entry cohort year and
//! the financial aid flag. Model artifacts name their columns and are remapped
//! onto this order at load time (see `classifier`).

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::catalog::PrerequisiteCatalog;
use crate::cohort::CohortStatsTable;
use crate::models::{CohortStat, PrerequisitePerformance, StudentPerformanceSnapshot, StudentProfile};

pub const FEATURE_COUNT: usize = 23;

pub type FeatureVector = [f64; FEATURE_COUNT];

pub const FEATURE_COLUMNS: [&str; FEATURE_COUNT] = [
    "num_subjects_completed",
    "current_gpa",
    "gpa_trend_last_3",
    "avg_coursework_percentage",
    "avg_overall_percentage",
    "num_fails",
    "fail_rate",
    "num_prerequisites",
    "num_prerequisites_completed",
    "num_prerequisites_missing",
    "avg_prereq_grade_points",
    "weighted_prereq_gpa",
    "min_prereq_grade",
    "max_prereq_grade",
    "subject_pass_rate",
    "subject_avg_score",
    "subject_avg_gpa",
    "subject_total_students",
    "subject_code_encoded",
    "programme_code_encoded",
    "gender_encoded",
    "cohort",
    "has_financial_aid",
];

/// Code assigned to any categorical value the encoders were not trained on.
pub const UNKNOWN_CODE: f64 = -1.0;
pub const ENCODER_VERSION: u32 = 1;

// Neutral cohort values used in the vector when a subject has no history.
const DEFAULT_PASS_RATE: f64 = 0.5;
const DEFAULT_AVG_SCORE: f64 = 50.0;
const DEFAULT_AVG_GPA: f64 = 2.0;

pub fn feature_index(column: &str) -> Option<usize> {
    FEATURE_COLUMNS.iter().position(|name| *name == column)
}

/// Display label for a feature column.
pub fn feature_label(column: &str) -> String {
    let label = match column {
        "current_gpa" => "Current GPA",
        "subject_pass_rate" => "Subject Pass Rate",
        "subject_avg_gpa" => "Subject Difficulty",
        "fail_rate" => "Student Fail Rate",
        "cohort" => "Entry Cohort",
        "num_fails" => "Number of Fails",
        "avg_overall_percentage" => "Average Score",
        "avg_coursework_percentage" => "Coursework Performance",
        "num_subjects_completed" => "Subjects Completed",
        "gpa_trend_last_3" => "Recent GPA Trend",
        "weighted_prereq_gpa" => "Prerequisite Performance",
        "num_prerequisites_missing" => "Missing Prerequisites",
        other => return title_case(other),
    };
    label.to_string()
}

fn title_case(column: &str) -> String {
    column
        .split('_')
        .filter(|word| !word.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// One categorical vocabulary: value -> integer code, in training order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Vocabulary {
    codes: HashMap<String, usize>,
}

impl Vocabulary {
    pub fn new<S: Into<String>>(values: impl IntoIterator<Item = S>) -> Self {
        let mut codes = HashMap::new();
        for value in values {
            let next = codes.len();
            let value: String = value.into();
            codes.entry(value.trim().to_string()).or_insert(next);
        }
        Self { codes }
    }

    pub fn encode(&self, value: Option<&str>) -> f64 {
        value
            .and_then(|value| self.codes.get(value.trim()))
            .map_or(UNKNOWN_CODE, |code| *code as f64)
    }

    pub fn len(&self) -> usize {
        self.codes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.codes.is_empty()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EncoderFile {
    pub version: u32,
    #[serde(default)]
    pub subject_code: Vec<String>,
    #[serde(default)]
    pub programme_code: Vec<String>,
    #[serde(default)]
    pub gender: Vec<String>,
}

/// Versioned lookup tables for the categorical features.
#[derive(Debug, Clone, PartialEq)]
pub struct CategoricalEncoders {
    pub version: u32,
    pub subject_code: Vocabulary,
    pub programme_code: Vocabulary,
    pub gender: Vocabulary,
}

impl Default for CategoricalEncoders {
    /// Empty vocabularies: every value encodes as unknown.
    fn default() -> Self {
        Self {
            version: ENCODER_VERSION,
            subject_code: Vocabulary::default(),
            programme_code: Vocabulary::default(),
            gender: Vocabulary::default(),
        }
    }
}

impl From<EncoderFile> for CategoricalEncoders {
    fn from(file: EncoderFile) -> Self {
        Self {
            version: file.version,
            subject_code: Vocabulary::new(file.subject_code),
            programme_code: Vocabulary::new(file.programme_code),
            gender: Vocabulary::new(file.gender),
        }
    }
}

/// Prerequisite standing of one student for one target subject.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PrerequisiteSummary {
    pub total: usize,
    /// Completed prerequisites, graded or not.
    pub completed: Vec<PrerequisitePerformance>,
    pub missing: Vec<String>,
    pub weighted_gpa: f64,
    pub mean_grade_points: f64,
    pub min_grade_points: f64,
    pub max_grade_points: f64,
    pub graded_weight: f64,
}

impl PrerequisiteSummary {
    pub fn has_graded(&self) -> bool {
        self.graded_weight > 0.0
    }

    /// Prerequisites that carry grade points. P/EX passes are not counted.
    pub fn graded_count(&self) -> usize {
        self.completed
            .iter()
            .filter(|taken| taken.grade_points.is_some())
            .count()
    }

    /// Prerequisites without grade points, whether untaken or ungraded.
    pub fn ungraded_count(&self) -> usize {
        self.total - self.graded_count()
    }
}

pub fn summarize_prerequisites(
    snapshot: &StudentPerformanceSnapshot,
    subject_code: &str,
    catalog: &PrerequisiteCatalog,
) -> PrerequisiteSummary {
    let prereqs = catalog.prerequisites(subject_code);
    let mut summary = PrerequisiteSummary {
        total: prereqs.len(),
        ..PrerequisiteSummary::default()
    };

    let mut weighted_total = 0.0;
    let mut graded_points = Vec::new();

    for (prereq_code, weight) in prereqs {
        let Some(taken) = snapshot.completed.get(prereq_code) else {
            summary.missing.push(prereq_code.clone());
            continue;
        };

        let impact_score = taken.grade_points.map_or(0.0, |points| points * weight);
        if let Some(points) = taken.grade_points {
            weighted_total += impact_score;
            summary.graded_weight += weight;
            graded_points.push(points);
        }
        summary.completed.push(PrerequisitePerformance {
            subject_code: prereq_code.clone(),
            subject_name: taken.subject_name.clone(),
            grade: taken.grade.clone(),
            grade_points: taken.grade_points,
            weight: *weight,
            impact_score,
        });
    }

    if summary.graded_weight > 0.0 {
        summary.weighted_gpa = weighted_total / summary.graded_weight;
        summary.mean_grade_points = graded_points.iter().sum::<f64>() / graded_points.len() as f64;
        summary.min_grade_points = graded_points.iter().copied().fold(f64::INFINITY, f64::min);
        summary.max_grade_points = graded_points
            .iter()
            .copied()
            .fold(f64::NEG_INFINITY, f64::max);
    }

    summary
}

/// Everything derived for one subject before any model is consulted.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureContext {
    pub subject_code: String,
    pub subject_name: String,
    pub vector: FeatureVector,
    pub prerequisites: PrerequisiteSummary,
    pub cohort: Option<CohortStat>,
}

pub fn build(
    snapshot: &StudentPerformanceSnapshot,
    profile: &StudentProfile,
    subject_code: &str,
    catalog: &PrerequisiteCatalog,
    cohort_stats: &CohortStatsTable,
    encoders: &CategoricalEncoders,
) -> FeatureContext {
    let prerequisites = summarize_prerequisites(snapshot, subject_code, catalog);
    let cohort = cohort_stats.get(subject_code).cloned();

    let (pass_rate, avg_score, avg_gpa, sample_size) = match &cohort {
        Some(stat) => (
            stat.pass_rate,
            stat.avg_score.unwrap_or(DEFAULT_AVG_SCORE),
            stat.avg_gpa.unwrap_or(DEFAULT_AVG_GPA),
            stat.sample_size as f64,
        ),
        None => (DEFAULT_PASS_RATE, DEFAULT_AVG_SCORE, DEFAULT_AVG_GPA, 0.0),
    };

    let vector: FeatureVector = [
        snapshot.subjects_completed as f64,
        snapshot.current_gpa,
        snapshot.gpa_trend_last_3,
        snapshot.avg_coursework_pct,
        snapshot.avg_overall_pct,
        snapshot.num_fails as f64,
        snapshot.fail_rate,
        prerequisites.total as f64,
        prerequisites.graded_count() as f64,
        prerequisites.ungraded_count() as f64,
        prerequisites.mean_grade_points,
        prerequisites.weighted_gpa,
        prerequisites.min_grade_points,
        prerequisites.max_grade_points,
        pass_rate,
        avg_score,
        avg_gpa,
        sample_size,
        encoders.subject_code.encode(Some(subject_code)),
        encoders.programme_code.encode(profile.programme_code.as_deref()),
        encoders.gender.encode(profile.gender.as_deref()),
        profile.cohort_year.map_or(0.0, f64::from),
        if profile.has_financial_aid { 1.0 } else { 0.0 },
    ];

    let subject_name = cohort
        .as_ref()
        .map(|stat| stat.subject_name.clone())
        .unwrap_or_else(|| subject_code.to_string());

    FeatureContext {
        subject_code: subject_code.to_string(),
        subject_name,
        vector: vector.map(|value| if value.is_finite() { value } else { 0.0 }),
        prerequisites,
        cohort,
    }
}
