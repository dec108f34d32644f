use std::collections::BTreeMap;
use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubjectRecord {
    pub subject_code: String,
    pub subject_name: String,
    pub grade: String,
    pub overall_pct: Option<f64>,
    pub coursework_pct: Option<f64>,
    pub exam_date: NaiveDate,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StudentProfile {
    pub programme_code: Option<String>,
    pub gender: Option<String>,
    pub cohort_year: Option<i32>,
    pub has_financial_aid: bool,
}

/// Everything the history provider knows about one student.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StudentHistory {
    pub profile: StudentProfile,
    pub records: Vec<SubjectRecord>,
}

impl StudentHistory {
    pub fn new(profile: StudentProfile, mut records: Vec<SubjectRecord>) -> Self {
        records.sort_by_key(|record| record.exam_date);
        Self { profile, records }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompletedSubject {
    pub subject_name: String,
    pub grade: String,
    pub grade_points: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StudentPerformanceSnapshot {
    pub student_id: i64,
    pub current_gpa: f64,
    pub subjects_completed: usize,
    pub num_fails: usize,
    pub fail_rate: f64,
    pub gpa_trend_last_3: f64,
    pub avg_overall_pct: f64,
    pub avg_coursework_pct: f64,
    /// Latest attempt per subject code.
    pub completed: BTreeMap<String, CompletedSubject>,
    #[serde(skip)]
    pub fingerprint: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrerequisiteEdge {
    pub subject_code: String,
    pub prereq_code: String,
    pub weight: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CohortStat {
    pub subject_code: String,
    pub subject_name: String,
    pub pass_rate: f64,
    pub avg_score: Option<f64>,
    pub avg_gpa: Option<f64>,
    pub sample_size: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    VeryHigh,
    Unknown,
}

impl RiskLevel {
    pub fn is_high(self) -> bool {
        matches!(self, RiskLevel::High | RiskLevel::VeryHigh)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RiskLevel::Low => "low",
            RiskLevel::Medium => "medium",
            RiskLevel::High => "high",
            RiskLevel::VeryHigh => "very_high",
            RiskLevel::Unknown => "unknown",
        }
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PredictionMethod {
    #[serde(rename = "rule-based")]
    RuleBased,
    #[serde(rename = "ml")]
    Ml,
    #[serde(rename = "hybrid")]
    Hybrid,
}

impl fmt::Display for PredictionMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            PredictionMethod::RuleBased => "rule-based",
            PredictionMethod::Ml => "ml",
            PredictionMethod::Hybrid => "hybrid",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PrerequisitePerformance {
    pub subject_code: String,
    pub subject_name: String,
    pub grade: String,
    pub grade_points: Option<f64>,
    pub weight: f64,
    pub impact_score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TopFactor {
    pub label: String,
    pub contribution: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubjectPrediction {
    pub subject_code: String,
    pub subject_name: String,
    pub risk_level: RiskLevel,
    pub success_probability: f64,
    pub rule_probability: f64,
    pub weighted_prereq_gpa: f64,
    pub prereq_performance: Vec<PrerequisitePerformance>,
    pub missing_prereqs: Vec<String>,
    pub cohort_pass_rate: Option<f64>,
    pub cohort_avg_score: Option<f64>,
    pub ml_probability: Option<f64>,
    pub ml_confidence: Option<f64>,
    pub top_factors: Option<Vec<TopFactor>>,
    pub explanation: String,
    pub recommendation: String,
    pub prediction_method: PredictionMethod,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PredictionReport {
    pub student_id: i64,
    pub current_gpa: f64,
    pub predictions: Vec<SubjectPrediction>,
    pub high_risk_subjects: Vec<String>,
    pub recommended_order: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChainLink {
    pub subject_code: String,
    pub subject_name: String,
    pub weight: f64,
    pub depth: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PrerequisiteChain {
    pub subject_code: String,
    pub subject_name: String,
    pub direct_prerequisites: Vec<ChainLink>,
    pub full_chain: Vec<ChainLink>,
}
