use std::fmt::Write;

use crate::config::EngineConfig;
use crate::features::{FeatureContext, PrerequisiteSummary};
use crate::models::RiskLevel;

// Grade-point floors used to single out weak or strong prerequisites.
const WEAK_PREREQ_POINTS: f64 = 2.5;
const STRONG_PREREQ_POINTS: f64 = 3.3;

#[derive(Debug, Clone, PartialEq)]
pub struct RuleAnalysis {
    pub probability: f64,
    pub risk_level: RiskLevel,
    pub weighted_prereq_gpa: f64,
    pub explanation: String,
    pub recommendation: String,
}

pub fn analyze(context: &FeatureContext, config: &EngineConfig) -> RuleAnalysis {
    let prereqs = &context.prerequisites;
    let cohort_pass_rate = context.cohort.as_ref().map(|stat| stat.pass_rate);

    let (probability, risk_level) = if prereqs.total == 0 {
        (cohort_only_probability(cohort_pass_rate, config), RiskLevel::Low)
    } else {
        let probability = prerequisite_probability(prereqs.weighted_gpa, cohort_pass_rate, config);
        // Every prerequisite was completed without a letter grade.
        let risk_level = if !prereqs.has_graded() && prereqs.missing.is_empty() {
            RiskLevel::Unknown
        } else {
            risk_from_gpa(prereqs.weighted_gpa, config)
        };
        (probability, risk_level)
    };

    RuleAnalysis {
        probability,
        risk_level,
        weighted_prereq_gpa: prereqs.weighted_gpa,
        explanation: explain(context, cohort_pass_rate),
        recommendation: recommend(risk_level, prereqs, &context.subject_name),
    }
}

/// `(gpa / 4) * (1 + (pass_rate - 0.5))`, the cohort term omitted when unknown,
/// clamped to `[0, cap]`.
pub fn prerequisite_probability(
    weighted_gpa: f64,
    cohort_pass_rate: Option<f64>,
    config: &EngineConfig,
) -> f64 {
    let base = weighted_gpa / 4.0;
    let adjusted = match cohort_pass_rate {
        Some(pass_rate) => base * (1.0 + (pass_rate - 0.5)),
        None => base,
    };
    clamp_probability(adjusted, config.rule_probability_cap)
}

fn cohort_only_probability(cohort_pass_rate: Option<f64>, config: &EngineConfig) -> f64 {
    let probability = cohort_pass_rate.unwrap_or(config.default_pass_probability);
    clamp_probability(probability, config.rule_probability_cap)
}

fn clamp_probability(value: f64, cap: f64) -> f64 {
    if value.is_nan() {
        return 0.0;
    }
    value.clamp(0.0, cap)
}

pub fn risk_from_gpa(weighted_gpa: f64, config: &EngineConfig) -> RiskLevel {
    if weighted_gpa >= config.rule_low_risk_gpa {
        RiskLevel::Low
    } else if weighted_gpa >= config.rule_medium_risk_gpa {
        RiskLevel::Medium
    } else {
        RiskLevel::High
    }
}

fn explain(context: &FeatureContext, cohort_pass_rate: Option<f64>) -> String {
    let prereqs = &context.prerequisites;
    let mut output = String::new();

    if prereqs.total == 0 {
        let _ = write!(output, "{} has no listed prerequisites.", context.subject_code);
    } else {
        let _ = write!(
            output,
            "Weighted prerequisite GPA {:.2} across {} of {} prerequisites.",
            prereqs.weighted_gpa,
            prereqs.completed.len(),
            prereqs.total
        );
        for taken in &prereqs.completed {
            match taken.grade_points {
                Some(points) => {
                    let _ = write!(
                        output,
                        " {} ({}): grade {} ({:.1} points, weight {:.1}).",
                        taken.subject_code, taken.subject_name, taken.grade, points, taken.weight
                    );
                }
                None => {
                    let _ = write!(
                        output,
                        " {} ({}): grade {} (ungraded).",
                        taken.subject_code, taken.subject_name, taken.grade
                    );
                }
            }
        }
        for code in &prereqs.missing {
            let _ = write!(output, " Missing prerequisite {code}.");
        }
    }

    match cohort_pass_rate {
        Some(pass_rate) => {
            let _ = write!(output, " Cohort pass rate {:.0}%.", pass_rate * 100.0);
        }
        None => {
            let _ = write!(output, " No cohort history for this subject.");
        }
    }

    output
}

fn recommend(risk_level: RiskLevel, prereqs: &PrerequisiteSummary, subject_name: &str) -> String {
    let weak: Vec<&str> = prereqs
        .completed
        .iter()
        .filter(|taken| taken.grade_points.is_some_and(|points| points < WEAK_PREREQ_POINTS))
        .take(2)
        .map(|taken| taken.subject_name.as_str())
        .collect();

    match risk_level {
        RiskLevel::VeryHigh | RiskLevel::High => {
            if !weak.is_empty() {
                format!(
                    "High risk. Your results in {} suggest {subject_name} will be a challenge; review the fundamentals or seek tutoring first.",
                    weak.join(", ")
                )
            } else if !prereqs.missing.is_empty() {
                format!(
                    "Some prerequisites are not yet taken ({}). Complete them before {subject_name}.",
                    prereqs.missing.join(", ")
                )
            } else {
                format!("High risk. Plan extra study time for {subject_name}.")
            }
        }
        RiskLevel::Medium => format!(
            "Moderate risk. Your preparation is adequate but {subject_name} needs consistent effort."
        ),
        RiskLevel::Low => {
            let strong = prereqs
                .completed
                .iter()
                .any(|taken| taken.grade_points.is_some_and(|points| points >= STRONG_PREREQ_POINTS));
            if strong {
                format!("Good preparation. Strong prerequisite results suggest you are ready for {subject_name}.")
            } else {
                format!("Low risk. You should do well in {subject_name} based on your background.")
            }
        }
        RiskLevel::Unknown => {
            if prereqs.missing.is_empty() {
                "Limited graded data for a prediction; this may be an entry-level subject.".to_string()
            } else {
                format!(
                    "No prerequisite grades available. Complete prerequisites first: {}",
                    prereqs.missing.join(", ")
                )
            }
        }
    }
}
