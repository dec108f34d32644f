use crate::classifier::ClassProbabilities;
use crate::config::EngineConfig;
use crate::features::{feature_label, FeatureContext, FeatureVector, FEATURE_COLUMNS};
use crate::models::{PredictionMethod, RiskLevel, SubjectPrediction, TopFactor};
use crate::rules::RuleAnalysis;

/// Classifier output for one subject, with the inputs needed to explain it.
#[derive(Debug, Clone, Copy)]
pub struct MlResult<'a> {
    pub probabilities: ClassProbabilities,
    pub importances: &'a FeatureVector,
}

pub fn risk_from_ml(probability: f64, config: &EngineConfig) -> RiskLevel {
    if probability >= config.ml_low_risk_probability {
        RiskLevel::Low
    } else if probability >= config.ml_medium_risk_probability {
        RiskLevel::Medium
    } else if probability >= config.ml_high_risk_probability {
        RiskLevel::High
    } else {
        RiskLevel::VeryHigh
    }
}

/// Distance from a coin flip, scaled to `[0, 1]`.
pub fn confidence(probability: f64) -> f64 {
    ((probability - 0.5).abs() * 2.0).min(1.0)
}

pub fn top_factors(vector: &FeatureVector, importances: &FeatureVector, count: usize) -> Vec<TopFactor> {
    let mut contributions: Vec<TopFactor> = FEATURE_COLUMNS
        .iter()
        .zip(vector.iter().zip(importances.iter()))
        .map(|(column, (value, importance))| TopFactor {
            label: feature_label(column),
            contribution: value.abs() * importance,
        })
        .collect();

    contributions.sort_by(|a, b| b.contribution.total_cmp(&a.contribution));
    contributions.truncate(count);
    contributions
}

pub fn combine(
    context: &FeatureContext,
    ml: Option<MlResult<'_>>,
    rule: RuleAnalysis,
    config: &EngineConfig,
) -> SubjectPrediction {
    let (success_probability, risk_level, method, ml_probability, ml_confidence, factors) =
        match ml {
            Some(result) => {
                let (p_pass, _) = result.probabilities;
                let fused = config.ml_weight * p_pass + config.rule_weight * rule.probability;
                let method = if config.rule_weight == 0.0 {
                    PredictionMethod::Ml
                } else {
                    PredictionMethod::Hybrid
                };
                (
                    fused.clamp(0.0, 1.0),
                    risk_from_ml(p_pass, config),
                    method,
                    Some(p_pass),
                    Some(confidence(p_pass)),
                    Some(top_factors(
                        &context.vector,
                        result.importances,
                        config.top_factor_count,
                    )),
                )
            }
            None => (
                rule.probability,
                rule.risk_level,
                PredictionMethod::RuleBased,
                None,
                None,
                None,
            ),
        };

    SubjectPrediction {
        subject_code: context.subject_code.clone(),
        subject_name: context.subject_name.clone(),
        risk_level,
        success_probability,
        rule_probability: rule.probability,
        weighted_prereq_gpa: rule.weighted_prereq_gpa,
        prereq_performance: context.prerequisites.completed.clone(),
        missing_prereqs: context.prerequisites.missing.clone(),
        cohort_pass_rate: context.cohort.as_ref().map(|stat| stat.pass_rate),
        cohort_avg_score: context.cohort.as_ref().and_then(|stat| stat.avg_score),
        ml_probability,
        ml_confidence,
        top_factors: factors,
        explanation: rule.explanation,
        recommendation: rule.recommendation,
        prediction_method: method,
    }
}
