//! Tunable constants for the engine.
//!
//! Every field of [`EngineConfig`] defaults to the named constant below, so a
//! TOML file only needs to mention what it overrides.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{PredictionError, Result};

pub const ML_WEIGHT: f64 = 0.70;
pub const RULE_WEIGHT: f64 = 0.30;

/// Weighted prerequisite GPA at or above this is low risk.
pub const RULE_LOW_RISK_GPA: f64 = 3.3;
pub const RULE_MEDIUM_RISK_GPA: f64 = 2.7;

pub const ML_LOW_RISK_PROBABILITY: f64 = 0.80;
pub const ML_MEDIUM_RISK_PROBABILITY: f64 = 0.60;
pub const ML_HIGH_RISK_PROBABILITY: f64 = 0.50;

/// Rule-based probability never claims certainty.
pub const RULE_PROBABILITY_CAP: f64 = 0.95;
/// Used for subjects without prerequisites when no cohort data exists.
pub const DEFAULT_PASS_PROBABILITY: f64 = 0.7;

pub const CACHE_CAPACITY: usize = 500;
pub const CACHE_EVICTION_FRACTION: f64 = 0.2;

pub const TOP_FACTOR_COUNT: usize = 5;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub ml_weight: f64,
    pub rule_weight: f64,
    pub rule_low_risk_gpa: f64,
    pub rule_medium_risk_gpa: f64,
    pub ml_low_risk_probability: f64,
    pub ml_medium_risk_probability: f64,
    pub ml_high_risk_probability: f64,
    pub rule_probability_cap: f64,
    pub default_pass_probability: f64,
    pub cache_capacity: usize,
    pub cache_eviction_fraction: f64,
    pub top_factor_count: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            ml_weight: ML_WEIGHT,
            rule_weight: RULE_WEIGHT,
            rule_low_risk_gpa: RULE_LOW_RISK_GPA,
            rule_medium_risk_gpa: RULE_MEDIUM_RISK_GPA,
            ml_low_risk_probability: ML_LOW_RISK_PROBABILITY,
            ml_medium_risk_probability: ML_MEDIUM_RISK_PROBABILITY,
            ml_high_risk_probability: ML_HIGH_RISK_PROBABILITY,
            rule_probability_cap: RULE_PROBABILITY_CAP,
            default_pass_probability: DEFAULT_PASS_PROBABILITY,
            cache_capacity: CACHE_CAPACITY,
            cache_eviction_fraction: CACHE_EVICTION_FRACTION,
            top_factor_count: TOP_FACTOR_COUNT,
        }
    }
}

impl EngineConfig {
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: EngineConfig =
            toml::from_str(raw).map_err(|err| PredictionError::Config(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|err| {
            PredictionError::Config(format!("cannot read {}: {err}", path.display()))
        })?;
        Self::from_toml_str(&raw)
    }

    pub fn validate(&self) -> Result<()> {
        let weight_sum = self.ml_weight + self.rule_weight;
        if self.ml_weight < 0.0 || self.rule_weight < 0.0 || (weight_sum - 1.0).abs() > 1e-9 {
            return Err(PredictionError::Config(format!(
                "fusion weights must be non-negative and sum to 1.0 (got {} + {})",
                self.ml_weight, self.rule_weight
            )));
        }
        if self.rule_medium_risk_gpa > self.rule_low_risk_gpa {
            return Err(PredictionError::Config(
                "rule_medium_risk_gpa must not exceed rule_low_risk_gpa".to_string(),
            ));
        }
        if !(self.ml_high_risk_probability <= self.ml_medium_risk_probability
            && self.ml_medium_risk_probability <= self.ml_low_risk_probability)
        {
            return Err(PredictionError::Config(
                "ML risk thresholds must be ordered high <= medium <= low".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.rule_probability_cap) {
            return Err(PredictionError::Config(
                "rule_probability_cap must lie in [0, 1]".to_string(),
            ));
        }
        if self.cache_capacity == 0 {
            return Err(PredictionError::Config(
                "cache_capacity must be at least 1".to_string(),
            ));
        }
        if !(self.cache_eviction_fraction > 0.0 && self.cache_eviction_fraction <= 1.0) {
            return Err(PredictionError::Config(
                "cache_eviction_fraction must lie in (0, 1]".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_named_constants() {
        let config = EngineConfig::default();
        assert_eq!(config.ml_weight, 0.70);
        assert_eq!(config.rule_weight, 0.30);
        assert_eq!(config.cache_capacity, 500);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn partial_toml_keeps_other_defaults() {
        let config = EngineConfig::from_toml_str("cache_capacity = 64\ntop_factor_count = 3\n")
            .expect("valid config");
        assert_eq!(config.cache_capacity, 64);
        assert_eq!(config.top_factor_count, 3);
        assert_eq!(config.rule_probability_cap, RULE_PROBABILITY_CAP);
    }

    #[test]
    fn rejects_weights_that_do_not_sum_to_one() {
        let err = EngineConfig::from_toml_str("ml_weight = 0.9\n").unwrap_err();
        assert!(matches!(err, PredictionError::Config(_)));
    }

    #[test]
    fn rejects_zero_capacity() {
        assert!(EngineConfig::from_toml_str("cache_capacity = 0\n").is_err());
    }
}
