//! Hybrid subject success forecasting.
//!
//! A rule-based prerequisite analysis and a trained random forest are fused
//! into one probability per (student, subject) pair. [`PredictionEngine`] is
//! the entry point; everything it returns is plain serializable data.

pub mod cache;
pub mod catalog;
pub mod classifier;
pub mod cohort;
pub mod config;
pub mod db;
pub mod engine;
pub mod error;
pub mod features;
pub mod grades;
pub mod hybrid;
pub mod models;
pub mod report;
pub mod rules;

pub use cache::StudentPerformanceCache;
pub use catalog::{default_catalog, PrerequisiteCatalog};
pub use classifier::{ClassifierAdapter, ModelArtifacts};
pub use cohort::CohortStatsTable;
pub use config::EngineConfig;
pub use engine::{HistoryProvider, InMemoryHistory, PredictionEngine};
pub use error::{PredictionError, Result};
pub use models::{PredictionReport, RiskLevel, SubjectPrediction};
