//! Error types for the forecasting engine

use thiserror::Error;

pub type Result<T> = std::result::Result<T, PredictionError>;

#[derive(Error, Debug)]
pub enum PredictionError {
    /// The history provider has no record of this student.
    #[error("student {0} not found")]
    StudentNotFound(i64),

    /// No cohort statistics or catalog entry exist for this subject.
    #[error("subject {0} not found")]
    SubjectNotFound(String),

    /// The caller asked for something the engine cannot answer as posed.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("config error: {0}")]
    Config(String),
}

/// Reasons a trained model artifact is rejected at load time.
#[derive(Error, Debug)]
pub enum ModelError {
    #[error("I/O error reading {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("JSON error in {path}: {source}")]
    Json {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("unsupported artifact version {found} (expected {expected})")]
    Version { found: u32, expected: u32 },

    #[error("unknown feature column '{0}'")]
    UnknownFeature(String),

    #[error("malformed tree {tree}: {reason}")]
    MalformedTree { tree: usize, reason: String },
}
