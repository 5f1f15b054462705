//! Error types for the retraining pipeline

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Schema mismatch: expected columns {expected:?}, got {got:?}")]
    SchemaMismatch {
        expected: Vec<String>,
        got: Vec<String>,
    },

    #[error("Data quality error: {0}")]
    DataQuality(String),

    #[error("Training failed: {0}")]
    Training(String),

    #[error("Evaluation failed: {0}")]
    Evaluation(String),

    #[error("A pipeline run is already in progress")]
    RunAlreadyInProgress,

    #[error("Insufficient reference data: {rows} rows, {required} required")]
    InsufficientReferenceData { rows: usize, required: usize },

    #[error("Column not found: {0}")]
    ColumnNotFound(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl Error {
    /// Short machine-readable kind, used in run reports and notifications.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::SchemaMismatch { .. } => "SchemaMismatch",
            Error::DataQuality(_) => "DataQualityError",
            Error::Training(_) => "TrainingError",
            Error::Evaluation(_) => "EvaluationError",
            Error::RunAlreadyInProgress => "RunAlreadyInProgress",
            Error::InsufficientReferenceData { .. } => "InsufficientReferenceData",
            Error::ColumnNotFound(_) => "ColumnNotFound",
            Error::Config(_) => "ConfigError",
            Error::Io(_) => "IoError",
            Error::Serialization(_) => "SerializationError",
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
