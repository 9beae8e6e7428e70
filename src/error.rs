use thiserror::Error;

use crate::storage::StoreError;
use crate::types::FieldError;

#[derive(Error, Debug)]
pub enum ImportError {
    #[error("JSON deserialization failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML deserialization failed: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Can't find migration {0}")]
    UnknownMigration(String),

    #[error("Invalid strategy: {0}")]
    InvalidStrategy(String),

    #[error("Strategy {name} failed: {source}")]
    StrategyFailed {
        name: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("Batch failed schema validation: {}", .0.join("; "))]
    Schema(Vec<String>),

    #[error("Unlinked data store error: {0}")]
    Store(#[from] StoreError),
}

pub type Result<T> = std::result::Result<T, ImportError>;

/// Raised by a strategy that refuses to transform a batch because one of its
/// preconditions does not hold. The batch it was given is left as it was.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct StrategyError {
    message: String,
}

impl StrategyError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Everything a strategy can return instead of a new batch.
#[derive(Error, Debug)]
pub enum StepFailure {
    /// Contained: logged by the runner, later strategies still run.
    #[error(transparent)]
    Refused(#[from] StrategyError),

    /// Aborts the remaining strategies of the run.
    #[error(transparent)]
    Fatal(#[from] anyhow::Error),
}

impl StepFailure {
    pub fn refused(message: impl Into<String>) -> Self {
        StepFailure::Refused(StrategyError::new(message))
    }
}

/// A strategy that would write a malformed reserved attribute refuses.
impl From<FieldError> for StepFailure {
    fn from(err: FieldError) -> Self {
        StepFailure::refused(err.to_string())
    }
}
