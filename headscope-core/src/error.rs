//! Error types for the headscope-core crate.

use thiserror::Error;

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, ProfilerError>;

/// Top-level error type for head profiling operations.
#[derive(Debug, Error)]
pub enum ProfilerError {
    #[error("Oracle error: {0}")]
    Oracle(String),

    #[error("Oracle '{oracle}' is unavailable: {reason}")]
    OracleUnavailable { oracle: String, reason: String },

    #[error("Invalid {kind} index {value}: must be in [0, {limit})")]
    InvalidIndex {
        kind: &'static str,
        value: usize,
        limit: usize,
    },

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Clustering error: {0}")]
    Clustering(String),

    #[error("Cache error: {0}")]
    Cache(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("{operation} failed: {message}")]
    OperationFailed { operation: String, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

impl ProfilerError {
    pub fn oracle(msg: impl Into<String>) -> Self {
        Self::Oracle(msg.into())
    }

    pub fn unavailable(oracle: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::OracleUnavailable {
            oracle: oracle.into(),
            reason: reason.into(),
        }
    }

    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    pub fn clustering(msg: impl Into<String>) -> Self {
        Self::Clustering(msg.into())
    }

    pub fn cache(msg: impl Into<String>) -> Self {
        Self::Cache(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Wrap an error into the generic "operation failed" condition.
    ///
    /// Index validation errors are caller mistakes and pass through unchanged.
    pub fn operation_failed(operation: impl Into<String>, source: ProfilerError) -> Self {
        match source {
            err @ Self::InvalidIndex { .. } => err,
            err @ Self::OperationFailed { .. } => err,
            other => Self::OperationFailed {
                operation: operation.into(),
                message: other.to_string(),
            },
        }
    }
}
