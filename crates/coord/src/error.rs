//! Coordination store error types.

use thiserror::Error;

/// Coordination store operation errors.
#[derive(Debug, Error)]
pub enum CoordError {
    #[error("no processor registered for task: {0}")]
    UnknownTask(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

/// Result type for coordination operations.
pub type CoordResult<T> = std::result::Result<T, CoordError>;
