//! Error types for the core domain.

use thiserror::Error;

/// Core domain error type.
#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid content id: {0}")]
    InvalidCid(String),

    #[error("invalid wallet public key: {0}")]
    InvalidWallet(String),

    #[error("content hash mismatch: expected {expected}, got {actual}")]
    HashMismatch { expected: String, actual: String },

    #[error("invalid file type: {0}")]
    InvalidFileType(String),

    #[error("invalid export payload: {0}")]
    InvalidExport(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Result type alias for core operations.
pub type Result<T> = std::result::Result<T, Error>;
