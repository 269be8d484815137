//! Chain client error types.

use thiserror::Error;

/// Chain client operation errors.
#[derive(Debug, Error)]
pub enum ChainError {
    #[error("chain unavailable: {0}")]
    Unavailable(String),

    #[error("not found on chain: {0}")]
    NotFound(String),

    #[error("invalid chain data: {0}")]
    InvalidData(String),
}

/// Result type for chain operations.
pub type ChainResult<T> = std::result::Result<T, ChainError>;
