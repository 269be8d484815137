//! Metadata store error types.

use thiserror::Error;

/// Metadata store operation errors.
#[derive(Debug, Error)]
pub enum MetadataError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("already exists: {0}")]
    AlreadyExists(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A concurrent writer advanced the user's clock between the caller's
    /// read and this transaction's commit.
    #[error("clock gap for {wallet}: expected clock {expected}, found {found}")]
    ClockGap {
        wallet: String,
        expected: i64,
        found: i64,
    },

    #[error("constraint violation: {0}")]
    Constraint(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("internal error: {0}")]
    Internal(String),
}

/// Result type for metadata operations.
pub type MetadataResult<T> = std::result::Result<T, MetadataError>;

impl MetadataError {
    /// Map a sqlx error, converting unique/primary-key violations into
    /// `Constraint` so callers can distinguish them from transport failures.
    pub fn from_sqlx(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(ref db) = err
            && db.is_unique_violation()
        {
            return Self::Constraint(db.message().to_string());
        }
        Self::Database(err)
    }
}
