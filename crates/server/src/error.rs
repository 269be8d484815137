//! API error types.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

/// API error response body: `{ "error": { "kind": …, "message": … } }`.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: ErrorDetail,
}

#[derive(Debug, Serialize)]
pub struct ErrorDetail {
    /// Stable error kind for programmatic handling.
    pub kind: String,
    /// Human-readable error message.
    pub message: String,
}

/// API error type.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("caller is not a member of the user's replica set: {0}")]
    PeerUnauthorized(String),

    #[error("node identity not yet bootstrapped")]
    BootstrapPending,

    #[error("internal error: {0}")]
    Internal(String),

    #[error("storage error: {0}")]
    Storage(#[from] chorus_storage::StorageError),

    #[error("metadata error: {0}")]
    Metadata(#[from] chorus_metadata::MetadataError),

    #[error("coordination error: {0}")]
    Coord(#[from] chorus_coord::CoordError),

    #[error("chain error: {0}")]
    Chain(#[from] chorus_chain::ChainError),

    #[error("core error: {0}")]
    Core(#[from] chorus_core::Error),
}

impl ApiError {
    /// Get the stable error kind for this error.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "not_found",
            Self::BadRequest(_) => "bad_request",
            Self::Unauthorized(_) => "unauthorized",
            Self::PeerUnauthorized(_) => "peer_unauthorized",
            Self::BootstrapPending => "bootstrap_pending",
            Self::Internal(_) => "internal_error",
            Self::Storage(_) => "storage_error",
            Self::Metadata(_) => "metadata_error",
            Self::Coord(_) => "coordination_error",
            Self::Chain(_) => "chain_error",
            Self::Core(_) => "bad_request",
        }
    }

    /// Get the HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::PeerUnauthorized(_) => StatusCode::FORBIDDEN,
            Self::BootstrapPending => StatusCode::SERVICE_UNAVAILABLE,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Storage(e) => match e {
                chorus_storage::StorageError::NotFound(_) => StatusCode::NOT_FOUND,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            },
            Self::Metadata(e) => match e {
                chorus_metadata::MetadataError::NotFound(_) => StatusCode::NOT_FOUND,
                chorus_metadata::MetadataError::AlreadyExists(_) => StatusCode::CONFLICT,
                chorus_metadata::MetadataError::Constraint(_) => StatusCode::CONFLICT,
                chorus_metadata::MetadataError::ClockGap { .. } => StatusCode::CONFLICT,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            },
            Self::Coord(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Chain(_) => StatusCode::BAD_GATEWAY,
            Self::Core(_) => StatusCode::BAD_REQUEST,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = ErrorResponse {
            error: ErrorDetail {
                kind: self.kind().to_string(),
                message: self.to_string(),
            },
        };
        (status, Json(body)).into_response()
    }
}

/// Result type for API handlers.
pub type ApiResult<T> = std::result::Result<T, ApiError>;
