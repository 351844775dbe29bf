//! Error types for the replicated cache
//!
//! Provides unified error handling using thiserror.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

// == Error Kind ==
/// Coarse classification of a [`CacheError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    StorageFailure,
    NetworkFailure,
    ServerFailure,
    InvalidRequest,
    Disposed,
}

// == Cache Error Enum ==
/// Unified error type for the replicated cache.
///
/// `Clone` so a failure can be fanned out on the sync event channel.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CacheError {
    /// Quota or serialization failure in the local key-value medium
    #[error("Storage failure: {0}")]
    StorageFailure(String),

    /// Transport failure or timeout talking to the backend
    #[error("Network failure: {0}")]
    NetworkFailure(String),

    /// Backend answered with a 5xx status or an unreadable body
    #[error("Server failure ({status}): {message}")]
    ServerFailure { status: u16, message: String },

    /// Invalid request data
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// The cache instance has been disposed
    #[error("Cache has been disposed")]
    Disposed,
}

impl CacheError {
    /// Returns the coarse kind of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            CacheError::StorageFailure(_) => ErrorKind::StorageFailure,
            CacheError::NetworkFailure(_) => ErrorKind::NetworkFailure,
            CacheError::ServerFailure { .. } => ErrorKind::ServerFailure,
            CacheError::InvalidRequest(_) => ErrorKind::InvalidRequest,
            CacheError::Disposed => ErrorKind::Disposed,
        }
    }

    /// Network and server failures are transient and go through the retry path.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::NetworkFailure | ErrorKind::ServerFailure
        )
    }
}

impl From<serde_json::Error> for CacheError {
    fn from(err: serde_json::Error) -> Self {
        CacheError::StorageFailure(format!("serialization: {}", err))
    }
}

impl From<reqwest::Error> for CacheError {
    fn from(err: reqwest::Error) -> Self {
        if let Some(status) = err.status() {
            CacheError::ServerFailure {
                status: status.as_u16(),
                message: err.to_string(),
            }
        } else if err.is_decode() {
            CacheError::ServerFailure {
                status: 200,
                message: format!("malformed response body: {}", err),
            }
        } else {
            CacheError::NetworkFailure(err.to_string())
        }
    }
}

// == IntoResponse Implementation ==
impl IntoResponse for CacheError {
    fn into_response(self) -> Response {
        let status = match &self {
            CacheError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            CacheError::Disposed => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = Json(json!({
            "error": self.to_string()
        }));

        (status, body).into_response()
    }
}

// == Result Type Alias ==
/// Convenience Result type for the replicated cache.
pub type Result<T> = std::result::Result<T, CacheError>;
