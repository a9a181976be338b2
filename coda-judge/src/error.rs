//! Error types for coda-judge
//!
//! `EngineError` carries the judgment core's error taxonomy; `ApiError` maps
//! it onto HTTP responses for the presentation layer.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Judgment core error taxonomy
///
/// Every variant is non-fatal to a running batch engine; only an explicit
/// stop terminates it.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Invalid selection or score; rejected locally, never reaches the store
    #[error("Validation error: {0}")]
    Validation(String),

    /// Save/count failure; surfaced to the caller with local state unchanged
    #[error("Persistence error: {0}")]
    Persistence(#[from] coda_common::Error),

    /// AI rating call failure; recorded per subject, batch continues
    #[error("Rater service error: {0}")]
    Rater(String),

    /// Empty filtered set, no open session, or target out of scope
    #[error("Navigation error: {0}")]
    Navigation(String),

    /// Judgment coverage not met at finish
    #[error("Completion error: {0}")]
    Completion(String),
}

/// Result type for judgment core operations
pub type EngineResult<T> = Result<T, EngineError>;

/// API error type
#[derive(Debug, Error)]
pub enum ApiError {
    /// Resource not found (404)
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Invalid request (400)
    #[error("Invalid request: {0}")]
    BadRequest(String),

    /// Conflict (409) - e.g., batch already running, no open session
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Selection/score validation failure (422)
    #[error("Validation failed: {0}")]
    Validation(String),

    /// Upstream rater/scoring service failure (502)
    #[error("Upstream service error: {0}")]
    Upstream(String),

    /// Internal server error (500)
    #[error("Internal server error: {0}")]
    Internal(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic error
    #[error(transparent)]
    Other(#[from] anyhow::Error),

    /// coda-common error
    #[error("Common error: {0}")]
    Common(#[from] coda_common::Error),
}

impl From<EngineError> for ApiError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::Validation(msg) => ApiError::Validation(msg),
            EngineError::Navigation(msg) => ApiError::Conflict(msg),
            EngineError::Completion(msg) => ApiError::Conflict(msg),
            EngineError::Rater(msg) => ApiError::Upstream(msg),
            EngineError::Persistence(coda_common::Error::NotFound(msg)) => ApiError::NotFound(msg),
            EngineError::Persistence(err) => ApiError::Internal(err.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_code, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, "CONFLICT", msg),
            ApiError::Validation(msg) => (StatusCode::UNPROCESSABLE_ENTITY, "VALIDATION", msg),
            ApiError::Upstream(msg) => (StatusCode::BAD_GATEWAY, "UPSTREAM_ERROR", msg),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", msg),
            ApiError::Io(ref err) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "IO_ERROR",
                err.to_string(),
            ),
            ApiError::Other(ref err) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR",
                err.to_string(),
            ),
            ApiError::Common(ref err) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "COMMON_ERROR",
                err.to_string(),
            ),
        };

        let body = Json(json!({
            "error": {
                "code": error_code,
                "message": message,
            }
        }));

        (status, body).into_response()
    }
}

/// Result type for API handlers
pub type ApiResult<T> = Result<T, ApiError>;
