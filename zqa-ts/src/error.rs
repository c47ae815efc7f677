//! Error types for zqa-ts
//!
//! [`TaskError`] is the lifecycle manager's taxonomy. [`ApiError`] is the
//! HTTP boundary: it maps each kind to a status code and a fixed user-facing
//! message, and never echoes internal details.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Lifecycle manager error
#[derive(Debug, Error)]
pub enum TaskError {
    /// Missing filename or wrong extension
    #[error("Invalid file: {0}")]
    InvalidFile(String),

    /// Size hint unknown, or hint/actual size above the cap
    #[error("File too large: {} (limit {limit} bytes)", describe_size(.size))]
    FileTooLarge { size: Option<u64>, limit: u64 },

    /// Archive failed structural validation
    #[error("ZIP validation failed: {0}")]
    ZipValidation(String),

    #[error("Task not found: {0}")]
    TaskNotFound(String),

    /// Storage, record store or analysis failure
    #[error("Task processing error: {0}")]
    Processing(String),

    /// Identity check failed
    #[error("Access denied: {0}")]
    AccessDenied(String),
}

fn describe_size(size: &Option<u64>) -> String {
    match size {
        Some(bytes) => format!("{} bytes", bytes),
        None => "size unknown".to_string(),
    }
}

/// Cap in the largest whole unit that divides it
fn describe_limit(limit: u64) -> String {
    const KIB: u64 = 1024;
    const MIB: u64 = 1024 * 1024;
    match limit {
        0 => "0 bytes".to_string(),
        l if l % MIB == 0 => format!("{} MB", l / MIB),
        l if l % KIB == 0 => format!("{} KB", l / KIB),
        l => format!("{} bytes", l),
    }
}

impl TaskError {
    /// HTTP status for this kind
    pub fn status_code(&self) -> StatusCode {
        match self {
            TaskError::InvalidFile(_)
            | TaskError::FileTooLarge { .. }
            | TaskError::ZipValidation(_) => StatusCode::BAD_REQUEST,
            TaskError::TaskNotFound(_) => StatusCode::NOT_FOUND,
            TaskError::Processing(_) => StatusCode::INTERNAL_SERVER_ERROR,
            TaskError::AccessDenied(_) => StatusCode::UNAUTHORIZED,
        }
    }

    /// Stable message shown to clients
    pub fn public_message(&self) -> String {
        match self {
            TaskError::InvalidFile(_) => "Invalid file".to_string(),
            TaskError::FileTooLarge { limit, .. } => {
                format!("File size exceeds {}", describe_limit(*limit))
            }
            TaskError::ZipValidation(_) => "ZIP archive validation failed".to_string(),
            TaskError::TaskNotFound(_) => "Task not found".to_string(),
            TaskError::Processing(_) => "Task processing error".to_string(),
            TaskError::AccessDenied(_) => "Invalid authentication credentials".to_string(),
        }
    }
}

/// API error type
#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Task(#[from] TaskError),

    /// Malformed request that never reached the lifecycle manager (400)
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Anything unclassified (500, generic body)
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, detail) = match &self {
            ApiError::Task(err) => {
                match err {
                    TaskError::Processing(_) => {
                        tracing::error!(error = %err, "Processing error")
                    }
                    TaskError::AccessDenied(_) => {
                        tracing::warn!(error = %err, "Access denied")
                    }
                    _ => tracing::debug!(error = %err, "Request rejected"),
                }
                (err.status_code(), err.public_message())
            }
            ApiError::BadRequest(msg) => {
                tracing::debug!(error = %msg, "Bad request");
                (StatusCode::BAD_REQUEST, msg.clone())
            }
            ApiError::Other(err) => {
                tracing::error!(error = %err, "Unhandled error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
        };

        (status, Json(json!({ "detail": detail }))).into_response()
    }
}

/// Result type for API handlers
pub type ApiResult<T> = Result<T, ApiError>;
