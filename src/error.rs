//! Error types for flat_drive
//!
//! Every failure a request can hit maps onto one of these kinds, and each kind
//! renders as the `{"error": ...}` JSON envelope with a fixed status code.

use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use thiserror::Error;

/// Result type alias using VfsError
pub type Result<T> = std::result::Result<T, VfsError>;

/// flat_drive error types
#[derive(Error, Debug)]
pub enum VfsError {
    /// Missing or contradictory input; nothing was mutated
    #[error("{0}")]
    Validation(String),

    /// Source object does not exist
    #[error("{0}")]
    NotFound(String),

    /// Key is hidden by the path policy
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Administrative call without a trusted assertion
    #[error("Unauthorized")]
    Unauthorized,

    /// Store call failed
    #[error("Backend failure: {0}")]
    Backend(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// SQLite error
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl VfsError {
    pub fn validation(msg: impl Into<String>) -> Self {
        VfsError::Validation(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        VfsError::NotFound(msg.into())
    }

    pub fn backend(msg: impl Into<String>) -> Self {
        VfsError::Backend(msg.into())
    }
}

impl From<actix_web::error::BlockingError> for VfsError {
    fn from(e: actix_web::error::BlockingError) -> Self {
        VfsError::Backend(e.to_string())
    }
}

impl ResponseError for VfsError {
    fn status_code(&self) -> StatusCode {
        match self {
            VfsError::Validation(_) => StatusCode::BAD_REQUEST,
            VfsError::NotFound(_) => StatusCode::NOT_FOUND,
            VfsError::Forbidden(_) => StatusCode::FORBIDDEN,
            VfsError::Unauthorized => StatusCode::UNAUTHORIZED,
            VfsError::Backend(_) | VfsError::Io(_) | VfsError::Sqlite(_) | VfsError::Json(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(serde_json::json!({
            "error": self.to_string(),
        }))
    }
}
