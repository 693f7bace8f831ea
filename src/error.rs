//! Crate-wide error type.
//!
//! Handlers return `PortalError` and actix turns it into an inline message
//! with the matching HTTP status. The comment cache never surfaces `Remote`
//! to users; it degrades to the local store instead.

use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PortalError {
    /// Record missing in its collection (e.g., suggestion, feedback, admin)
    #[error("{0} not found with ID {1}")]
    NotFound(String, String),

    /// Rejected before any network call (empty text, blocked word, rating range)
    #[error("validation error: {0}")]
    Validation(String),

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// Authenticated, but not an admin
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// Status transition not allowed, or the record changed underneath us
    #[error("conflict: {0}")]
    Conflict(String),

    /// Document database unreachable or refused the operation
    #[error("remote store error: {0}")]
    Remote(String),

    /// Local key/value store could not be read or written
    #[error("local storage error: {0}")]
    Storage(String),

    #[error("configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, PortalError>;

impl PortalError {
    pub fn not_found(kind: &str, id: &str) -> Self {
        Self::NotFound(kind.to_string(), id.to_string())
    }

    pub fn validation(msg: &str) -> Self {
        Self::Validation(msg.to_string())
    }
}

impl From<mongodb::error::Error> for PortalError {
    fn from(err: mongodb::error::Error) -> Self {
        PortalError::Remote(err.to_string())
    }
}

impl From<mongodb::bson::oid::Error> for PortalError {
    fn from(err: mongodb::bson::oid::Error) -> Self {
        PortalError::Validation(format!("invalid document id: {}", err))
    }
}

impl From<serde_json::Error> for PortalError {
    fn from(err: serde_json::Error) -> Self {
        PortalError::Storage(err.to_string())
    }
}

impl From<std::io::Error> for PortalError {
    fn from(err: std::io::Error) -> Self {
        PortalError::Storage(err.to_string())
    }
}

impl ResponseError for PortalError {
    fn status_code(&self) -> StatusCode {
        match self {
            PortalError::NotFound(..) => StatusCode::NOT_FOUND,
            PortalError::Validation(_) => StatusCode::BAD_REQUEST,
            PortalError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            PortalError::Forbidden(_) => StatusCode::FORBIDDEN,
            PortalError::Conflict(_) => StatusCode::CONFLICT,
            PortalError::Remote(_) | PortalError::Storage(_) | PortalError::Config(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code())
            .json(serde_json::json!({ "error": self.to_string() }))
    }
}
