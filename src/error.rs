// src/error.rs

use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use log::error;
use serde_json::json;

/// Failure returned by every task and category operation.
///
/// `NotFound` is used both for missing entities and for entities owned by
/// somebody else, so callers cannot discover ids they do not own.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    DuplicateName(String),

    #[error("{0}")]
    InvalidReference(String),

    #[error("{0}")]
    Unauthenticated(String),

    #[error("storage unavailable: {0}")]
    StorageUnavailable(String),
}

pub type ServiceResult<T> = Result<T, ServiceError>;

impl ServiceError {
    pub fn task_not_found() -> Self {
        ServiceError::NotFound("Task not found".to_string())
    }

    pub fn category_not_found() -> Self {
        ServiceError::NotFound("Category not found".to_string())
    }

    pub fn attachment_not_found() -> Self {
        ServiceError::NotFound("Attachment not found".to_string())
    }

    pub fn duplicate_category() -> Self {
        ServiceError::DuplicateName("Category with this name already exists".to_string())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        ServiceError::Validation(msg.into())
    }
}

impl From<mongodb::error::Error> for ServiceError {
    fn from(err: mongodb::error::Error) -> Self {
        error!("MongoDB error: {}", err);
        ServiceError::StorageUnavailable(err.to_string())
    }
}

impl ResponseError for ServiceError {
    fn status_code(&self) -> StatusCode {
        match self {
            ServiceError::NotFound(_) => StatusCode::NOT_FOUND,
            ServiceError::Validation(_)
            | ServiceError::DuplicateName(_)
            | ServiceError::InvalidReference(_) => StatusCode::BAD_REQUEST,
            ServiceError::Unauthenticated(_) => StatusCode::UNAUTHORIZED,
            ServiceError::StorageUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    fn error_response(&self) -> HttpResponse {
        // Driver details stay in the log.
        let message = match self {
            ServiceError::StorageUnavailable(_) => "Server error".to_string(),
            other => other.to_string(),
        };
        HttpResponse::build(self.status_code()).json(json!({ "message": message }))
    }
}

/// Failure of a calendar or attachment-store call.
///
/// Never converted into [`ServiceError`]; see [`crate::best_effort::attempt`].
#[derive(Debug, thiserror::Error)]
pub enum ExternalSyncError {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("calendar backend error: {0}")]
    Calendar(String),

    #[error("unknown calendar event {0}")]
    UnknownEvent(String),
}

impl From<mongodb::error::Error> for ExternalSyncError {
    fn from(err: mongodb::error::Error) -> Self {
        ExternalSyncError::Calendar(err.to_string())
    }
}
