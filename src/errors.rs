use crate::services::submission_service::{AdminError, SubmitError};
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use std::fmt;

/// A lightweight wrapper for general errors that keeps the message local.
///
/// Every error path renders the same envelope: `{"error": ..., "status": ...}`
/// with only the message string exposed, never the underlying error object.
#[derive(Debug)]
pub struct AppError {
    pub status: StatusCode,
    pub message: String,
}

impl AppError {
    /// Create a new AppError with a specific status and message.
    pub fn new(status: StatusCode, msg: impl Into<String>) -> Self {
        Self {
            status,
            message: msg.into(),
        }
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for AppError {}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = Json(json!({
            "error": self.message,
            "status": self.status.as_u16()
        }));

        (self.status, body).into_response()
    }
}

impl From<SubmitError> for AppError {
    fn from(err: SubmitError) -> Self {
        let status = match &err {
            SubmitError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            SubmitError::InvalidBody
            | SubmitError::MissingChallengeToken
            | SubmitError::EmptyBatch
            | SubmitError::Validation(_) => StatusCode::BAD_REQUEST,
            SubmitError::ChallengeRejected => StatusCode::FORBIDDEN,
            SubmitError::SystemBusy => StatusCode::SERVICE_UNAVAILABLE,
            SubmitError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        AppError::new(status, err.to_string())
    }
}

impl From<AdminError> for AppError {
    fn from(err: AdminError) -> Self {
        let status = match &err {
            AdminError::Unauthorized => StatusCode::UNAUTHORIZED,
            AdminError::Host { status, .. } => {
                StatusCode::from_u16(*status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
            }
            AdminError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        AppError::new(status, err.to_string())
    }
}
