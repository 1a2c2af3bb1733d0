// src/error.rs

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use std::fmt;

use crate::exam::providers::CollaboratorError;
use crate::exam::service::{StartError, SubmitError};
use crate::exam::session::SessionError;

/// Global Application Error Enum.
/// Centralizes error handling and mapping to HTTP responses.
#[derive(Debug)]
pub enum AppError {
    // 500 Internal Server Error
    InternalServerError(String),

    // 400 Bad Request (validation failures)
    BadRequest(String),

    // 401 Unauthorized
    AuthError(String),

    // 403 Forbidden
    Forbidden(String),

    // 404 Not Found
    NotFound(String),

    // 409 Conflict (duplicate username, double submission, state errors)
    Conflict(String),

    // 502 Bad Gateway (collaborator failure; retryable)
    BadGateway(String),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

impl std::error::Error for AppError {}

/// Implements `IntoResponse` for `AppError`.
/// Converts the error into a JSON response with appropriate HTTP status code.
impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            AppError::InternalServerError(msg) => {
                tracing::error!("Internal Server Error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal Server Error".to_string(),
                )
            }
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::AuthError(msg) => (StatusCode::UNAUTHORIZED, msg),
            AppError::Forbidden(msg) => (StatusCode::FORBIDDEN, msg),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, msg),
            AppError::BadGateway(msg) => (StatusCode::BAD_GATEWAY, msg),
        };
        let body = Json(json!({
            "error": error_message,
        }));

        (status, body).into_response()
    }
}

/// Converts `sqlx::Error` into `AppError::InternalServerError`.
/// Allows using `?` operator on database queries.
impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        AppError::InternalServerError(err.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::BadRequest(err.to_string())
    }
}

impl From<SessionError> for AppError {
    fn from(err: SessionError) -> Self {
        match err {
            SessionError::InsufficientQuestions { .. } | SessionError::OutOfRange { .. } => {
                AppError::BadRequest(err.to_string())
            }
            SessionError::NotInProgress | SessionError::AlreadySubmitting => {
                AppError::Conflict(err.to_string())
            }
            SessionError::CursorDesync => AppError::InternalServerError(err.to_string()),
        }
    }
}

impl From<CollaboratorError> for AppError {
    fn from(err: CollaboratorError) -> Self {
        match err {
            CollaboratorError::InsufficientPool { .. } => AppError::Conflict(err.to_string()),
            CollaboratorError::NotFound => AppError::NotFound(err.to_string()),
            CollaboratorError::Rejected(_) | CollaboratorError::Unavailable(_) => {
                AppError::BadGateway(err.to_string())
            }
        }
    }
}

impl From<StartError> for AppError {
    fn from(err: StartError) -> Self {
        match err {
            StartError::Provider(e) => e.into(),
            StartError::Session(e) => e.into(),
        }
    }
}

impl From<SubmitError> for AppError {
    fn from(err: SubmitError) -> Self {
        match err {
            SubmitError::AlreadySubmitting => AppError::Conflict(err.to_string()),
            SubmitError::Collaborator(e) => e.into(),
        }
    }
}
