use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use triage_core::error::{self, ApiError};

/// Internal error type that converts to structured API responses
#[derive(Debug)]
pub enum AppError {
    /// Validation error (400)
    Validation {
        message: String,
        field: Option<String>,
        received: Option<serde_json::Value>,
        docs_hint: Option<String>,
    },
    /// Resource does not exist (404)
    NotFound { resource: String },
    /// Action type cannot be executed or rolled back (400)
    InvalidAction { message: String },
    /// Rollback rejected: already rolled back or superseded by a later action (409)
    RollbackConflict { message: String },
    /// AI scoring service unreachable after retries (502)
    Upstream { message: String },
    /// Database error (500)
    Database(sqlx::Error),
    /// Internal error (500)
    Internal(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        // TODO: extract request_id from extensions once the request-id middleware is wired
        let request_id = uuid::Uuid::now_v7().to_string();

        let (status, api_error) = match self {
            AppError::Validation {
                message,
                field,
                received,
                docs_hint,
            } => (
                StatusCode::BAD_REQUEST,
                ApiError {
                    error: error::codes::VALIDATION_FAILED.to_string(),
                    message,
                    field,
                    received,
                    request_id,
                    docs_hint,
                },
            ),
            AppError::NotFound { resource } => (
                StatusCode::NOT_FOUND,
                ApiError {
                    error: error::codes::NOT_FOUND.to_string(),
                    message: format!("{resource} not found"),
                    field: None,
                    received: None,
                    request_id,
                    docs_hint: None,
                },
            ),
            AppError::InvalidAction { message } => (
                StatusCode::BAD_REQUEST,
                ApiError {
                    error: error::codes::INVALID_ACTION.to_string(),
                    message,
                    field: None,
                    received: None,
                    request_id,
                    docs_hint: None,
                },
            ),
            AppError::RollbackConflict { message } => (
                StatusCode::CONFLICT,
                ApiError {
                    error: error::codes::ROLLBACK_CONFLICT.to_string(),
                    message,
                    field: None,
                    received: None,
                    request_id,
                    docs_hint: Some(
                        "Each action can be rolled back at most once. Fetch the ticket's \
                         action history to see the current rollback status."
                            .to_string(),
                    ),
                },
            ),
            AppError::Upstream { message } => (
                StatusCode::BAD_GATEWAY,
                ApiError {
                    error: error::codes::UPSTREAM_UNAVAILABLE.to_string(),
                    message,
                    field: None,
                    received: None,
                    request_id,
                    docs_hint: Some(
                        "The ticket is left unprocessed and can be re-submitted for \
                         processing later."
                            .to_string(),
                    ),
                },
            ),
            AppError::Database(err) => {
                tracing::error!("Database error: {:?}", err);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ApiError {
                        error: error::codes::INTERNAL_ERROR.to_string(),
                        message: "An internal error occurred".to_string(),
                        field: None,
                        received: None,
                        request_id,
                        docs_hint: None,
                    },
                )
            }
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ApiError {
                        error: error::codes::INTERNAL_ERROR.to_string(),
                        message: "An internal error occurred".to_string(),
                        field: None,
                        received: None,
                        request_id,
                        docs_hint: None,
                    },
                )
            }
        };

        (status, Json(api_error)).into_response()
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        AppError::Database(err)
    }
}
