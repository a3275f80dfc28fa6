//! Application error taxonomy and its mapping onto HTTP responses.
//!
//! Recoverable conditions (malformed import documents, rejected conflict
//! resolutions) carry their message through to the client; persistence
//! failures are logged server-side and answered with a generic 500.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use std::fmt;

#[derive(Debug)]
pub enum AppError {
    // 400: import document is not an array of the declared record kind
    MalformedImport(String),

    // 422: intra-file resolution left blank or duplicate ids
    ValidationRejected(String),

    // 404
    NotFound(String),

    // 409: duplicate id on create, or an import already in flight
    Conflict(String),

    // 500: the JSON file store could not be read or written
    Persistence(String),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

impl std::error::Error for AppError {}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            AppError::MalformedImport(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::ValidationRejected(msg) => (StatusCode::UNPROCESSABLE_ENTITY, msg),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, msg),
            AppError::Persistence(msg) => {
                tracing::error!("persistence failure: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "persistence failure".to_string(),
                )
            }
        };
        let body = Json(json!({
            "error": error_message,
        }));

        (status, body).into_response()
    }
}

/// Lets store code use `?` on file operations.
impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::Persistence(err.to_string())
    }
}
