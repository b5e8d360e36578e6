use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;

use crate::{password::HashError, storage::StorageError, token::TokenError};

/// Message returned for both unknown usernames and wrong passwords.
pub const INVALID_CREDENTIALS: &str = "Invalid username or password";

/// AppError
///
/// The single error type surfaced by handlers. Every variant renders as a JSON
/// `{ "message": ... }` body; dependency failures are logged with their cause
/// and reported to the client with a generic message only.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("username already taken")]
    DuplicateUsername,

    #[error("invalid credentials")]
    InvalidCredentials,

    /// Missing, malformed, expired or forged session. Deliberately carries no cause.
    #[error("unauthorized")]
    Unauthorized,

    #[error("forbidden")]
    Forbidden,

    #[error("{0} not found")]
    NotFound(&'static str),

    /// Request body exceeded the configured upload limit.
    #[error("payload too large")]
    PayloadTooLarge,

    #[error("dependency failure: {0}")]
    Dependency(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("password hashing error: {0}")]
    Hash(#[from] HashError),

    #[error("token signing error: {0}")]
    Token(TokenError),
}

/// ErrorBody
///
/// Wire shape of every error response.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            AppError::Validation(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            AppError::DuplicateUsername => {
                (StatusCode::CONFLICT, "Username already exists".to_string())
            }
            AppError::InvalidCredentials => {
                (StatusCode::BAD_REQUEST, INVALID_CREDENTIALS.to_string())
            }
            AppError::Unauthorized => (StatusCode::UNAUTHORIZED, "Unauthorized".to_string()),
            AppError::Forbidden => (StatusCode::FORBIDDEN, "Forbidden".to_string()),
            AppError::NotFound(what) => (StatusCode::NOT_FOUND, format!("{} not found", what)),
            AppError::PayloadTooLarge => (
                StatusCode::PAYLOAD_TOO_LARGE,
                "Upload exceeds the size limit".to_string(),
            ),
            AppError::Dependency(_)
            | AppError::Database(_)
            | AppError::Storage(_)
            | AppError::Hash(_)
            | AppError::Token(_) => {
                tracing::error!(error = %self, "request failed on a dependency");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
        };

        (status, Json(ErrorBody { message })).into_response()
    }
}

/// Convenience alias for handler and repository results.
pub type AppResult<T> = Result<T, AppError>;
