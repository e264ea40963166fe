//! Error types for the timeline engine.
//!
//! All errors in the application convert to `AppError`, which implements
//! `IntoResponse` for HTTP responses. Variants mirror the five error kinds
//! the engine's operations are specified to produce.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    /// User/post missing in RelStore (404).
    #[error("not found")]
    NotFound,

    /// Unique-violation on username or duplicate follow edge (409). Most
    /// call sites resolve this idempotently instead of surfacing it; it is
    /// still a distinct kind for the cases that can't (user creation).
    #[error("conflict: {0}")]
    Conflict(String),

    /// Store I/O failure, retryable at the caller (503).
    #[error("transient store failure: {0}")]
    Transient(String),

    /// The ambient cancellation handle was cancelled (mapped to 408).
    #[error("operation cancelled")]
    CancelDetected,

    /// Missing uid, empty content, unknown strategy (400).
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Anything else: programmer error, unexpected driver failure (500).
    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::RowNotFound => AppError::NotFound,
            sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
                AppError::Conflict(db_err.message().to_string())
            }
            _ => AppError::Transient(err.to_string()),
        }
    }
}

impl From<sqlx::migrate::MigrateError> for AppError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        AppError::Internal(anyhow::anyhow!("migration failed: {err}"))
    }
}

impl From<redis::RedisError> for AppError {
    fn from(err: redis::RedisError) -> Self {
        AppError::Transient(err.to_string())
    }
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::Internal(anyhow::anyhow!("config error: {err}"))
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        use axum::Json;

        let (status, error_message, error_type) = match &self {
            AppError::NotFound => (StatusCode::NOT_FOUND, self.to_string(), "not_found"),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, msg.clone(), "conflict"),
            AppError::Transient(msg) => {
                (StatusCode::SERVICE_UNAVAILABLE, msg.clone(), "transient")
            }
            AppError::CancelDetected => (StatusCode::REQUEST_TIMEOUT, self.to_string(), "cancelled"),
            AppError::InvalidInput(msg) => (StatusCode::BAD_REQUEST, msg.clone(), "invalid_input"),
            AppError::Internal(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal error".to_string(),
                "internal",
            ),
        };

        crate::metrics::ERRORS_TOTAL
            .with_label_values(&[error_type])
            .inc();

        let body = Json(serde_json::json!({ "error": error_message }));
        (status, body).into_response()
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
