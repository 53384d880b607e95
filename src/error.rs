use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::domain::{ServiceId, UserId};

/// Failures of the placement and distribution core.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Validation failed: {0}")]
    Validation(String),
    #[error("Circular reference: user {node} already appears above user {start}")]
    CircularReference { start: UserId, node: UserId },
    #[error("Ancestor chain above user {start} exceeds the depth limit of {limit}")]
    ChainTooDeep { start: UserId, limit: usize },
    #[error("Placement search under sponsor {sponsor} exceeded the visit limit of {limit}")]
    Overflow { sponsor: UserId, limit: usize },
    #[error("Service {0} is not active")]
    InactiveService(ServiceId),
    #[error("Service {service} has an invalid BV: {reason}")]
    InvalidBv { service: ServiceId, reason: String },
    #[error("Transaction failed: {0}")]
    Transaction(String),
    #[error(transparent)]
    Db(#[from] sqlx::Error),
}

impl CoreError {
    /// Safety caps only trip on corrupt or runaway data, never on user input.
    pub fn is_integrity_failure(&self) -> bool {
        matches!(
            self,
            CoreError::ChainTooDeep { .. } | CoreError::Overflow { .. }
        )
    }

    /// True when a unit of work lost a race and may succeed if run again:
    /// a (parent, position) or referral code uniqueness clash, or SQLite busy.
    pub fn is_contention(&self) -> bool {
        match self {
            CoreError::Db(sqlx::Error::Database(db)) => {
                db.is_unique_violation()
                    || matches!(db.code().as_deref(), Some("5") | Some("6") | Some("517"))
            }
            _ => false,
        }
    }
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Internal server error: {0}")]
    Internal(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Bad request: {0}")]
    BadRequest(String),
    #[error("Conflict: {0}")]
    Conflict(String),
    #[error("Unprocessable: {0}")]
    Unprocessable(String),
    #[error("Unavailable: {0}")]
    Unavailable(String),
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        AppError::Internal(err.to_string())
    }
}

impl From<CoreError> for AppError {
    fn from(err: CoreError) -> Self {
        let msg = err.to_string();
        match err {
            CoreError::NotFound(_) => AppError::NotFound(msg),
            CoreError::Validation(_) => AppError::BadRequest(msg),
            CoreError::CircularReference { .. } => AppError::Conflict(msg),
            CoreError::InactiveService(_) | CoreError::InvalidBv { .. } => {
                AppError::Unprocessable(msg)
            }
            CoreError::Transaction(_) => AppError::Unavailable(msg),
            CoreError::ChainTooDeep { .. } | CoreError::Overflow { .. } | CoreError::Db(_) => {
                AppError::Internal(msg)
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            AppError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, msg),
            AppError::Unprocessable(msg) => (StatusCode::UNPROCESSABLE_ENTITY, msg),
            AppError::Unavailable(msg) => (StatusCode::SERVICE_UNAVAILABLE, msg),
        };

        let body = Json(json!({
            "error": error_message,
        }));

        (status, body).into_response()
    }
}
