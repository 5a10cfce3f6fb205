use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

/// AppError
///
/// The failure type returned by every handler. Each variant maps onto one HTTP status,
/// and a policy denial always surfaces as `Forbidden`, never as an empty success.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Unauthorized")]
    Unauthorized,

    #[error("Forbidden")]
    Forbidden,

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// RepoError
///
/// Persistence failures that a handler may need to distinguish.
#[derive(Debug, Error)]
pub enum RepoError {
    /// A unique constraint (post slug, category name, tag name) was violated.
    #[error("Duplicate value: {0}")]
    Conflict(String),

    /// A referenced category, tag or user does not exist.
    #[error("Unknown reference: {0}")]
    MissingReference(String),

    #[error("Query execution failed: {0}")]
    Query(String),
}

/// ConfigError
///
/// Raised by `AppConfig::load` when the environment cannot produce a usable configuration.
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("{name} has an invalid value: {value:?}")]
    Invalid { name: &'static str, value: String },
}

/// ErrorBody
///
/// JSON body written for every error response.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ErrorBody {
    pub status: u16,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl AppError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Unauthorized => StatusCode::UNAUTHORIZED,
            AppError::Forbidden => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let detail = match self {
            AppError::NotFound(detail) | AppError::Conflict(detail) | AppError::Validation(detail) => {
                Some(detail)
            }
            AppError::Internal(detail) => {
                // Internal details stay in the logs.
                tracing::error!("Internal error: {}", detail);
                None
            }
            AppError::Unauthorized | AppError::Forbidden => None,
        };

        let body = ErrorBody {
            status: status.as_u16(),
            title: status.canonical_reason().unwrap_or("Error").to_string(),
            detail,
        };

        (status, Json(body)).into_response()
    }
}

impl From<RepoError> for AppError {
    fn from(err: RepoError) -> Self {
        match err {
            RepoError::Conflict(msg) => AppError::Conflict(msg),
            RepoError::MissingReference(msg) => AppError::Validation(msg),
            RepoError::Query(msg) => AppError::Internal(msg),
        }
    }
}

impl From<sqlx::Error> for RepoError {
    fn from(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db_err) = &err {
            let constraint = db_err.constraint().unwrap_or("constraint").to_string();
            if db_err.is_unique_violation() {
                return RepoError::Conflict(constraint);
            }
            if db_err.is_foreign_key_violation() {
                return RepoError::MissingReference(constraint);
            }
        }
        RepoError::Query(err.to_string())
    }
}
