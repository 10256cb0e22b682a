use axum::{
    extract::rejection::{JsonRejection, PathRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use sea_orm::{DbErr, RuntimeErr};
use serde::Serialize;
use thiserror::Error;

/// Application error types
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Authentication required")]
    Unauthorized,

    #[error("Access forbidden")]
    Forbidden,

    #[error("Validation error: {message}")]
    Validation {
        message: String,
        field: Option<String>,
    },

    #[error("Reference error: {message}")]
    Reference { message: String, field: String },

    #[error("Cycle error: {0}")]
    Cycle(String),

    #[error("Scope violation: {message}")]
    ScopeViolation { message: String, field: String },

    #[error("Config conflict: {0}")]
    ConfigConflict(String),

    #[error("Has dependents: {0}")]
    HasDependents(String),

    #[error("Exclusivity violation: {0}")]
    ExclusivityViolation(String),

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Internal server error: {0}")]
    Internal(String),

    #[error("Database error: {0}")]
    Database(DbErr),
}

impl AppError {
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        AppError::Validation {
            message: message.into(),
            field: Some(field.into()),
        }
    }

    pub fn reference(field: impl Into<String>, message: impl Into<String>) -> Self {
        AppError::Reference {
            message: message.into(),
            field: field.into(),
        }
    }

    pub fn scope(field: impl Into<String>, message: impl Into<String>) -> Self {
        AppError::ScopeViolation {
            message: message.into(),
            field: field.into(),
        }
    }

    /// Stable machine-readable code
    pub fn code(&self) -> &'static str {
        match self {
            AppError::Unauthorized => "UNAUTHORIZED",
            AppError::Forbidden => "FORBIDDEN",
            AppError::Validation { .. } => "VALIDATION_ERROR",
            AppError::Reference { .. } => "REFERENCE_ERROR",
            AppError::Cycle(_) => "CYCLE_ERROR",
            AppError::ScopeViolation { .. } => "SCOPE_VIOLATION",
            AppError::ConfigConflict(_) => "CONFIG_CONFLICT",
            AppError::HasDependents(_) => "HAS_DEPENDENTS",
            AppError::ExclusivityViolation(_) => "EXCLUSIVITY_VIOLATION",
            AppError::NotFound(_) => "NOT_FOUND",
            AppError::Conflict(_) => "CONFLICT",
            AppError::Internal(_) => "INTERNAL_ERROR",
            AppError::Database(_) => "DATABASE_ERROR",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Unauthorized => StatusCode::UNAUTHORIZED,
            AppError::Forbidden => StatusCode::FORBIDDEN,
            AppError::Validation { .. } => StatusCode::BAD_REQUEST,
            AppError::Reference { .. }
            | AppError::Cycle(_)
            | AppError::ScopeViolation { .. }
            | AppError::ConfigConflict(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::HasDependents(_)
            | AppError::ExclusivityViolation(_)
            | AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Internal(_) | AppError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Offending payload field, when one applies
    pub fn field(&self) -> Option<&str> {
        match self {
            AppError::Validation { field, .. } => field.as_deref(),
            AppError::Reference { field, .. } | AppError::ScopeViolation { field, .. } => {
                Some(field.as_str())
            }
            _ => None,
        }
    }
}

/// Error response body
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
}

impl From<&AppError> for ErrorResponse {
    fn from(err: &AppError) -> Self {
        let message = match err {
            AppError::Validation { message, .. }
            | AppError::Reference { message, .. }
            | AppError::ScopeViolation { message, .. } => message.clone(),
            AppError::Cycle(msg)
            | AppError::ConfigConflict(msg)
            | AppError::HasDependents(msg)
            | AppError::ExclusivityViolation(msg)
            | AppError::NotFound(msg)
            | AppError::Conflict(msg) => msg.clone(),
            AppError::Unauthorized => "Authentication required".to_string(),
            AppError::Forbidden => "Access forbidden".to_string(),
            AppError::Internal(_) => "Internal Server Error".to_string(),
            AppError::Database(_) => "Database Error".to_string(),
        };

        Self {
            code: err.code().to_string(),
            message,
            field: err.field().map(str::to_string),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match &self {
            AppError::Internal(msg) => tracing::error!("Internal error: {}", msg),
            AppError::Database(err) => tracing::error!("Database error: {}", err),
            other => tracing::debug!(code = other.code(), "Request rejected: {}", other),
        }

        let body = ErrorResponse::from(&self);
        (self.status(), Json(body)).into_response()
    }
}

/// Result type alias for application
pub type AppResult<T> = Result<T, AppError>;

/// Helper trait for converting Option to AppError::NotFound
pub trait OptionExt<T> {
    fn ok_or_not_found(self, msg: impl Into<String>) -> AppResult<T>;
}

impl<T> OptionExt<T> for Option<T> {
    fn ok_or_not_found(self, msg: impl Into<String>) -> AppResult<T> {
        self.ok_or_else(|| AppError::NotFound(msg.into()))
    }
}

const PG_UNIQUE: &str = "23505";
const PG_SERIALIZATION_FAILURE: &str = "40001";
const PG_DEADLOCK: &str = "40P01";
const SQLITE_UNIQUE_CODES: &[&str] = &["1555", "2067"];
const SQLITE_BUSY_CODES: &[&str] = &["5", "517"];

/// Database error code, when the driver reported one
fn db_error_code(error: &DbErr) -> Option<String> {
    let runtime_err = match error {
        DbErr::Query(RuntimeErr::SqlxError(sqlx_err))
        | DbErr::Exec(RuntimeErr::SqlxError(sqlx_err)) => sqlx_err,
        _ => return None,
    };

    runtime_err
        .as_database_error()
        .and_then(|db_error| db_error.code())
        .map(|code| code.to_string())
}

/// Unique-constraint and serialization failures are conflicts the caller can retry
impl From<DbErr> for AppError {
    fn from(err: DbErr) -> Self {
        if let Some(code) = db_error_code(&err) {
            if code == PG_UNIQUE || SQLITE_UNIQUE_CODES.contains(&code.as_str()) {
                tracing::debug!(?err, "Unique constraint violation detected");
                return AppError::Conflict("Resource already exists".to_string());
            }
            if code == PG_SERIALIZATION_FAILURE
                || code == PG_DEADLOCK
                || SQLITE_BUSY_CODES.contains(&code.as_str())
            {
                tracing::warn!(?err, "Concurrent transaction conflict");
                return AppError::Conflict(
                    "Concurrent update detected, re-fetch and retry".to_string(),
                );
            }
        }

        match err {
            DbErr::RecordNotFound(record) => AppError::NotFound(record),
            other => AppError::Database(other),
        }
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::Validation {
            message: rejection.body_text(),
            field: None,
        }
    }
}

impl From<QueryRejection> for AppError {
    fn from(rejection: QueryRejection) -> Self {
        AppError::Validation {
            message: rejection.body_text(),
            field: None,
        }
    }
}

impl From<PathRejection> for AppError {
    fn from(rejection: PathRejection) -> Self {
        AppError::Validation {
            message: rejection.body_text(),
            field: None,
        }
    }
}

/// Helper to convert anyhow errors to AppError
impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Internal(err.to_string())
    }
}
