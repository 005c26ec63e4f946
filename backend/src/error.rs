//! Standardized error handling for the BCMS API
//!
//! Every failure leaves the API as the same JSON body. Internal detail is logged,
//! never returned.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// SQLSTATE codes surfaced by Postgres constraint violations.
const UNIQUE_VIOLATION: &str = "23505";
const FOREIGN_KEY_VIOLATION: &str = "23503";
const CHECK_VIOLATION: &str = "23514";

/// Standard API error response
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiError {
    /// Error code (e.g., "VALIDATION_ERROR", "NOT_FOUND", "FORBIDDEN")
    pub code: String,
    /// Human-readable error message
    pub message: String,
    /// Optional field-level errors for validation
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<HashMap<String, Vec<String>>>,
    /// ISO 8601 timestamp
    pub timestamp: String,
}

impl ApiError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            details: None,
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }

    // Convenience constructors for common error types

    /// Create a 404 Not Found error
    pub fn not_found(resource: impl Into<String>) -> AppError {
        AppError::NotFound(resource.into())
    }

    /// Create a 500 Internal Server Error
    pub fn internal(message: impl Into<String>) -> AppError {
        AppError::InternalError(message.into())
    }

    /// Create a 403 Forbidden error
    pub fn forbidden(message: impl Into<String>) -> AppError {
        AppError::Forbidden(message.into())
    }

    /// Create a 401 Unauthorized error
    pub fn unauthorized(message: impl Into<String>) -> AppError {
        AppError::Unauthorized(message.into())
    }

    /// Create a 400 Bad Request error
    pub fn bad_request(message: impl Into<String>) -> AppError {
        AppError::BadRequest(message.into())
    }

    /// Create a 409 Conflict error
    pub fn conflict(message: impl Into<String>) -> AppError {
        AppError::Conflict(message.into())
    }

    /// Create a validation error with a single field error
    pub fn validation_single(field: impl Into<String>, message: impl Into<String>) -> AppError {
        let mut details = HashMap::new();
        details.insert(field.into(), vec![message.into()]);
        AppError::ValidationError { details }
    }
}

/// Application error type that can be converted to HTTP responses
#[derive(Debug)]
pub enum AppError {
    // Authentication errors
    Unauthorized(String),
    InvalidCredentials,
    TokenExpired,

    // Authorization errors
    Forbidden(String),
    InsufficientPermissions { missing: Vec<String> },

    // Resource errors
    NotFound(String),
    Conflict(String),

    // Validation errors
    ValidationError { details: HashMap<String, Vec<String>> },
    Unprocessable(String),
    BadRequest(String),

    // Server errors
    InternalError(String),
    DatabaseError(String),
}

impl AppError {
    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Unauthorized(_) | Self::InvalidCredentials | Self::TokenExpired => {
                StatusCode::UNAUTHORIZED
            }
            Self::Forbidden(_) | Self::InsufficientPermissions { .. } => StatusCode::FORBIDDEN,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::ValidationError { .. } | Self::Unprocessable(_) => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::InternalError(_) | Self::DatabaseError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Get the error code string
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Unauthorized(_) => "UNAUTHORIZED",
            Self::InvalidCredentials => "INVALID_CREDENTIALS",
            Self::TokenExpired => "TOKEN_EXPIRED",
            Self::Forbidden(_) => "FORBIDDEN",
            Self::InsufficientPermissions { .. } => "INSUFFICIENT_PERMISSIONS",
            Self::NotFound(_) => "NOT_FOUND",
            Self::Conflict(_) => "CONFLICT",
            Self::ValidationError { .. } => "VALIDATION_ERROR",
            Self::Unprocessable(_) => "UNPROCESSABLE_ENTITY",
            Self::BadRequest(_) => "BAD_REQUEST",
            Self::InternalError(_) => "INTERNAL_ERROR",
            Self::DatabaseError(_) => "DATABASE_ERROR",
        }
    }

    /// Get the error message
    pub fn message(&self) -> String {
        match self {
            Self::Unauthorized(msg) => msg.clone(),
            Self::InvalidCredentials => "Incorrect email or password".to_string(),
            Self::TokenExpired => "Authentication token has expired".to_string(),
            Self::Forbidden(msg) => msg.clone(),
            Self::InsufficientPermissions { missing } => {
                let mut missing = missing.clone();
                missing.sort();
                format!(
                    "User does not have the required permissions: {}.",
                    missing.join(", ")
                )
            }
            Self::NotFound(resource) => format!("{} not found", resource),
            Self::Conflict(msg) => msg.clone(),
            Self::ValidationError { .. } => "Validation failed".to_string(),
            Self::Unprocessable(msg) => msg.clone(),
            Self::BadRequest(msg) => msg.clone(),
            Self::InternalError(msg) => {
                tracing::error!("Internal error: {}", msg);
                "An internal error occurred".to_string()
            }
            Self::DatabaseError(msg) => {
                tracing::error!("Database error: {}", msg);
                "A database error occurred".to_string()
            }
        }
    }
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InternalError(msg) | Self::DatabaseError(msg) => {
                write!(f, "{}: {}", self.error_code(), msg)
            }
            _ => write!(f, "{}: {}", self.error_code(), self.message()),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let mut error = ApiError::new(self.error_code(), self.message());

        if let Self::ValidationError { details } = &self {
            error.details = Some(details.clone());
        }

        (status, Json(error)).into_response()
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::RowNotFound => Self::NotFound("Resource".to_string()),
            sqlx::Error::Database(db_err) => match db_err.code().as_deref() {
                Some(UNIQUE_VIOLATION) => {
                    tracing::warn!(constraint = ?db_err.constraint(), "unique constraint violated");
                    Self::Conflict("A record with the same unique value already exists.".to_string())
                }
                Some(FOREIGN_KEY_VIOLATION) => {
                    Self::BadRequest("A referenced record does not exist.".to_string())
                }
                Some(CHECK_VIOLATION) => {
                    Self::BadRequest("A value is outside its allowed range.".to_string())
                }
                _ => Self::DatabaseError(err.to_string()),
            },
            _ => Self::DatabaseError(err.to_string()),
        }
    }
}

impl From<jsonwebtoken::errors::Error> for AppError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        match err.kind() {
            jsonwebtoken::errors::ErrorKind::ExpiredSignature => Self::TokenExpired,
            _ => Self::Unauthorized("Could not validate credentials".to_string()),
        }
    }
}

/// Result type alias for handlers
pub type ApiResult<T> = Result<T, AppError>;

/// Helper to add multiple validation errors
pub struct ValidationBuilder {
    details: HashMap<String, Vec<String>>,
}

impl ValidationBuilder {
    pub fn new() -> Self {
        Self {
            details: HashMap::new(),
        }
    }

    pub fn error(mut self, field: &str, message: &str) -> Self {
        self.push(field, message);
        self
    }

    pub fn push(&mut self, field: &str, message: &str) {
        self.details
            .entry(field.to_string())
            .or_default()
            .push(message.to_string());
    }

    /// Fold a single-field validation failure into the builder.
    pub fn absorb<T>(&mut self, result: Result<T, AppError>) -> Option<T> {
        match result {
            Ok(value) => Some(value),
            Err(AppError::ValidationError { details }) => {
                for (field, messages) in details {
                    self.details.entry(field).or_default().extend(messages);
                }
                None
            }
            Err(other) => {
                self.push("_", &other.message());
                None
            }
        }
    }

    pub fn build(self) -> Option<AppError> {
        if self.details.is_empty() {
            None
        } else {
            Some(AppError::ValidationError {
                details: self.details,
            })
        }
    }

    /// Finish validation, failing if any field was rejected.
    pub fn finish(self) -> Result<(), AppError> {
        match self.build() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    pub fn has_errors(&self) -> bool {
        !self.details.is_empty()
    }
}

impl Default for ValidationBuilder {
    fn default() -> Self {
        Self::new()
    }
}
