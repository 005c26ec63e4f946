//! Request validation for the BCMS API
//!
//! Payloads are checked field by field and rejected as a whole with a 422 that
//! lists every offending field.

use axum::{
    async_trait,
    extract::{rejection::JsonRejection, FromRequest, Request},
    Json,
};
use regex::Regex;
use serde::{de::DeserializeOwned, Deserialize, Deserializer};
use std::sync::OnceLock;

use crate::error::{ApiError, AppError, ValidationBuilder};

/// Validation result type
pub type ValidationResult<T> = Result<T, AppError>;

/// Implemented by request payloads that carry field constraints.
pub trait Validate {
    fn validate(&self) -> ValidationResult<()>;
}

/// JSON body that has been deserialized and validated
#[derive(Debug, Clone)]
pub struct Validated<T>(pub T);

impl<T> Validated<T> {
    pub fn into_inner(self) -> T {
        self.0
    }
}

impl<T> std::ops::Deref for Validated<T> {
    type Target = T;
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

#[async_trait]
impl<S, T> FromRequest<S> for Validated<T>
where
    T: DeserializeOwned + Validate,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state)
            .await
            .map_err(json_rejection)?;
        value.validate()?;
        Ok(Validated(value))
    }
}

fn json_rejection(rejection: JsonRejection) -> AppError {
    match rejection {
        JsonRejection::JsonDataError(err) => ApiError::validation_single("body", err.body_text()),
        JsonRejection::JsonSyntaxError(err) => AppError::BadRequest(err.body_text()),
        JsonRejection::MissingJsonContentType(_) => {
            AppError::BadRequest("Expected request with `Content-Type: application/json`".to_string())
        }
        other => AppError::BadRequest(other.body_text()),
    }
}

/// Deserializer for `Option<Option<T>>` patch fields: an omitted key stays
/// `None`, an explicit `null` becomes `Some(None)`.
pub fn nullable<'de, T, D>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

/// Borrow the inner string of a nullable patch field
pub fn patched(value: &Option<Option<String>>) -> Option<&str> {
    value.as_ref().and_then(|inner| inner.as_deref())
}

fn email_regex() -> &'static Regex {
    static EMAIL: OnceLock<Regex> = OnceLock::new();
    EMAIL.get_or_init(|| {
        Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("email pattern is valid")
    })
}

/// Validator builder for request payloads
#[derive(Default)]
pub struct Validator {
    builder: ValidationBuilder,
}

impl Validator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add error if condition is true
    pub fn error_if(mut self, condition: bool, field: &str, message: &str) -> Self {
        if condition {
            self.builder.push(field, message);
        }
        self
    }

    /// Non-blank string no longer than `max` characters
    pub fn name(self, value: &str, field: &str, max: usize) -> Self {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            return self.error_if(true, field, &format!("{} cannot be empty", field));
        }
        self.max_length(Some(value), field, max)
    }

    /// Same as [`Validator::name`] for patch fields
    pub fn optional_name(self, value: Option<&str>, field: &str, max: usize) -> Self {
        match value {
            Some(v) => self.name(v, field, max),
            None => self,
        }
    }

    pub fn max_length(self, value: Option<&str>, field: &str, max: usize) -> Self {
        let too_long = value.is_some_and(|v| v.chars().count() > max);
        self.error_if(too_long, field, &format!("{} must be {} characters or less", field, max))
    }

    pub fn email(self, value: Option<&str>, field: &str) -> Self {
        let invalid = value.is_some_and(|v| !email_regex().is_match(v.trim()));
        self.error_if(invalid, field, "Invalid email format")
    }

    pub fn min_length(self, value: Option<&str>, field: &str, min: usize) -> Self {
        let too_short = value.is_some_and(|v| v.chars().count() < min);
        self.error_if(too_short, field, &format!("{} must be at least {} characters", field, min))
    }

    pub fn non_negative_i32(self, value: Option<i32>, field: &str) -> Self {
        self.error_if(value.is_some_and(|n| n < 0), field, &format!("{} cannot be negative", field))
    }

    pub fn non_negative_f64(self, value: Option<f64>, field: &str) -> Self {
        self.error_if(value.is_some_and(|n| n < 0.0), field, &format!("{} cannot be negative", field))
    }

    pub fn at_least_i32(self, value: Option<i32>, field: &str, min: i32) -> Self {
        self.error_if(
            value.is_some_and(|n| n < min),
            field,
            &format!("{} must be greater than or equal to {}", field, min),
        )
    }

    pub fn not_empty<T>(self, value: &[T], field: &str) -> Self {
        self.error_if(value.is_empty(), field, &format!("{} cannot be empty", field))
    }

    /// Finish validation
    pub fn finish(self) -> ValidationResult<()> {
        self.builder.finish()
    }
}
