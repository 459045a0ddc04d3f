//! Shared primitives for all Rust crates in the JIT credential broker.

#![forbid(unsafe_code)]

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type used across broker crates.
pub type AppResult<T> = Result<T, AppError>;

/// A validated non-empty UTF-8 string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NonEmptyString(String);

impl NonEmptyString {
    /// Creates a validated non-empty string.
    pub fn new(value: impl Into<String>) -> AppResult<Self> {
        let value = value.into();
        if value.trim().is_empty() {
            return Err(AppError::Validation(
                "value must not be empty or whitespace".to_owned(),
            ));
        }

        Ok(Self(value))
    }

    /// Creates a validated non-empty string, naming the offending field on failure.
    pub fn for_field(field: &str, value: impl Into<String>) -> AppResult<Self> {
        Self::new(value).map_err(|_| AppError::Validation(format!("{field} is required")))
    }

    /// Returns the underlying string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl From<NonEmptyString> for String {
    fn from(value: NonEmptyString) -> Self {
        value.0
    }
}

/// Common application error categories.
#[derive(Debug, Error)]
pub enum AppError {
    /// Invalid input or violated invariant.
    #[error("validation error: {0}")]
    Validation(String),

    /// Requested resource does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// A lifecycle transition was attempted on a request that already left `pending`.
    #[error("not pending: {0}")]
    NotPending(String),

    /// Caller is not authenticated.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// Caller is authenticated but not allowed to perform the operation.
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// Bounded in-memory state is full.
    #[error("capacity exceeded: {0}")]
    CapacityExceeded(String),

    /// Admission control rejected the call.
    #[error("rate limited: {message}")]
    RateLimited {
        /// Human-readable rejection message.
        message: String,
        /// Time until the next slot opens.
        retry_after: Duration,
    },

    /// Secret store or upstream credential issuer failed.
    #[error("upstream error: {0}")]
    Upstream(String),

    /// Internal unexpected error.
    #[error("internal error: {0}")]
    Internal(String),
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::{AppError, NonEmptyString};

    #[test]
    fn non_empty_string_rejects_whitespace() {
        let result = NonEmptyString::new("   ");
        assert!(result.is_err());
    }

    #[test]
    fn for_field_names_the_missing_field() {
        let result = NonEmptyString::for_field("reason", "");
        assert!(matches!(
            result,
            Err(AppError::Validation(message)) if message == "reason is required"
        ));
    }

    #[test]
    fn rate_limited_displays_message() {
        let error = AppError::RateLimited {
            message: "slow down".to_owned(),
            retry_after: Duration::from_secs(3),
        };
        assert_eq!(error.to_string(), "rate limited: slow down");
    }
}
