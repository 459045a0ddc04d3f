use std::time::Duration;

use jitbroker_core::{AppError, AppResult};

/// Default admitted requests per window.
pub const DEFAULT_RATE_LIMIT_MAX_REQUESTS: usize = 50;

/// Default window length.
pub const DEFAULT_RATE_LIMIT_WINDOW: Duration = Duration::from_secs(15 * 60);

/// Configuration for a rate limit rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitRule {
    /// Maximum number of admitted requests in the window.
    pub max_requests: usize,
    /// Sliding window length.
    pub window: Duration,
}

impl RateLimitRule {
    /// Creates a new rate limit rule.
    pub fn new(max_requests: usize, window: Duration) -> AppResult<Self> {
        if max_requests == 0 {
            return Err(AppError::Validation(
                "rate limit max requests must be greater than zero".to_owned(),
            ));
        }
        if window.is_zero() {
            return Err(AppError::Validation(
                "rate limit window must be greater than zero".to_owned(),
            ));
        }

        Ok(Self {
            max_requests,
            window,
        })
    }
}

impl Default for RateLimitRule {
    fn default() -> Self {
        Self {
            max_requests: DEFAULT_RATE_LIMIT_MAX_REQUESTS,
            window: DEFAULT_RATE_LIMIT_WINDOW,
        }
    }
}
