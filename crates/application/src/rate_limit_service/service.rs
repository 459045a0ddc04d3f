use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;

use jitbroker_core::{AppError, AppResult};

use super::config::RateLimitRule;

/// Outcome of one admission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateLimitDecision {
    /// The call was admitted and recorded.
    Allowed,
    /// The call was rejected; the next slot opens after `retry_after`.
    Limited {
        /// Time until the oldest retained entry leaves the window.
        retry_after: Duration,
    },
}

/// Application service for rate limiting.
#[derive(Clone)]
pub struct RateLimitService {
    rule: RateLimitRule,
    windows: Arc<Mutex<HashMap<String, VecDeque<Instant>>>>,
}

impl RateLimitService {
    /// Creates a new rate limit service with a fixed rule.
    #[must_use]
    pub fn new(rule: RateLimitRule) -> Self {
        Self {
            rule,
            windows: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Checks and records one call for `(resource, requester)`.
    pub async fn allow(&self, resource: &str, requester: &str) -> RateLimitDecision {
        let key = format!("{resource}:{requester}");
        let now = Instant::now();

        let mut windows = self.windows.lock().await;
        let entries = windows.entry(key).or_default();
        prune(entries, now, self.rule.window);

        if entries.len() >= self.rule.max_requests {
            let retry_after = entries
                .front()
                .map(|oldest| (*oldest + self.rule.window).saturating_duration_since(now))
                .unwrap_or(self.rule.window);
            return RateLimitDecision::Limited { retry_after };
        }

        entries.push_back(now);
        RateLimitDecision::Allowed
    }

    /// Checks the limit and maps a rejection to [`AppError::RateLimited`].
    pub async fn check_rate_limit(&self, resource: &str, requester: &str) -> AppResult<()> {
        match self.allow(resource, requester).await {
            RateLimitDecision::Allowed => Ok(()),
            RateLimitDecision::Limited { retry_after } => Err(AppError::RateLimited {
                message: format!(
                    "rate limit exceeded for {resource}, retry after {}s",
                    retry_after.as_secs().max(1)
                ),
                retry_after,
            }),
        }
    }

    /// Drops keys whose entries have all left the window. Returns removed key count.
    pub async fn prune_idle(&self) -> usize {
        let now = Instant::now();
        let mut windows = self.windows.lock().await;
        let before = windows.len();
        windows.retain(|_, entries| {
            prune(entries, now, self.rule.window);
            !entries.is_empty()
        });
        before - windows.len()
    }

    /// Returns the number of tracked keys.
    pub async fn tracked_keys(&self) -> usize {
        self.windows.lock().await.len()
    }
}

fn prune(entries: &mut VecDeque<Instant>, now: Instant, window: Duration) {
    while let Some(oldest) = entries.front() {
        if now.saturating_duration_since(*oldest) < window {
            break;
        }
        entries.pop_front();
    }
}
