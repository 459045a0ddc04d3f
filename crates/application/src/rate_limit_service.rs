//! Sliding-window admission control per `(resource, requester)` pair.
//!
//! Each key keeps the timestamps of its admitted requests inside the window.
//! State lives behind the service's own lock and is never exposed.

mod config;
mod service;

pub use config::{DEFAULT_RATE_LIMIT_MAX_REQUESTS, DEFAULT_RATE_LIMIT_WINDOW, RateLimitRule};
pub use service::{RateLimitDecision, RateLimitService};
