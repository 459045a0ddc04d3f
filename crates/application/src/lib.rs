//! Application services and ports.

#![forbid(unsafe_code)]

mod approval_service;
mod backend_registry;
mod broker_ports;
mod deferred_tasks;
mod dynamic_policy_backend;
mod rate_limit_service;
mod request_store;
mod static_backend;

#[cfg(test)]
mod test_support;

pub use approval_service::{
    ApprovalDecision, ApprovalService, CallbackOutcome, DEFAULT_REQUEST_TIMEOUT, DEFAULT_SCOPE,
    HealthReport, RequestStatusView,
};
pub use backend_registry::BackendRegistry;
pub use broker_ports::{
    ApprovalNotice, CredentialBackend, MintOptions, MintedToken, Notifier, SecretStoreHealth,
    SecretStorePolicyManager, SecretStoreReader, SecretStoreTokenMinter,
};
pub use deferred_tasks::DeferredTasks;
pub use dynamic_policy_backend::{
    DEFAULT_POLICY_CLEANUP_BUFFER, DYNAMIC_POLICY_BACKEND_NAME, DYNAMIC_POLICY_PREFIX,
    DynamicPolicyBackend, dynamic_policy_name,
};
pub use rate_limit_service::{
    DEFAULT_RATE_LIMIT_MAX_REQUESTS, DEFAULT_RATE_LIMIT_WINDOW, RateLimitDecision, RateLimitRule,
    RateLimitService,
};
pub use request_store::{DEFAULT_REQUEST_STORE_CAPACITY, RequestStore};
pub use static_backend::{STATIC_BACKEND_NAME, StaticBackend};
