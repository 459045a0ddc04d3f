//! Domain entities and invariants.

#![forbid(unsafe_code)]

mod request;
mod tier;
mod vault_path;

pub use request::{
    AccessRequest, Credential, NewAccessRequest, NotificationHandle, RequestId, RequestStatus,
    VAULT_RESOURCE,
};
pub use tier::{TierConfig, TierPolicy};
pub use vault_path::{
    DEFAULT_MAX_VAULT_PATHS, DEFAULT_VAULT_PATH_PREFIX, ScopedVaultPath, VaultCapability,
    VaultPathRequest, VaultPathRules, render_policy_document,
};
