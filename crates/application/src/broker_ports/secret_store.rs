use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use jitbroker_core::AppResult;
use jitbroker_domain::RequestId;

/// Token returned by the secret store.
#[derive(Clone, PartialEq, Eq)]
pub struct MintedToken {
    /// Bearer token value.
    pub token: String,
    /// Lease identifier (token accessor) used for audit and revocation.
    pub lease_id: String,
}

impl fmt::Debug for MintedToken {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("MintedToken")
            .field("token", &"<redacted>")
            .field("lease_id", &self.lease_id)
            .finish()
    }
}

/// Port for minting secret-store native tokens.
#[async_trait]
pub trait SecretStoreTokenMinter: Send + Sync {
    /// Mints a token bound to the static policy for `resource` at `tier`.
    async fn mint_token(&self, resource: &str, tier: u32, ttl: Duration) -> AppResult<MintedToken>;

    /// Mints a token bound to `policy_name` plus the baseline default policy.
    async fn mint_scoped_token(
        &self,
        policy_name: &str,
        ttl: Duration,
        request_id: &RequestId,
    ) -> AppResult<MintedToken>;
}

/// Port for reading key/value secrets that dynamic backends need upstream.
#[async_trait]
pub trait SecretStoreReader: Send + Sync {
    /// Reads string values stored at `path`.
    async fn read_secret(&self, path: &str) -> AppResult<BTreeMap<String, String>>;
}

/// Port for ACL policy management.
#[async_trait]
pub trait SecretStorePolicyManager: Send + Sync {
    /// Creates or overwrites a policy document.
    async fn put_policy(&self, name: &str, document: &str) -> AppResult<()>;

    /// Deletes a policy.
    async fn delete_policy(&self, name: &str) -> AppResult<()>;
}

/// Liveness probe for the secret store.
#[async_trait]
pub trait SecretStoreHealth: Send + Sync {
    /// Returns an error when the secret store is unreachable or rejects the broker's identity.
    async fn health(&self) -> AppResult<()>;
}
