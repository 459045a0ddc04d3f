use std::time::Duration;

use async_trait::async_trait;
use jitbroker_core::AppResult;
use jitbroker_domain::{Credential, RequestId, VaultPathRequest};

/// Request-scoped parameters passed to a backend mint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MintOptions {
    /// Backend-interpreted permission scopes.
    pub scopes: Vec<String>,
    /// Request identifier, used to name temporary upstream objects.
    pub request_id: RequestId,
    /// Requested secret-store paths for least-privilege minting.
    pub vault_paths: Vec<VaultPathRequest>,
}

impl MintOptions {
    /// Creates options without scopes or paths.
    #[must_use]
    pub fn new(request_id: RequestId) -> Self {
        Self {
            scopes: Vec::new(),
            request_id,
            vault_paths: Vec::new(),
        }
    }

    /// Sets scopes.
    #[must_use]
    pub fn with_scopes(mut self, scopes: Vec<String>) -> Self {
        self.scopes = scopes;
        self
    }

    /// Sets requested secret-store paths.
    #[must_use]
    pub fn with_vault_paths(mut self, vault_paths: Vec<VaultPathRequest>) -> Self {
        self.vault_paths = vault_paths;
        self
    }
}

/// Strategy that mints a credential for one kind of resource.
///
/// Implementations may shorten the TTL to an upstream maximum. A backend
/// whose upstream token format has a fixed lifetime reports that lifetime in
/// [`Credential::lease_ttl`].
#[async_trait]
pub trait CredentialBackend: Send + Sync {
    /// Stable backend name recorded in credential metadata.
    fn name(&self) -> &'static str;

    /// Mints a credential.
    async fn mint_credential(
        &self,
        resource: &str,
        tier: u32,
        ttl: Duration,
        options: &MintOptions,
    ) -> AppResult<Credential>;

    /// Liveness probe. Never mutates upstream state.
    async fn health(&self) -> AppResult<()>;
}
