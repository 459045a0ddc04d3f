use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::info;

use jitbroker_core::AppResult;
use jitbroker_domain::Credential;

use crate::broker_ports::{CredentialBackend, MintOptions, SecretStoreHealth, SecretStoreTokenMinter};

/// Backend name recorded in credential metadata.
pub const STATIC_BACKEND_NAME: &str = "static";

/// Fallback backend minting secret-store native tokens from static tier policies.
#[derive(Clone)]
pub struct StaticBackend {
    minter: Arc<dyn SecretStoreTokenMinter>,
    health: Arc<dyn SecretStoreHealth>,
}

impl StaticBackend {
    /// Creates a static backend.
    #[must_use]
    pub fn new(minter: Arc<dyn SecretStoreTokenMinter>, health: Arc<dyn SecretStoreHealth>) -> Self {
        Self { minter, health }
    }
}

#[async_trait]
impl CredentialBackend for StaticBackend {
    fn name(&self) -> &'static str {
        STATIC_BACKEND_NAME
    }

    async fn mint_credential(
        &self,
        resource: &str,
        tier: u32,
        ttl: Duration,
        _options: &MintOptions,
    ) -> AppResult<Credential> {
        let minted = self.minter.mint_token(resource, tier, ttl).await?;

        info!(
            backend = STATIC_BACKEND_NAME,
            resource,
            tier,
            ttl_seconds = ttl.as_secs(),
            "backend credential minted"
        );

        Ok(Credential::new(minted.token, ttl, minted.lease_id.clone())
            .with_metadata("type", "vault_token")
            .with_metadata("backend", STATIC_BACKEND_NAME)
            .with_metadata("lease_id", minted.lease_id))
    }

    async fn health(&self) -> AppResult<()> {
        self.health.health().await
    }
}
