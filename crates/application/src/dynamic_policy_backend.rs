//! Least-privilege secret-store tokens scoped to caller-requested paths.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{error, info, warn};

use jitbroker_core::{AppError, AppResult};
use jitbroker_domain::{Credential, RequestId, VaultPathRules, render_policy_document};

use crate::broker_ports::{
    CredentialBackend, MintOptions, SecretStoreHealth, SecretStorePolicyManager,
    SecretStoreTokenMinter,
};
use crate::deferred_tasks::DeferredTasks;

/// Backend name recorded in credential metadata.
pub const DYNAMIC_POLICY_BACKEND_NAME: &str = "vault_dynamic";

/// Prefix of every temporary policy name.
pub const DYNAMIC_POLICY_PREFIX: &str = "jit-vault-";

/// Extra time a temporary policy outlives its token.
pub const DEFAULT_POLICY_CLEANUP_BUFFER: Duration = Duration::from_secs(5 * 60);

/// Returns the temporary policy name for a request.
#[must_use]
pub fn dynamic_policy_name(request_id: &RequestId) -> String {
    format!("{DYNAMIC_POLICY_PREFIX}{request_id}")
}

/// Mints tokens bound to a per-request policy containing exactly the requested paths.
#[derive(Clone)]
pub struct DynamicPolicyBackend {
    policies: Arc<dyn SecretStorePolicyManager>,
    minter: Arc<dyn SecretStoreTokenMinter>,
    health: Arc<dyn SecretStoreHealth>,
    rules: VaultPathRules,
    tasks: DeferredTasks,
    cleanup_buffer: Duration,
}

impl DynamicPolicyBackend {
    /// Creates a dynamic policy backend.
    #[must_use]
    pub fn new(
        policies: Arc<dyn SecretStorePolicyManager>,
        minter: Arc<dyn SecretStoreTokenMinter>,
        health: Arc<dyn SecretStoreHealth>,
        rules: VaultPathRules,
        tasks: DeferredTasks,
    ) -> Self {
        Self {
            policies,
            minter,
            health,
            rules,
            tasks,
            cleanup_buffer: DEFAULT_POLICY_CLEANUP_BUFFER,
        }
    }

    /// Overrides how long a policy outlives its token.
    #[must_use]
    pub fn with_cleanup_buffer(mut self, cleanup_buffer: Duration) -> Self {
        self.cleanup_buffer = cleanup_buffer;
        self
    }

    async fn discard_policy(&self, policy_name: &str, request_id: &RequestId) {
        if let Err(cleanup_error) = self.policies.delete_policy(policy_name).await {
            error!(
                policy_name,
                request_id = %request_id,
                error = %cleanup_error,
                "failed to delete dynamic policy after mint failure"
            );
        }
    }

    fn schedule_cleanup(&self, policy_name: String, request_id: RequestId, delay: Duration) {
        let policies = Arc::clone(&self.policies);
        self.tasks.spawn_after("dynamic_policy_cleanup", delay, async move {
            match policies.delete_policy(&policy_name).await {
                Ok(()) => info!(
                    policy_name = %policy_name,
                    request_id = %request_id,
                    "dynamic policy cleaned up"
                ),
                Err(cleanup_error) => error!(
                    policy_name = %policy_name,
                    request_id = %request_id,
                    error = %cleanup_error,
                    "dynamic policy cleanup failed"
                ),
            }
        });
    }
}

#[async_trait]
impl CredentialBackend for DynamicPolicyBackend {
    fn name(&self) -> &'static str {
        DYNAMIC_POLICY_BACKEND_NAME
    }

    async fn mint_credential(
        &self,
        resource: &str,
        tier: u32,
        ttl: Duration,
        options: &MintOptions,
    ) -> AppResult<Credential> {
        let scoped_paths = self
            .rules
            .validate(&options.vault_paths)
            .map_err(|validation_error| match validation_error {
                AppError::Validation(message) => {
                    AppError::Validation(format!("path validation: {message}"))
                }
                other => other,
            })?;

        let request_id = &options.request_id;
        let policy_name = dynamic_policy_name(request_id);
        let document = render_policy_document(&scoped_paths);

        self.policies
            .put_policy(&policy_name, &document)
            .await
            .map_err(|put_error| {
                AppError::Upstream(format!(
                    "create temporary policy {policy_name}: {put_error}"
                ))
            })?;

        info!(
            policy_name = %policy_name,
            paths_count = scoped_paths.len(),
            request_id = %request_id,
            "dynamic policy created"
        );

        let minted = match self.minter.mint_scoped_token(&policy_name, ttl, request_id).await {
            Ok(minted) => minted,
            Err(mint_error) => {
                warn!(
                    policy_name = %policy_name,
                    request_id = %request_id,
                    error = %mint_error,
                    "scoped token mint failed, removing policy"
                );
                self.discard_policy(&policy_name, request_id).await;
                return Err(AppError::Upstream(format!(
                    "mint dynamic token: {mint_error}"
                )));
            }
        };

        self.schedule_cleanup(
            policy_name.clone(),
            request_id.clone(),
            ttl.saturating_add(self.cleanup_buffer),
        );

        info!(
            backend = DYNAMIC_POLICY_BACKEND_NAME,
            resource,
            tier,
            ttl_seconds = ttl.as_secs(),
            policy_name = %policy_name,
            request_id = %request_id,
            "backend credential minted"
        );

        Ok(Credential::new(minted.token, ttl, minted.lease_id.clone())
            .with_metadata("type", "vault_token")
            .with_metadata("backend", DYNAMIC_POLICY_BACKEND_NAME)
            .with_metadata("lease_id", minted.lease_id)
            .with_metadata("policy_name", policy_name))
    }

    async fn health(&self) -> AppResult<()> {
        self.health.health().await
    }
}
