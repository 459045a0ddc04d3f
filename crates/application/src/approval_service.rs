//! End-to-end access request workflow.
//!
//! Binds rate limiting, tier policy, backend selection and out-of-band human
//! approval. Resolution races (callback against timeout, duplicate callbacks)
//! are settled by the request store's single transition out of `pending`, and
//! an approval reserves its request before minting so at most one credential
//! is minted per request.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info, warn};

use jitbroker_core::{AppError, AppResult};
use jitbroker_domain::{
    AccessRequest, Credential, NewAccessRequest, RequestId, RequestStatus, TierConfig, TierPolicy,
    VaultPathRules,
};

use crate::backend_registry::BackendRegistry;
use crate::broker_ports::{ApprovalNotice, MintOptions, Notifier};
use crate::deferred_tasks::DeferredTasks;
use crate::rate_limit_service::RateLimitService;
use crate::request_store::{MintRelease, RequestStore};

mod callback;
mod expiry;
mod status;
mod submit;

/// Default time a human approver has to answer.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30 * 60);

/// Scope applied when a caller requests none.
pub const DEFAULT_SCOPE: &str = "api";

/// Decision delivered by the approval channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApprovalDecision {
    /// Mint and release the credential.
    Approve,
    /// Reject the request.
    Deny,
}

impl ApprovalDecision {
    /// Returns the stable decision value.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Approve => "approve",
            Self::Deny => "deny",
        }
    }
}

impl fmt::Display for ApprovalDecision {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

impl FromStr for ApprovalDecision {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "approve" => Ok(Self::Approve),
            "deny" => Ok(Self::Deny),
            _ => Err(AppError::Validation(format!(
                "unknown approval decision '{value}'"
            ))),
        }
    }
}

/// What a callback did to its request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallbackOutcome {
    /// A credential was minted and stored.
    Approved,
    /// The request was denied.
    Denied,
    /// The request was missing or already resolved.
    Ignored,
    /// Minting failed; the request stays pending unless its timeout fired meanwhile.
    MintFailed,
}

/// Status poll result, carrying the credential on its single delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestStatusView {
    /// Request identifier.
    pub request_id: RequestId,
    /// Lifecycle status at the time of the poll.
    pub status: RequestStatus,
    /// Credential, present only on the poll that claimed it.
    pub credential: Option<Credential>,
}

/// Secret store and store occupancy snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HealthReport {
    /// Secret-store probe failure, when it failed.
    pub secret_store_error: Option<String>,
    /// Total stored requests.
    pub requests_in_store: usize,
    /// Requests awaiting resolution.
    pub pending_requests: usize,
}

impl HealthReport {
    /// Returns whether every dependency answered.
    #[must_use]
    pub fn is_healthy(&self) -> bool {
        self.secret_store_error.is_none()
    }
}

/// Application service orchestrating access requests.
#[derive(Clone)]
pub struct ApprovalService {
    store: RequestStore,
    rate_limiter: RateLimitService,
    registry: Arc<BackendRegistry>,
    notifier: Arc<dyn Notifier>,
    tasks: DeferredTasks,
    tiers: Arc<TierPolicy>,
    vault_rules: VaultPathRules,
    allowed_requesters: Option<Arc<BTreeSet<String>>>,
    request_timeout: Duration,
    default_scopes: Vec<String>,
}

impl ApprovalService {
    /// Creates an approval service with the standard tier policy.
    #[must_use]
    pub fn new(
        store: RequestStore,
        rate_limiter: RateLimitService,
        registry: BackendRegistry,
        notifier: Arc<dyn Notifier>,
        tasks: DeferredTasks,
    ) -> Self {
        Self {
            store,
            rate_limiter,
            registry: Arc::new(registry),
            notifier,
            tasks,
            tiers: Arc::new(TierPolicy::standard()),
            vault_rules: VaultPathRules::default(),
            allowed_requesters: None,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            default_scopes: vec![DEFAULT_SCOPE.to_owned()],
        }
    }

    /// Replaces the tier policy.
    #[must_use]
    pub fn with_tier_policy(mut self, tiers: TierPolicy) -> Self {
        self.tiers = Arc::new(tiers);
        self
    }

    /// Replaces the secret-store path rules used for fail-fast validation.
    #[must_use]
    pub fn with_vault_rules(mut self, vault_rules: VaultPathRules) -> Self {
        self.vault_rules = vault_rules;
        self
    }

    /// Restricts submissions to the given requesters.
    #[must_use]
    pub fn with_allowed_requesters<I, S>(mut self, requesters: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allowed_requesters = Some(Arc::new(requesters.into_iter().map(Into::into).collect()));
        self
    }

    /// Sets how long a human approver has to answer.
    #[must_use]
    pub fn with_request_timeout(mut self, request_timeout: Duration) -> Self {
        self.request_timeout = request_timeout;
        self
    }

    /// Returns whether `requester` may submit requests.
    #[must_use]
    pub fn is_requester_allowed(&self, requester: &str) -> bool {
        self.allowed_requesters
            .as_ref()
            .is_none_or(|allowed| allowed.contains(requester))
    }

    /// Returns snapshots of requests awaiting resolution.
    pub async fn pending_requests(&self) -> Vec<AccessRequest> {
        self.store.pending_requests().await
    }

    /// Probes the secret store and reports store occupancy.
    pub async fn health(&self) -> HealthReport {
        let secret_store_error = self
            .registry
            .fallback()
            .health()
            .await
            .err()
            .map(|probe_error| probe_error.to_string());

        HealthReport {
            secret_store_error,
            requests_in_store: self.store.count().await,
            pending_requests: self.store.pending_requests().await.len(),
        }
    }

    /// Purges resolved requests older than `max_age` and idle rate-limit keys.
    pub async fn run_maintenance(&self, max_age: Duration) -> AppResult<usize> {
        let removed = self.store.cleanup(max_age).await?;
        let pruned_keys = self.rate_limiter.prune_idle().await;
        if removed > 0 || pruned_keys > 0 {
            let tracked_keys = self.rate_limiter.tracked_keys().await;
            info!(removed, pruned_keys, tracked_keys, "store cleanup completed");
        }
        Ok(removed)
    }

    fn tier_config(&self, tier: u32) -> AppResult<TierConfig> {
        self.tiers.tier(tier).cloned()
    }

    fn notice(&self, request: &AccessRequest) -> ApprovalNotice {
        let ttl = self
            .tiers
            .tier(request.tier())
            .map(TierConfig::ttl)
            .unwrap_or(Duration::ZERO);
        ApprovalNotice::from_request(request, ttl)
    }

    /// Mints through the resource's backend. Dynamic failures never fall back to static.
    async fn mint_for(&self, request: &AccessRequest, tier: &TierConfig) -> AppResult<Credential> {
        let backend = self.registry.backend_for(request.resource());
        let options = MintOptions::new(request.id().clone())
            .with_scopes(request.scopes().to_vec())
            .with_vault_paths(request.vault_paths().to_vec());

        let minted = backend
            .mint_credential(request.resource(), request.tier(), tier.ttl(), &options)
            .await;

        if let Err(mint_error) = &minted
            && self.registry.is_dynamic(request.resource())
        {
            error!(
                request_id = %request.id(),
                resource = request.resource(),
                backend = backend.name(),
                error = %mint_error,
                "dynamic backend failed"
            );
        }

        minted
    }

    fn spawn_timeout_watcher(&self, request_id: RequestId) {
        let service = self.clone();
        self.tasks
            .spawn_after("approval_timeout", self.request_timeout, async move {
                service.expire(&request_id).await;
            });
    }
}

#[cfg(test)]
mod tests;
