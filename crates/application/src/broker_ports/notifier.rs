use std::time::Duration;

use async_trait::async_trait;
use jitbroker_core::AppResult;
use jitbroker_domain::{AccessRequest, NotificationHandle, RequestId, VaultPathRequest};

/// Request details presented to a human approver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApprovalNotice {
    /// Request identifier, echoed back in approve and deny callbacks.
    pub request_id: RequestId,
    /// Requester identity.
    pub requester: String,
    /// Target resource.
    pub resource: String,
    /// Requested tier.
    pub tier: u32,
    /// Caller justification.
    pub reason: String,
    /// Credential lifetime granted on approval.
    pub ttl: Duration,
    /// Requested scopes.
    pub scopes: Vec<String>,
    /// Requested secret-store paths.
    pub vault_paths: Vec<VaultPathRequest>,
}

impl ApprovalNotice {
    /// Builds a notice from a stored request.
    #[must_use]
    pub fn from_request(request: &AccessRequest, ttl: Duration) -> Self {
        Self {
            request_id: request.id().clone(),
            requester: request.requester().to_owned(),
            resource: request.resource().to_owned(),
            tier: request.tier(),
            reason: request.reason().to_owned(),
            ttl,
            scopes: request.scopes().to_vec(),
            vault_paths: request.vault_paths().to_vec(),
        }
    }
}

/// Out-of-band human approval channel.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Asks an approver to approve or deny, returning a handle for later updates.
    async fn send_approval(&self, notice: &ApprovalNotice) -> AppResult<NotificationHandle>;

    /// Marks the approval message as approved.
    async fn mark_approved(
        &self,
        handle: &NotificationHandle,
        notice: &ApprovalNotice,
    ) -> AppResult<()>;

    /// Marks the approval message as denied.
    async fn mark_denied(&self, handle: &NotificationHandle, notice: &ApprovalNotice)
    -> AppResult<()>;

    /// Marks the approval message as expired.
    async fn mark_timed_out(
        &self,
        handle: &NotificationHandle,
        notice: &ApprovalNotice,
    ) -> AppResult<()>;

    /// Marks the approval message as failed after approval.
    async fn mark_error(
        &self,
        handle: &NotificationHandle,
        notice: &ApprovalNotice,
        message: &str,
    ) -> AppResult<()>;
}
