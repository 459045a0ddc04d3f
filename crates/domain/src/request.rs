use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use jitbroker_core::{AppError, AppResult, NonEmptyString};
use serde::{Deserialize, Serialize};

use crate::VaultPathRequest;

/// Resource name that routes to least-privilege dynamic policy minting.
pub const VAULT_RESOURCE: &str = "vault";

/// Opaque access request identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(String);

impl RequestId {
    /// Creates a validated request identifier.
    pub fn new(value: impl Into<String>) -> AppResult<Self> {
        let value = NonEmptyString::for_field("request_id", value)?;
        Ok(Self(value.into()))
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.0.as_str())
    }
}

/// Access request lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestStatus {
    /// Waiting for auto-approval, a human decision or the timeout.
    Pending,
    /// A credential was minted and awaits its single claim.
    Approved,
    /// A human approver rejected the request.
    Denied,
    /// No decision arrived before the approval deadline.
    Timeout,
    /// The credential was delivered to the caller.
    Claimed,
}

impl RequestStatus {
    /// Returns the stable lowercase status value.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Denied => "denied",
            Self::Timeout => "timeout",
            Self::Claimed => "claimed",
        }
    }
}

impl fmt::Display for RequestStatus {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

impl FromStr for RequestStatus {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "pending" => Ok(Self::Pending),
            "approved" => Ok(Self::Approved),
            "denied" => Ok(Self::Denied),
            "timeout" => Ok(Self::Timeout),
            "claimed" => Ok(Self::Claimed),
            _ => Err(AppError::Validation(format!(
                "unknown request status '{value}'"
            ))),
        }
    }
}

/// Opaque reference to an out-of-band approval message.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NotificationHandle(String);

impl NotificationHandle {
    /// Wraps a notifier-specific handle value.
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Returns the raw handle value.
    #[must_use]
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

/// Short-lived secret produced by a credential backend.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    token: String,
    lease_ttl: Duration,
    lease_id: String,
    metadata: BTreeMap<String, String>,
}

impl Credential {
    /// Creates a credential without metadata.
    #[must_use]
    pub fn new(token: impl Into<String>, lease_ttl: Duration, lease_id: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            lease_ttl,
            lease_id: lease_id.into(),
            metadata: BTreeMap::new(),
        }
    }

    /// Adds an audit annotation.
    #[must_use]
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Returns the bearer secret.
    #[must_use]
    pub fn token(&self) -> &str {
        self.token.as_str()
    }

    /// Returns the lifetime actually granted by the backend.
    #[must_use]
    pub fn lease_ttl(&self) -> Duration {
        self.lease_ttl
    }

    /// Returns the backend lease identifier.
    #[must_use]
    pub fn lease_id(&self) -> &str {
        self.lease_id.as_str()
    }

    /// Returns backend-specific annotations used for display and audit.
    #[must_use]
    pub fn metadata(&self) -> &BTreeMap<String, String> {
        &self.metadata
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("Credential")
            .field("token", &"<redacted>")
            .field("lease_ttl", &self.lease_ttl)
            .field("lease_id", &self.lease_id)
            .field("metadata", &self.metadata)
            .finish()
    }
}

/// Validated input for a new access request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewAccessRequest {
    requester: NonEmptyString,
    resource: NonEmptyString,
    tier: u32,
    reason: NonEmptyString,
    scopes: Vec<String>,
    vault_paths: Vec<VaultPathRequest>,
}

impl NewAccessRequest {
    /// Creates a request input with required fields.
    pub fn new(
        requester: impl Into<String>,
        resource: impl Into<String>,
        tier: u32,
        reason: impl Into<String>,
    ) -> AppResult<Self> {
        Ok(Self {
            requester: NonEmptyString::for_field("requester", requester)?,
            resource: NonEmptyString::for_field("resource", resource)?,
            tier,
            reason: NonEmptyString::for_field("reason", reason)?,
            scopes: Vec::new(),
            vault_paths: Vec::new(),
        })
    }

    /// Sets backend-interpreted permission scopes.
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

    /// Returns the requester identity.
    #[must_use]
    pub fn requester(&self) -> &str {
        self.requester.as_str()
    }

    /// Returns the target resource.
    #[must_use]
    pub fn resource(&self) -> &str {
        self.resource.as_str()
    }

    /// Returns the requested tier.
    #[must_use]
    pub fn tier(&self) -> u32 {
        self.tier
    }

    /// Returns the justification.
    #[must_use]
    pub fn reason(&self) -> &str {
        self.reason.as_str()
    }

    /// Returns requested scopes.
    #[must_use]
    pub fn scopes(&self) -> &[String] {
        &self.scopes
    }

    /// Returns requested secret-store paths.
    #[must_use]
    pub fn vault_paths(&self) -> &[VaultPathRequest] {
        &self.vault_paths
    }

    /// Returns whether this request targets the dynamic secret-store resource.
    #[must_use]
    pub fn is_vault(&self) -> bool {
        self.resource.as_str() == VAULT_RESOURCE
    }
}

/// One credential access request and its lifecycle state.
///
/// The credential is present exactly while the status is
/// [`RequestStatus::Approved`]. Every transition out of `pending` is
/// exclusive: once resolved, a request never returns to `pending`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessRequest {
    id: RequestId,
    requester: String,
    resource: String,
    tier: u32,
    reason: String,
    scopes: Vec<String>,
    vault_paths: Vec<VaultPathRequest>,
    status: RequestStatus,
    created_at: DateTime<Utc>,
    approved_at: Option<DateTime<Utc>>,
    granted_ttl: Option<Duration>,
    credential: Option<Credential>,
    notification: Option<NotificationHandle>,
}

impl AccessRequest {
    /// Creates a pending request from validated input.
    #[must_use]
    pub fn new(id: RequestId, input: NewAccessRequest, created_at: DateTime<Utc>) -> Self {
        Self {
            id,
            requester: input.requester.into(),
            resource: input.resource.into(),
            tier: input.tier,
            reason: input.reason.into(),
            scopes: input.scopes,
            vault_paths: input.vault_paths,
            status: RequestStatus::Pending,
            created_at,
            approved_at: None,
            granted_ttl: None,
            credential: None,
            notification: None,
        }
    }

    /// Returns the request identifier.
    #[must_use]
    pub fn id(&self) -> &RequestId {
        &self.id
    }

    /// Returns the requester identity.
    #[must_use]
    pub fn requester(&self) -> &str {
        self.requester.as_str()
    }

    /// Returns the target resource.
    #[must_use]
    pub fn resource(&self) -> &str {
        self.resource.as_str()
    }

    /// Returns the privilege tier.
    #[must_use]
    pub fn tier(&self) -> u32 {
        self.tier
    }

    /// Returns the justification.
    #[must_use]
    pub fn reason(&self) -> &str {
        self.reason.as_str()
    }

    /// Returns requested scopes.
    #[must_use]
    pub fn scopes(&self) -> &[String] {
        &self.scopes
    }

    /// Returns requested secret-store paths.
    #[must_use]
    pub fn vault_paths(&self) -> &[VaultPathRequest] {
        &self.vault_paths
    }

    /// Returns the current lifecycle status.
    #[must_use]
    pub fn status(&self) -> RequestStatus {
        self.status
    }

    /// Returns creation time.
    #[must_use]
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Returns approval time, when approved.
    #[must_use]
    pub fn approved_at(&self) -> Option<DateTime<Utc>> {
        self.approved_at
    }

    /// Returns the TTL recorded on approval.
    #[must_use]
    pub fn granted_ttl(&self) -> Option<Duration> {
        self.granted_ttl
    }

    /// Returns the held credential while approved and unclaimed.
    #[must_use]
    pub fn credential(&self) -> Option<&Credential> {
        self.credential.as_ref()
    }

    /// Returns the approval message handle, when one was sent.
    #[must_use]
    pub fn notification(&self) -> Option<&NotificationHandle> {
        self.notification.as_ref()
    }

    /// Returns whether the request is still awaiting resolution.
    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.status == RequestStatus::Pending
    }

    /// Records the approval message handle.
    pub fn attach_notification(&mut self, handle: NotificationHandle) {
        self.notification = Some(handle);
    }

    /// Transitions `pending -> approved` and takes ownership of the credential.
    pub fn approve(
        &mut self,
        credential: Credential,
        ttl: Duration,
        approved_at: DateTime<Utc>,
    ) -> AppResult<()> {
        self.ensure_pending()?;
        self.status = RequestStatus::Approved;
        self.approved_at = Some(approved_at);
        self.granted_ttl = Some(ttl);
        self.credential = Some(credential);
        Ok(())
    }

    /// Transitions `pending -> denied`.
    pub fn deny(&mut self) -> AppResult<()> {
        self.ensure_pending()?;
        self.status = RequestStatus::Denied;
        Ok(())
    }

    /// Transitions `pending -> timeout`. Returns `false` when already resolved.
    pub fn time_out(&mut self) -> bool {
        if !self.is_pending() {
            return false;
        }

        self.status = RequestStatus::Timeout;
        true
    }

    /// Transitions `approved -> claimed` and hands out the credential.
    ///
    /// Returns `None` for every state other than `approved`, so a credential
    /// is released at most once.
    pub fn claim(&mut self) -> Option<Credential> {
        if self.status != RequestStatus::Approved {
            return None;
        }

        let credential = self.credential.take()?;
        self.status = RequestStatus::Claimed;
        Some(credential)
    }

    fn ensure_pending(&self) -> AppResult<()> {
        if self.is_pending() {
            return Ok(());
        }

        Err(AppError::NotPending(format!(
            "request {} is {}",
            self.id, self.status
        )))
    }
}
