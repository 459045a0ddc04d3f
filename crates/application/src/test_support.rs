//! Port fakes shared by service tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;

use jitbroker_core::{AppError, AppResult};
use jitbroker_domain::{Credential, NotificationHandle, RequestId};

use crate::broker_ports::{
    ApprovalNotice, CredentialBackend, MintOptions, MintedToken, Notifier, SecretStoreHealth,
    SecretStorePolicyManager, SecretStoreTokenMinter,
};

#[derive(Default)]
struct SecretStoreState {
    policies: HashMap<String, String>,
    deleted_policies: Vec<String>,
    minted: Vec<(String, u32)>,
    scoped: Vec<(String, Duration)>,
    fail_put: bool,
    fail_mint: bool,
    unhealthy: bool,
}

/// In-memory secret store recording every call.
#[derive(Default)]
pub struct FakeSecretStore {
    state: Mutex<SecretStoreState>,
    accessors: AtomicUsize,
}

impl FakeSecretStore {
    pub async fn fail_policy_writes(&self) {
        self.state.lock().await.fail_put = true;
    }

    pub async fn fail_mints(&self) {
        self.state.lock().await.fail_mint = true;
    }

    pub async fn set_healthy(&self, healthy: bool) {
        self.state.lock().await.unhealthy = !healthy;
    }

    pub async fn policy(&self, name: &str) -> Option<String> {
        self.state.lock().await.policies.get(name).cloned()
    }

    pub async fn policy_count(&self) -> usize {
        self.state.lock().await.policies.len()
    }

    pub async fn deleted_policies(&self) -> Vec<String> {
        self.state.lock().await.deleted_policies.clone()
    }

    pub async fn minted_resources(&self) -> Vec<(String, u32)> {
        self.state.lock().await.minted.clone()
    }

    pub async fn scoped_mints(&self) -> Vec<(String, Duration)> {
        self.state.lock().await.scoped.clone()
    }

    fn next_accessor(&self) -> String {
        format!("accessor-{}", self.accessors.fetch_add(1, Ordering::SeqCst) + 1)
    }
}

#[async_trait]
impl SecretStoreTokenMinter for FakeSecretStore {
    async fn mint_token(&self, resource: &str, tier: u32, _ttl: Duration) -> AppResult<MintedToken> {
        let mut state = self.state.lock().await;
        if state.fail_mint {
            return Err(AppError::Upstream("token create refused".to_owned()));
        }
        state.minted.push((resource.to_owned(), tier));
        Ok(MintedToken {
            token: format!("s.static-{resource}"),
            lease_id: self.next_accessor(),
        })
    }

    async fn mint_scoped_token(
        &self,
        policy_name: &str,
        ttl: Duration,
        _request_id: &RequestId,
    ) -> AppResult<MintedToken> {
        let mut state = self.state.lock().await;
        if state.fail_mint {
            return Err(AppError::Upstream("token create refused".to_owned()));
        }
        state.scoped.push((policy_name.to_owned(), ttl));
        Ok(MintedToken {
            token: format!("s.scoped-{policy_name}"),
            lease_id: self.next_accessor(),
        })
    }
}

#[async_trait]
impl SecretStorePolicyManager for FakeSecretStore {
    async fn put_policy(&self, name: &str, document: &str) -> AppResult<()> {
        let mut state = self.state.lock().await;
        if state.fail_put {
            return Err(AppError::Upstream("policy write refused".to_owned()));
        }
        state.policies.insert(name.to_owned(), document.to_owned());
        Ok(())
    }

    async fn delete_policy(&self, name: &str) -> AppResult<()> {
        let mut state = self.state.lock().await;
        state.policies.remove(name);
        state.deleted_policies.push(name.to_owned());
        Ok(())
    }
}

#[async_trait]
impl SecretStoreHealth for FakeSecretStore {
    async fn health(&self) -> AppResult<()> {
        if self.state.lock().await.unhealthy {
            return Err(AppError::Upstream("secret store sealed".to_owned()));
        }
        Ok(())
    }
}

/// Backend returning canned credentials or a canned failure.
pub struct FakeBackend {
    name: &'static str,
    fail: bool,
    delay: Duration,
    mints: AtomicUsize,
}

impl FakeBackend {
    pub fn succeeding(name: &'static str) -> Self {
        Self {
            name,
            fail: false,
            delay: Duration::ZERO,
            mints: AtomicUsize::new(0),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn failing(name: &'static str) -> Self {
        Self {
            name,
            fail: true,
            delay: Duration::ZERO,
            mints: AtomicUsize::new(0),
        }
    }

    pub fn mint_count(&self) -> usize {
        self.mints.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CredentialBackend for FakeBackend {
    fn name(&self) -> &'static str {
        self.name
    }

    async fn mint_credential(
        &self,
        resource: &str,
        _tier: u32,
        ttl: Duration,
        options: &MintOptions,
    ) -> AppResult<Credential> {
        self.mints.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if self.fail {
            return Err(AppError::Upstream(format!("{} unavailable", self.name)));
        }
        Ok(Credential::new(format!("token-{resource}"), ttl, "lease")
            .with_metadata("backend", self.name)
            .with_metadata("request_id", options.request_id.as_str()))
    }

    async fn health(&self) -> AppResult<()> {
        Ok(())
    }
}

/// Notifier recording every call as `"<event>:<request_id>"`.
#[derive(Default)]
pub struct RecordingNotifier {
    events: Mutex<Vec<String>>,
    fail_send: bool,
    sent: AtomicUsize,
}

impl RecordingNotifier {
    pub fn failing_send() -> Self {
        Self {
            fail_send: true,
            ..Self::default()
        }
    }

    pub async fn events(&self) -> Vec<String> {
        self.events.lock().await.clone()
    }

    async fn record(&self, event: &str, notice: &ApprovalNotice) {
        self.events
            .lock()
            .await
            .push(format!("{event}:{}", notice.request_id));
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send_approval(&self, notice: &ApprovalNotice) -> AppResult<NotificationHandle> {
        if self.fail_send {
            return Err(AppError::Upstream("chat api down".to_owned()));
        }
        self.record("sent", notice).await;
        let message_id = self.sent.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(NotificationHandle::new(message_id.to_string()))
    }

    async fn mark_approved(
        &self,
        _handle: &NotificationHandle,
        notice: &ApprovalNotice,
    ) -> AppResult<()> {
        self.record("approved", notice).await;
        Ok(())
    }

    async fn mark_denied(
        &self,
        _handle: &NotificationHandle,
        notice: &ApprovalNotice,
    ) -> AppResult<()> {
        self.record("denied", notice).await;
        Ok(())
    }

    async fn mark_timed_out(
        &self,
        _handle: &NotificationHandle,
        notice: &ApprovalNotice,
    ) -> AppResult<()> {
        self.record("timed_out", notice).await;
        Ok(())
    }

    async fn mark_error(
        &self,
        _handle: &NotificationHandle,
        notice: &ApprovalNotice,
        _message: &str,
    ) -> AppResult<()> {
        self.record("error", notice).await;
        Ok(())
    }
}
