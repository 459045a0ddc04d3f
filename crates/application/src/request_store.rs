use std::collections::HashMap;
use std::fmt::Write;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::RwLock;

use jitbroker_core::{AppError, AppResult};
use jitbroker_domain::{AccessRequest, Credential, NewAccessRequest, NotificationHandle, RequestId};

/// Default ceiling on stored requests, independent of status.
pub const DEFAULT_REQUEST_STORE_CAPACITY: usize = 1000;

const REQUEST_ID_PREFIX: &str = "req-";
const REQUEST_ID_RANDOM_BYTES: usize = 6;

#[derive(Default)]
struct StoreState {
    requests: HashMap<RequestId, AccessRequest>,
    // Pending requests with a human-approved mint in flight. The flag records
    // a timeout that fired meanwhile.
    minting: HashMap<RequestId, bool>,
}

/// In-memory registry of access request lifecycle state.
///
/// All reads and transitions go through one lock, so every check-and-set on a
/// request's status is atomic. Clones share the same underlying map.
#[derive(Clone)]
pub struct RequestStore {
    state: Arc<RwLock<StoreState>>,
    capacity: usize,
}

/// Result of releasing a mint reservation without approving.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MintRelease {
    /// The request is still pending.
    Pending,
    /// A timeout fired during the mint and has now been applied.
    TimedOut,
}

impl Default for RequestStore {
    fn default() -> Self {
        Self::new(DEFAULT_REQUEST_STORE_CAPACITY)
    }
}

impl RequestStore {
    /// Creates an empty store holding at most `capacity` requests.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            state: Arc::new(RwLock::new(StoreState::default())),
            capacity,
        }
    }

    /// Inserts a new pending request under a fresh identifier.
    pub async fn create(&self, input: NewAccessRequest) -> AppResult<AccessRequest> {
        let mut state = self.state.write().await;
        let requests = &mut state.requests;
        if requests.len() >= self.capacity {
            return Err(AppError::CapacityExceeded(format!(
                "request store is full ({} requests)",
                self.capacity
            )));
        }

        let id = loop {
            let candidate = generate_request_id()?;
            if !requests.contains_key(&candidate) {
                break candidate;
            }
        };

        let request = AccessRequest::new(id.clone(), input, Utc::now());
        requests.insert(id, request.clone());
        Ok(request)
    }

    /// Returns a snapshot of one request.
    pub async fn get(&self, id: &RequestId) -> Option<AccessRequest> {
        self.state.read().await.requests.get(id).cloned()
    }

    /// Reserves a pending request for a single in-flight mint.
    ///
    /// Returns `Ok(None)` when the request is resolved or already reserved.
    /// While reserved, `deny` is refused and `timeout` is deferred until the
    /// reservation ends.
    pub async fn reserve_mint(&self, id: &RequestId) -> AppResult<Option<AccessRequest>> {
        let mut state = self.state.write().await;
        let request = find_mut(&mut state.requests, id)?;
        if !request.is_pending() {
            return Ok(None);
        }
        let snapshot = request.clone();
        if state.minting.contains_key(id) {
            return Ok(None);
        }
        state.minting.insert(id.clone(), false);
        Ok(Some(snapshot))
    }

    /// Ends a reservation after a failed mint, applying any deferred timeout.
    pub async fn release_mint(&self, id: &RequestId) -> AppResult<MintRelease> {
        let mut state = self.state.write().await;
        let timeout_deferred = state.minting.remove(id).unwrap_or(false);
        let request = find_mut(&mut state.requests, id)?;
        if timeout_deferred && request.time_out() {
            return Ok(MintRelease::TimedOut);
        }
        Ok(MintRelease::Pending)
    }

    /// Transitions `pending -> approved`, storing the credential for one claim.
    ///
    /// Ends any mint reservation; a timeout deferred by it is dropped.
    pub async fn approve(&self, id: &RequestId, credential: Credential, ttl: Duration) -> AppResult<()> {
        let mut state = self.state.write().await;
        state.minting.remove(id);
        let request = find_mut(&mut state.requests, id)?;
        request.approve(credential, ttl, Utc::now())
    }

    /// Transitions `pending -> denied`.
    pub async fn deny(&self, id: &RequestId) -> AppResult<()> {
        let mut state = self.state.write().await;
        if state.minting.contains_key(id) {
            return Err(AppError::NotPending(format!(
                "request {id} has an approval in progress"
            )));
        }
        find_mut(&mut state.requests, id)?.deny()
    }

    /// Hands out the credential of an approved request exactly once.
    ///
    /// Returns `Ok(None)` when the request exists but is not `approved`.
    pub async fn claim(&self, id: &RequestId) -> AppResult<Option<Credential>> {
        let mut state = self.state.write().await;
        Ok(find_mut(&mut state.requests, id)?.claim())
    }

    /// Transitions `pending -> timeout`.
    ///
    /// Returns `Ok(false)` without changes when the request was already resolved.
    /// A request reserved for minting is not timed out here; the timeout is
    /// applied by `release_mint` if the mint fails.
    pub async fn timeout(&self, id: &RequestId) -> AppResult<bool> {
        let mut state = self.state.write().await;
        let StoreState { requests, minting } = &mut *state;
        let request = find_mut(requests, id)?;
        if let Some(timeout_deferred) = minting.get_mut(id) {
            *timeout_deferred = request.is_pending();
            return Ok(false);
        }
        Ok(request.time_out())
    }

    /// Records the approval message handle for later updates.
    pub async fn attach_notification(
        &self,
        id: &RequestId,
        handle: NotificationHandle,
    ) -> AppResult<()> {
        let mut state = self.state.write().await;
        find_mut(&mut state.requests, id)?.attach_notification(handle);
        Ok(())
    }

    /// Returns snapshots of all requests still awaiting resolution.
    pub async fn pending_requests(&self) -> Vec<AccessRequest> {
        let mut pending: Vec<AccessRequest> = self
            .state
            .read()
            .await
            .requests
            .values()
            .filter(|request| request.is_pending())
            .cloned()
            .collect();
        pending.sort_by_key(AccessRequest::created_at);
        pending
    }

    /// Removes resolved requests created more than `max_age` ago.
    ///
    /// Pending requests are never removed here; the timeout watcher resolves them.
    pub async fn cleanup(&self, max_age: Duration) -> AppResult<usize> {
        let max_age = chrono::Duration::from_std(max_age)
            .map_err(|error| AppError::Validation(format!("invalid cleanup age: {error}")))?;
        let cutoff = Utc::now() - max_age;

        let mut state = self.state.write().await;
        let before = state.requests.len();
        state
            .requests
            .retain(|_, request| request.is_pending() || request.created_at() > cutoff);
        Ok(before - state.requests.len())
    }

    /// Returns the number of stored requests.
    pub async fn count(&self) -> usize {
        self.state.read().await.requests.len()
    }
}

fn find_mut<'a>(
    requests: &'a mut HashMap<RequestId, AccessRequest>,
    id: &RequestId,
) -> AppResult<&'a mut AccessRequest> {
    requests
        .get_mut(id)
        .ok_or_else(|| AppError::NotFound(format!("request not found: {id}")))
}

fn generate_request_id() -> AppResult<RequestId> {
    let mut bytes = [0_u8; REQUEST_ID_RANDOM_BYTES];
    getrandom::fill(&mut bytes)
        .map_err(|error| AppError::Internal(format!("failed to generate request id: {error}")))?;

    let id = bytes.iter().fold(
        String::with_capacity(REQUEST_ID_PREFIX.len() + REQUEST_ID_RANDOM_BYTES * 2),
        |mut acc, byte| {
            let _ = write!(acc, "{byte:02x}");
            acc
        },
    );

    RequestId::new(format!("{REQUEST_ID_PREFIX}{id}"))
}
