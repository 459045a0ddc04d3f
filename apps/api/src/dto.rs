use std::collections::BTreeMap;

use jitbroker_application::RequestStatusView;
use jitbroker_domain::{AccessRequest, Credential, RequestStatus, VaultPathRequest};
use serde::{Deserialize, Serialize};

/// Liveness payload for unauthenticated callers.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}

/// Detailed health payload for authenticated callers.
#[derive(Debug, Serialize)]
pub struct HealthDetailsResponse {
    pub status: &'static str,
    pub vault: String,
    pub uptime_seconds: u64,
    pub requests_in_store: usize,
    pub pending_requests: usize,
}

/// Incoming payload for `POST /request`.
///
/// Every field defaults so missing values surface as validation errors
/// naming the field.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct CreateAccessRequest {
    pub requester: String,
    pub resource: String,
    pub tier: u32,
    pub reason: String,
    pub scopes: Vec<String>,
    pub vault_paths: Vec<VaultPathRequest>,
}

/// Credential as delivered to the requester.
#[derive(Debug, Serialize)]
pub struct CredentialResponse {
    pub token: String,
    pub lease_ttl: u64,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub lease_id: String,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, String>,
}

impl From<Credential> for CredentialResponse {
    fn from(value: Credential) -> Self {
        Self {
            token: value.token().to_owned(),
            lease_ttl: value.lease_ttl().as_secs(),
            lease_id: value.lease_id().to_owned(),
            metadata: value.metadata().clone(),
        }
    }
}

/// Request status, optionally carrying the credential on its single delivery.
#[derive(Debug, Serialize)]
pub struct AccessRequestResponse {
    pub request_id: String,
    pub status: RequestStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub credential: Option<CredentialResponse>,
}

impl From<&AccessRequest> for AccessRequestResponse {
    fn from(value: &AccessRequest) -> Self {
        Self {
            request_id: value.id().to_string(),
            status: value.status(),
            credential: None,
        }
    }
}

impl From<RequestStatusView> for AccessRequestResponse {
    fn from(value: RequestStatusView) -> Self {
        Self {
            request_id: value.request_id.to_string(),
            status: value.status,
            credential: value.credential.map(CredentialResponse::from),
        }
    }
}

/// Subset of a Telegram update the webhook acts on.
#[derive(Debug, Deserialize)]
pub struct TelegramUpdate {
    #[serde(default)]
    pub update_id: i64,
    pub callback_query: Option<TelegramCallbackQuery>,
}

#[derive(Debug, Deserialize)]
pub struct TelegramCallbackQuery {
    pub from: TelegramUser,
    #[serde(default)]
    pub data: String,
}

#[derive(Debug, Deserialize)]
pub struct TelegramUser {
    pub id: i64,
}
