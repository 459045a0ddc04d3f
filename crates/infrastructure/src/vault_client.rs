//! Secret-store adapter over the Vault HTTP API.
//!
//! Authenticates with AppRole and keeps the client token in memory. Every
//! call that fails is retried once after a fresh login.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::{info, warn};
use url::Url;

use jitbroker_application::{
    MintedToken, SecretStoreHealth, SecretStorePolicyManager, SecretStoreReader,
    SecretStoreTokenMinter,
};
use jitbroker_core::{AppError, AppResult};
use jitbroker_domain::{RequestId, VAULT_RESOURCE};

use crate::http_support::{ensure_success, read_json, transport_error, trimmed_base};

mod policies;

pub use policies::StaticTokenPolicies;

const TOKEN_SOURCE: &str = "jitbroker";

/// AppRole credentials used to log in.
#[derive(Clone)]
pub struct VaultAppRole {
    /// AppRole role id.
    pub role_id: String,
    /// AppRole secret id.
    pub secret_id: String,
}

/// Vault HTTP client implementing the secret-store ports.
pub struct VaultClient {
    http_client: reqwest::Client,
    base_url: String,
    app_role: VaultAppRole,
    token: RwLock<Option<String>>,
    policies: StaticTokenPolicies,
}

#[derive(Debug, Deserialize)]
struct AuthEnvelope {
    auth: Option<AuthInfo>,
}

#[derive(Debug, Deserialize)]
struct AuthInfo {
    client_token: String,
    #[serde(default)]
    accessor: String,
    #[serde(default)]
    lease_duration: u64,
    #[serde(default)]
    renewable: bool,
}

#[derive(Debug, Serialize)]
struct TokenCreateRequest {
    policies: Vec<String>,
    ttl: String,
    display_name: String,
    renewable: bool,
    meta: BTreeMap<String, String>,
}

#[derive(Debug, Deserialize)]
struct SecretEnvelope {
    data: Option<Value>,
}

impl VaultClient {
    /// Creates a client. No network call happens until the first request.
    #[must_use]
    pub fn new(
        http_client: reqwest::Client,
        base_url: &Url,
        app_role: VaultAppRole,
        policies: StaticTokenPolicies,
    ) -> Self {
        Self {
            http_client,
            base_url: trimmed_base(base_url),
            app_role,
            token: RwLock::new(None),
            policies,
        }
    }

    /// Logs in with AppRole and replaces the held client token.
    pub async fn authenticate(&self) -> AppResult<()> {
        let response = self
            .http_client
            .post(format!("{}/v1/auth/approle/login", self.base_url))
            .json(&serde_json::json!({
                "role_id": self.app_role.role_id,
                "secret_id": self.app_role.secret_id,
            }))
            .send()
            .await
            .map_err(|error| transport_error("approle login", &error))?;

        let envelope: AuthEnvelope = read_json(response, "approle login").await?;
        let auth = envelope
            .auth
            .ok_or_else(|| AppError::Upstream("approle login returned no auth".to_owned()))?;

        info!(
            lease_duration = auth.lease_duration,
            renewable = auth.renewable,
            "vault authenticated"
        );
        *self.token.write().await = Some(auth.client_token);
        Ok(())
    }

    async fn current_token(&self) -> AppResult<String> {
        if let Some(token) = self.token.read().await.clone() {
            return Ok(token);
        }

        self.authenticate().await?;
        self.token
            .read()
            .await
            .clone()
            .ok_or_else(|| AppError::Internal("vault token missing after login".to_owned()))
    }

    async fn send_once<F>(&self, context: &str, build: &F) -> AppResult<reqwest::Response>
    where
        F: Fn(&reqwest::Client) -> reqwest::RequestBuilder,
    {
        let token = self.current_token().await?;
        let response = build(&self.http_client)
            .header("X-Vault-Token", token)
            .send()
            .await
            .map_err(|error| transport_error(context, &error))?;
        ensure_success(response, context).await
    }

    async fn call<F>(&self, context: &str, build: F) -> AppResult<reqwest::Response>
    where
        F: Fn(&reqwest::Client) -> reqwest::RequestBuilder,
    {
        match self.send_once(context, &build).await {
            Ok(response) => Ok(response),
            Err(first_error) => {
                warn!(context, error = %first_error, "vault call failed, re-authenticating");
                self.authenticate().await.map_err(|auth_error| {
                    AppError::Upstream(format!(
                        "re-auth failed: {auth_error} (original: {first_error})"
                    ))
                })?;
                self.send_once(context, &build).await.map_err(|retry_error| {
                    AppError::Upstream(format!("{context} (after re-auth): {retry_error}"))
                })
            }
        }
    }

    async fn create_orphan(&self, request: TokenCreateRequest) -> AppResult<MintedToken> {
        let url = format!("{}/v1/auth/token/create-orphan", self.base_url);
        let response = self
            .call("token create", |client| client.post(&url).json(&request))
            .await?;

        let envelope: AuthEnvelope = read_json(response, "token create").await?;
        let auth = envelope
            .auth
            .ok_or_else(|| AppError::Upstream("token create returned no auth".to_owned()))?;

        Ok(MintedToken {
            token: auth.client_token,
            lease_id: auth.accessor,
        })
    }

    fn policy_url(&self, name: &str) -> String {
        format!("{}/v1/sys/policies/acl/{name}", self.base_url)
    }
}

fn vault_ttl(ttl: Duration) -> String {
    format!("{}s", ttl.as_secs())
}

#[async_trait]
impl SecretStoreTokenMinter for VaultClient {
    async fn mint_token(&self, resource: &str, tier: u32, ttl: Duration) -> AppResult<MintedToken> {
        let policies = self.policies.policies_for(resource, tier);
        let display_name = format!("jit-{resource}-tier{tier}-{}", Utc::now().timestamp());

        let minted = self
            .create_orphan(TokenCreateRequest {
                policies: policies.clone(),
                ttl: vault_ttl(ttl),
                display_name: display_name.clone(),
                renewable: false,
                meta: BTreeMap::from([
                    ("resource".to_owned(), resource.to_owned()),
                    ("tier".to_owned(), tier.to_string()),
                    ("source".to_owned(), TOKEN_SOURCE.to_owned()),
                ]),
            })
            .await?;

        info!(
            resource,
            tier,
            ttl_seconds = ttl.as_secs(),
            policies = ?policies,
            display_name = %display_name,
            "token issued"
        );
        Ok(minted)
    }

    async fn mint_scoped_token(
        &self,
        policy_name: &str,
        ttl: Duration,
        request_id: &RequestId,
    ) -> AppResult<MintedToken> {
        let display_name = format!("jit-vault-{request_id}");

        let minted = self
            .create_orphan(TokenCreateRequest {
                policies: vec!["default".to_owned(), policy_name.to_owned()],
                ttl: vault_ttl(ttl),
                display_name: display_name.clone(),
                renewable: false,
                meta: BTreeMap::from([
                    ("resource".to_owned(), VAULT_RESOURCE.to_owned()),
                    ("request_id".to_owned(), request_id.to_string()),
                    ("source".to_owned(), TOKEN_SOURCE.to_owned()),
                ]),
            })
            .await?;

        info!(
            request_id = %request_id,
            policy_name,
            ttl_seconds = ttl.as_secs(),
            display_name = %display_name,
            "dynamic token issued"
        );
        Ok(minted)
    }
}

#[async_trait]
impl SecretStoreReader for VaultClient {
    async fn read_secret(&self, path: &str) -> AppResult<BTreeMap<String, String>> {
        let url = format!("{}/v1/{}", self.base_url, path.trim_start_matches('/'));
        let response = self.call("secret read", |client| client.get(&url)).await?;
        let envelope: SecretEnvelope = read_json(response, "secret read").await?;

        let data = envelope
            .data
            .and_then(|data| data.get("data").cloned())
            .and_then(|data| data.as_object().cloned())
            .ok_or_else(|| AppError::Upstream(format!("no KV v2 data at path {path}")))?;

        Ok(data
            .into_iter()
            .filter_map(|(key, value)| value.as_str().map(|value| (key, value.to_owned())))
            .collect())
    }
}

#[async_trait]
impl SecretStorePolicyManager for VaultClient {
    async fn put_policy(&self, name: &str, document: &str) -> AppResult<()> {
        let url = self.policy_url(name);
        let body = serde_json::json!({ "policy": document });
        self.call("policy write", |client| client.put(&url).json(&body))
            .await?;
        Ok(())
    }

    async fn delete_policy(&self, name: &str) -> AppResult<()> {
        let url = self.policy_url(name);
        self.call("policy delete", |client| client.delete(&url))
            .await?;
        Ok(())
    }
}

#[async_trait]
impl SecretStoreHealth for VaultClient {
    async fn health(&self) -> AppResult<()> {
        let url = format!("{}/v1/auth/token/lookup-self", self.base_url);
        let Err(lookup_error) = self
            .send_once("token lookup", &|client: &reqwest::Client| client.get(&url))
            .await
        else {
            return Ok(());
        };

        self.authenticate().await.map_err(|auth_error| {
            AppError::Upstream(format!(
                "vault unreachable: {lookup_error} (re-auth: {auth_error})"
            ))
        })
    }
}
