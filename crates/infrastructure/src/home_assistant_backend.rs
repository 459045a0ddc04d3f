use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::info;
use url::Url;

use jitbroker_application::{CredentialBackend, MintOptions, SecretStoreReader};
use jitbroker_core::{AppError, AppResult};
use jitbroker_domain::Credential;

use crate::http_support::{read_json, required_secret, transport_error, trimmed_base};

/// Backend name and credential metadata value.
pub const HOME_ASSISTANT_BACKEND_NAME: &str = "homeassistant";

/// Secret holding the long-lived refresh token.
pub const HOME_ASSISTANT_SECRET_PATH: &str = "homelab/data/docker/homeassistant";

const DEFAULT_ACCESS_TOKEN_TTL: Duration = Duration::from_secs(30 * 60);

/// Mints Home Assistant access tokens through the OAuth refresh grant.
///
/// Home Assistant fixes the access token lifetime, so the requested TTL is
/// ignored and the upstream `expires_in` is reported instead.
pub struct HomeAssistantBackend {
    http_client: reqwest::Client,
    base_url: String,
    secrets: Arc<dyn SecretStoreReader>,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: u64,
}

impl HomeAssistantBackend {
    /// Creates the backend for a Home Assistant instance.
    #[must_use]
    pub fn new(
        http_client: reqwest::Client,
        base_url: &Url,
        secrets: Arc<dyn SecretStoreReader>,
    ) -> Self {
        Self {
            http_client,
            base_url: trimmed_base(base_url),
            secrets,
        }
    }
}

#[async_trait]
impl CredentialBackend for HomeAssistantBackend {
    fn name(&self) -> &'static str {
        HOME_ASSISTANT_BACKEND_NAME
    }

    async fn mint_credential(
        &self,
        resource: &str,
        tier: u32,
        _ttl: Duration,
        _options: &MintOptions,
    ) -> AppResult<Credential> {
        let mut secret = self.secrets.read_secret(HOME_ASSISTANT_SECRET_PATH).await?;
        let refresh_token =
            required_secret(&mut secret, "refresh_token", HOME_ASSISTANT_SECRET_PATH)?;
        let client_id = required_secret(&mut secret, "client_id", HOME_ASSISTANT_SECRET_PATH)?;

        let response = self
            .http_client
            .post(format!("{}/auth/token", self.base_url))
            .form(&[
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh_token.as_str()),
                ("client_id", client_id.as_str()),
            ])
            .send()
            .await
            .map_err(|error| transport_error("homeassistant token refresh", &error))?;

        let token: TokenResponse = read_json(response, "homeassistant token refresh").await?;
        if token.access_token.is_empty() {
            return Err(AppError::Upstream(
                "homeassistant returned empty access token".to_owned(),
            ));
        }

        let lease_ttl = if token.expires_in > 0 {
            Duration::from_secs(token.expires_in)
        } else {
            DEFAULT_ACCESS_TOKEN_TTL
        };

        info!(
            backend = HOME_ASSISTANT_BACKEND_NAME,
            resource,
            tier,
            ttl_seconds = lease_ttl.as_secs(),
            "backend credential minted"
        );

        Ok(Credential::new(token.access_token, lease_ttl, "")
            .with_metadata("type", "oauth_access_token")
            .with_metadata("backend", HOME_ASSISTANT_BACKEND_NAME))
    }

    async fn health(&self) -> AppResult<()> {
        let response = self
            .http_client
            .get(format!("{}/api/", self.base_url))
            .send()
            .await
            .map_err(|error| transport_error("homeassistant health", &error))?;

        // 401 still proves the API is up.
        let status = response.status();
        if status.is_success() || status == reqwest::StatusCode::UNAUTHORIZED {
            return Ok(());
        }

        Err(AppError::Upstream(format!(
            "homeassistant health returned {status}"
        )))
    }
}
