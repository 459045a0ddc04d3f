use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{SecondsFormat, TimeDelta, Utc};
use serde::Deserialize;
use tracing::info;
use url::Url;

use jitbroker_application::{CredentialBackend, MintOptions, SecretStoreReader};
use jitbroker_core::{AppError, AppResult};
use jitbroker_domain::Credential;

use crate::http_support::{ensure_success, read_json, required_secret, transport_error, trimmed_base};

/// Backend name and credential metadata value.
pub const GRAFANA_BACKEND_NAME: &str = "grafana";

/// Secret holding the admin token and service account id.
pub const GRAFANA_SECRET_PATH: &str = "homelab/data/docker/grafana";

/// Mints expiring Grafana service-account tokens.
pub struct GrafanaBackend {
    http_client: reqwest::Client,
    base_url: String,
    secrets: Arc<dyn SecretStoreReader>,
}

#[derive(Debug, Deserialize)]
struct ServiceAccountToken {
    key: String,
    #[serde(default)]
    id: i64,
}

impl GrafanaBackend {
    /// Creates the backend for a Grafana instance.
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
impl CredentialBackend for GrafanaBackend {
    fn name(&self) -> &'static str {
        GRAFANA_BACKEND_NAME
    }

    async fn mint_credential(
        &self,
        resource: &str,
        tier: u32,
        ttl: Duration,
        _options: &MintOptions,
    ) -> AppResult<Credential> {
        let mut secret = self.secrets.read_secret(GRAFANA_SECRET_PATH).await?;
        let admin_token = required_secret(&mut secret, "token", GRAFANA_SECRET_PATH)?;
        let service_account_id =
            required_secret(&mut secret, "service_account_id", GRAFANA_SECRET_PATH)?;

        let now = Utc::now();
        let lifetime = TimeDelta::from_std(ttl)
            .map_err(|_| AppError::Validation(format!("ttl {ttl:?} is out of range")))?;
        let expires = (now + lifetime).to_rfc3339_opts(SecondsFormat::Secs, true);

        let response = self
            .http_client
            .post(format!(
                "{}/api/serviceaccounts/{service_account_id}/tokens",
                self.base_url
            ))
            .bearer_auth(&admin_token)
            .json(&serde_json::json!({
                "name": format!("jit-{}", now.timestamp()),
                "expires": expires,
            }))
            .send()
            .await
            .map_err(|error| transport_error("grafana token create", &error))?;

        let token: ServiceAccountToken = read_json(response, "grafana token create").await?;
        if token.key.is_empty() {
            return Err(AppError::Upstream(
                "grafana returned empty token key".to_owned(),
            ));
        }

        info!(
            backend = GRAFANA_BACKEND_NAME,
            resource,
            tier,
            ttl_seconds = ttl.as_secs(),
            "backend credential minted"
        );

        Ok(Credential::new(token.key, ttl, token.id.to_string())
            .with_metadata("type", "service_account_token")
            .with_metadata("backend", GRAFANA_BACKEND_NAME)
            .with_metadata("service_account_id", service_account_id))
    }

    async fn health(&self) -> AppResult<()> {
        let response = self
            .http_client
            .get(format!("{}/api/health", self.base_url))
            .send()
            .await
            .map_err(|error| transport_error("grafana health", &error))?;
        ensure_success(response, "grafana health").await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use axum::extract::Path;
    use axum::http::{HeaderMap, StatusCode};
    use axum::routing::{get, post};
    use axum::{Json, Router};
    use chrono::{DateTime, TimeDelta, Utc};
    use jitbroker_application::{CredentialBackend, MintOptions};
    use jitbroker_core::AppError;
    use jitbroker_domain::RequestId;
    use serde_json::{Value, json};

    use super::GrafanaBackend;
    use crate::http_support::test_server;
    use crate::test_support::FakeSecretReader;

    fn options() -> MintOptions {
        MintOptions::new(RequestId::new("req-1").unwrap_or_else(|_| unreachable!()))
    }

    fn secrets() -> Arc<FakeSecretReader> {
        Arc::new(FakeSecretReader::with_secret(
            "homelab/data/docker/grafana",
            &[("token", "glsa_admin"), ("service_account_id", "7")],
        ))
    }

    async fn create_token(
        Path(account): Path<String>,
        headers: HeaderMap,
        Json(body): Json<Value>,
    ) -> (StatusCode, Json<Value>) {
        let bearer = headers
            .get("authorization")
            .and_then(|value| value.to_str().ok());
        if account != "7" || bearer != Some("Bearer glsa_admin") {
            return (StatusCode::FORBIDDEN, Json(json!({ "message": "denied" })));
        }

        let expires = body["expires"]
            .as_str()
            .and_then(|value| DateTime::parse_from_rfc3339(value).ok())
            .map(|value| value.with_timezone(&Utc));
        let expected = Utc::now() + TimeDelta::minutes(15);
        let within_window = expires.is_some_and(|expires| {
            (expires - expected).num_seconds().abs() <= 60
        });
        if !within_window {
            return (StatusCode::BAD_REQUEST, Json(json!({ "message": "bad expires" })));
        }

        (
            StatusCode::OK,
            Json(json!({ "id": 31, "name": body["name"], "key": "glsa_jit" })),
        )
    }

    async fn backend() -> GrafanaBackend {
        let router = Router::new()
            .route("/api/serviceaccounts/{account}/tokens", post(create_token))
            .route("/api/health", get(|| async { StatusCode::SERVICE_UNAVAILABLE }));
        let base_url = test_server::spawn(router).await;
        GrafanaBackend::new(reqwest::Client::new(), &base_url, secrets())
    }

    #[tokio::test]
    async fn service_account_token_expires_after_ttl() {
        let backend = backend().await;

        let credential = backend
            .mint_credential("grafana", 1, Duration::from_secs(900), &options())
            .await
            .unwrap_or_else(|_| unreachable!());

        assert_eq!(credential.token(), "glsa_jit");
        assert_eq!(credential.lease_id(), "31");
        assert_eq!(credential.lease_ttl(), Duration::from_secs(900));
        assert_eq!(
            credential
                .metadata()
                .get("service_account_id")
                .map(String::as_str),
            Some("7")
        );
    }

    #[tokio::test]
    async fn rejected_admin_token_is_an_upstream_error() {
        let router = Router::new().route("/api/serviceaccounts/{account}/tokens", post(create_token));
        let base_url = test_server::spawn(router).await;
        let secrets = Arc::new(FakeSecretReader::with_secret(
            "homelab/data/docker/grafana",
            &[("token", "stale"), ("service_account_id", "7")],
        ));
        let backend = GrafanaBackend::new(reqwest::Client::new(), &base_url, secrets);

        let result = backend
            .mint_credential("grafana", 1, Duration::from_secs(900), &options())
            .await;

        assert!(matches!(
            result,
            Err(AppError::Upstream(message)) if message.contains("403")
        ));
    }

    #[tokio::test]
    async fn health_requires_ok_status() {
        let backend = backend().await;
        assert!(backend.health().await.is_err());
    }
}
