//! GitLab project access tokens with scheduled revocation.
//!
//! GitLab only accepts whole-day expiry dates, so every token is created to
//! expire tomorrow and explicitly revoked once the requested TTL elapses.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{TimeDelta, Utc};
use serde::Deserialize;
use tracing::{info, warn};
use url::Url;

use jitbroker_application::{CredentialBackend, DeferredTasks, MintOptions};
use jitbroker_core::{AppError, AppResult};
use jitbroker_domain::Credential;

use crate::http_support::{ensure_success, read_json, transport_error, trimmed_base};

/// Backend name and credential metadata value.
pub const GITLAB_BACKEND_NAME: &str = "gitlab";

/// Project used when none is configured.
pub const DEFAULT_GITLAB_PROJECT_ID: &str = "4";

/// Developer role.
const DEVELOPER_ACCESS_LEVEL: u32 = 30;

const DEFAULT_TOKEN_SCOPE: &str = "api";

/// Mints short-lived GitLab project access tokens.
pub struct GitLabBackend {
    api: GitLabApi,
    tasks: DeferredTasks,
}

#[derive(Clone)]
struct GitLabApi {
    http_client: reqwest::Client,
    base_url: String,
    admin_token: String,
    project_id: String,
}

#[derive(Debug, Deserialize)]
struct ProjectAccessToken {
    id: i64,
    token: String,
    #[serde(default)]
    name: String,
}

impl GitLabBackend {
    /// Creates the backend. Revocations run on `tasks`.
    #[must_use]
    pub fn new(
        http_client: reqwest::Client,
        base_url: &Url,
        admin_token: impl Into<String>,
        tasks: DeferredTasks,
    ) -> Self {
        Self {
            api: GitLabApi {
                http_client,
                base_url: trimmed_base(base_url),
                admin_token: admin_token.into(),
                project_id: DEFAULT_GITLAB_PROJECT_ID.to_owned(),
            },
            tasks,
        }
    }

    /// Targets another project.
    #[must_use]
    pub fn with_project_id(mut self, project_id: impl Into<String>) -> Self {
        self.api.project_id = project_id.into();
        self
    }

    /// Revokes a project access token immediately.
    pub async fn revoke(&self, token_id: i64) -> AppResult<()> {
        self.api.revoke(token_id).await
    }
}

impl GitLabApi {
    fn tokens_url(&self) -> String {
        format!(
            "{}/api/v4/projects/{}/access_tokens",
            self.base_url, self.project_id
        )
    }

    async fn create(&self, scopes: &[String]) -> AppResult<ProjectAccessToken> {
        let now = Utc::now();
        let expires_at = (now + TimeDelta::days(1)).format("%Y-%m-%d").to_string();

        let response = self
            .http_client
            .post(self.tokens_url())
            .header("PRIVATE-TOKEN", &self.admin_token)
            .json(&serde_json::json!({
                "name": format!("jit-gitlab-{}", now.timestamp()),
                "scopes": scopes,
                "expires_at": expires_at,
                "access_level": DEVELOPER_ACCESS_LEVEL,
            }))
            .send()
            .await
            .map_err(|error| transport_error("gitlab token create", &error))?;

        read_json(response, "gitlab token create").await
    }

    async fn revoke(&self, token_id: i64) -> AppResult<()> {
        let response = self
            .http_client
            .delete(format!("{}/{token_id}", self.tokens_url()))
            .header("PRIVATE-TOKEN", &self.admin_token)
            .send()
            .await
            .map_err(|error| transport_error("gitlab token revoke", &error))?;
        ensure_success(response, "gitlab token revoke").await?;
        Ok(())
    }
}

#[async_trait]
impl CredentialBackend for GitLabBackend {
    fn name(&self) -> &'static str {
        GITLAB_BACKEND_NAME
    }

    async fn mint_credential(
        &self,
        resource: &str,
        tier: u32,
        ttl: Duration,
        options: &MintOptions,
    ) -> AppResult<Credential> {
        let scopes = if options.scopes.is_empty() {
            vec![DEFAULT_TOKEN_SCOPE.to_owned()]
        } else {
            options.scopes.clone()
        };

        let token = self.api.create(&scopes).await?;
        if token.token.is_empty() {
            return Err(AppError::Upstream(
                "gitlab returned empty access token".to_owned(),
            ));
        }

        let api = self.api.clone();
        let token_id = token.id;
        let request_id = options.request_id.clone();
        self.tasks.spawn_after("gitlab_token_revocation", ttl, async move {
            match api.revoke(token_id).await {
                Ok(()) => info!(request_id = %request_id, token_id, "gitlab token revoked"),
                Err(error) => {
                    warn!(request_id = %request_id, token_id, error = %error, "gitlab token revocation failed");
                }
            }
        });

        info!(
            backend = GITLAB_BACKEND_NAME,
            resource,
            tier,
            ttl_seconds = ttl.as_secs(),
            token_id,
            "backend credential minted"
        );

        Ok(Credential::new(token.token, ttl, token_id.to_string())
            .with_metadata("type", "project_access_token")
            .with_metadata("backend", GITLAB_BACKEND_NAME)
            .with_metadata("project_id", self.api.project_id.clone())
            .with_metadata("token_id", token_id.to_string())
            .with_metadata("token_name", token.name))
    }

    async fn health(&self) -> AppResult<()> {
        let response = self
            .api
            .http_client
            .get(format!("{}/api/v4/version", self.api.base_url))
            .header("PRIVATE-TOKEN", &self.api.admin_token)
            .send()
            .await
            .map_err(|error| transport_error("gitlab health", &error))?;
        ensure_success(response, "gitlab health").await?;
        Ok(())
    }
}
