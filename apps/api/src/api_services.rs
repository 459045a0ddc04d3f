use std::sync::Arc;
use std::time::Duration;

use jitbroker_application::{
    ApprovalService, BackendRegistry, DeferredTasks, DynamicPolicyBackend, RateLimitRule,
    RateLimitService, RequestStore, SecretStoreReader, StaticBackend,
};
use jitbroker_core::{AppError, AppResult};
use jitbroker_domain::{DEFAULT_MAX_VAULT_PATHS, TierPolicy, VAULT_RESOURCE, VaultPathRules};
use jitbroker_infrastructure::{
    GITLAB_BACKEND_NAME, GRAFANA_BACKEND_NAME, GitLabBackend, GrafanaBackend,
    HOME_ASSISTANT_BACKEND_NAME, HomeAssistantBackend, StaticTokenPolicies, TelegramNotifier,
    VaultAppRole, VaultClient,
};
use tracing::warn;

use crate::api_config::ApiConfig;

/// Upstream calls never wait longer than this.
const HTTP_TIMEOUT: Duration = Duration::from_secs(10);

/// Adapters and services wired from configuration.
pub struct BrokerServices {
    pub approval_service: ApprovalService,
    pub vault: Arc<VaultClient>,
    pub notifier: Arc<TelegramNotifier>,
}

pub fn build_services(config: &ApiConfig, tasks: &DeferredTasks) -> AppResult<BrokerServices> {
    let http_client = reqwest::Client::builder()
        .timeout(HTTP_TIMEOUT)
        .build()
        .map_err(|error| AppError::Internal(format!("failed to build http client: {error}")))?;

    let vault = Arc::new(VaultClient::new(
        http_client.clone(),
        &config.vault_addr,
        VaultAppRole {
            role_id: config.vault_role_id.clone(),
            secret_id: config.vault_secret_id.clone(),
        },
        StaticTokenPolicies::standard(),
    ));
    let notifier = Arc::new(TelegramNotifier::new(
        http_client.clone(),
        config.telegram_bot_token.clone(),
        config.telegram_chat_id,
    ));

    let vault_rules = VaultPathRules::new(config.vault_path_prefix.clone(), DEFAULT_MAX_VAULT_PATHS)?;
    let secrets: Arc<dyn SecretStoreReader> = vault.clone();

    let mut registry = BackendRegistry::new(Arc::new(StaticBackend::new(vault.clone(), vault.clone())))
        .with_dynamic(
            VAULT_RESOURCE,
            Arc::new(DynamicPolicyBackend::new(
                vault.clone(),
                vault.clone(),
                vault.clone(),
                vault_rules.clone(),
                tasks.clone(),
            )),
        );

    if let Some(url) = &config.home_assistant_url {
        registry = registry.with_dynamic(
            HOME_ASSISTANT_BACKEND_NAME,
            Arc::new(HomeAssistantBackend::new(http_client.clone(), url, secrets.clone())),
        );
    }

    if let Some(url) = &config.grafana_url {
        registry = registry.with_dynamic(
            GRAFANA_BACKEND_NAME,
            Arc::new(GrafanaBackend::new(http_client.clone(), url, secrets.clone())),
        );
    }

    match (&config.gitlab_url, &config.gitlab_admin_token) {
        (Some(url), Some(admin_token)) => {
            registry = registry.with_dynamic(
                GITLAB_BACKEND_NAME,
                Arc::new(
                    GitLabBackend::new(http_client, url, admin_token.clone(), tasks.clone())
                        .with_project_id(config.gitlab_project_id.clone()),
                ),
            );
        }
        (Some(_), None) => {
            warn!("GITLAB_URL is set without GITLAB_ADMIN_TOKEN, gitlab uses static tokens");
        }
        _ => {}
    }

    let approval_service = ApprovalService::new(
        RequestStore::new(config.max_requests),
        RateLimitService::new(RateLimitRule::new(
            config.rate_limit_max,
            config.rate_limit_window,
        )?),
        registry,
        notifier.clone(),
        tasks.clone(),
    )
    .with_tier_policy(TierPolicy::standard())
    .with_vault_rules(vault_rules)
    .with_allowed_requesters(config.allowed_requesters.iter().cloned())
    .with_request_timeout(config.request_timeout);

    Ok(BrokerServices {
        approval_service,
        vault,
        notifier,
    })
}
