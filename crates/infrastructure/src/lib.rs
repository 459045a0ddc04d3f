//! Infrastructure adapters for broker ports.

#![forbid(unsafe_code)]

mod gitlab_backend;
mod grafana_backend;
mod home_assistant_backend;
mod http_support;
mod telegram_notifier;
#[cfg(test)]
mod test_support;
mod vault_client;

pub use gitlab_backend::{DEFAULT_GITLAB_PROJECT_ID, GITLAB_BACKEND_NAME, GitLabBackend};
pub use grafana_backend::{GRAFANA_BACKEND_NAME, GRAFANA_SECRET_PATH, GrafanaBackend};
pub use home_assistant_backend::{
    HOME_ASSISTANT_BACKEND_NAME, HOME_ASSISTANT_SECRET_PATH, HomeAssistantBackend,
};
pub use telegram_notifier::{CALLBACK_PREFIX, TELEGRAM_API_BASE, TelegramNotifier};
pub use vault_client::{StaticTokenPolicies, VaultAppRole, VaultClient};
