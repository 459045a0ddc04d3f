use std::collections::HashMap;
use std::sync::Arc;

use tracing::info;

use crate::broker_ports::CredentialBackend;

/// Routes a resource name to the backend that mints its credentials.
///
/// Dynamic backends are registered once at startup; every other resource
/// falls back to the static backend. Lookups never perform I/O.
#[derive(Clone)]
pub struct BackendRegistry {
    fallback: Arc<dyn CredentialBackend>,
    backends: HashMap<String, Arc<dyn CredentialBackend>>,
}

impl BackendRegistry {
    /// Creates a registry with only the static fallback.
    #[must_use]
    pub fn new(fallback: Arc<dyn CredentialBackend>) -> Self {
        Self {
            fallback,
            backends: HashMap::new(),
        }
    }

    /// Registers a dynamic backend for `resource`, replacing any earlier one.
    #[must_use]
    pub fn with_dynamic(
        mut self,
        resource: impl Into<String>,
        backend: Arc<dyn CredentialBackend>,
    ) -> Self {
        let resource = resource.into();
        info!(
            resource = %resource,
            backend = backend.name(),
            "dynamic backend registered"
        );
        self.backends.insert(resource, backend);
        self
    }

    /// Returns the backend for `resource`.
    #[must_use]
    pub fn backend_for(&self, resource: &str) -> Arc<dyn CredentialBackend> {
        self.backends
            .get(resource)
            .map_or_else(|| Arc::clone(&self.fallback), Arc::clone)
    }

    /// Returns whether `resource` routes to a dynamic backend.
    #[must_use]
    pub fn is_dynamic(&self, resource: &str) -> bool {
        self.backends.contains_key(resource)
    }

    /// Returns the static fallback backend.
    #[must_use]
    pub fn fallback(&self) -> Arc<dyn CredentialBackend> {
        Arc::clone(&self.fallback)
    }

    /// Returns resources with a registered dynamic backend, sorted.
    #[must_use]
    pub fn dynamic_resources(&self) -> Vec<&str> {
        let mut resources: Vec<&str> = self.backends.keys().map(String::as_str).collect();
        resources.sort_unstable();
        resources
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use jitbroker_domain::RequestId;

    use crate::broker_ports::{CredentialBackend, MintOptions};
    use crate::static_backend::StaticBackend;
    use crate::test_support::{FakeBackend, FakeSecretStore};

    use super::BackendRegistry;

    fn registry(store: &Arc<FakeSecretStore>) -> BackendRegistry {
        let fallback: Arc<dyn CredentialBackend> =
            Arc::new(StaticBackend::new(store.clone(), store.clone()));
        BackendRegistry::new(fallback)
            .with_dynamic("grafana", Arc::new(FakeBackend::succeeding("grafana")))
    }

    fn options() -> MintOptions {
        MintOptions::new(RequestId::new("req-0123456789ab").unwrap_or_else(|_| unreachable!()))
    }

    #[test]
    fn unregistered_resources_fall_back_to_static() {
        let store = Arc::new(FakeSecretStore::default());
        let registry = registry(&store);

        assert!(registry.is_dynamic("grafana"));
        assert!(!registry.is_dynamic("sonarr"));
        assert_eq!(registry.backend_for("grafana").name(), "grafana");
        assert_eq!(registry.backend_for("sonarr").name(), "static");
        assert_eq!(registry.dynamic_resources(), vec!["grafana"]);
    }

    #[tokio::test]
    async fn static_backend_annotates_credential() {
        let store = Arc::new(FakeSecretStore::default());
        let registry = registry(&store);

        let credential = registry
            .backend_for("sonarr")
            .mint_credential("sonarr", 1, Duration::from_secs(900), &options())
            .await
            .unwrap_or_else(|_| unreachable!());

        assert_eq!(credential.lease_ttl(), Duration::from_secs(900));
        assert_eq!(credential.lease_id(), "accessor-1");
        assert_eq!(
            credential.metadata().get("backend").map(String::as_str),
            Some("static")
        );
        assert_eq!(
            credential.metadata().get("type").map(String::as_str),
            Some("vault_token")
        );
        assert_eq!(store.minted_resources().await, vec![("sonarr".to_owned(), 1)]);
    }

    #[tokio::test]
    async fn static_health_reflects_secret_store() {
        let store = Arc::new(FakeSecretStore::default());
        let registry = registry(&store);
        assert!(registry.fallback().health().await.is_ok());

        store.set_healthy(false).await;
        assert!(registry.fallback().health().await.is_err());
    }
}
