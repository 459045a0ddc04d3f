use std::collections::BTreeMap;

const GENERIC_POLICY_PREFIX: &str = "jit-tier";

/// Static token policy routing.
///
/// Known resources map to their own policies. Every other resource gets the
/// generic policy of the requested tier, so a static token can always be minted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StaticTokenPolicies {
    resource_policies: BTreeMap<String, Vec<String>>,
}

impl StaticTokenPolicies {
    /// Creates a table with no resource-specific policies.
    #[must_use]
    pub fn generic_only() -> Self {
        Self {
            resource_policies: BTreeMap::new(),
        }
    }

    /// Standard homelab table.
    #[must_use]
    pub fn standard() -> Self {
        [
            ("homeassistant", "jit-tier1-homeassistant"),
            ("grafana", "jit-tier1-grafana"),
            ("influxdb", "jit-tier1-influxdb"),
            ("tautulli", "jit-tier1-tautulli"),
            ("plex", "jit-tier1-plex"),
            ("radarr", "jit-tier1-radarr"),
            ("sonarr", "jit-tier1-sonarr"),
            ("gitlab", "jit-tier2-gitlab"),
            ("portainer", "jit-tier2-portainer"),
            ("docker", "jit-tier2-docker"),
            ("ssh", "jit-tier2-ssh"),
            ("vault-admin", "jit-tier3-vault-admin"),
            ("network", "jit-tier3-network"),
        ]
        .into_iter()
        .fold(Self::generic_only(), |policies, (resource, policy)| {
            policies.with_resource(resource, [policy])
        })
    }

    /// Maps a resource to its own policies.
    #[must_use]
    pub fn with_resource<I, S>(mut self, resource: impl Into<String>, policies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.resource_policies
            .insert(resource.into(), policies.into_iter().map(Into::into).collect());
        self
    }

    /// Resolves the token policies for a resource at a tier.
    #[must_use]
    pub fn policies_for(&self, resource: &str, tier: u32) -> Vec<String> {
        self.resource_policies
            .get(resource)
            .filter(|policies| !policies.is_empty())
            .cloned()
            .unwrap_or_else(|| vec![format!("{GENERIC_POLICY_PREFIX}{tier}-generic")])
    }
}

impl Default for StaticTokenPolicies {
    fn default() -> Self {
        Self::standard()
    }
}
