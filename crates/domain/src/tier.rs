use std::collections::BTreeMap;
use std::time::Duration;

use jitbroker_core::{AppError, AppResult};

/// Approval and lifetime policy for one tier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TierConfig {
    ttl: Duration,
    auto_approve: bool,
    description: String,
}

impl TierConfig {
    /// Creates a tier configuration.
    #[must_use]
    pub fn new(ttl: Duration, auto_approve: bool, description: impl Into<String>) -> Self {
        Self {
            ttl,
            auto_approve,
            description: description.into(),
        }
    }

    /// Returns the credential lifetime for this tier.
    #[must_use]
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Returns whether requests at this tier skip human approval.
    #[must_use]
    pub fn auto_approve(&self) -> bool {
        self.auto_approve
    }

    /// Returns the operator-facing tier description.
    #[must_use]
    pub fn description(&self) -> &str {
        self.description.as_str()
    }
}

/// Immutable tier table plus per-resource minimum tiers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TierPolicy {
    tiers: BTreeMap<u32, TierConfig>,
    minimum_tiers: BTreeMap<String, u32>,
}

impl TierPolicy {
    /// Creates an empty policy. Every tier lookup fails until tiers are added.
    #[must_use]
    pub fn new() -> Self {
        Self {
            tiers: BTreeMap::new(),
            minimum_tiers: BTreeMap::new(),
        }
    }

    /// Standard deployment policy.
    #[must_use]
    pub fn standard() -> Self {
        Self::new()
            .with_tier(
                1,
                TierConfig::new(
                    Duration::from_secs(15 * 60),
                    true,
                    "Auto-approve, read-only service access",
                ),
            )
            .with_tier(
                2,
                TierConfig::new(
                    Duration::from_secs(30 * 60),
                    false,
                    "Infrastructure access, requires approval",
                ),
            )
            .with_tier(
                3,
                TierConfig::new(
                    Duration::from_secs(60 * 60),
                    false,
                    "Critical access, requires approval",
                ),
            )
            .with_minimum_tier("gitlab", 2)
            .with_minimum_tier("homeassistant", 2)
            .with_minimum_tier("vault", 2)
    }

    /// Adds or replaces a tier.
    #[must_use]
    pub fn with_tier(mut self, tier: u32, config: TierConfig) -> Self {
        self.tiers.insert(tier, config);
        self
    }

    /// Requires at least `tier` for `resource`.
    #[must_use]
    pub fn with_minimum_tier(mut self, resource: impl Into<String>, tier: u32) -> Self {
        self.minimum_tiers.insert(resource.into(), tier);
        self
    }

    /// Resolves a tier configuration.
    pub fn tier(&self, tier: u32) -> AppResult<&TierConfig> {
        self.tiers
            .get(&tier)
            .ok_or_else(|| AppError::Validation(format!("unknown tier: {tier}")))
    }

    /// Returns the configured minimum tier for a resource.
    #[must_use]
    pub fn minimum_tier(&self, resource: &str) -> Option<u32> {
        self.minimum_tiers.get(resource).copied()
    }

    /// Rejects requests below the resource's minimum tier.
    pub fn check_minimum(&self, resource: &str, tier: u32) -> AppResult<()> {
        match self.minimum_tier(resource) {
            Some(minimum) if tier < minimum => Err(AppError::Validation(format!(
                "resource {resource} requires minimum tier {minimum}"
            ))),
            _ => Ok(()),
        }
    }
}

impl Default for TierPolicy {
    fn default() -> Self {
        Self::standard()
    }
}
