//! Least-privilege secret-store path requests.
//!
//! Callers of the `vault` resource name the exact paths and capabilities they
//! need. Every request is checked against [`VaultPathRules`] before a policy is
//! rendered, and the rendered policy contains nothing beyond what was asked for.

use std::fmt::Write;
use std::str::FromStr;

use jitbroker_core::{AppError, AppResult};
use serde::{Deserialize, Serialize};

/// Default namespace every requested path must live under.
pub const DEFAULT_VAULT_PATH_PREFIX: &str = "homelab/data/";

/// Default maximum number of paths in one request.
pub const DEFAULT_MAX_VAULT_PATHS: usize = 10;

/// Capabilities a caller may request on a path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VaultCapability {
    /// Read secret data.
    Read,
    /// List keys under a path.
    List,
    /// Create new secret data.
    Create,
    /// Update existing secret data.
    Update,
}

impl VaultCapability {
    /// Every capability a caller may request.
    pub const ALLOWED: [Self; 4] = [Self::Read, Self::List, Self::Create, Self::Update];

    /// Returns the policy-document value for this capability.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Read => "read",
            Self::List => "list",
            Self::Create => "create",
            Self::Update => "update",
        }
    }
}

impl FromStr for VaultCapability {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "read" => Ok(Self::Read),
            "list" => Ok(Self::List),
            "create" => Ok(Self::Create),
            "update" => Ok(Self::Update),
            _ => Err(AppError::Validation(format!(
                "capability '{value}' is not allowed (allowed: read, list, create, update)"
            ))),
        }
    }
}

/// Raw path request as supplied by a caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VaultPathRequest {
    /// Requested secret-store path.
    pub path: String,
    /// Requested capabilities on the path.
    pub capabilities: Vec<String>,
}

impl VaultPathRequest {
    /// Creates a path request.
    #[must_use]
    pub fn new(path: impl Into<String>, capabilities: &[&str]) -> Self {
        Self {
            path: path.into(),
            capabilities: capabilities
                .iter()
                .map(|capability| (*capability).to_owned())
                .collect(),
        }
    }
}

/// A path request that passed [`VaultPathRules::validate`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScopedVaultPath {
    path: String,
    capabilities: Vec<VaultCapability>,
}

impl ScopedVaultPath {
    /// Returns the validated path.
    #[must_use]
    pub fn path(&self) -> &str {
        self.path.as_str()
    }

    /// Returns the validated capabilities in request order, without duplicates.
    #[must_use]
    pub fn capabilities(&self) -> &[VaultCapability] {
        &self.capabilities
    }
}

/// Allow-list rules applied to every dynamic secret-store request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VaultPathRules {
    prefix: String,
    max_paths: usize,
}

impl Default for VaultPathRules {
    fn default() -> Self {
        Self {
            prefix: DEFAULT_VAULT_PATH_PREFIX.to_owned(),
            max_paths: DEFAULT_MAX_VAULT_PATHS,
        }
    }
}

impl VaultPathRules {
    /// Creates rules with a custom prefix and path limit.
    pub fn new(prefix: impl Into<String>, max_paths: usize) -> AppResult<Self> {
        let prefix = prefix.into();
        if prefix.trim().is_empty() {
            return Err(AppError::Validation(
                "vault path prefix must not be empty".to_owned(),
            ));
        }
        if !prefix.ends_with('/') {
            return Err(AppError::Validation(format!(
                "vault path prefix '{prefix}' must end with '/'"
            )));
        }
        if max_paths == 0 {
            return Err(AppError::Validation(
                "maximum vault path count must be greater than zero".to_owned(),
            ));
        }

        Ok(Self { prefix, max_paths })
    }

    /// Returns the required path prefix.
    #[must_use]
    pub fn prefix(&self) -> &str {
        self.prefix.as_str()
    }

    /// Returns the maximum number of paths in one request.
    #[must_use]
    pub fn max_paths(&self) -> usize {
        self.max_paths
    }

    /// Validates raw path requests.
    ///
    /// Rejects an empty list, more than `max_paths` entries, paths outside the
    /// prefix, and any capability outside [`VaultCapability::ALLOWED`].
    pub fn validate(&self, paths: &[VaultPathRequest]) -> AppResult<Vec<ScopedVaultPath>> {
        if paths.is_empty() {
            return Err(AppError::Validation(
                "vault_paths is required when resource is vault".to_owned(),
            ));
        }
        if paths.len() > self.max_paths {
            return Err(AppError::Validation(format!(
                "too many vault paths: {} (max {})",
                paths.len(),
                self.max_paths
            )));
        }

        paths
            .iter()
            .enumerate()
            .map(|(index, request)| self.validate_one(index, request))
            .collect()
    }

    fn validate_one(&self, index: usize, request: &VaultPathRequest) -> AppResult<ScopedVaultPath> {
        let path = request.path.as_str();
        if path.is_empty() {
            return Err(AppError::Validation(format!(
                "vault_paths[{index}]: path is required"
            )));
        }
        if !path.starts_with(self.prefix.as_str()) || path.len() == self.prefix.len() {
            return Err(AppError::Validation(format!(
                "vault_paths[{index}]: path '{path}' must start with '{}'",
                self.prefix
            )));
        }
        if path.split('/').any(|segment| segment == "..") {
            return Err(AppError::Validation(format!(
                "vault_paths[{index}]: path '{path}' must not contain '..' segments"
            )));
        }
        // Paths are embedded verbatim in a quoted policy string.
        if let Some(invalid) = path.chars().find(|character| !is_path_character(*character)) {
            return Err(AppError::Validation(format!(
                "vault_paths[{index}]: path '{path}' contains disallowed character '{invalid}'"
            )));
        }

        if request.capabilities.is_empty() {
            return Err(AppError::Validation(format!(
                "vault_paths[{index}]: at least one capability is required"
            )));
        }

        let mut capabilities = Vec::with_capacity(request.capabilities.len());
        for raw in &request.capabilities {
            let capability = VaultCapability::from_str(raw).map_err(|error| match error {
                AppError::Validation(message) => {
                    AppError::Validation(format!("vault_paths[{index}]: {message}"))
                }
                other => other,
            })?;
            if !capabilities.contains(&capability) {
                capabilities.push(capability);
            }
        }

        Ok(ScopedVaultPath {
            path: path.to_owned(),
            capabilities,
        })
    }
}

fn is_path_character(character: char) -> bool {
    character.is_ascii_alphanumeric() || matches!(character, '/' | '-' | '_' | '.' | '*' | '+')
}

/// Renders validated paths into an HCL ACL policy, one block per path in input order.
#[must_use]
pub fn render_policy_document(paths: &[ScopedVaultPath]) -> String {
    let mut document = String::from("# Auto-generated JIT dynamic Vault policy\n");
    for scoped in paths {
        let capabilities = scoped
            .capabilities
            .iter()
            .map(|capability| format!("\"{}\"", capability.as_str()))
            .collect::<Vec<_>>()
            .join(", ");
        let _ = write!(
            document,
            "\npath \"{}\" {{\n  capabilities = [{capabilities}]\n}}\n",
            scoped.path
        );
    }

    document
}
