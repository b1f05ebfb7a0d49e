//! Relay configuration.
//!
//! Everything here is read once at startup and injected into the negotiator,
//! the capability catalog and the registry. Nothing reads it as global state.

use std::{
    collections::HashSet,
    path::{Path, PathBuf},
    time::Duration,
};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::{CapabilityCatalog, ServerInfo, VersionNegotiator};

/// Protocol versions understood out of the box, oldest first.
pub const DEFAULT_SUPPORTED_VERSIONS: &[&str] = &["2024-11-05", "2025-03-26", "2025-06-18"];

/// Configuration error.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Invalid config JSON: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("At least one supported protocol version is required")]
    NoSupportedVersions,
    #[error("Duplicate supported protocol version: {0}")]
    DuplicateVersion(String),
    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// Capability switches advertised at initialize time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CapabilityConfig {
    pub tools_list_changed: bool,
    pub prompts_list_changed: bool,
    pub resources_subscribe: bool,
    pub resources_list_changed: bool,
    /// Advertise routing to more than one backend target.
    pub multi_target: bool,
    /// Advertise supervisory (multi-agent) mode.
    pub supervisor: bool,
    /// Extra deployment-specific entries for the `experimental` group.
    pub experimental: Map<String, Value>,
}

impl Default for CapabilityConfig {
    fn default() -> Self {
        Self {
            tools_list_changed: true,
            prompts_list_changed: false,
            resources_subscribe: false,
            resources_list_changed: false,
            multi_target: false,
            supervisor: false,
            experimental: Map::new(),
        }
    }
}

/// Top-level relay configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RelayConfig {
    pub server_name: String,
    pub server_version: String,
    /// Oldest first.
    pub supported_versions: Vec<String>,
    pub capabilities: CapabilityConfig,
    /// How long a closed session stays queryable.
    pub closed_retention_secs: u64,
    pub sweep_interval_secs: u64,
    pub bind_addr: String,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            server_name: "mcp-relay".to_string(),
            server_version: env!("CARGO_PKG_VERSION").to_string(),
            supported_versions: DEFAULT_SUPPORTED_VERSIONS
                .iter()
                .map(ToString::to_string)
                .collect(),
            capabilities: CapabilityConfig::default(),
            closed_retention_secs: 300,
            sweep_interval_secs: 30,
            bind_addr: "127.0.0.1:3000".to_string(),
        }
    }
}

impl RelayConfig {
    /// Parse and validate a JSON document.
    ///
    /// # Errors
    /// Returns error if the JSON is malformed or fails validation.
    pub fn from_json_str(s: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a JSON config file.
    ///
    /// # Errors
    /// Returns error if the file cannot be read or fails to parse.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_json_str(&raw)?;
        tracing::info!(path = %path.display(), "Loaded relay config");
        Ok(config)
    }

    /// Check invariants the rest of the relay relies on.
    ///
    /// # Errors
    /// Returns error on an empty or duplicated version list, a blank server
    /// name, or a zero sweep interval.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.supported_versions.is_empty() {
            return Err(ConfigError::NoSupportedVersions);
        }
        let mut seen = HashSet::new();
        for v in &self.supported_versions {
            if !seen.insert(v.as_str()) {
                return Err(ConfigError::DuplicateVersion(v.clone()));
            }
        }
        if self.server_name.trim().is_empty() {
            return Err(ConfigError::Invalid("serverName must not be empty".into()));
        }
        if self.sweep_interval_secs == 0 {
            return Err(ConfigError::Invalid("sweepIntervalSecs must be positive".into()));
        }
        Ok(())
    }

    /// Negotiator over `supported_versions`.
    ///
    /// # Errors
    /// Returns error if the version list is invalid.
    pub fn negotiator(&self) -> Result<VersionNegotiator, ConfigError> {
        VersionNegotiator::new(self.supported_versions.iter().cloned())
    }

    #[must_use]
    pub fn capability_catalog(&self) -> CapabilityCatalog {
        CapabilityCatalog::from_config(&self.capabilities)
    }

    #[must_use]
    pub fn server_info(&self) -> ServerInfo {
        ServerInfo::new(&self.server_name, &self.server_version)
    }

    #[must_use]
    pub const fn closed_retention(&self) -> Duration {
        Duration::from_secs(self.closed_retention_secs)
    }

    #[must_use]
    pub const fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}
