//! Server-side handshake profile shared by every session.

use mcp_relay_core::{
    CapabilityCatalog, ConfigError, RelayConfig, ServerInfo, VersionNegotiator,
};

/// Immutable inputs to `initialize`: what the server speaks, advertises and
/// calls itself.
#[derive(Debug, Clone)]
pub struct ServerProfile {
    negotiator: VersionNegotiator,
    catalog: CapabilityCatalog,
    server_info: ServerInfo,
}

impl ServerProfile {
    #[must_use]
    pub const fn new(
        negotiator: VersionNegotiator,
        catalog: CapabilityCatalog,
        server_info: ServerInfo,
    ) -> Self {
        Self {
            negotiator,
            catalog,
            server_info,
        }
    }

    /// Build the profile described by `config`.
    ///
    /// # Errors
    /// Returns error if the configured version list is invalid.
    pub fn from_config(config: &RelayConfig) -> Result<Self, ConfigError> {
        Ok(Self::new(
            config.negotiator()?,
            config.capability_catalog(),
            config.server_info(),
        ))
    }

    #[must_use]
    pub const fn negotiator(&self) -> &VersionNegotiator {
        &self.negotiator
    }

    #[must_use]
    pub const fn catalog(&self) -> &CapabilityCatalog {
        &self.catalog
    }

    #[must_use]
    pub const fn server_info(&self) -> &ServerInfo {
        &self.server_info
    }
}
