//! Static catalog of server-advertised capabilities.

use std::sync::Arc;

use serde_json::{Value, json};

use crate::{
    config::CapabilityConfig,
    protocol::{
        LoggingCapability, PromptsCapability, ResourcesCapability, ServerCapabilities,
        ToolsCapability,
    },
};

/// Immutable capability description.
///
/// Cloning is cheap; each session takes its own [`snapshot`](Self::snapshot)
/// at creation. What clients advertise never feeds back into this catalog.
#[derive(Debug, Clone, PartialEq)]
pub struct CapabilityCatalog {
    capabilities: Arc<ServerCapabilities>,
}

impl CapabilityCatalog {
    /// Catalog advertising exactly `capabilities`.
    #[must_use]
    pub fn new(capabilities: ServerCapabilities) -> Self {
        Self {
            capabilities: Arc::new(capabilities),
        }
    }

    /// Resolve the catalog from configuration switches.
    #[must_use]
    pub fn from_config(config: &CapabilityConfig) -> Self {
        let mut experimental = config.experimental.clone();
        if config.multi_target {
            experimental.insert("multiTarget".into(), json!({ "enabled": true }));
        }
        if config.supervisor {
            experimental.insert("supervisor".into(), json!({ "enabled": true }));
        }

        Self::new(ServerCapabilities {
            tools: ToolsCapability {
                list_changed: config.tools_list_changed,
            },
            prompts: PromptsCapability {
                list_changed: config.prompts_list_changed,
            },
            resources: ResourcesCapability {
                subscribe: config.resources_subscribe,
                list_changed: config.resources_list_changed,
            },
            logging: LoggingCapability {},
            experimental,
        })
    }

    /// Owned copy for storing in a session.
    #[must_use]
    pub fn snapshot(&self) -> ServerCapabilities {
        ServerCapabilities::clone(&self.capabilities)
    }

    #[must_use]
    pub fn capabilities(&self) -> &ServerCapabilities {
        &self.capabilities
    }

    #[must_use]
    pub fn experimental(&self, feature: &str) -> Option<&Value> {
        self.capabilities.experimental.get(feature)
    }
}

impl Default for CapabilityCatalog {
    fn default() -> Self {
        Self::from_config(&CapabilityConfig::default())
    }
}
