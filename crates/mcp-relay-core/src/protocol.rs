//! Initialize handshake payloads and advertised capability shapes.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Opaque key/value object supplied by a client (`clientInfo`, `capabilities`).
pub type ClientObject = Map<String, Value>;

/// Parameters of an inbound `initialize` request.
///
/// Only the structure is checked here. A missing `protocolVersion` is not a
/// parse failure: it is reported by the session as a protocol error so the
/// caller can retry.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializeParams {
    #[serde(default, alias = "protocol_version")]
    pub protocol_version: Option<String>,
    #[serde(default)]
    pub capabilities: Option<ClientObject>,
    #[serde(default, alias = "client_info")]
    pub client_info: Option<ClientObject>,
}

impl InitializeParams {
    /// Params requesting `version` with no client data.
    #[must_use]
    pub fn new(version: impl Into<String>) -> Self {
        Self {
            protocol_version: Some(version.into()),
            ..Self::default()
        }
    }

    /// Attach `clientInfo`.
    #[must_use]
    pub fn with_client_info(mut self, info: ClientObject) -> Self {
        self.client_info = Some(info);
        self
    }

    /// Attach client `capabilities`.
    #[must_use]
    pub fn with_capabilities(mut self, capabilities: ClientObject) -> Self {
        self.capabilities = Some(capabilities);
        self
    }

    /// Requested version, treating an empty string as absent.
    #[must_use]
    pub fn requested_version(&self) -> Option<&str> {
        self.protocol_version
            .as_deref()
            .map(str::trim)
            .filter(|v| !v.is_empty())
    }
}

/// Result of a successful `initialize`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializeResult {
    pub protocol_version: String,
    pub capabilities: ServerCapabilities,
    pub server_info: ServerInfo,
}

/// Static server identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerInfo {
    pub name: String,
    pub version: String,
}

impl ServerInfo {
    #[must_use]
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
        }
    }
}

/// Capabilities advertised by the server at initialize time.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ServerCapabilities {
    pub tools: ToolsCapability,
    pub prompts: PromptsCapability,
    pub resources: ResourcesCapability,
    pub logging: LoggingCapability,
    pub experimental: Map<String, Value>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolsCapability {
    /// Whether the server emits `notifications/tools/list_changed`.
    #[serde(default)]
    pub list_changed: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptsCapability {
    #[serde(default)]
    pub list_changed: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourcesCapability {
    #[serde(default)]
    pub subscribe: bool,
    #[serde(default)]
    pub list_changed: bool,
}

/// Logging carries no options; it serializes as `{}`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingCapability {}
