//! Per-request context handed to backends.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{ClientObject, SessionId};

/// What a backend needs to know about the session a request came from.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestContext {
    pub session_id: SessionId,
    pub protocol_version: String,
    #[serde(default)]
    pub routing_target: Option<String>,
    #[serde(default)]
    pub client_info: ClientObject,

    /// Arbitrary metadata for transport-specific needs.
    #[serde(default)]
    pub metadata: HashMap<String, Value>,
}

impl RequestContext {
    #[must_use]
    pub fn new(session_id: SessionId, protocol_version: impl Into<String>) -> Self {
        Self {
            session_id,
            protocol_version: protocol_version.into(),
            routing_target: None,
            client_info: ClientObject::new(),
            metadata: HashMap::new(),
        }
    }

    #[must_use]
    pub fn with_routing_target(mut self, target: Option<String>) -> Self {
        self.routing_target = target;
        self
    }

    #[must_use]
    pub fn with_client_info(mut self, client_info: ClientObject) -> Self {
        self.client_info = client_info;
        self
    }

    /// Client name from `clientInfo`, if it sent one.
    #[must_use]
    pub fn client_name(&self) -> Option<&str> {
        self.client_info.get("name").and_then(Value::as_str)
    }

    #[must_use]
    pub fn get_metadata(&self, key: &str) -> Option<&Value> {
        self.metadata.get(key)
    }

    pub fn set_metadata(&mut self, key: impl Into<String>, value: Value) {
        self.metadata.insert(key.into(), value);
    }
}
