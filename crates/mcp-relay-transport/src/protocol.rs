//! JSON-RPC 2.0 wire types and error mapping.

use mcp_relay_core::{BackendError, SessionError};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

pub const JSONRPC_VERSION: &str = "2.0";

// JSON-RPC error codes
pub const PARSE_ERROR: i32 = -32700;
pub const INVALID_REQUEST: i32 = -32600;
pub const METHOD_NOT_FOUND: i32 = -32601;
pub const INVALID_PARAMS: i32 = -32602;
pub const INTERNAL_ERROR: i32 = -32603;

// Server-defined codes
pub const ROUTING_FAILED: i32 = -32001;
pub const SESSION_NOT_READY: i32 = -32002;
pub const SESSION_NOT_FOUND: i32 = -32003;
pub const SESSION_STATE_CONFLICT: i32 = -32004;

/// Inbound request or notification (no `id`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Value>,
    pub method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl JsonRpcRequest {
    #[must_use]
    pub fn new(id: impl Into<Value>, method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id: Some(id.into()),
            method: method.into(),
            params,
        }
    }

    #[must_use]
    pub fn notification(method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id: None,
            method: method.into(),
            params,
        }
    }

    #[must_use]
    pub const fn is_notification(&self) -> bool {
        self.id.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: String,
    pub id: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

impl JsonRpcResponse {
    #[must_use]
    pub fn success(id: Option<Value>, result: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            result: Some(result),
            error: None,
        }
    }

    #[must_use]
    pub fn failure(id: Option<Value>, error: JsonRpcError) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            result: None,
            error: Some(error),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcError {
    pub code: i32,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl JsonRpcError {
    #[must_use]
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }

    #[must_use]
    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }
}

impl From<&SessionError> for JsonRpcError {
    fn from(err: &SessionError) -> Self {
        let message = err.to_string();
        match err {
            SessionError::MissingProtocolVersion => Self::new(INVALID_PARAMS, message),
            SessionError::UnsupportedProtocolVersion {
                requested,
                supported,
            } => Self::new(INVALID_PARAMS, message)
                .with_data(json!({ "requested": requested, "supported": supported })),
            SessionError::SessionAlreadyInitializedOrClosed { state, .. } => {
                Self::new(SESSION_STATE_CONFLICT, message).with_data(json!({ "state": state }))
            }
            SessionError::SessionNotFound(_) => Self::new(SESSION_NOT_FOUND, message),
            SessionError::SessionNotReady { state, .. } => {
                Self::new(SESSION_NOT_READY, message).with_data(json!({ "state": state }))
            }
            SessionError::RoutingTargetUnresolved { target, .. } => {
                Self::new(ROUTING_FAILED, message).with_data(json!({ "target": target }))
            }
        }
    }
}

impl From<&BackendError> for JsonRpcError {
    fn from(err: &BackendError) -> Self {
        let code = match err {
            BackendError::MethodNotFound(_) => METHOD_NOT_FOUND,
            BackendError::InvalidParams(_) => INVALID_PARAMS,
            BackendError::Internal(_) => INTERNAL_ERROR,
        };
        Self::new(code, err.to_string())
    }
}
