//! Per-connection request dispatch.
//!
//! One [`Connection`] owns one session for the lifetime of a client
//! connection. `initialize` drives the handshake; every other method is gated
//! on the session being initialized and then forwarded to the backend its
//! routing target resolves to.

use std::{collections::HashMap, sync::Arc};

use mcp_relay_core::{InitializeParams, Router, SessionError, SessionId, SessionState};
use mcp_relay_session::{CloseOutcome, SessionHandle, SessionRegistry, resolve_route};
use serde_json::{Value, json};

use crate::protocol::{
    INTERNAL_ERROR, INVALID_PARAMS, INVALID_REQUEST, JSONRPC_VERSION, JsonRpcError,
    JsonRpcRequest, JsonRpcResponse, PARSE_ERROR,
};

pub const METHOD_INITIALIZE: &str = "initialize";
pub const METHOD_INITIALIZED: &str = "notifications/initialized";
pub const METHOD_PING: &str = "ping";

/// Transport-side view of one client connection.
pub struct Connection {
    registry: Arc<SessionRegistry>,
    router: Arc<dyn Router>,
    session: Arc<SessionHandle>,
    /// Copied into every forwarded request's context.
    metadata: HashMap<String, Value>,
}

impl Connection {
    /// Accept a connection: registers a fresh session.
    #[must_use]
    pub fn open(
        registry: Arc<SessionRegistry>,
        router: Arc<dyn Router>,
        routing_target: Option<String>,
    ) -> Self {
        let session = registry.create_session(routing_target);
        Self {
            registry,
            router,
            session,
            metadata: HashMap::new(),
        }
    }

    /// Attach connection-scoped metadata (transport name, peer details) that
    /// backends see on every forwarded request.
    #[must_use]
    pub fn with_metadata(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    #[must_use]
    pub fn session_id(&self) -> SessionId {
        self.session.id()
    }

    #[must_use]
    pub fn state(&self) -> SessionState {
        self.session.state()
    }

    /// Handle one raw text frame.
    pub async fn handle_text(&self, text: &str) -> Option<JsonRpcResponse> {
        let value: Value = match serde_json::from_str(text) {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!(session_id = %self.session_id(), "Unparseable frame: {e}");
                return Some(JsonRpcResponse::failure(
                    None,
                    JsonRpcError::new(PARSE_ERROR, format!("Parse error: {e}")),
                ));
            }
        };

        let id = value.get("id").cloned();
        match serde_json::from_value::<JsonRpcRequest>(value) {
            Ok(request) => self.handle(request).await,
            Err(e) => Some(JsonRpcResponse::failure(
                id,
                JsonRpcError::new(INVALID_REQUEST, format!("Invalid request: {e}")),
            )),
        }
    }

    /// Handle one request. Notifications never produce a response.
    pub async fn handle(&self, request: JsonRpcRequest) -> Option<JsonRpcResponse> {
        tracing::debug!(session_id = %self.session_id(), method = %request.method, "Handling request");

        let JsonRpcRequest {
            jsonrpc,
            id,
            method,
            params,
        } = request;

        let outcome = if jsonrpc == JSONRPC_VERSION {
            match method.as_str() {
                METHOD_INITIALIZE => self.initialize(params),
                METHOD_INITIALIZED => {
                    tracing::debug!(session_id = %self.session_id(), "Client confirmed initialization");
                    Ok(Value::Null)
                }
                METHOD_PING => self.ping(),
                _ => self.forward(&method, params).await,
            }
        } else {
            Err(JsonRpcError::new(
                INVALID_REQUEST,
                format!("Unsupported jsonrpc version: {jsonrpc}"),
            ))
        };

        id.map(|id| match outcome {
            Ok(result) => JsonRpcResponse::success(Some(id), result),
            Err(error) => JsonRpcResponse::failure(Some(id), error),
        })
    }

    /// Connection teardown. Safe to call more than once.
    pub fn close(&self) -> CloseOutcome {
        self.registry.close_session(self.session_id())
    }

    fn initialize(&self, params: Option<Value>) -> Result<Value, JsonRpcError> {
        let params: InitializeParams = match params {
            Some(params) => serde_json::from_value(params).map_err(|e| {
                JsonRpcError::new(INVALID_PARAMS, format!("Invalid initialize params: {e}"))
            })?,
            None => InitializeParams::default(),
        };

        let result = self
            .registry
            .initialize(self.session_id(), params)
            .map_err(|e| JsonRpcError::from(&e))?;

        serde_json::to_value(result).map_err(|e| {
            JsonRpcError::new(INTERNAL_ERROR, format!("Failed to serialize response: {e}"))
        })
    }

    fn ping(&self) -> Result<Value, JsonRpcError> {
        match self.state() {
            SessionState::Closed => Err(JsonRpcError::from(&SessionError::SessionNotReady {
                id: self.session_id(),
                state: SessionState::Closed,
            })),
            _ => Ok(json!({})),
        }
    }

    async fn forward(&self, method: &str, params: Option<Value>) -> Result<Value, JsonRpcError> {
        let mut route = resolve_route(&self.registry, &*self.router, self.session_id())
            .await
            .map_err(|e| {
                tracing::warn!(session_id = %self.session_id(), %method, error = %e, "Request rejected");
                JsonRpcError::from(&e)
            })?;
        for (key, value) in &self.metadata {
            route.context.set_metadata(key.clone(), value.clone());
        }

        route
            .backend
            .dispatch(&route.context, method, params)
            .await
            .map_err(|e| {
                tracing::warn!(session_id = %self.session_id(), %method, error = %e, "Backend error");
                JsonRpcError::from(&e)
            })
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        if self.close() == CloseOutcome::Closed {
            tracing::debug!(session_id = %self.session_id(), "Session closed on connection drop");
        }
    }
}
