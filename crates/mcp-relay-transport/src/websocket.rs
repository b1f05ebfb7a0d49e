//! WebSocket transport and diagnostics endpoints.

use std::sync::Arc;

use axum::{
    Json,
    extract::{
        Path, Query, State, WebSocketUpgrade,
        ws::{Message, WebSocket},
    },
    http::{HeaderMap, StatusCode, header::USER_AGENT},
    response::IntoResponse,
};
use futures::{SinkExt, StreamExt};
use mcp_relay_core::Router;
use mcp_relay_session::{SessionInfo, SessionRegistry};
use serde::Deserialize;
use serde_json::{Value, json};
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::{connection::Connection, protocol::JsonRpcResponse};

/// Shared handler state.
#[derive(Clone)]
pub struct RelayState {
    pub registry: Arc<SessionRegistry>,
    pub router: Arc<dyn Router>,
}

impl RelayState {
    #[must_use]
    pub fn new(registry: Arc<SessionRegistry>, router: Arc<dyn Router>) -> Self {
        Self { registry, router }
    }
}

/// Query parameters accepted on `/ws`.
#[derive(Debug, Default, Deserialize)]
pub struct ConnectParams {
    /// Backend target this connection's session routes to.
    pub target: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ListParams {
    /// Only list sessions that are not closed.
    #[serde(default)]
    pub active: bool,
}

/// WebSocket upgrade handler.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(params): Query<ConnectParams>,
    State(state): State<RelayState>,
    headers: HeaderMap,
) -> impl IntoResponse {
    let user_agent = headers
        .get(USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    ws.on_upgrade(move |socket| handle_socket(socket, state, params.target, user_agent))
}

async fn handle_socket(
    socket: WebSocket,
    state: RelayState,
    target: Option<String>,
    user_agent: Option<String>,
) {
    let (mut sender, mut receiver) = socket.split();
    let mut conn = Connection::open(state.registry, state.router, target)
        .with_metadata("transport", json!("websocket"));
    if let Some(user_agent) = user_agent {
        conn = conn.with_metadata("userAgent", Value::String(user_agent));
    }
    let session_id = conn.session_id();
    tracing::info!(%session_id, "WebSocket connected");

    // Channel for sending responses to the client
    let (tx, mut rx) = mpsc::unbounded_channel::<JsonRpcResponse>();

    let send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            let json = match serde_json::to_string(&msg) {
                Ok(j) => j,
                Err(e) => {
                    tracing::error!("Failed to serialize response: {e}");
                    continue;
                }
            };
            if sender.send(Message::Text(json.into())).await.is_err() {
                break;
            }
        }
    });

    while let Some(msg) = receiver.next().await {
        let response = match msg {
            Ok(Message::Text(text)) => conn.handle_text(text.as_str()).await,
            Ok(Message::Binary(data)) => match std::str::from_utf8(&data) {
                Ok(text) => conn.handle_text(text).await,
                Err(_) => {
                    tracing::debug!(%session_id, "Dropped non-UTF-8 binary frame");
                    continue;
                }
            },
            Ok(Message::Close(_)) => break,
            Ok(_) => continue,
            Err(e) => {
                tracing::error!(%session_id, "WebSocket error: {e}");
                break;
            }
        };

        if let Some(response) = response {
            if tx.send(response).is_err() {
                break;
            }
        }
    }

    send_task.abort();
    conn.close();
    tracing::info!(%session_id, "WebSocket disconnected");
}

/// List retained sessions.
pub async fn list_sessions(
    State(state): State<RelayState>,
    Query(params): Query<ListParams>,
) -> Json<Vec<SessionInfo>> {
    if params.active {
        Json(state.registry.active_sessions())
    } else {
        Json(state.registry.all_sessions())
    }
}

/// Snapshot of one session.
pub async fn get_session(
    State(state): State<RelayState>,
    Path(id): Path<Uuid>,
) -> Result<Json<SessionInfo>, (StatusCode, String)> {
    state
        .registry
        .get(id)
        .map(|handle| Json(handle.info()))
        .map_err(|e| (StatusCode::NOT_FOUND, e.to_string()))
}

/// Relay routes: `/ws`, `/sessions`, `/sessions/{id}`.
///
/// # Example
/// ```ignore
/// let app = create_relay_router(RelayState::new(registry, router));
/// ```
#[must_use]
pub fn create_relay_router(state: RelayState) -> axum::Router {
    axum::Router::new()
        .route("/ws", axum::routing::get(ws_handler))
        .route("/sessions", axum::routing::get(list_sessions))
        .route("/sessions/{id}", axum::routing::get(get_session))
        .with_state(state)
}
