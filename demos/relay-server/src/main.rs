//! Example relay server with an in-process echo backend.
//!
//! Run with: cargo run -p relay-server-demo
//!
//! Then connect an MCP client over WebSocket to ws://localhost:3000/ws
//! (append `?target=echo` to route through the named target) and inspect
//! sessions at http://localhost:3000/sessions.

use std::{net::SocketAddr, sync::Arc};

use anyhow::Context;
use async_trait::async_trait;
use mcp_relay_core::{Backend, BackendError, RelayConfig, RequestContext};
use mcp_relay_session::{SessionRegistry, StaticRouter};
use mcp_relay_transport::{RelayState, create_relay_router};
use serde_json::{Value, json};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Environment variable naming a JSON config file.
const CONFIG_ENV: &str = "MCP_RELAY_CONFIG";

/// Answers every request with what it received.
struct EchoBackend {
    name: &'static str,
}

#[async_trait]
impl Backend for EchoBackend {
    async fn dispatch(
        &self,
        ctx: &RequestContext,
        method: &str,
        params: Option<Value>,
    ) -> Result<Value, BackendError> {
        Ok(json!({
            "backend": self.name,
            "method": method,
            "params": params,
            "sessionId": ctx.session_id,
            "protocolVersion": ctx.protocol_version,
            "client": ctx.client_name(),
        }))
    }
}

fn load_config() -> anyhow::Result<RelayConfig> {
    match std::env::var_os(CONFIG_ENV) {
        Some(path) => RelayConfig::load(&path)
            .with_context(|| format!("loading {}", path.to_string_lossy())),
        None => Ok(RelayConfig::default()),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let config = load_config()?;
    let registry = Arc::new(SessionRegistry::from_config(&config)?);

    let router = Arc::new(StaticRouter::with_default(Arc::new(EchoBackend {
        name: "local",
    })));
    if config.capabilities.multi_target {
        router.register("echo", Arc::new(EchoBackend { name: "echo" }));
    }

    let _sweeper = Arc::clone(&registry).spawn_retention_sweeper(config.sweep_interval());

    let app = create_relay_router(RelayState::new(registry, router))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let addr: SocketAddr = config
        .bind_addr
        .parse()
        .with_context(|| format!("invalid bindAddr {}", config.bind_addr))?;
    tracing::info!(
        supported_versions = ?config.supported_versions,
        "Relay listening on ws://{addr}/ws"
    );

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
