//! Transport boundary for MCP relay sessions.
//!
//! Provides:
//! - Wire protocol (JSON-RPC 2.0) and error-code mapping
//! - `Connection` - per-connection handshake gating and forwarding
//! - WebSocket transport and session diagnostics (feature: websocket)

pub mod connection;
pub mod protocol;

#[cfg(feature = "websocket")]
pub mod websocket;

pub use connection::Connection;
pub use protocol::{JsonRpcError, JsonRpcRequest, JsonRpcResponse};

#[cfg(feature = "websocket")]
pub use websocket::{RelayState, create_relay_router};
