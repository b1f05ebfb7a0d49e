//! Core building blocks for the MCP relay session layer.
//!
//! This crate is free of I/O and provides:
//! - `InitializeParams` / `InitializeResult` - handshake payloads
//! - `VersionNegotiator` - pure protocol version agreement
//! - `CapabilityCatalog` - static server capability description
//! - `RelayConfig` - injected configuration
//! - `Router` / `Backend` traits and `RequestContext`

pub mod capabilities;
pub mod config;
pub mod context;
pub mod error;
pub mod negotiation;
pub mod protocol;
pub mod traits;

pub use capabilities::CapabilityCatalog;
pub use config::{CapabilityConfig, ConfigError, RelayConfig};
pub use context::RequestContext;
pub use error::SessionError;
pub use negotiation::{NegotiationError, VersionNegotiator};
pub use protocol::{ClientObject, InitializeParams, InitializeResult, ServerCapabilities, ServerInfo};
pub use traits::{Backend, BackendError, Router, RoutingError, SessionId, SessionState};
