//! Session lifecycle and routing for MCP relay connections.
//!
//! Provides:
//! - `Session` / `SessionHandle` - per-connection protocol state machine
//! - `SessionRegistry` - concurrent creation, lookup, close and retention
//! - `SessionEvent` - lifecycle broadcast
//! - `StaticRouter` and `resolve_route` - routing glue for forwarded requests

pub mod events;
pub mod profile;
pub mod registry;
pub mod router;
pub mod session;

pub use events::{EventBus, SessionEvent};
pub use profile::ServerProfile;
pub use registry::SessionRegistry;
pub use router::{Route, StaticRouter, resolve_route};
pub use session::{CloseOutcome, Session, SessionHandle, SessionInfo};
