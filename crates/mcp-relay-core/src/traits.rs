//! Core types and traits for sessions and backend routing.

use std::{fmt, sync::Arc};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use uuid::Uuid;

use crate::RequestContext;

/// Session identifier.
pub type SessionId = Uuid;

/// Protocol lifecycle state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// Created, waiting for `initialize`.
    Uninitialized,
    /// Held only for the duration of an `initialize` call.
    Initializing,
    /// Handshake complete; requests are accepted.
    Initialized,
    /// Terminal.
    Closed,
}

impl SessionState {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Uninitialized => "uninitialized",
            Self::Initializing => "initializing",
            Self::Initialized => "initialized",
            Self::Closed => "closed",
        }
    }

    #[must_use]
    pub const fn is_closed(self) -> bool {
        matches!(self, Self::Closed)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Routing error.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RoutingError {
    #[error("Unknown routing target: {0}")]
    UnknownTarget(String),
    #[error("Routing target unavailable: {0}")]
    TargetUnavailable(String),
    #[error("No default backend configured")]
    NoDefaultTarget,
}

/// Error returned by a backend while handling a forwarded request.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BackendError {
    #[error("Method not supported by backend: {0}")]
    MethodNotFound(String),
    #[error("Invalid params: {0}")]
    InvalidParams(String),
    #[error("Backend failure: {0}")]
    Internal(String),
}

/// A backend execution target that forwarded protocol traffic is dispatched to.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Handle one request on behalf of a session.
    async fn dispatch(
        &self,
        ctx: &RequestContext,
        method: &str,
        params: Option<Value>,
    ) -> Result<Value, BackendError>;
}

/// Resolves a session's routing target to a live backend.
///
/// Sessions only hold the target key; backend lifecycle belongs to the router.
#[async_trait]
pub trait Router: Send + Sync {
    /// Resolve `target` (`None` in non-proxying deployments).
    ///
    /// Failure must be reported, never papered over with a default backend.
    async fn resolve(&self, target: Option<&str>) -> Result<Arc<dyn Backend>, RoutingError>;
}

#[async_trait]
impl<R: Router + ?Sized> Router for Arc<R> {
    async fn resolve(&self, target: Option<&str>) -> Result<Arc<dyn Backend>, RoutingError> {
        (**self).resolve(target).await
    }
}
