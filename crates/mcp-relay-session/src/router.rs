//! Routing of session traffic to backend targets.

use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use mcp_relay_core::{Backend, RequestContext, Router, RoutingError, SessionError, SessionId};
use parking_lot::RwLock;

use crate::SessionRegistry;

enum TargetSlot {
    Live(Arc<dyn Backend>),
    /// Deregistered; kept so lookups report it as gone rather than unknown.
    Dead,
}

/// In-memory routing table.
///
/// Useful for single-process deployments and tests. A process-supervising
/// router can implement [`Router`] directly instead.
#[derive(Default)]
pub struct StaticRouter {
    targets: RwLock<HashMap<String, TargetSlot>>,
    default: RwLock<Option<Arc<dyn Backend>>>,
}

impl StaticRouter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Router whose only backend serves sessions without a routing target.
    #[must_use]
    pub fn with_default(backend: Arc<dyn Backend>) -> Self {
        let router = Self::new();
        router.set_default(backend);
        router
    }

    pub fn set_default(&self, backend: Arc<dyn Backend>) {
        *self.default.write() = Some(backend);
    }

    /// Register (or revive) `target`.
    pub fn register(&self, target: impl Into<String>, backend: Arc<dyn Backend>) {
        let target = target.into();
        tracing::info!(%target, "Routing target registered");
        self.targets.write().insert(target, TargetSlot::Live(backend));
    }

    /// Mark `target` dead. Returns false if it was not live.
    pub fn deregister(&self, target: &str) -> bool {
        let mut targets = self.targets.write();
        match targets.get_mut(target) {
            Some(slot) if matches!(slot, TargetSlot::Live(_)) => {
                *slot = TargetSlot::Dead;
                tracing::info!(%target, "Routing target deregistered");
                true
            }
            _ => false,
        }
    }

    /// Live target names, sorted.
    #[must_use]
    pub fn targets(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .targets
            .read()
            .iter()
            .filter(|(_, slot)| matches!(slot, TargetSlot::Live(_)))
            .map(|(name, _)| name.clone())
            .collect();
        names.sort();
        names
    }
}

#[async_trait]
impl Router for StaticRouter {
    async fn resolve(&self, target: Option<&str>) -> Result<Arc<dyn Backend>, RoutingError> {
        let Some(target) = target else {
            return self
                .default
                .read()
                .clone()
                .ok_or(RoutingError::NoDefaultTarget);
        };

        match self.targets.read().get(target) {
            Some(TargetSlot::Live(backend)) => Ok(Arc::clone(backend)),
            Some(TargetSlot::Dead) => Err(RoutingError::TargetUnavailable(target.to_owned())),
            None => Err(RoutingError::UnknownTarget(target.to_owned())),
        }
    }
}

/// A request admitted for forwarding: who sent it and where it goes.
pub struct Route {
    pub context: RequestContext,
    pub backend: Arc<dyn Backend>,
}

/// Admit one post-initialize request from session `id`.
///
/// Checks the session is initialized, records activity, then resolves the
/// session's routing target.
///
/// # Errors
/// `SessionNotFound`, `SessionNotReady`, or `RoutingTargetUnresolved`.
pub async fn resolve_route(
    registry: &SessionRegistry,
    router: &dyn Router,
    id: SessionId,
) -> Result<Route, SessionError> {
    let context = registry.get(id)?.begin_request()?;
    let target = context.routing_target.as_deref();

    match router.resolve(target).await {
        Ok(backend) => {
            tracing::debug!(session_id = %id, routing_target = ?target, "Request routed");
            Ok(Route { context, backend })
        }
        Err(e) => {
            tracing::warn!(session_id = %id, routing_target = ?target, error = %e, "Routing failed");
            Err(SessionError::unresolved(target, &e))
        }
    }
}
