//! Per-connection protocol lifecycle.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use mcp_relay_core::{
    ClientObject, InitializeParams, InitializeResult, RequestContext, ServerCapabilities,
    SessionError, SessionId, SessionState,
};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{ServerProfile, SessionEvent, events::EventBus};

/// Outcome of a close request. Neither variant is a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CloseOutcome {
    /// This call closed the session.
    Closed,
    /// The session was already closed.
    AlreadyClosed,
    /// No such session is registered.
    Absent,
}

/// Data fixed by a successful handshake.
#[derive(Debug, Clone)]
struct Handshake {
    protocol_version: String,
    client_info: ClientObject,
    client_capabilities: ClientObject,
    initialized_at: DateTime<Utc>,
}

/// Lifecycle with its timestamps attached, so `closed_at` without `Closed`
/// or a version without a handshake cannot be expressed.
#[derive(Debug, Clone)]
enum Lifecycle {
    Uninitialized,
    Initializing,
    Initialized(Handshake),
    Closed {
        handshake: Option<Handshake>,
        closed_at: DateTime<Utc>,
    },
}

impl Lifecycle {
    const fn state(&self) -> SessionState {
        match self {
            Self::Uninitialized => SessionState::Uninitialized,
            Self::Initializing => SessionState::Initializing,
            Self::Initialized(_) => SessionState::Initialized,
            Self::Closed { .. } => SessionState::Closed,
        }
    }

    const fn handshake(&self) -> Option<&Handshake> {
        match self {
            Self::Initialized(h) | Self::Closed { handshake: Some(h), .. } => Some(h),
            _ => None,
        }
    }
}

/// Server-side record of one client connection.
#[derive(Debug)]
pub struct Session {
    id: SessionId,
    lifecycle: Lifecycle,
    profile: Arc<ServerProfile>,
    server_capabilities: ServerCapabilities,
    routing_target: Option<String>,
    created_at: DateTime<Utc>,
    last_activity: DateTime<Utc>,
}

impl Session {
    /// Create an uninitialized session with a fresh id.
    #[must_use]
    pub fn new(profile: Arc<ServerProfile>, routing_target: Option<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            lifecycle: Lifecycle::Uninitialized,
            server_capabilities: profile.catalog().snapshot(),
            profile,
            routing_target,
            created_at: now,
            last_activity: now,
        }
    }

    #[must_use]
    pub const fn id(&self) -> SessionId {
        self.id
    }

    #[must_use]
    pub const fn state(&self) -> SessionState {
        self.lifecycle.state()
    }

    /// Negotiated version; empty until a handshake succeeds.
    #[must_use]
    pub fn protocol_version(&self) -> &str {
        self.lifecycle
            .handshake()
            .map_or("", |h| h.protocol_version.as_str())
    }

    #[must_use]
    pub fn routing_target(&self) -> Option<&str> {
        self.routing_target.as_deref()
    }

    #[must_use]
    pub const fn server_capabilities(&self) -> &ServerCapabilities {
        &self.server_capabilities
    }

    #[must_use]
    pub const fn last_activity(&self) -> DateTime<Utc> {
        self.last_activity
    }

    #[must_use]
    pub const fn closed_at(&self) -> Option<DateTime<Utc>> {
        match self.lifecycle {
            Lifecycle::Closed { closed_at, .. } => Some(closed_at),
            _ => None,
        }
    }

    /// Run the initialize handshake.
    ///
    /// Only legal from `Uninitialized`. Validation and negotiation failures
    /// restore `Uninitialized` before returning, so the client may retry.
    ///
    /// # Errors
    /// `SessionAlreadyInitializedOrClosed` outside `Uninitialized` (nothing is
    /// mutated), `MissingProtocolVersion`, or `UnsupportedProtocolVersion`.
    pub fn initialize(&mut self, params: InitializeParams) -> Result<InitializeResult, SessionError> {
        if !matches!(self.lifecycle, Lifecycle::Uninitialized) {
            let state = self.state();
            tracing::warn!(session_id = %self.id, %state, "Rejected initialize");
            return Err(SessionError::SessionAlreadyInitializedOrClosed { id: self.id, state });
        }

        self.lifecycle = Lifecycle::Initializing;

        let negotiated = params
            .requested_version()
            .ok_or(SessionError::MissingProtocolVersion)
            .and_then(|requested| {
                self.profile
                    .negotiator()
                    .negotiate(requested)
                    .map_err(SessionError::from)
            });

        let protocol_version = match negotiated {
            Ok(v) => v,
            Err(e) => {
                self.lifecycle = Lifecycle::Uninitialized;
                tracing::warn!(session_id = %self.id, error = %e, "Initialize failed, session rolled back");
                return Err(e);
            }
        };

        let InitializeParams {
            capabilities,
            client_info,
            ..
        } = params;

        self.lifecycle = Lifecycle::Initialized(Handshake {
            protocol_version: protocol_version.clone(),
            client_info: client_info.unwrap_or_default(),
            client_capabilities: capabilities.unwrap_or_default(),
            initialized_at: not_before(self.created_at),
        });

        tracing::info!(
            session_id = %self.id,
            protocol_version = %protocol_version,
            routing_target = ?self.routing_target,
            "Session initialized"
        );

        Ok(InitializeResult {
            protocol_version,
            capabilities: self.server_capabilities.clone(),
            server_info: self.profile.server_info().clone(),
        })
    }

    /// Close the session. Irreversible; repeated calls report `AlreadyClosed`.
    pub fn close(&mut self) -> CloseOutcome {
        if self.state().is_closed() {
            return CloseOutcome::AlreadyClosed;
        }

        let handshake = match std::mem::replace(&mut self.lifecycle, Lifecycle::Uninitialized) {
            Lifecycle::Initialized(h) => Some(h),
            _ => None,
        };
        let floor = handshake
            .as_ref()
            .map_or(self.created_at, |h| h.initialized_at);
        self.lifecycle = Lifecycle::Closed {
            handshake,
            closed_at: not_before(floor),
        };

        tracing::info!(session_id = %self.id, "Session closed");
        CloseOutcome::Closed
    }

    /// Record activity. Never moves `last_activity` backwards.
    pub fn touch(&mut self) {
        self.last_activity = not_before(self.last_activity);
        tracing::debug!(session_id = %self.id, "Session touched");
    }

    /// Context for forwarding a request to a backend.
    ///
    /// # Errors
    /// `SessionNotReady` unless the session is initialized.
    pub fn request_context(&self) -> Result<RequestContext, SessionError> {
        match &self.lifecycle {
            Lifecycle::Initialized(h) => Ok(RequestContext::new(self.id, &h.protocol_version)
                .with_routing_target(self.routing_target.clone())
                .with_client_info(h.client_info.clone())),
            other => Err(SessionError::SessionNotReady {
                id: self.id,
                state: other.state(),
            }),
        }
    }

    /// Read-only snapshot of every field.
    #[must_use]
    pub fn info(&self) -> SessionInfo {
        let handshake = self.lifecycle.handshake();
        let closed_at = self.closed_at();
        let uptime_ms = handshake.map(|h| {
            let end = closed_at.unwrap_or_else(Utc::now);
            u64::try_from((end - h.initialized_at).num_milliseconds()).unwrap_or(0)
        });

        SessionInfo {
            id: self.id,
            state: self.state(),
            protocol_version: self.protocol_version().to_string(),
            client_info: handshake.map(|h| h.client_info.clone()).unwrap_or_default(),
            client_capabilities: handshake
                .map(|h| h.client_capabilities.clone())
                .unwrap_or_default(),
            server_capabilities: self.server_capabilities.clone(),
            routing_target: self.routing_target.clone(),
            created_at: self.created_at,
            initialized_at: handshake.map(|h| h.initialized_at),
            closed_at,
            last_activity: self.last_activity,
            uptime_ms,
        }
    }
}

/// `Utc::now()`, clamped so timestamps never precede `floor`.
fn not_before(floor: DateTime<Utc>) -> DateTime<Utc> {
    Utc::now().max(floor)
}

/// Snapshot returned by [`Session::info`], suitable for a status surface.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionInfo {
    pub id: SessionId,
    pub state: SessionState,
    pub protocol_version: String,
    pub client_info: ClientObject,
    pub client_capabilities: ClientObject,
    pub server_capabilities: ServerCapabilities,
    pub routing_target: Option<String>,
    pub created_at: DateTime<Utc>,
    pub initialized_at: Option<DateTime<Utc>>,
    pub closed_at: Option<DateTime<Utc>>,
    pub last_activity: DateTime<Utc>,
    /// Time since `initialized_at`, up to `closed_at` or now.
    pub uptime_ms: Option<u64>,
}

/// Shared, serialized access to one [`Session`].
///
/// Every operation takes the session's lock for its whole duration, so two
/// callers can never interleave transitions on the same session. The lock is
/// never held across an await.
#[derive(Debug)]
pub struct SessionHandle {
    id: SessionId,
    inner: Mutex<Session>,
}

impl SessionHandle {
    #[must_use]
    pub fn new(session: Session) -> Self {
        Self {
            id: session.id(),
            inner: Mutex::new(session),
        }
    }

    #[must_use]
    pub const fn id(&self) -> SessionId {
        self.id
    }

    #[must_use]
    pub fn state(&self) -> SessionState {
        self.inner.lock().state()
    }

    #[must_use]
    pub fn routing_target(&self) -> Option<String> {
        self.inner.lock().routing_target.clone()
    }

    #[must_use]
    pub fn last_activity(&self) -> DateTime<Utc> {
        self.inner.lock().last_activity()
    }

    /// See [`Session::initialize`]. `Initialized` is published before the
    /// session lock is released, so it always precedes this session's `Closed`.
    pub(crate) fn initialize(
        &self,
        params: InitializeParams,
        events: &EventBus,
    ) -> Result<InitializeResult, SessionError> {
        let mut session = self.inner.lock();
        let result = session.initialize(params)?;
        events.publish(SessionEvent::Initialized {
            session_id: self.id,
            protocol_version: result.protocol_version.clone(),
        });
        Ok(result)
    }

    pub fn touch(&self) {
        self.inner.lock().touch();
    }

    /// Touch and build a [`RequestContext`] atomically.
    ///
    /// # Errors
    /// `SessionNotReady` unless the session is initialized; nothing is touched
    /// in that case.
    pub fn begin_request(&self) -> Result<RequestContext, SessionError> {
        let mut session = self.inner.lock();
        let ctx = session.request_context()?;
        session.touch();
        Ok(ctx)
    }

    #[must_use]
    pub fn info(&self) -> SessionInfo {
        self.inner.lock().info()
    }

    /// Only the registry closes shared sessions.
    pub(crate) fn close(&self, events: &EventBus) -> CloseOutcome {
        let mut session = self.inner.lock();
        let outcome = session.close();
        if outcome == CloseOutcome::Closed {
            events.publish(SessionEvent::Closed {
                session_id: self.id,
            });
        }
        outcome
    }

    pub(crate) fn closed_at(&self) -> Option<DateTime<Utc>> {
        self.inner.lock().closed_at()
    }
}

#[cfg(test)]
mod tests {
    use mcp_relay_core::RelayConfig;
    use serde_json::json;

    use super::*;

    fn profile() -> Arc<ServerProfile> {
        Arc::new(ServerProfile::from_config(&RelayConfig::default()).unwrap())
    }

    fn client_info(name: &str) -> ClientObject {
        json!({ "name": name, "version": "1.0" })
            .as_object()
            .cloned()
            .unwrap()
    }

    #[test]
    fn test_new_session_is_uninitialized() {
        let session = Session::new(profile(), None);
        assert_eq!(session.state(), SessionState::Uninitialized);
        assert_eq!(session.protocol_version(), "");
        assert_eq!(session.created_at, session.last_activity);
        let info = session.info();
        assert!(info.initialized_at.is_none());
        assert!(info.uptime_ms.is_none());
    }

    #[test]
    fn test_initialize_success() {
        let mut session = Session::new(profile(), Some("repl-1".into()));
        let result = session
            .initialize(InitializeParams::new("2025-06-18").with_client_info(client_info("x")))
            .unwrap();

        assert_eq!(result.protocol_version, "2025-06-18");
        assert_eq!(result.server_info.name, "mcp-relay");
        assert!(result.capabilities.tools.list_changed);
        assert_eq!(session.state(), SessionState::Initialized);

        let info = session.info();
        assert_eq!(info.protocol_version, "2025-06-18");
        assert_eq!(info.client_info["name"], "x");
        assert!(info.client_capabilities.is_empty());
        assert_eq!(info.routing_target.as_deref(), Some("repl-1"));
        assert!(info.initialized_at.unwrap() >= info.created_at);
        assert!(info.uptime_ms.is_some());
    }

    #[test]
    fn test_initialize_twice_leaves_first_handshake() {
        let mut session = Session::new(profile(), None);
        session
            .initialize(InitializeParams::new("2024-11-05").with_client_info(client_info("first")))
            .unwrap();
        let before = session.info();

        let err = session
            .initialize(InitializeParams::new("2025-06-18").with_client_info(client_info("second")))
            .unwrap_err();

        assert_eq!(
            err,
            SessionError::SessionAlreadyInitializedOrClosed {
                id: session.id(),
                state: SessionState::Initialized,
            }
        );
        let after = session.info();
        assert_eq!(after.protocol_version, "2024-11-05");
        assert_eq!(after.client_info, before.client_info);
        assert_eq!(after.initialized_at, before.initialized_at);
    }

    #[test]
    fn test_missing_version_rolls_back() {
        let mut session = Session::new(profile(), None);
        let err = session.initialize(InitializeParams::default()).unwrap_err();
        assert_eq!(err, SessionError::MissingProtocolVersion);
        assert_eq!(session.state(), SessionState::Uninitialized);

        session.initialize(InitializeParams::new("2025-06-18")).unwrap();
        assert_eq!(session.state(), SessionState::Initialized);
    }

    #[test]
    fn test_unsupported_version_rolls_back() {
        let mut session = Session::new(profile(), None);
        let err = session
            .initialize(InitializeParams::new("1999-01-01"))
            .unwrap_err();
        match err {
            SessionError::UnsupportedProtocolVersion { requested, supported } => {
                assert_eq!(requested, "1999-01-01");
                assert_eq!(supported, vec!["2024-11-05", "2025-03-26", "2025-06-18"]);
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(session.state(), SessionState::Uninitialized);
        assert_eq!(session.protocol_version(), "");
        assert!(session.info().client_info.is_empty());
    }

    #[test]
    fn test_future_version_negotiates_down() {
        let mut session = Session::new(profile(), None);
        let result = session.initialize(InitializeParams::new("2030-01-01")).unwrap();
        assert_eq!(result.protocol_version, "2025-06-18");
        assert_eq!(session.protocol_version(), "2025-06-18");
    }

    #[test]
    fn test_close_is_idempotent_and_terminal() {
        let mut session = Session::new(profile(), None);
        session.initialize(InitializeParams::new("2025-06-18")).unwrap();

        assert_eq!(session.close(), CloseOutcome::Closed);
        let closed_at = session.closed_at().unwrap();
        assert_eq!(session.close(), CloseOutcome::AlreadyClosed);
        assert_eq!(session.closed_at(), Some(closed_at));
        assert_eq!(session.state(), SessionState::Closed);

        // Version survives close; nothing leaves Closed.
        assert_eq!(session.protocol_version(), "2025-06-18");
        let err = session
            .initialize(InitializeParams::new("2025-06-18"))
            .unwrap_err();
        assert!(matches!(
            err,
            SessionError::SessionAlreadyInitializedOrClosed {
                state: SessionState::Closed,
                ..
            }
        ));
        assert_eq!(session.state(), SessionState::Closed);
    }

    #[test]
    fn test_close_before_initialize() {
        let mut session = Session::new(profile(), None);
        assert_eq!(session.close(), CloseOutcome::Closed);
        let info = session.info();
        assert_eq!(info.state, SessionState::Closed);
        assert_eq!(info.protocol_version, "");
        assert!(info.initialized_at.is_none());
        assert!(info.uptime_ms.is_none());
        assert!(info.closed_at.unwrap() >= info.created_at);
    }

    #[test]
    fn test_touch_is_monotonic() {
        let mut session = Session::new(profile(), None);
        let mut previous = session.last_activity();
        for _ in 0..100 {
            session.touch();
            assert!(session.last_activity() >= previous);
            previous = session.last_activity();
        }
        assert_eq!(session.state(), SessionState::Uninitialized);
    }

    #[test]
    fn test_uptime_frozen_after_close() {
        let mut session = Session::new(profile(), None);
        session.initialize(InitializeParams::new("2025-06-18")).unwrap();
        session.close();
        let first = session.info().uptime_ms;
        std::thread::sleep(std::time::Duration::from_millis(5));
        assert_eq!(session.info().uptime_ms, first);
    }

    #[test]
    fn test_request_context_requires_initialized() {
        let mut session = Session::new(profile(), Some("t".into()));
        let err = session.request_context().unwrap_err();
        assert!(matches!(
            err,
            SessionError::SessionNotReady {
                state: SessionState::Uninitialized,
                ..
            }
        ));

        session
            .initialize(InitializeParams::new("2025-06-18").with_client_info(client_info("cli")))
            .unwrap();
        let ctx = session.request_context().unwrap();
        assert_eq!(ctx.session_id, session.id());
        assert_eq!(ctx.protocol_version, "2025-06-18");
        assert_eq!(ctx.routing_target.as_deref(), Some("t"));
        assert_eq!(ctx.client_name(), Some("cli"));
    }

    #[test]
    fn test_capabilities_snapshot_at_creation() {
        let session = Session::new(profile(), None);
        assert_eq!(
            session.server_capabilities(),
            &profile().catalog().snapshot()
        );
    }

    #[test]
    fn test_handle_serializes_initialize() {
        let handle = Arc::new(SessionHandle::new(Session::new(profile(), None)));
        let events = Arc::new(EventBus::new());
        let mut rx = events.subscribe();
        let threads: Vec<_> = (0..8)
            .map(|_| {
                let handle = Arc::clone(&handle);
                let events = Arc::clone(&events);
                std::thread::spawn(move || {
                    handle.initialize(InitializeParams::new("2025-06-18"), &events)
                })
            })
            .collect();

        let wins = threads
            .into_iter()
            .map(|t| t.join().unwrap())
            .filter(Result::is_ok)
            .count();
        assert_eq!(wins, 1);
        assert_eq!(handle.state(), SessionState::Initialized);
        assert!(matches!(rx.try_recv(), Ok(SessionEvent::Initialized { .. })));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_handle_events_follow_transitions() {
        let handle = SessionHandle::new(Session::new(profile(), None));
        let events = EventBus::new();
        let mut rx = events.subscribe();

        handle
            .initialize(InitializeParams::new("1999-01-01"), &events)
            .unwrap_err();
        assert!(rx.try_recv().is_err());

        handle
            .initialize(InitializeParams::new("2025-06-18"), &events)
            .unwrap();
        assert_eq!(handle.close(&events), CloseOutcome::Closed);
        assert_eq!(handle.close(&events), CloseOutcome::AlreadyClosed);

        let id = handle.id();
        assert_eq!(
            rx.try_recv().unwrap(),
            SessionEvent::Initialized {
                session_id: id,
                protocol_version: "2025-06-18".into(),
            }
        );
        assert_eq!(rx.try_recv().unwrap(), SessionEvent::Closed { session_id: id });
        assert!(rx.try_recv().is_err());
    }
}
