//! Process-wide registry of live sessions.

use std::{collections::HashMap, sync::Arc, time::Duration};

use chrono::{DateTime, TimeDelta, Utc};
use mcp_relay_core::{
    ConfigError, InitializeParams, InitializeResult, RelayConfig, SessionError, SessionId,
};
use parking_lot::RwLock;
use tokio::sync::broadcast;

use crate::{
    CloseOutcome, ServerProfile, Session, SessionEvent, SessionHandle, SessionInfo,
    events::EventBus,
};

/// Floor for the sweeper period; `tokio::time::interval` rejects zero.
const MIN_SWEEP_PERIOD: Duration = Duration::from_millis(1);

/// Concurrency-safe collection of sessions.
///
/// Insert, lookup and removal go through one lock, so a session returned by
/// [`create_session`](Self::create_session) is visible to every other caller
/// immediately. Per-session transitions are serialized by each
/// [`SessionHandle`]. The registry lock is always taken before a session lock,
/// never after.
pub struct SessionRegistry {
    profile: Arc<ServerProfile>,
    sessions: RwLock<HashMap<SessionId, Arc<SessionHandle>>>,
    events: EventBus,
    retention: TimeDelta,
}

impl SessionRegistry {
    /// Create a registry that keeps closed sessions for `retention`.
    #[must_use]
    pub fn new(profile: ServerProfile, retention: Duration) -> Self {
        Self {
            profile: Arc::new(profile),
            sessions: RwLock::new(HashMap::new()),
            events: EventBus::new(),
            retention: TimeDelta::from_std(retention).unwrap_or(TimeDelta::MAX),
        }
    }

    /// Build profile and retention from `config`.
    ///
    /// # Errors
    /// Returns error if the config is invalid.
    pub fn from_config(config: &RelayConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self::new(
            ServerProfile::from_config(config)?,
            config.closed_retention(),
        ))
    }

    #[must_use]
    pub fn profile(&self) -> &ServerProfile {
        &self.profile
    }

    /// Register a new uninitialized session.
    pub fn create_session(&self, routing_target: Option<String>) -> Arc<SessionHandle> {
        let session = Session::new(Arc::clone(&self.profile), routing_target.clone());
        let handle = Arc::new(SessionHandle::new(session));
        let session_id = handle.id();

        tracing::info!(%session_id, ?routing_target, "Session created");
        // Published before the session becomes reachable so `Created` leads.
        self.events.publish(SessionEvent::Created {
            session_id,
            routing_target,
        });
        self.sessions
            .write()
            .insert(session_id, Arc::clone(&handle));
        handle
    }

    /// Look up a session, closed ones included while retained.
    ///
    /// # Errors
    /// `SessionNotFound` if the id is unknown or already purged.
    pub fn get(&self, id: SessionId) -> Result<Arc<SessionHandle>, SessionError> {
        self.sessions
            .read()
            .get(&id)
            .cloned()
            .ok_or(SessionError::SessionNotFound(id))
    }

    /// Run the initialize handshake on session `id`.
    ///
    /// # Errors
    /// `SessionNotFound`, or any handshake error from the session.
    pub fn initialize(
        &self,
        id: SessionId,
        params: InitializeParams,
    ) -> Result<InitializeResult, SessionError> {
        self.get(id)?.initialize(params, &self.events)
    }

    /// Mark activity on session `id`.
    ///
    /// # Errors
    /// `SessionNotFound` if the id is unknown.
    pub fn touch(&self, id: SessionId) -> Result<(), SessionError> {
        self.get(id)?.touch();
        Ok(())
    }

    /// Close session `id`. Idempotent: unknown and already-closed ids are
    /// reported, not treated as errors.
    pub fn close_session(&self, id: SessionId) -> CloseOutcome {
        let Ok(handle) = self.get(id) else {
            tracing::debug!(session_id = %id, "Close requested for absent session");
            return CloseOutcome::Absent;
        };

        handle.close(&self.events)
    }

    /// Visit a snapshot of every non-closed session.
    ///
    /// The registry lock is released before `f` runs.
    pub fn for_each_active<F>(&self, mut f: F)
    where
        F: FnMut(&SessionInfo),
    {
        for handle in self.handles() {
            let info = handle.info();
            if !info.state.is_closed() {
                f(&info);
            }
        }
    }

    /// Non-closed sessions, newest first.
    #[must_use]
    pub fn active_sessions(&self) -> Vec<SessionInfo> {
        let mut result = Vec::new();
        self.for_each_active(|info| result.push(info.clone()));
        result.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        result
    }

    /// Every retained session, closed ones included, newest first.
    #[must_use]
    pub fn all_sessions(&self) -> Vec<SessionInfo> {
        let mut result: Vec<SessionInfo> = self.handles().iter().map(|h| h.info()).collect();
        result.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        result
    }

    /// Active sessions with no activity for at least `idle_for`.
    #[must_use]
    pub fn idle_sessions(&self, idle_for: Duration) -> Vec<SessionId> {
        let Ok(idle_for) = TimeDelta::from_std(idle_for) else {
            return Vec::new();
        };
        let Some(cutoff) = Utc::now().checked_sub_signed(idle_for) else {
            return Vec::new();
        };
        self.handles()
            .iter()
            .filter(|h| !h.state().is_closed() && h.last_activity() <= cutoff)
            .map(|h| h.id())
            .collect()
    }

    /// Drop closed sessions whose retention ended at or before `now`.
    ///
    /// Returns how many were removed.
    pub fn purge_expired(&self, now: DateTime<Utc>) -> usize {
        let mut purged = Vec::new();
        self.sessions.write().retain(|id, handle| {
            let expired = handle
                .closed_at()
                .and_then(|closed_at| closed_at.checked_add_signed(self.retention))
                .is_some_and(|expiry| expiry <= now);
            if expired {
                purged.push(*id);
            }
            !expired
        });

        for session_id in &purged {
            tracing::info!(%session_id, "Session purged");
            self.events.publish(SessionEvent::Purged {
                session_id: *session_id,
            });
        }
        purged.len()
    }

    /// Run [`purge_expired`](Self::purge_expired) every `period`, at most
    /// once per millisecond.
    pub fn spawn_retention_sweeper(
        self: Arc<Self>,
        period: Duration,
    ) -> tokio::task::JoinHandle<()> {
        let period = period.max(MIN_SWEEP_PERIOD);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let purged = self.purge_expired(Utc::now());
                if purged > 0 {
                    tracing::debug!(purged, remaining = self.len(), "Retention sweep");
                }
            }
        })
    }

    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    #[must_use]
    pub fn event_stream(&self) -> futures::stream::BoxStream<'static, SessionEvent> {
        self.events.stream()
    }

    /// Retained sessions, closed ones included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.sessions.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sessions.read().is_empty()
    }

    #[must_use]
    pub fn active_count(&self) -> usize {
        self.handles()
            .iter()
            .filter(|h| !h.state().is_closed())
            .count()
    }

    fn handles(&self) -> Vec<Arc<SessionHandle>> {
        self.sessions.read().values().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use futures::StreamExt;
    use mcp_relay_core::SessionState;
    use uuid::Uuid;

    use super::*;

    fn registry(retention: Duration) -> SessionRegistry {
        let profile = ServerProfile::from_config(&RelayConfig::default()).unwrap();
        SessionRegistry::new(profile, retention)
    }

    #[test]
    fn test_create_then_get() {
        let registry = registry(Duration::from_secs(60));
        let handle = registry.create_session(None);

        let found = registry.get(handle.id()).unwrap();
        assert_eq!(found.state(), SessionState::Uninitialized);
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.active_count(), 1);
    }

    #[test]
    fn test_get_unknown() {
        let registry = registry(Duration::from_secs(60));
        let id = Uuid::new_v4();
        assert!(matches!(
            registry.get(id),
            Err(SessionError::SessionNotFound(missing)) if missing == id
        ));
    }

    #[test]
    fn test_close_retains_closed_session() {
        let registry = registry(Duration::from_secs(60));
        let id = registry.create_session(None).id();
        registry
            .initialize(id, InitializeParams::new("2025-06-18"))
            .unwrap();

        assert_eq!(registry.close_session(id), CloseOutcome::Closed);
        assert_eq!(registry.get(id).unwrap().state(), SessionState::Closed);
        assert_eq!(registry.close_session(id), CloseOutcome::AlreadyClosed);
        assert_eq!(registry.close_session(Uuid::new_v4()), CloseOutcome::Absent);
        assert_eq!(registry.active_count(), 0);
        assert_eq!(registry.all_sessions().len(), 1);
    }

    #[test]
    fn test_purge_respects_retention() {
        let registry = registry(Duration::from_secs(60));
        let closed = registry.create_session(None).id();
        let open = registry.create_session(None).id();
        registry.close_session(closed);

        assert_eq!(registry.purge_expired(Utc::now()), 0);
        assert!(registry.get(closed).is_ok());

        let later = Utc::now() + TimeDelta::seconds(61);
        assert_eq!(registry.purge_expired(later), 1);
        assert!(registry.get(closed).is_err());
        assert!(registry.get(open).is_ok());
        assert_eq!(registry.close_session(closed), CloseOutcome::Absent);
    }

    #[test]
    fn test_for_each_active_skips_closed() {
        let registry = registry(Duration::from_secs(60));
        let a = registry.create_session(Some("a".into())).id();
        let b = registry.create_session(Some("b".into())).id();
        registry.close_session(a);

        let mut seen = Vec::new();
        registry.for_each_active(|info| seen.push(info.id));
        assert_eq!(seen, vec![b]);
    }

    #[test]
    fn test_active_sessions_newest_first() {
        let registry = registry(Duration::from_secs(60));
        let first = registry.create_session(None).id();
        std::thread::sleep(Duration::from_millis(2));
        let second = registry.create_session(None).id();

        let ids: Vec<_> = registry.active_sessions().iter().map(|i| i.id).collect();
        assert_eq!(ids, vec![second, first]);
    }

    #[test]
    fn test_idle_sessions() {
        let registry = registry(Duration::from_secs(60));
        let id = registry.create_session(None).id();
        std::thread::sleep(Duration::from_millis(20));

        assert_eq!(registry.idle_sessions(Duration::from_millis(10)), vec![id]);
        registry.touch(id).unwrap();
        assert!(registry.idle_sessions(Duration::from_millis(10)).is_empty());

        registry.close_session(id);
        std::thread::sleep(Duration::from_millis(20));
        assert!(registry.idle_sessions(Duration::from_millis(10)).is_empty());
    }

    #[test]
    fn test_idle_sessions_huge_duration() {
        let registry = registry(Duration::from_secs(60));
        registry.create_session(None);

        assert!(registry
            .idle_sessions(Duration::from_secs(10_000_000_000_000))
            .is_empty());
        assert!(registry.idle_sessions(Duration::MAX).is_empty());
    }

    #[test]
    fn test_failed_initialize_publishes_nothing() {
        let registry = registry(Duration::from_secs(60));
        let id = registry.create_session(None).id();
        let mut rx = registry.subscribe();

        let err = registry
            .initialize(id, InitializeParams::new("1999-01-01"))
            .unwrap_err();
        assert!(matches!(err, SessionError::UnsupportedProtocolVersion { .. }));
        assert!(rx.try_recv().is_err());
        assert_eq!(registry.get(id).unwrap().state(), SessionState::Uninitialized);
    }

    #[tokio::test]
    async fn test_lifecycle_events() {
        let registry = registry(Duration::ZERO);
        let mut events = registry.event_stream();

        let id = registry.create_session(Some("repl".into())).id();
        registry
            .initialize(id, InitializeParams::new("2025-06-18"))
            .unwrap();
        registry.close_session(id);
        registry.close_session(id);
        registry.purge_expired(Utc::now() + TimeDelta::seconds(1));

        assert_eq!(
            events.next().await.unwrap(),
            SessionEvent::Created {
                session_id: id,
                routing_target: Some("repl".into()),
            }
        );
        assert_eq!(
            events.next().await.unwrap(),
            SessionEvent::Initialized {
                session_id: id,
                protocol_version: "2025-06-18".into(),
            }
        );
        assert_eq!(
            events.next().await.unwrap(),
            SessionEvent::Closed { session_id: id }
        );
        assert_eq!(
            events.next().await.unwrap(),
            SessionEvent::Purged { session_id: id }
        );
    }

    #[tokio::test]
    async fn test_retention_sweeper_purges() {
        let registry = Arc::new(registry(Duration::ZERO));
        let id = registry.create_session(None).id();
        registry.close_session(id);

        let mut rx = registry.subscribe();
        let sweeper = Arc::clone(&registry).spawn_retention_sweeper(Duration::from_millis(10));

        let event = rx.recv().await.unwrap();
        assert_eq!(event, SessionEvent::Purged { session_id: id });
        assert!(registry.is_empty());
        sweeper.abort();
    }

    #[tokio::test]
    async fn test_retention_sweeper_zero_period() {
        let registry = Arc::new(registry(Duration::ZERO));
        let id = registry.create_session(None).id();
        registry.close_session(id);

        let mut rx = registry.subscribe();
        let sweeper = Arc::clone(&registry).spawn_retention_sweeper(Duration::ZERO);

        let event = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(event, SessionEvent::Purged { session_id: id });
        assert!(!sweeper.is_finished());
        sweeper.abort();
    }

    #[test]
    fn test_initialized_precedes_closed_under_race() {
        let registry = Arc::new(registry(Duration::from_secs(60)));
        let mut rx = registry.subscribe();
        let ids: Vec<_> = (0..32).map(|_| registry.create_session(None).id()).collect();

        let threads: Vec<_> = ids
            .iter()
            .flat_map(|&id| {
                let init = Arc::clone(&registry);
                let close = Arc::clone(&registry);
                [
                    std::thread::spawn(move || {
                        let _ = init.initialize(id, InitializeParams::new("2025-06-18"));
                    }),
                    std::thread::spawn(move || {
                        close.close_session(id);
                    }),
                ]
            })
            .collect();
        for t in threads {
            t.join().unwrap();
        }

        let mut closed = std::collections::HashSet::new();
        while let Ok(event) = rx.try_recv() {
            match event {
                SessionEvent::Initialized { session_id, .. } => {
                    assert!(!closed.contains(&session_id), "Initialized after Closed");
                }
                SessionEvent::Closed { session_id } => {
                    assert!(closed.insert(session_id));
                }
                _ => {}
            }
        }
        assert_eq!(closed.len(), ids.len());
    }

    #[test]
    fn test_concurrent_create_and_close() {
        let registry = Arc::new(registry(Duration::from_secs(60)));
        let threads: Vec<_> = (0..16)
            .map(|_| {
                let registry = Arc::clone(&registry);
                std::thread::spawn(move || {
                    let id = registry.create_session(None).id();
                    registry
                        .initialize(id, InitializeParams::new("2025-06-18"))
                        .unwrap();
                    assert_eq!(registry.close_session(id), CloseOutcome::Closed);
                    assert_eq!(registry.get(id).unwrap().state(), SessionState::Closed);
                })
            })
            .collect();

        for t in threads {
            t.join().unwrap();
        }
        assert_eq!(registry.len(), 16);
        assert_eq!(registry.active_count(), 0);
    }

    #[test]
    fn test_from_config_rejects_invalid() {
        let config = RelayConfig {
            supported_versions: Vec::new(),
            ..RelayConfig::default()
        };
        assert!(SessionRegistry::from_config(&config).is_err());
    }
}
