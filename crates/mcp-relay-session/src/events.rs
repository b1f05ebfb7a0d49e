//! Broadcast of session lifecycle events.

use futures::StreamExt;
use mcp_relay_core::SessionId;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;

/// Capacity of the event channel; slow subscribers observe a lag and skip.
const EVENT_CAPACITY: usize = 1024;

/// Lifecycle event published by the registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionEvent {
    Created {
        session_id: SessionId,
        routing_target: Option<String>,
    },
    Initialized {
        session_id: SessionId,
        protocol_version: String,
    },
    Closed { session_id: SessionId },
    /// Dropped from the registry after its retention period.
    Purged { session_id: SessionId },
}

impl SessionEvent {
    #[must_use]
    pub const fn session_id(&self) -> SessionId {
        match self {
            Self::Created { session_id, .. }
            | Self::Initialized { session_id, .. }
            | Self::Closed { session_id }
            | Self::Purged { session_id } => *session_id,
        }
    }
}

/// Fan-out of [`SessionEvent`]s to any number of listeners.
#[derive(Debug)]
pub struct EventBus {
    sender: broadcast::Sender<SessionEvent>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    #[must_use]
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(EVENT_CAPACITY);
        Self { sender }
    }

    /// Publish to current listeners. Having none is fine.
    pub fn publish(&self, event: SessionEvent) {
        let _ = self.sender.send(event);
    }

    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.sender.subscribe()
    }

    /// Live event stream; lagged items are skipped.
    #[must_use]
    pub fn stream(&self) -> futures::stream::BoxStream<'static, SessionEvent> {
        BroadcastStream::new(self.subscribe())
            .filter_map(|res| async move { res.ok() })
            .boxed()
    }

    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}
