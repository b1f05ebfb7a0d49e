//! Session-layer error kinds.

use thiserror::Error;

use crate::{NegotiationError, RoutingError, SessionId, SessionState};

/// Errors surfaced by the session layer.
///
/// Every variant concerns a single session; none of them leaves registry-wide
/// state altered.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error("initialize request is missing protocolVersion")]
    MissingProtocolVersion,
    #[error("unsupported protocol version {requested:?}; supported: {}", supported.join(", "))]
    UnsupportedProtocolVersion {
        requested: String,
        supported: Vec<String>,
    },
    #[error("session {id} cannot be initialized in state {state}")]
    SessionAlreadyInitializedOrClosed { id: SessionId, state: SessionState },
    #[error("session not found: {0}")]
    SessionNotFound(SessionId),
    #[error("session {id} is not ready (state {state})")]
    SessionNotReady { id: SessionId, state: SessionState },
    #[error("routing target {} could not be resolved: {reason}", target.as_deref().unwrap_or("<default>"))]
    RoutingTargetUnresolved {
        target: Option<String>,
        reason: String,
    },
}

impl SessionError {
    /// Wrap a router failure for `target`.
    #[must_use]
    pub fn unresolved(target: Option<&str>, err: &RoutingError) -> Self {
        Self::RoutingTargetUnresolved {
            target: target.map(ToOwned::to_owned),
            reason: err.to_string(),
        }
    }
}

impl From<NegotiationError> for SessionError {
    fn from(err: NegotiationError) -> Self {
        Self::UnsupportedProtocolVersion {
            requested: err.requested,
            supported: err.supported,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_negotiation_error_converts() {
        let err: SessionError = NegotiationError {
            requested: "1999-01-01".into(),
            supported: vec!["2024-11-05".into()],
        }
        .into();
        assert_eq!(
            err,
            SessionError::UnsupportedProtocolVersion {
                requested: "1999-01-01".into(),
                supported: vec!["2024-11-05".into()],
            }
        );
    }

    #[test]
    fn test_unresolved_message() {
        let err = SessionError::unresolved(None, &RoutingError::NoDefaultTarget);
        assert_eq!(
            err.to_string(),
            "routing target <default> could not be resolved: No default backend configured"
        );
    }
}
