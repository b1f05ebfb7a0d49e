//! Protocol version negotiation.
//!
//! Supported versions are opaque tokens ordered by their position in the
//! configured list (oldest first). A client token that appears in the list is
//! accepted as-is. A token the server does not know has no position, so it is
//! placed against the list by string comparison: tokens below the oldest entry
//! are refused, anything else is downgraded to the newest supported entry that
//! does not compare above it.

use std::{cmp::Ordering, sync::Arc};

use thiserror::Error;

use crate::config::ConfigError;

/// Negotiation failure, carrying everything a client-facing error needs.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unsupported protocol version {requested:?}; supported: {}", supported.join(", "))]
pub struct NegotiationError {
    pub requested: String,
    pub supported: Vec<String>,
}

/// Pure negotiator over an injected, immutable supported-version list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionNegotiator {
    supported: Arc<[String]>,
}

impl VersionNegotiator {
    /// Build a negotiator from versions listed oldest first.
    ///
    /// # Errors
    /// Returns error if the list is empty or contains a duplicate.
    pub fn new<I, S>(versions: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let supported: Vec<String> = versions.into_iter().map(Into::into).collect();
        if supported.is_empty() {
            return Err(ConfigError::NoSupportedVersions);
        }
        for (i, v) in supported.iter().enumerate() {
            if v.trim().is_empty() {
                return Err(ConfigError::Invalid("supported version must not be blank".into()));
            }
            if supported[..i].contains(v) {
                return Err(ConfigError::DuplicateVersion(v.clone()));
            }
        }
        if supported.windows(2).any(|w| w[0] >= w[1]) {
            tracing::warn!(
                ?supported,
                "supported versions do not sort as strings in configured order; \
                 unknown client versions may be placed unexpectedly"
            );
        }
        Ok(Self {
            supported: supported.into(),
        })
    }

    /// Agree on a version for `client_version`.
    ///
    /// # Errors
    /// Returns error if the client version is older than every supported one.
    pub fn negotiate(&self, client_version: &str) -> Result<String, NegotiationError> {
        if self.is_supported(client_version) {
            return Ok(client_version.to_owned());
        }

        if client_version >= self.oldest() {
            if let Some(best) = self
                .supported
                .iter()
                .rev()
                .find(|v| v.as_str() <= client_version)
            {
                return Ok(best.clone());
            }
        }

        Err(NegotiationError {
            requested: client_version.to_owned(),
            supported: self.supported.to_vec(),
        })
    }

    /// Supported versions, oldest first.
    #[must_use]
    pub fn supported(&self) -> &[String] {
        &self.supported
    }

    #[must_use]
    pub fn is_supported(&self, version: &str) -> bool {
        self.position(version).is_some()
    }

    #[must_use]
    pub fn oldest(&self) -> &str {
        &self.supported[0]
    }

    #[must_use]
    pub fn latest(&self) -> &str {
        &self.supported[self.supported.len() - 1]
    }

    /// Order two known versions by configured position.
    ///
    /// Returns `None` if either token is not in the supported list.
    #[must_use]
    pub fn compare(&self, a: &str, b: &str) -> Option<Ordering> {
        Some(self.position(a)?.cmp(&self.position(b)?))
    }

    fn position(&self, version: &str) -> Option<usize> {
        self.supported.iter().position(|v| v == version)
    }
}
