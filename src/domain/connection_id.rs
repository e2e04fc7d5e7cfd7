//! Opaque connection identifier.
//!
//! [`ConnectionId`] wraps a [`uuid::Uuid`] (v4) assigned at handshake time.
//! It attributes user messages to their sender and keys the registry; it is
//! never used to address a message to a particular peer.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Unique identifier for a live WebSocket connection.
///
/// Generated once when the connection is opened and stable for its whole
/// lifetime. Rendered as a hyphenated UUID string in the `sender` field of
/// outgoing envelopes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectionId(uuid::Uuid);

impl ConnectionId {
    /// Creates a new random `ConnectionId` (UUID v4).
    #[must_use]
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }

    /// Returns the underlying UUID (test-only accessor).
    #[cfg(test)]
    pub(crate) fn as_uuid(&self) -> &uuid::Uuid {
        &self.0
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
