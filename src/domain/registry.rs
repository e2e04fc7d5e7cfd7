//! Set of live connections and the fan-out delivery policy.
//!
//! [`Registry`] is deliberately lock-free: it is owned by the coordinator's
//! control loop and never shared. Every method takes `&mut self` or `&self`
//! and completes without awaiting.
//!
//! # Delivery policy
//!
//! [`Registry::fan_out`] attempts one non-blocking enqueue per target. A
//! target whose queue is full (or already closed) is evicted on the spot:
//! it is removed from the registry and its `Connection` handed back to the
//! caller, so dropping it closes the outbound queue. Evicted peers get no
//! notice and the frame is never retried.

use std::collections::HashMap;

use super::ConnectionId;
use super::connection::{Connection, EnqueueError};
use super::envelope::Frame;

/// Outcome of one [`Registry::fan_out`] call.
#[derive(Debug, Default)]
pub struct FanOut {
    /// Number of queues that accepted the frame.
    pub delivered: usize,
    /// Connections removed because their queue refused the frame.
    pub evicted: Vec<(Connection, EnqueueError)>,
}

/// Membership of all currently active connections.
#[derive(Debug, Default)]
pub struct Registry {
    connections: HashMap<ConnectionId, Connection>,
}

impl Registry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a connection, returning the entry it replaced (if any).
    pub fn insert(&mut self, connection: Connection) -> Option<Connection> {
        self.connections.insert(connection.id(), connection)
    }

    /// Removes a connection. Returns `None` if it was not registered, which
    /// makes repeated removal a no-op.
    pub fn remove(&mut self, id: &ConnectionId) -> Option<Connection> {
        self.connections.remove(id)
    }

    /// Returns the ids of all registered connections, in no particular order.
    #[must_use]
    pub fn ids(&self) -> Vec<ConnectionId> {
        self.connections.keys().copied().collect()
    }

    /// Returns the number of registered connections.
    #[must_use]
    pub fn len(&self) -> usize {
        self.connections.len()
    }

    /// Returns `true` if no connection is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    /// Delivers `frame` to every registered connection except `except`.
    ///
    /// Connections whose queue refuses the frame are removed and returned
    /// in [`FanOut::evicted`].
    pub fn fan_out(&mut self, frame: &Frame, except: Option<ConnectionId>) -> FanOut {
        let mut delivered = 0;
        let mut refused = Vec::new();

        for (id, connection) in &self.connections {
            if except == Some(*id) {
                continue;
            }
            match connection.try_enqueue(frame.clone()) {
                Ok(()) => delivered += 1,
                Err(reason) => refused.push((*id, reason)),
            }
        }

        let evicted = refused
            .into_iter()
            .filter_map(|(id, reason)| self.connections.remove(&id).map(|c| (c, reason)))
            .collect();

        FanOut { delivered, evicted }
    }
}
