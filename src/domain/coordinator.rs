//! Single-owner control loop serializing registry mutation and fan-out.
//!
//! The [`Coordinator`] is the only task that ever touches the [`Registry`].
//! Everything else talks to it through a cloneable [`HubHandle`], which
//! submits events over three intakes:
//!
//! - **register**: insert a connection, announce it to everyone else;
//! - **unregister**: remove a connection (idempotent), announce its departure;
//! - **broadcast**: deliver a serialized user message to every peer except
//!   its origin.
//!
//! A fourth, read-only intake answers membership snapshots.
//!
//! Events are handled one at a time. No intake has priority over another:
//! whichever is ready first wins. Handling an event never awaits a peer;
//! each delivery is a single non-blocking enqueue and refusal means eviction
//! (see [`Registry::fan_out`]).

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use super::ConnectionId;
use super::connection::Connection;
use super::envelope::{Envelope, Frame};
use super::registry::{FanOut, Registry};
use crate::error::HubError;

/// A connection waiting to be inserted, with the acknowledgement sent back
/// once it is in the registry.
#[derive(Debug)]
struct Registration {
    connection: Connection,
    ack: oneshot::Sender<()>,
}

/// A serialized user message and the connection it came from.
#[derive(Debug, Clone)]
pub struct Broadcast {
    /// Connection that must not receive its own message.
    pub origin: ConnectionId,
    /// The envelope, serialized once.
    pub frame: Frame,
}

/// Cloneable submission side of the coordinator.
#[derive(Debug, Clone)]
pub struct HubHandle {
    register_tx: mpsc::Sender<Registration>,
    unregister_tx: mpsc::Sender<ConnectionId>,
    broadcast_tx: mpsc::Sender<Broadcast>,
    snapshot_tx: mpsc::Sender<oneshot::Sender<Vec<ConnectionId>>>,
}

impl HubHandle {
    /// Registers `connection` and waits until the coordinator has inserted
    /// it, so that nothing it sends can overtake its own registration.
    ///
    /// # Errors
    ///
    /// Returns [`HubError::CoordinatorClosed`] if the control loop is gone.
    pub async fn register(&self, connection: Connection) -> Result<(), HubError> {
        let (ack, done) = oneshot::channel();
        self.register_tx
            .send(Registration { connection, ack })
            .await
            .map_err(|_| HubError::CoordinatorClosed)?;
        done.await.map_err(|_| HubError::CoordinatorClosed)
    }

    /// Requests removal of `id`. Removing an absent connection is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`HubError::CoordinatorClosed`] if the control loop is gone.
    pub async fn unregister(&self, id: ConnectionId) -> Result<(), HubError> {
        self.unregister_tx
            .send(id)
            .await
            .map_err(|_| HubError::CoordinatorClosed)
    }

    /// Submits a user message for delivery. Waits while the intake is full.
    ///
    /// # Errors
    ///
    /// Returns [`HubError::CoordinatorClosed`] if the control loop is gone.
    pub async fn broadcast(&self, broadcast: Broadcast) -> Result<(), HubError> {
        self.broadcast_tx
            .send(broadcast)
            .await
            .map_err(|_| HubError::CoordinatorClosed)
    }

    /// Returns the ids currently registered, in no particular order.
    ///
    /// # Errors
    ///
    /// Returns [`HubError::CoordinatorClosed`] if the control loop is gone.
    pub async fn peers(&self) -> Result<Vec<ConnectionId>, HubError> {
        let (reply, answer) = oneshot::channel();
        self.snapshot_tx
            .send(reply)
            .await
            .map_err(|_| HubError::CoordinatorClosed)?;
        answer.await.map_err(|_| HubError::CoordinatorClosed)
    }
}

/// The control loop owning the registry.
#[derive(Debug)]
pub struct Coordinator {
    registry: Registry,
    server_ip: Arc<str>,
    register_rx: mpsc::Receiver<Registration>,
    unregister_rx: mpsc::Receiver<ConnectionId>,
    broadcast_rx: mpsc::Receiver<Broadcast>,
    snapshot_rx: mpsc::Receiver<oneshot::Sender<Vec<ConnectionId>>>,
}

impl Coordinator {
    /// Creates a coordinator and its handle.
    ///
    /// `server_ip` tags every system notice. `intake_capacity` bounds each
    /// intake; zero is raised to one.
    #[must_use]
    pub fn new(server_ip: Arc<str>, intake_capacity: usize) -> (Self, HubHandle) {
        let capacity = intake_capacity.max(1);
        let (register_tx, register_rx) = mpsc::channel(capacity);
        let (unregister_tx, unregister_rx) = mpsc::channel(capacity);
        let (broadcast_tx, broadcast_rx) = mpsc::channel(capacity);
        let (snapshot_tx, snapshot_rx) = mpsc::channel(capacity);

        let coordinator = Self {
            registry: Registry::new(),
            server_ip,
            register_rx,
            unregister_rx,
            broadcast_rx,
            snapshot_rx,
        };
        let handle = HubHandle {
            register_tx,
            unregister_tx,
            broadcast_tx,
            snapshot_tx,
        };
        (coordinator, handle)
    }

    /// Spawns the control loop onto the current Tokio runtime.
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    /// Runs the control loop until every [`HubHandle`] has been dropped.
    pub async fn run(mut self) {
        tracing::debug!("hub coordinator started");
        loop {
            tokio::select! {
                Some(Registration { connection, ack }) = self.register_rx.recv() => {
                    self.on_register(connection);
                    // The submitter may have given up waiting; nothing to undo.
                    let _ = ack.send(());
                }
                Some(id) = self.unregister_rx.recv() => self.on_unregister(id),
                Some(broadcast) = self.broadcast_rx.recv() => self.on_broadcast(broadcast),
                Some(reply) = self.snapshot_rx.recv() => {
                    let _ = reply.send(self.registry.ids());
                }
                else => break,
            }
        }
        tracing::debug!(active = self.registry.len(), "hub coordinator stopped");
    }

    fn on_register(&mut self, connection: Connection) {
        let id = connection.id();
        let peer_addr = connection.peer_addr();
        if self.registry.insert(connection).is_some() {
            tracing::warn!(connection_id = %id, "replaced connection with duplicate id");
        }
        tracing::info!(
            connection_id = %id,
            peer_addr = %peer_addr,
            active = self.registry.len(),
            "peer connected"
        );
        self.announce(&Envelope::connected(&self.server_ip, peer_addr), Some(id));
    }

    fn on_unregister(&mut self, id: ConnectionId) {
        let Some(connection) = self.registry.remove(&id) else {
            tracing::trace!(connection_id = %id, "unregister for absent connection ignored");
            return;
        };
        let peer_addr = connection.peer_addr();
        // Dropping the entry closes its outbound queue.
        drop(connection);
        tracing::info!(
            connection_id = %id,
            peer_addr = %peer_addr,
            active = self.registry.len(),
            "peer disconnected"
        );
        self.announce(&Envelope::disconnected(&self.server_ip, peer_addr), None);
    }

    fn on_broadcast(&mut self, broadcast: Broadcast) {
        let report = self.registry.fan_out(&broadcast.frame, Some(broadcast.origin));
        tracing::trace!(
            origin = %broadcast.origin,
            delivered = report.delivered,
            "message broadcast"
        );
        self.log_evictions(report);
    }

    fn announce(&mut self, notice: &Envelope, except: Option<ConnectionId>) {
        match notice.to_frame() {
            Ok(frame) => {
                let report = self.registry.fan_out(&frame, except);
                self.log_evictions(report);
            }
            Err(err) => {
                tracing::error!(error = %err, "failed to encode system notice");
            }
        }
    }

    fn log_evictions(&self, report: FanOut) {
        for (connection, reason) in report.evicted {
            tracing::warn!(
                connection_id = %connection.id(),
                peer_addr = %connection.peer_addr(),
                reason = ?reason,
                active = self.registry.len(),
                "evicted peer that could not accept a message"
            );
        }
    }
}

/// Convenience for building a [`Broadcast`] from a user envelope.
///
/// # Errors
///
/// Returns [`HubError::Encode`] if the envelope cannot be serialized.
pub fn user_broadcast(
    origin: ConnectionId,
    content: impl Into<String>,
    server_ip: &str,
    peer_addr: SocketAddr,
) -> Result<Broadcast, HubError> {
    let frame = Envelope::user(origin, content, server_ip, peer_addr).to_frame()?;
    Ok(Broadcast { origin, frame })
}
