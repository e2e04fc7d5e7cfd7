//! A single peer session as seen by the coordinator.
//!
//! [`Connection`] carries the identity of a peer and the sending half of its
//! bounded outbound queue. The receiving half, [`OutboundQueue`], belongs to
//! the connection's outbound pump. Dropping the `Connection` (which only the
//! registry ever holds once registered) closes the queue and fires the
//! connection's closed signal, which stops both pumps and with them the
//! transport.

use std::net::SocketAddr;

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio_util::sync::{CancellationToken, DropGuard};

use super::ConnectionId;
use super::envelope::Frame;

/// Receiving half of a connection's outbound queue.
pub type OutboundQueue = mpsc::Receiver<Frame>;

/// Why a non-blocking enqueue was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueError {
    /// The queue is at capacity: the peer is not keeping up.
    Full,
    /// The outbound pump is gone (its transport write failed).
    Closed,
}

/// A live peer session owned by the registry.
#[derive(Debug)]
pub struct Connection {
    id: ConnectionId,
    peer_addr: SocketAddr,
    outbound: mpsc::Sender<Frame>,
    closed: CancellationToken,
    _close_on_drop: DropGuard,
}

impl Connection {
    /// Opens a new connection for `peer_addr` with a fresh identifier and an
    /// outbound queue holding at most `capacity` frames.
    ///
    /// A `capacity` of zero is raised to one.
    #[must_use]
    pub fn open(peer_addr: SocketAddr, capacity: usize) -> (Self, OutboundQueue) {
        let (outbound, queue) = mpsc::channel(capacity.max(1));
        let closed = CancellationToken::new();
        let connection = Self {
            id: ConnectionId::new(),
            peer_addr,
            outbound,
            _close_on_drop: closed.clone().drop_guard(),
            closed,
        };
        (connection, queue)
    }

    /// Returns the connection's identifier.
    #[must_use]
    pub const fn id(&self) -> ConnectionId {
        self.id
    }

    /// Returns the remote address of the peer.
    #[must_use]
    pub const fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }

    /// Returns a signal that is cancelled once this connection is dropped,
    /// whether the peer left or the hub evicted it.
    #[must_use]
    pub fn closed_signal(&self) -> CancellationToken {
        self.closed.clone()
    }

    /// Attempts to enqueue `frame` without waiting.
    ///
    /// # Errors
    ///
    /// Returns [`EnqueueError::Full`] when the queue is at capacity and
    /// [`EnqueueError::Closed`] when its receiver has been dropped.
    pub fn try_enqueue(&self, frame: Frame) -> Result<(), EnqueueError> {
        self.outbound.try_send(frame).map_err(|err| match err {
            TrySendError::Full(_) => EnqueueError::Full,
            TrySendError::Closed(_) => EnqueueError::Closed,
        })
    }
}
