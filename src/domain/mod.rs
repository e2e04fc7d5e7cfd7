//! Domain layer: connection identity, envelopes, registry, and coordinator.
//!
//! This module contains the core of the hub: the wire message model, the
//! per-peer connection handle with its bounded outbound queue, the registry
//! of live connections, and the single control loop that owns it.

pub mod connection;
pub mod connection_id;
pub mod coordinator;
pub mod envelope;
pub mod registry;

pub use connection::{Connection, EnqueueError, OutboundQueue};
pub use connection_id::ConnectionId;
pub use coordinator::{Broadcast, Coordinator, HubHandle};
pub use envelope::{Envelope, Frame};
pub use registry::Registry;
