//! # broadcast-hub
//!
//! Real-time message broadcast hub. Clients connect over WebSocket and every
//! message one client sends is fanned out to all other connected clients,
//! together with join and leave notices generated by the hub.
//!
//! ## Architecture
//!
//! ```text
//! Clients (WebSocket)
//!     │
//!     ├── Upgrade handler (ws/handler)
//!     │
//!     ├── Inbound pump ──► Coordinator ──► Outbound pump   (ws/connection)
//!     │                     (domain/coordinator)
//!     │
//!     └── Registry (domain/registry), owned by the coordinator task only
//! ```
//!
//! The coordinator is the single serialization point: registration,
//! unregistration and broadcast are handled one at a time by one task, so
//! the registry needs no lock. A peer whose outbound queue is full when a
//! message is delivered is disconnected instead of stalling everyone else.
//!
//! There is no idle timeout, no connection cap and no graceful shutdown;
//! connections live until their socket fails or they are evicted.

pub mod api;
pub mod app_state;
pub mod config;
pub mod domain;
pub mod error;
pub mod net;
pub mod ws;
