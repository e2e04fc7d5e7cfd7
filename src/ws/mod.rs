//! WebSocket layer: upgrade handling and per-connection pumps.
//!
//! The WebSocket endpoint at `/ws` joins a client to the broadcast hub.

pub mod connection;
pub mod handler;
