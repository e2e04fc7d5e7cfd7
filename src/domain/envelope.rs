//! Wire message model exchanged between peers.
//!
//! Every frame the hub writes to a client is a JSON-serialized
//! [`Envelope`]. Envelopes come in two classes:
//!
//! - **user messages**, built by a connection's inbound pump from the raw
//!   client payload and attributed to that connection;
//! - **system notices**, built by the coordinator when a peer joins or
//!   leaves, with no sender.
//!
//! The JSON keys (`sender`, `Recipient`, `Content`, `serverIp`, `senderIp`)
//! are kept exactly as existing clients expect them, and empty fields are
//! omitted.

use std::net::SocketAddr;

use axum::extract::ws::Utf8Bytes;
use serde::{Deserialize, Serialize};

use super::ConnectionId;

/// One serialized envelope, ready to be written as a text frame.
///
/// Cloning is a reference-count bump, so a single serialization is shared
/// by every outbound queue it is delivered to.
pub type Frame = Utf8Bytes;

/// Content of the notice sent when a peer joins the hub.
pub const CONNECTED_NOTICE: &str = "/A new socket has connected. ";

/// Content of the notice sent when a peer leaves the hub.
pub const DISCONNECTED_NOTICE: &str = "/A socket has disconnected. ";

/// Message envelope as it appears on the wire.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    /// Originating connection id. Empty for system notices.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub sender: String,

    /// Reserved for targeted delivery. Never populated by the hub.
    #[serde(
        rename = "Recipient",
        default,
        skip_serializing_if = "String::is_empty"
    )]
    pub recipient: String,

    /// Raw client payload, or the notice text.
    #[serde(rename = "Content", default, skip_serializing_if = "String::is_empty")]
    pub content: String,

    /// Address of the hub host that produced the envelope.
    #[serde(rename = "serverIp", default, skip_serializing_if = "String::is_empty")]
    pub server_ip: String,

    /// Remote address of the peer the envelope is about.
    #[serde(rename = "senderIp", default, skip_serializing_if = "String::is_empty")]
    pub sender_ip: String,
}

impl Envelope {
    /// Builds a user message attributed to `sender`.
    #[must_use]
    pub fn user(
        sender: ConnectionId,
        content: impl Into<String>,
        server_ip: &str,
        peer_addr: SocketAddr,
    ) -> Self {
        Self {
            sender: sender.to_string(),
            recipient: String::new(),
            content: content.into(),
            server_ip: server_ip.to_owned(),
            sender_ip: peer_addr.to_string(),
        }
    }

    /// Builds the system notice announcing that `peer_addr` joined.
    #[must_use]
    pub fn connected(server_ip: &str, peer_addr: SocketAddr) -> Self {
        Self::notice(CONNECTED_NOTICE, server_ip, peer_addr)
    }

    /// Builds the system notice announcing that `peer_addr` left.
    #[must_use]
    pub fn disconnected(server_ip: &str, peer_addr: SocketAddr) -> Self {
        Self::notice(DISCONNECTED_NOTICE, server_ip, peer_addr)
    }

    fn notice(content: &str, server_ip: &str, peer_addr: SocketAddr) -> Self {
        Self {
            content: content.to_owned(),
            server_ip: server_ip.to_owned(),
            sender_ip: peer_addr.to_string(),
            ..Self::default()
        }
    }

    /// Serializes the envelope into a [`Frame`].
    ///
    /// # Errors
    ///
    /// Returns the underlying [`serde_json::Error`] if serialization fails.
    pub fn to_frame(&self) -> Result<Frame, serde_json::Error> {
        serde_json::to_string(self).map(Frame::from)
    }
}
