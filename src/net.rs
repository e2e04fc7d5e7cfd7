//! Host address lookup used to tag envelopes with the server's address.

use std::net::{IpAddr, Ipv4Addr, SocketAddr, UdpSocket};

/// Fallback returned when no routable IPv4 address is found.
pub const FALLBACK_HOST: &str = "localhost";

/// Returns this host's primary non-loopback IPv4 address as a string, or
/// [`FALLBACK_HOST`] when there is none.
///
/// The address is the one the OS would use as the source for outbound
/// traffic. Connecting a UDP socket only selects a route; no packet is sent.
#[must_use]
pub fn local_ip() -> String {
    probe_ipv4()
        .filter(|ip| !ip.is_loopback() && !ip.is_unspecified())
        .map_or_else(|| FALLBACK_HOST.to_string(), |ip| ip.to_string())
}

fn probe_ipv4() -> Option<Ipv4Addr> {
    let socket = UdpSocket::bind(SocketAddr::from((Ipv4Addr::UNSPECIFIED, 0))).ok()?;
    socket
        .connect(SocketAddr::from((Ipv4Addr::new(192, 0, 2, 1), 9)))
        .ok()?;
    match socket.local_addr().ok()?.ip() {
        IpAddr::V4(ip) => Some(ip),
        IpAddr::V6(_) => None,
    }
}
