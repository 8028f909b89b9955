//! Peer endpoints.

use std::fmt;
use std::net::{IpAddr, SocketAddr};

use serde::{Deserialize, Serialize};

/// The IP this machine would use to reach the internet. Connecting a UDP
/// socket sends nothing; it only picks a route.
pub fn outbound_ip() -> std::io::Result<IpAddr> {
    let socket = std::net::UdpSocket::bind("0.0.0.0:0")?;
    socket.connect("8.8.8.8:80")?;
    Ok(socket.local_addr()?.ip())
}

/// A peer's receive endpoint. Used as the roster key.
///
/// `address` is whatever the peer advertised or the source IP it was seen
/// from. It is resolved on every send, so hostnames are allowed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Node {
    pub address: String,
    pub port: u16,
}

impl Node {
    pub fn new(address: impl Into<String>, port: u16) -> Self {
        Self {
            address: address.into(),
            port,
        }
    }

    /// Build a node from a datagram source. IPv4-mapped IPv6 sources are
    /// folded back to plain IPv4 so the same peer is never keyed twice.
    pub fn from_socket_addr(addr: SocketAddr) -> Self {
        Self {
            address: addr.ip().to_canonical().to_string(),
            port: addr.port(),
        }
    }

    /// The socket address, if `address` is an IP literal.
    pub fn socket_addr(&self) -> Option<SocketAddr> {
        self.address
            .parse::<IpAddr>()
            .ok()
            .map(|ip| SocketAddr::new(ip, self.port))
    }

    /// Whether the address names this machine.
    pub fn is_loopback(&self) -> bool {
        match self.address.parse::<IpAddr>() {
            Ok(ip) => ip.to_canonical().is_loopback(),
            Err(_) => self.address.eq_ignore_ascii_case("localhost"),
        }
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.address.contains(':') {
            write!(f, "[{}]:{}", self.address, self.port)
        } else {
            write!(f, "{}:{}", self.address, self.port)
        }
    }
}

impl From<SocketAddr> for Node {
    fn from(addr: SocketAddr) -> Self {
        Self::from_socket_addr(addr)
    }
}
