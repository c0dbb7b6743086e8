//! The public or local (IPv4 address, UDP port) pairs the rest of the crate works with.

use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};

use serde::Serialize;

/// An IPv4 UDP endpoint: an address paired with a port.
///
/// Every observation this crate produces — a socket's local endpoint, a server's
/// reflected public endpoint, a probe destination — is one of these. Equality and
/// ordering are structural; the string form is the plain `ip:port` used throughout
/// logs and the narrative report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct Endpoint {
    pub ip: Ipv4Addr,
    pub port: u16,
}

impl Endpoint {
    pub fn new(ip: Ipv4Addr, port: u16) -> Self {
        Self { ip, port }
    }
}

impl std::fmt::Display for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.ip, self.port)
    }
}

impl From<SocketAddrV4> for Endpoint {
    fn from(addr: SocketAddrV4) -> Self {
        Self::new(*addr.ip(), addr.port())
    }
}

impl From<Endpoint> for SocketAddr {
    fn from(ep: Endpoint) -> Self {
        SocketAddr::V4(SocketAddrV4::new(ep.ip, ep.port))
    }
}

/// Extracts the IPv4 endpoint from a socket address, discarding anything IPv6.
///
/// Every socket in this crate is bound to an unspecified IPv4 address, so a `from`
/// address reported as V6 would indicate a kernel or test-harness bug rather than a
/// real peer; callers treat `None` here as "ignore this datagram".
pub fn ipv4_endpoint(addr: SocketAddr) -> Option<Endpoint> {
    match addr {
        SocketAddr::V4(v4) => Some(Endpoint::from(v4)),
        SocketAddr::V6(_) => None,
    }
}
