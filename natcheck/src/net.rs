//! The ambient networking facts the probe engine needs: DNS resolution and local IPv4
//! address enumeration.
//!
//! Kept deliberately thin. Server hostname resolution is "a trivial interface" by
//! design (§6): a single free function, no caching, no custom resolver. Local address
//! enumeration reuses the teacher workspace's `netdev`-based approach
//! (`netwatch::interfaces`), trimmed to the one thing this crate needs — the list of
//! usable IPv4 addresses on up, non-loopback interfaces — dropping the gateway
//! discovery and interface-change watching that exist there for port-mapping lease
//! renewal, which has no counterpart here.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use tracing::debug;

use crate::error::Error;

/// Resolves `host` and returns every IPv4 address reported, in resolver order.
pub async fn resolve_ipv4(host: &str, port: u16) -> Result<Vec<Ipv4Addr>, Error> {
    let addrs = tokio::net::lookup_host((host, port))
        .await
        .map_err(|source| Error::ResolveFailed {
            host: host.to_string(),
            source,
        })?;

    let ips: Vec<Ipv4Addr> = addrs
        .filter_map(|addr: SocketAddr| match addr.ip() {
            IpAddr::V4(ip) => Some(ip),
            IpAddr::V6(_) => None,
        })
        .collect();

    if ips.is_empty() {
        debug!(%host, "resolver returned no IPv4 addresses");
    }
    Ok(ips)
}

/// Every IPv4 address bound to an up, non-loopback interface on this host.
///
/// Used both to populate `ProbeSnapshot::local_ips` and, by the analyzer, to decide
/// whether an observed mapped address is actually local (`no_nat`).
pub fn local_ipv4_addresses() -> Vec<Ipv4Addr> {
    netdev::get_interfaces()
        .into_iter()
        .filter(|iface| iface.is_up())
        .flat_map(|iface| iface.ipv4.into_iter().map(|net| net.addr()))
        .filter(|ip| is_usable_v4(*ip))
        .collect()
}

/// An address with plausible Internet connectivity: not loopback, not unspecified.
fn is_usable_v4(ip: Ipv4Addr) -> bool {
    !ip.is_loopback() && !ip.is_unspecified()
}

/// Excludes RFC 1918 private ranges and non-global-unicast addresses, per §6's
/// definition of "public" for the reflector server's startup check.
pub fn is_global_unicast_v4(ip: Ipv4Addr) -> bool {
    if ip.is_private() || ip.is_loopback() || ip.is_link_local() || ip.is_multicast() {
        return false;
    }
    !ip.is_unspecified() && !ip.is_broadcast()
}
