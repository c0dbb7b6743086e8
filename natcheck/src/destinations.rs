//! Cartesian product of resolved server IPs and configured probe ports.

use std::net::Ipv4Addr;

use crate::endpoint::Endpoint;

/// Builds the ordered destination set: IPs in the order given, each crossed with every
/// port in the order given. Deterministic, so reruns against the same input are
/// directly comparable.
pub fn build(server_ips: &[Ipv4Addr], ports: &[u16]) -> Vec<Endpoint> {
    server_ips
        .iter()
        .flat_map(|ip| ports.iter().map(move |&port| Endpoint::new(*ip, port)))
        .collect()
}
