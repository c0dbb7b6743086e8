//! NAT and firewall behavior characterization: a UDP probe protocol, a reflector
//! server to run it against, and an analyzer that turns raw probes into a cone-type,
//! firewall-class, port-preservation, and filtered-egress report.

mod analyzer;
mod codec;
mod coordinator;
mod destinations;
mod endpoint;
mod error;
mod firewall;
mod mapper;
mod net;
mod probe;
mod report;
mod server;

mod defaults {
    use std::time::Duration;

    /// Ports probed against every resolved server IP, per §6. Spans the IANA
    /// well-known/registered/dynamic ranges and includes VPN and VoIP ports commonly
    /// permitted by restrictive-but-business-friendly firewalls.
    pub(crate) const PROBE_PORTS: [u16; 12] =
        [60000, 80, 443, 500, 1701, 4500, 1723, 1194, 51820, 3478, 5060, 5061];

    /// Timeout for resolving each server hostname.
    pub(crate) const RESOLVE_TIMEOUT: Duration = Duration::from_secs(3);

    /// Number of concurrent mapping-phase sockets.
    pub(crate) const MAPPING_SOCKET_COUNT: usize = 3;

    /// Wall-clock duration of the mapping phase.
    pub(crate) const MAPPING_PHASE_DURATION: Duration = Duration::from_secs(3);

    /// Interval between retransmissions to the same destination during the mapping phase.
    pub(crate) const MAPPING_TRANSMIT_INTERVAL: Duration = Duration::from_millis(200);

    /// Wall-clock duration of the firewall phase.
    pub(crate) const FIREWALL_PHASE_DURATION: Duration = Duration::from_secs(3);

    /// Interval between retransmissions during the firewall phase.
    pub(crate) const FIREWALL_TRANSMIT_INTERVAL: Duration = Duration::from_millis(50);
}

pub use analyzer::{analyze, Analysis};
pub use codec::{decode_reflection, decode_request, encode_reflection, encode_request, ReplyFrom};
pub use coordinator::{run, Config};
pub use endpoint::Endpoint;
pub use error::Error;
pub use net::local_ipv4_addresses;
pub use probe::{FirewallProbe, MappingProbe, ProbeSnapshot};
pub use report::{anonymize, narrative, Anonymizer};
pub use server::{serve, ServerConfig};
