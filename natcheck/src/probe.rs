//! The raw observations the two probe phases produce, before analysis.

use std::net::Ipv4Addr;

use serde::Serialize;

use crate::endpoint::Endpoint;

/// One observation made by a mapping-phase socket against one destination.
///
/// Immutable once constructed; a probe's identity for deduplication purposes is the
/// 4-tuple `(local, mapped, remote, timeout)`, compared structurally (the derived
/// `PartialEq` already does this field-by-field, which is equivalent to the spec's
/// "rendered as text" definition since `Endpoint`'s `Display` is injective on its
/// fields).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct MappingProbe {
    /// The client socket's local endpoint at the time of the probe.
    pub local: Endpoint,
    /// The public endpoint the server observed the packet arriving from. `None` iff
    /// `timeout` is true.
    pub mapped: Option<Endpoint>,
    /// The destination this probe was sent to.
    pub remote: Endpoint,
    /// True iff no valid reply was ever received from `remote` on `local`'s socket
    /// during the mapping phase.
    pub timeout: bool,
}

impl MappingProbe {
    pub(crate) fn received(local: Endpoint, mapped: Endpoint, remote: Endpoint) -> Self {
        Self {
            local,
            mapped: Some(mapped),
            remote,
            timeout: false,
        }
    }

    pub(crate) fn timed_out(local: Endpoint, remote: Endpoint) -> Self {
        Self {
            local,
            mapped: None,
            remote,
            timeout: true,
        }
    }
}

/// The single firewall-phase observation, if the mapping phase ever handed the
/// firewall prober a working destination.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FirewallProbe {
    /// The firewall-phase socket's local endpoint.
    pub local: Endpoint,
    /// The single destination probed throughout the firewall window.
    pub remote: Endpoint,
    /// Distinct source endpoints inbound frames were received from, in first-seen
    /// order.
    pub received: Vec<Endpoint>,
}

/// The raw result of a full probe run: everything the analyzer needs and nothing it
/// computes. Corresponds to §3's `Result` record; renamed to avoid colliding with
/// `std::result::Result`.
#[derive(Debug, Clone, Serialize)]
pub struct ProbeSnapshot {
    /// The host's own IPv4 addresses, gathered once at the start of the run.
    pub local_ips: Vec<Ipv4Addr>,
    /// Every mapping probe emitted, ordered contiguously per socket in socket-start
    /// order — the analyzer's `mapping_varies_by_dest_*` predicates depend on this
    /// ordering and must never see interleaved sockets.
    pub mapping: Vec<MappingProbe>,
    /// The firewall probe, if a working destination arrived in time.
    pub firewall: Option<FirewallProbe>,
}
