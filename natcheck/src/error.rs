//! Error taxonomy for the probe engine.
//!
//! This mirrors the flat, single-enum shape `portmapper::ProbeError` uses rather than a
//! tree of per-module error types, since the whole probe engine lives in one crate.
//! Notably absent as variants: a read timeout (never an error — it is the signal that a
//! phase has ended), a failed transmit (counted internally at `trace` level and never
//! surfaced, since a single send failing against a firewalled destination is expected),
//! and "no working destination" / "no data" (both are facts the analyzer reports, not
//! failures the caller must handle).

use std::net::Ipv4Addr;

#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    #[error("failed to resolve {host}")]
    ResolveFailed {
        host: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to bind UDP socket on {local_ip}")]
    SocketBindFailed {
        local_ip: Ipv4Addr,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to receive on socket bound to {local_ip}")]
    ReceiveFailed {
        local_ip: Ipv4Addr,
        #[source]
        source: std::io::Error,
    },

    #[error("server requires at least two distinct public IPv4 listener addresses")]
    InsufficientPublicAddresses,

    #[error("unknown output format {0:?}")]
    UnknownFormat(String),
}
