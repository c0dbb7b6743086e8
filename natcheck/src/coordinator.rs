//! The probe coordinator (§4.5): resolves servers, builds the destination set, and
//! runs the mapping and firewall phases to completion against a shared deadline
//! handoff.

use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::task::AbortOnDropHandle;
use tracing::{debug, info, instrument};

use crate::defaults;
use crate::destinations;
use crate::error::Error;
use crate::firewall::{self, FirewallPhaseConfig};
use crate::mapper::{self, MappingPhaseConfig};
use crate::net;
use crate::probe::ProbeSnapshot;

/// All tuning knobs for a single probe run. `Default` matches §6's documented
/// defaults exactly.
#[derive(Debug, Clone)]
pub struct Config {
    /// Hostnames of the cooperating reflector servers. Each is resolved to every
    /// IPv4 address it reports; all of them are crossed with `ports`.
    pub servers: Vec<String>,
    /// Ports probed against every resolved server IP.
    pub ports: Vec<u16>,
    /// Timeout for resolving each server hostname.
    pub resolve_timeout: Duration,
    /// Number of concurrent mapping-phase sockets.
    pub socket_count: usize,
    /// Wall-clock duration of the mapping phase.
    pub mapping_phase_duration: Duration,
    /// Interval between retransmissions to the same destination during the mapping
    /// phase.
    pub mapping_transmit_interval: Duration,
    /// Wall-clock duration of the firewall phase.
    pub firewall_phase_duration: Duration,
    /// Interval between retransmissions during the firewall phase.
    pub firewall_transmit_interval: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            servers: vec![
                "natcheck-server-a.example".to_string(),
                "natcheck-server-b.example".to_string(),
            ],
            ports: defaults::PROBE_PORTS.to_vec(),
            resolve_timeout: defaults::RESOLVE_TIMEOUT,
            socket_count: defaults::MAPPING_SOCKET_COUNT,
            mapping_phase_duration: defaults::MAPPING_PHASE_DURATION,
            mapping_transmit_interval: defaults::MAPPING_TRANSMIT_INTERVAL,
            firewall_phase_duration: defaults::FIREWALL_PHASE_DURATION,
            firewall_transmit_interval: defaults::FIREWALL_TRANSMIT_INTERVAL,
        }
    }
}

/// Runs a full probe: resolves `config.servers`, builds the destination set, and runs
/// the mapping and firewall phases concurrently to completion.
///
/// Any fatal I/O error aborts the run entirely; no partial [`ProbeSnapshot`] is ever
/// returned on error, per §7.
#[instrument(skip(config), fields(servers = ?config.servers, ports = config.ports.len()))]
pub async fn run(config: &Config) -> Result<ProbeSnapshot, Error> {
    let local_ips = net::local_ipv4_addresses();
    debug!(?local_ips, "enumerated local IPv4 addresses");

    let mut server_ips = Vec::new();
    for host in &config.servers {
        let resolved = resolve_host(host, config.resolve_timeout).await?;
        debug!(%host, ?resolved, "resolved server");
        server_ips.extend(resolved);
    }

    let destinations = Arc::new(destinations::build(&server_ips, &config.ports));
    info!(count = destinations.len(), "built destination set");

    // A host may have no usable local IPv4 address at all (e.g. a stripped-down test
    // sandbox); the probe still runs, it will simply report `no_nat = false` for
    // every mapping since nothing ever matches `local_ips`.
    let primary_local_ip = local_ips.first().copied().unwrap_or(Ipv4Addr::UNSPECIFIED);

    let (working_tx, working_rx) = mpsc::channel(1);

    // Start the firewall phase first: it blocks on the handoff until either a
    // mapping socket offers a working destination, or every mapping socket finishes
    // (at which point `working_tx` is dropped and `recv` resolves to `None`).
    // Wrapped so that if the mapping phase errors out below, returning early drops
    // this handle and aborts the still-running firewall task instead of leaking it.
    let firewall_handle = AbortOnDropHandle::new(tokio::spawn(firewall::run(
        working_rx,
        config.mapping_phase_duration,
        FirewallPhaseConfig {
            phase_duration: config.firewall_phase_duration,
            transmit_interval: config.firewall_transmit_interval,
        },
        primary_local_ip,
    )));

    let mapping = mapper::run(
        destinations,
        MappingPhaseConfig {
            socket_count: config.socket_count,
            phase_duration: config.mapping_phase_duration,
            transmit_interval: config.mapping_transmit_interval,
        },
        primary_local_ip,
        working_tx,
    )
    .await?;

    let firewall = firewall_handle.await.expect("firewall task panicked")?;

    Ok(ProbeSnapshot {
        local_ips,
        mapping,
        firewall,
    })
}

async fn resolve_host(host: &str, timeout: Duration) -> Result<Vec<Ipv4Addr>, Error> {
    match tokio::time::timeout(timeout, net::resolve_ipv4(host, 0)).await {
        Ok(result) => result,
        Err(_elapsed) => Err(Error::ResolveFailed {
            host: host.to_string(),
            source: std::io::Error::new(std::io::ErrorKind::TimedOut, "resolve timed out"),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_matches_documented_defaults() {
        let config = Config::default();
        assert_eq!(config.socket_count, 3);
        assert_eq!(config.mapping_phase_duration, Duration::from_secs(3));
        assert_eq!(config.mapping_transmit_interval, Duration::from_millis(200));
        assert_eq!(config.firewall_phase_duration, Duration::from_secs(3));
        assert_eq!(config.firewall_transmit_interval, Duration::from_millis(50));
        assert_eq!(config.resolve_timeout, Duration::from_secs(3));
        assert_eq!(
            config.ports,
            vec![60000, 80, 443, 500, 1701, 4500, 1723, 1194, 51820, 3478, 5060, 5061]
        );
    }

    #[tokio::test]
    async fn run_against_localhost_returns_a_snapshot_without_panicking() {
        // No server will actually be reachable at these bogus hostnames, so this
        // exercises the resolve-failure path end to end.
        let config = Config {
            servers: vec!["definitely-not-a-real-host.invalid".to_string()],
            ports: vec![1],
            resolve_timeout: Duration::from_millis(500),
            socket_count: 1,
            mapping_phase_duration: Duration::from_millis(50),
            mapping_transmit_interval: Duration::from_millis(10),
            firewall_phase_duration: Duration::from_millis(50),
            firewall_transmit_interval: Duration::from_millis(10),
        };
        let result = run(&config).await;
        assert!(matches!(result, Err(Error::ResolveFailed { .. })));
    }
}
