//! The mapping prober (§4.3): N concurrent UDP sockets, each hammering every
//! destination until the phase deadline and recording what comes back.

use std::collections::HashSet;
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::task::AbortOnDropHandle;
use tracing::trace;

use crate::codec::{decode_reflection, encode_request, ReplyFrom};
use crate::endpoint::{ipv4_endpoint, Endpoint};
use crate::error::Error;
use crate::probe::MappingProbe;

/// Tuning for the mapping phase: how many sockets, for how long, at what cadence.
#[derive(Debug, Clone, Copy)]
pub struct MappingPhaseConfig {
    pub socket_count: usize,
    pub phase_duration: Duration,
    pub transmit_interval: Duration,
}

/// Runs the mapping phase to completion and returns every probe, ordered contiguously
/// per socket in socket-start order (required by the analyzer, see §4.6/§9).
///
/// `working_tx` receives the first distinct destination any socket gets a reflection
/// from; it is a capacity-1 channel, so only the very first offer across every socket
/// is ever delivered — later `try_send` calls are dropped, which is intentional.
pub async fn run(
    destinations: Arc<Vec<Endpoint>>,
    config: MappingPhaseConfig,
    local_ip: Ipv4Addr,
    working_tx: mpsc::Sender<Endpoint>,
) -> Result<Vec<MappingProbe>, Error> {
    let deadline = Instant::now() + config.phase_duration;

    // Each handle is wrapped so that if one socket errors and we return early below,
    // dropping the remaining not-yet-awaited handles aborts those sockets (and their
    // transmitter sub-tasks, via `run_socket`'s own cleanup) instead of leaking them.
    let mut handles = Vec::with_capacity(config.socket_count);
    for _ in 0..config.socket_count {
        let destinations = destinations.clone();
        let working_tx = working_tx.clone();
        handles.push(AbortOnDropHandle::new(tokio::spawn(run_socket(
            destinations,
            deadline,
            config.transmit_interval,
            local_ip,
            working_tx,
        ))));
    }

    // Await in spawn order, not completion order: the analyzer requires each
    // socket's probes to stay contiguous and in socket-start order.
    let mut probes = Vec::new();
    for handle in handles {
        let socket_probes = handle.await.expect("mapping socket task panicked")?;
        probes.extend(socket_probes);
    }
    Ok(probes)
}

async fn run_socket(
    destinations: Arc<Vec<Endpoint>>,
    deadline: Instant,
    transmit_interval: Duration,
    local_ip: Ipv4Addr,
    working_tx: mpsc::Sender<Endpoint>,
) -> Result<Vec<MappingProbe>, Error> {
    let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0))
        .await
        .map_err(|source| Error::SocketBindFailed { local_ip, source })?;
    let local_port = socket
        .local_addr()
        .map_err(|source| Error::SocketBindFailed { local_ip, source })?
        .port();
    let socket = Arc::new(socket);
    let local = Endpoint::new(local_ip, local_port);

    let transmitters: Vec<_> = destinations
        .iter()
        .map(|&dest| tokio::spawn(transmit_loop(socket.clone(), dest, deadline, transmit_interval)))
        .collect();

    let mut probes = Vec::new();
    let mut seen = HashSet::new();
    let mut responded = HashSet::new();
    let mut buf = [0u8; 512];

    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            break;
        }
        match tokio::time::timeout(remaining, socket.recv_from(&mut buf)).await {
            Ok(Ok((n, from))) => {
                let Some(remote) = ipv4_endpoint(from) else {
                    continue;
                };
                let Some(mapped) = decode_reflection(&buf[..n]) else {
                    continue;
                };
                let candidate = MappingProbe::received(local, mapped, remote);
                if seen.insert(candidate) {
                    // Best-effort offer; the channel holds at most one and silently
                    // discards the rest, which is exactly what we want here.
                    let _ = working_tx.try_send(remote);
                    responded.insert(remote);
                    probes.push(candidate);
                }
            }
            Ok(Err(source)) => {
                for handle in transmitters {
                    handle.abort();
                }
                return Err(Error::ReceiveFailed { local_ip, source });
            }
            Err(_elapsed) => break,
        }
    }

    for handle in transmitters {
        handle.abort();
    }

    for &dest in destinations.iter() {
        if !responded.contains(&dest) {
            probes.push(MappingProbe::timed_out(local, dest));
        }
    }

    Ok(probes)
}

async fn transmit_loop(socket: Arc<UdpSocket>, dest: Endpoint, deadline: Instant, interval: Duration) {
    let frame = encode_request(ReplyFrom::SAME);
    let addr: SocketAddr = dest.into();

    if Instant::now() >= deadline {
        return;
    }
    if let Err(error) = socket.send_to(&frame, addr).await {
        trace!(%dest, %error, "mapping transmit failed");
    }

    let mut ticker = tokio::time::interval(interval);
    ticker.tick().await; // interval's first tick fires immediately; we already sent.

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if Instant::now() >= deadline {
                    break;
                }
                if let Err(error) = socket.send_to(&frame, addr).await {
                    trace!(%dest, %error, "mapping transmit failed");
                }
            }
            _ = tokio::time::sleep_until(deadline) => break,
        }
    }
}
