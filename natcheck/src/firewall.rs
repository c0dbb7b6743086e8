//! The firewall prober (§4.4): given one working destination, solicit replies from
//! varied source (IP, port) tuples and record what actually arrives back.

use std::collections::HashSet;
use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;

use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::trace;

use crate::codec::{decode_reflection, encode_request, ReplyFrom};
use crate::endpoint::{ipv4_endpoint, Endpoint};
use crate::error::Error;
use crate::probe::FirewallProbe;

#[derive(Debug, Clone, Copy)]
pub struct FirewallPhaseConfig {
    pub phase_duration: Duration,
    pub transmit_interval: Duration,
}

/// Waits for the mapping phase to hand over a working destination (giving up after
/// `working_wait` with `Ok(None)`, which is the documented non-fatal
/// `NoWorkingDestination` outcome), then runs the firewall window against it.
pub async fn run(
    mut working_rx: mpsc::Receiver<Endpoint>,
    working_wait: Duration,
    config: FirewallPhaseConfig,
    local_ip: Ipv4Addr,
) -> Result<Option<FirewallProbe>, Error> {
    let remote = match tokio::time::timeout(working_wait, working_rx.recv()).await {
        Ok(Some(dest)) => dest,
        Ok(None) | Err(_) => return Ok(None),
    };

    let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0))
        .await
        .map_err(|source| Error::SocketBindFailed { local_ip, source })?;
    let local_port = socket
        .local_addr()
        .map_err(|source| Error::SocketBindFailed { local_ip, source })?
        .port();
    let local = Endpoint::new(local_ip, local_port);
    let addr: SocketAddr = remote.into();

    let deadline = Instant::now() + config.phase_duration;
    let mut cycle: u64 = 0;
    let mut received = Vec::new();
    let mut seen = HashSet::new();
    let mut buf = [0u8; 512];

    if Instant::now() < deadline {
        send_cycle(&socket, addr, cycle).await;
        cycle += 1;
    }

    let mut ticker = tokio::time::interval(config.transmit_interval);
    ticker.tick().await; // consume the immediate first tick; we already sent once.

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if Instant::now() >= deadline {
                    break;
                }
                send_cycle(&socket, addr, cycle).await;
                cycle += 1;
            }
            res = socket.recv_from(&mut buf) => {
                match res {
                    Ok((n, from)) => {
                        if let Some(from_ep) = ipv4_endpoint(from) {
                            if decode_reflection(&buf[..n]).is_some() && seen.insert(from_ep) {
                                received.push(from_ep);
                            }
                        }
                    }
                    Err(source) => return Err(Error::ReceiveFailed { local_ip, source }),
                }
            }
            _ = tokio::time::sleep_until(deadline) => break,
        }
    }

    Ok(Some(FirewallProbe {
        local,
        remote,
        received,
    }))
}

async fn send_cycle(socket: &UdpSocket, addr: SocketAddr, cycle: u64) {
    let frame = encode_request(ReplyFrom::for_cycle(cycle));
    if let Err(error) = socket.send_to(&frame, addr).await {
        trace!(%addr, %error, "firewall transmit failed");
    }
}
