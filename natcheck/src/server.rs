//! The reflector server (§4.9/§6): the interoperating peer the prober talks to.
//!
//! One task per configured listener, all sharing a view of every other listener so a
//! request arriving on one can be answered from whichever listener the request's flag
//! bits select.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::UdpSocket;
use tokio_util::task::AbortOnDropHandle;
use tracing::{debug, info, trace};

use crate::codec::{decode_request, encode_reflection, ReplyFrom, REQUEST_LEN};
use crate::endpoint::{ipv4_endpoint, Endpoint};
use crate::error::Error;
use crate::net::is_global_unicast_v4;

/// The set of (public IP, port) pairs the server listens on.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub listeners: Vec<Endpoint>,
}

/// Runs the reflector server until cancelled or a fatal I/O error occurs.
///
/// Refuses to start unless `config.listeners` names at least two distinct public
/// IPv4 addresses (§6's server prerequisite) — "public" excludes RFC 1918 ranges and
/// non-global-unicast addresses, per [`is_global_unicast_v4`].
pub async fn serve(config: &ServerConfig) -> Result<(), Error> {
    let distinct_ips: std::collections::HashSet<_> = config.listeners.iter().map(|ep| ep.ip).collect();
    if distinct_ips.len() < 2 || !distinct_ips.iter().all(|&ip| is_global_unicast_v4(ip)) {
        return Err(Error::InsufficientPublicAddresses);
    }

    let mut sockets = Vec::with_capacity(config.listeners.len());
    for ep in &config.listeners {
        let socket = UdpSocket::bind(SocketAddr::from(*ep))
            .await
            .map_err(|source| Error::SocketBindFailed { local_ip: ep.ip, source })?;
        sockets.push(socket);
    }
    info!(listeners = config.listeners.len(), "reflector server listening");

    run_listeners(Arc::new(sockets), Arc::new(config.listeners.clone())).await
}

/// The actual receive/select/reply loop, factored out so tests can exercise it
/// against loopback sockets without tripping the public-address check in [`serve`].
async fn run_listeners(sockets: Arc<Vec<UdpSocket>>, listeners: Arc<Vec<Endpoint>>) -> Result<(), Error> {
    // Wrapped so that one listener erroring and returning early below aborts every
    // other still-running listener task instead of leaving them bound and receiving.
    let mut handles = Vec::with_capacity(sockets.len());
    for idx in 0..sockets.len() {
        let sockets = sockets.clone();
        let listeners = listeners.clone();
        handles.push(AbortOnDropHandle::new(tokio::spawn(async move {
            serve_one(idx, sockets, listeners).await
        })));
    }
    for handle in handles {
        handle.await.expect("reflector listener task panicked")?;
    }
    Ok(())
}

async fn serve_one(idx: usize, sockets: Arc<Vec<UdpSocket>>, listeners: Arc<Vec<Endpoint>>) -> Result<(), Error> {
    let socket = &sockets[idx];
    let received_on = listeners[idx];
    let mut buf = [0u8; REQUEST_LEN];
    loop {
        let (n, from) = socket
            .recv_from(&mut buf)
            .await
            .map_err(|source| Error::ReceiveFailed { local_ip: received_on.ip, source })?;

        let Some(client) = ipv4_endpoint(from) else {
            continue;
        };
        let Some(reply_from) = decode_request(&buf[..n]) else {
            continue;
        };
        let Some(response_idx) = select_listener(&listeners, received_on, reply_from) else {
            trace!(%client, ?reply_from, "no listener satisfies the requested vary combination");
            continue;
        };

        let frame = encode_reflection(client);
        let response_socket = &sockets[response_idx];
        if let Err(error) = response_socket.send_to(&frame, SocketAddr::from(client)).await {
            debug!(%client, %error, "failed to send reflection");
        }
    }
}

/// Picks the listener `S` such that `(S.ip == received_on.ip) != vary_ip` and
/// `(S.port == received_on.port) != vary_port`, per §6. Returns `None` if no
/// configured listener satisfies both constraints simultaneously.
fn select_listener(listeners: &[Endpoint], received_on: Endpoint, reply_from: ReplyFrom) -> Option<usize> {
    listeners.iter().position(|&s| {
        (s.ip == received_on.ip) != reply_from.vary_ip && (s.port == received_on.port) != reply_from.vary_port
    })
}
