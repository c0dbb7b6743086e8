//! Wire codec for the two frame shapes the probe protocol exchanges.
//!
//! Frames are distinguished purely by length: a 180-byte request travels
//! client → server, an 18-byte reflection travels server → client. Anything
//! else received on either side is silently ignored.

use std::net::{Ipv4Addr, Ipv6Addr};

use crate::endpoint::Endpoint;

/// Size in bytes of a request frame (client → server).
pub const REQUEST_LEN: usize = 180;
/// Size in bytes of a reflection frame (server → client).
pub const REFLECTION_LEN: usize = 18;

const VARY_IP_BIT: u8 = 0b01;
const VARY_PORT_BIT: u8 = 0b10;

/// Which source the client is asking the server to reply from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReplyFrom {
    pub vary_ip: bool,
    pub vary_port: bool,
}

impl ReplyFrom {
    /// The mapping-phase request: vary nothing, reply from the addressed socket.
    pub const SAME: ReplyFrom = ReplyFrom {
        vary_ip: false,
        vary_port: false,
    };

    /// The firewall-phase request cycles through all four combinations, in order,
    /// as `0, 1, 2, 3, 0, 1, ...` across successive transmissions.
    pub fn for_cycle(cycle: u64) -> ReplyFrom {
        let bits = (cycle % 4) as u8;
        ReplyFrom {
            vary_ip: bits & VARY_IP_BIT != 0,
            vary_port: bits & VARY_PORT_BIT != 0,
        }
    }
}

/// Encodes a 180-byte request frame. Only byte 0 is meaningful; the remainder is
/// zeroed, which the server does not constrain.
pub fn encode_request(reply_from: ReplyFrom) -> [u8; REQUEST_LEN] {
    let mut buf = [0u8; REQUEST_LEN];
    let mut flags = 0u8;
    if reply_from.vary_ip {
        flags |= VARY_IP_BIT;
    }
    if reply_from.vary_port {
        flags |= VARY_PORT_BIT;
    }
    buf[0] = flags;
    buf
}

/// Decodes a request frame received by the server. Returns `None` if `bytes` is not
/// exactly [`REQUEST_LEN`] long.
pub fn decode_request(bytes: &[u8]) -> Option<ReplyFrom> {
    if bytes.len() != REQUEST_LEN {
        return None;
    }
    let flags = bytes[0];
    Some(ReplyFrom {
        vary_ip: flags & VARY_IP_BIT != 0,
        vary_port: flags & VARY_PORT_BIT != 0,
    })
}

/// Encodes an 18-byte reflection frame reporting the client's observed public endpoint.
pub fn encode_reflection(observed: Endpoint) -> [u8; REFLECTION_LEN] {
    let mut buf = [0u8; REFLECTION_LEN];
    let mapped: Ipv6Addr = observed.ip.to_ipv6_mapped();
    buf[0..16].copy_from_slice(&mapped.octets());
    buf[16..18].copy_from_slice(&observed.port.to_be_bytes());
    buf
}

/// Decodes a reflection frame. Returns `None` if `bytes` is not exactly
/// [`REFLECTION_LEN`] long, or if the embedded address is not an IPv4-in-IPv6-mapped
/// form.
pub fn decode_reflection(bytes: &[u8]) -> Option<Endpoint> {
    if bytes.len() != REFLECTION_LEN {
        return None;
    }
    let mut ip_bytes = [0u8; 16];
    ip_bytes.copy_from_slice(&bytes[0..16]);
    let ip: Ipv4Addr = Ipv6Addr::from(ip_bytes).to_ipv4_mapped()?;
    let port = u16::from_be_bytes([bytes[16], bytes[17]]);
    Some(Endpoint::new(ip, port))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reflection_round_trips() {
        let ep = Endpoint::new(Ipv4Addr::new(203, 0, 113, 7), 51820);
        let frame = encode_reflection(ep);
        assert_eq!(frame.len(), REFLECTION_LEN);
        assert_eq!(decode_reflection(&frame), Some(ep));
    }

    #[test]
    fn reflection_rejects_wrong_length() {
        assert_eq!(decode_reflection(&[0u8; 17]), None);
        assert_eq!(decode_reflection(&[0u8; 19]), None);
    }

    #[test]
    fn request_encodes_flag_bits() {
        let frame = encode_request(ReplyFrom {
            vary_ip: true,
            vary_port: false,
        });
        assert_eq!(frame.len(), REQUEST_LEN);
        assert_eq!(frame[0], VARY_IP_BIT);
        assert!(frame[1..].iter().all(|&b| b == 0));

        let decoded = decode_request(&frame).unwrap();
        assert!(decoded.vary_ip);
        assert!(!decoded.vary_port);
    }

    #[test]
    fn firewall_cycle_visits_all_four_combinations_in_order() {
        let expected = [
            ReplyFrom {
                vary_ip: false,
                vary_port: false,
            },
            ReplyFrom {
                vary_ip: true,
                vary_port: false,
            },
            ReplyFrom {
                vary_ip: false,
                vary_port: true,
            },
            ReplyFrom {
                vary_ip: true,
                vary_port: true,
            },
        ];
        for (cycle, want) in expected.iter().enumerate() {
            assert_eq!(ReplyFrom::for_cycle(cycle as u64), *want);
        }
        // and it repeats
        assert_eq!(ReplyFrom::for_cycle(4), expected[0]);
    }

    #[test]
    fn request_ignores_wrong_length() {
        assert_eq!(decode_request(&[0u8; 179]), None);
    }
}
