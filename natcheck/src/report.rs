//! Human-readable narrative (§4.8) and IP anonymization for publishable output.

use std::collections::HashMap;
use std::net::Ipv4Addr;

use crate::analyzer::Analysis;
use crate::endpoint::Endpoint;
use crate::probe::{FirewallProbe, MappingProbe, ProbeSnapshot};

/// Produces the deterministic narrative paragraphs for an analysis.
///
/// Scenario 1 of the testable-properties section pins the exact opening sentence for
/// `no_data`; everything else is free-form prose over the remaining facts, always in
/// the same order: NAT mapping class, firewall class, port preservation, public IP
/// count, blocked egress.
pub fn narrative(analysis: &Analysis) -> String {
    if analysis.no_data {
        return "Probing got no useful data at all.".to_string();
    }

    let mut lines = Vec::new();

    let mapping_class = match (
        analysis.mapping_varies_by_dest_ip,
        analysis.mapping_varies_by_dest_port,
    ) {
        (false, false) if analysis.no_nat => "No NAT was detected; this host has a public IPv4 address.",
        (false, false) => "NAT mapping is endpoint-independent (3-tuple): the same public mapping is reused for every destination.",
        (true, false) => "NAT mapping depends on the destination IP (4-tuple with IP): a new mapping is allocated per remote address.",
        (false, true) => "NAT mapping depends on the destination port (4-tuple with port): a new mapping is allocated per remote port.",
        (true, true) => "NAT mapping depends on both destination IP and port (5-tuple): a new mapping is allocated per full remote endpoint.",
    };
    lines.push(mapping_class.to_string());

    let firewall_class = match (
        analysis.firewall_enforces_dest_ip,
        analysis.firewall_enforces_dest_port,
    ) {
        (false, false) => "The firewall is open: inbound packets were accepted regardless of source IP or port.",
        (true, false) => "The firewall enforces the source IP only: packets from a different IP were blocked, but a different port was accepted.",
        (false, true) => "The firewall enforces the source port only: packets from a different port were blocked, but a different IP was accepted.",
        (true, true) => "The firewall enforces both source IP and source port.",
    };
    lines.push(firewall_class.to_string());

    lines.push(if analysis.mapping_preserves_source_port {
        "The NAT preserves the client's source port in its public mapping.".to_string()
    } else {
        "The NAT does not reliably preserve the client's source port.".to_string()
    });

    lines.push(if analysis.multiple_public_ips {
        "Multiple public IP addresses were observed across sockets.".to_string()
    } else {
        "A single public IP address was observed across sockets.".to_string()
    });

    if analysis.filtered_egress.is_empty() {
        lines.push("No outbound UDP ports appeared to be filtered.".to_string());
    } else {
        let ports = analysis
            .filtered_egress
            .iter()
            .map(|p| p.to_string())
            .collect::<Vec<_>>()
            .join(", ");
        lines.push(format!("These outbound UDP ports appear filtered: {ports}."));
    }

    lines.join("\n")
}

/// Assigns fresh `1.1.b1.b2`-style addresses to every distinct, non-unspecified IPv4
/// address it sees, consistently across every call to [`Anonymizer::map`].
#[derive(Debug, Default)]
pub struct Anonymizer {
    table: HashMap<Ipv4Addr, Ipv4Addr>,
    next_b1: u8,
    next_b2: u8,
}

impl Anonymizer {
    pub fn new() -> Self {
        Self {
            table: HashMap::new(),
            next_b1: 1,
            next_b2: 1,
        }
    }

    /// Maps `ip` to its anonymized form, assigning a fresh one on first sight.
    /// Unspecified addresses pass through unchanged.
    pub fn map(&mut self, ip: Ipv4Addr) -> Ipv4Addr {
        if ip.is_unspecified() {
            return ip;
        }
        if let Some(&mapped) = self.table.get(&ip) {
            return mapped;
        }
        let assigned = Ipv4Addr::new(1, 1, self.next_b1, self.next_b2);
        if self.next_b2 == 255 {
            self.next_b2 = 1;
            self.next_b1 = if self.next_b1 == 255 { 1 } else { self.next_b1 + 1 };
        } else {
            self.next_b2 += 1;
        }
        self.table.insert(ip, assigned);
        assigned
    }

    fn map_endpoint(&mut self, ep: Endpoint) -> Endpoint {
        Endpoint::new(self.map(ep.ip), ep.port)
    }
}

/// Returns a copy of `snapshot` with every IP address consistently anonymized.
pub fn anonymize(snapshot: &ProbeSnapshot) -> ProbeSnapshot {
    let mut anon = Anonymizer::new();

    let local_ips = snapshot.local_ips.iter().map(|&ip| anon.map(ip)).collect();

    let mapping = snapshot
        .mapping
        .iter()
        .map(|p| MappingProbe {
            local: anon.map_endpoint(p.local),
            mapped: p.mapped.map(|ep| anon.map_endpoint(ep)),
            remote: anon.map_endpoint(p.remote),
            timeout: p.timeout,
        })
        .collect();

    let firewall = snapshot.firewall.as_ref().map(|fw| FirewallProbe {
        local: anon.map_endpoint(fw.local),
        remote: anon.map_endpoint(fw.remote),
        received: fw.received.iter().map(|&ep| anon.map_endpoint(ep)).collect(),
    });

    ProbeSnapshot {
        local_ips,
        mapping,
        firewall,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_data_narrative_opens_with_the_documented_sentence() {
        let analysis = Analysis {
            no_data: true,
            no_nat: false,
            mapping_varies_by_dest_ip: false,
            mapping_varies_by_dest_port: false,
            firewall_enforces_dest_ip: false,
            firewall_enforces_dest_port: false,
            mapping_preserves_source_port: false,
            multiple_public_ips: false,
            filtered_egress: vec![],
        };
        assert_eq!(narrative(&analysis), "Probing got no useful data at all.");
    }

    #[test]
    fn anonymizer_is_consistent_and_injective() {
        let mut anon = Anonymizer::new();
        let a = Ipv4Addr::new(8, 8, 8, 8);
        let b = Ipv4Addr::new(1, 2, 3, 4);

        let a1 = anon.map(a);
        let b1 = anon.map(b);
        let a2 = anon.map(a);

        assert_eq!(a1, a2, "same input must map to the same output");
        assert_ne!(a1, b1, "distinct inputs must map to distinct outputs");
        assert_eq!(a1.octets()[0..2], [1, 1]);
    }

    #[test]
    fn anonymizer_passes_through_unspecified() {
        let mut anon = Anonymizer::new();
        assert_eq!(anon.map(Ipv4Addr::UNSPECIFIED), Ipv4Addr::UNSPECIFIED);
    }

    #[test]
    fn anonymize_snapshot_is_consistent_across_fields() {
        let local = Endpoint::new(Ipv4Addr::new(10, 0, 0, 1), 5000);
        let mapped = Endpoint::new(Ipv4Addr::new(203, 0, 113, 9), 5000);
        let remote = Endpoint::new(Ipv4Addr::new(8, 8, 8, 8), 443);
        let snapshot = ProbeSnapshot {
            local_ips: vec![Ipv4Addr::new(10, 0, 0, 1)],
            mapping: vec![MappingProbe::received(local, mapped, remote)],
            firewall: Some(FirewallProbe {
                local,
                remote,
                received: vec![remote],
            }),
        };

        let anonymized = anonymize(&snapshot);
        // local_ips[0] and mapping[0].local.ip both came from the same source IP.
        assert_eq!(anonymized.local_ips[0], anonymized.mapping[0].local.ip);
        // the firewall probe's remote and the mapping probe's remote are the same IP.
        assert_eq!(
            anonymized.firewall.unwrap().remote.ip,
            anonymized.mapping[0].remote.ip
        );
    }
}
