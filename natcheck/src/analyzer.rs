//! The inference engine (§4.6/§4.7): a pure function from a [`ProbeSnapshot`] to a
//! fixed [`Analysis`] vector. No I/O, no clock, no randomness — calling it twice on
//! the same snapshot must yield identical output.

use std::collections::HashSet;

use serde::Serialize;

use crate::probe::{MappingProbe, ProbeSnapshot};

/// Minimum fraction of non-timeout probes that must preserve the source port for
/// `mapping_preserves_source_port` to be considered true.
const PORT_PRESERVATION_THRESHOLD: f64 = 0.8;

/// The fixed vector of facts the analyzer derives from a [`ProbeSnapshot`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Analysis {
    /// No mapping probes were collected, or every one timed out.
    pub no_data: bool,
    /// Every non-timeout mapping reports a `mapped.ip` that is also a local IP.
    pub no_nat: bool,
    /// Holding the remote port fixed, varying the remote IP moves the mapping.
    pub mapping_varies_by_dest_ip: bool,
    /// Holding the remote IP fixed, varying the remote port moves the mapping.
    pub mapping_varies_by_dest_port: bool,
    /// Every firewall-phase response arrived from the probed remote's IP.
    pub firewall_enforces_dest_ip: bool,
    /// Every firewall-phase response arrived from the probed remote's port.
    pub firewall_enforces_dest_port: bool,
    /// At least 80% of non-timeout probes preserved `local.port == mapped.port`.
    pub mapping_preserves_source_port: bool,
    /// More than one distinct `mapped.ip` was observed.
    pub multiple_public_ips: bool,
    /// Destination ports for which every probe, on every socket, timed out.
    pub filtered_egress: Vec<u16>,
}

/// Runs the full analysis. Pure: depends only on `snapshot`.
pub fn analyze(snapshot: &ProbeSnapshot) -> Analysis {
    let non_timeout: Vec<&MappingProbe> = snapshot.mapping.iter().filter(|p| !p.timeout).collect();

    Analysis {
        no_data: no_data(&snapshot.mapping),
        no_nat: no_nat(&snapshot.local_ips, &non_timeout),
        mapping_varies_by_dest_ip: varies_by(&snapshot.mapping, Axis::DestIp),
        mapping_varies_by_dest_port: varies_by(&snapshot.mapping, Axis::DestPort),
        firewall_enforces_dest_ip: firewall_enforces(snapshot, |remote, recv| recv.ip == remote.ip),
        firewall_enforces_dest_port: firewall_enforces(snapshot, |remote, recv| recv.port == remote.port),
        mapping_preserves_source_port: mapping_preserves_source_port(&non_timeout),
        multiple_public_ips: multiple_public_ips(&non_timeout),
        filtered_egress: filtered_egress(&snapshot.mapping),
    }
}

fn no_data(mapping: &[MappingProbe]) -> bool {
    mapping.is_empty() || mapping.iter().all(|p| p.timeout)
}

fn no_nat(local_ips: &[std::net::Ipv4Addr], non_timeout: &[&MappingProbe]) -> bool {
    let locals: HashSet<_> = local_ips.iter().copied().collect();
    non_timeout
        .iter()
        .all(|p| locals.contains(&p.mapped.expect("non-timeout probe always has mapped").ip))
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Axis {
    DestIp,
    DestPort,
}

/// Implements §4.6's anchor-walking scan for both `mapping_varies_by_dest_ip` and
/// `mapping_varies_by_dest_port`, parameterized on which remote field is the axis
/// under test.
fn varies_by(mapping: &[MappingProbe], axis: Axis) -> bool {
    struct Anchor {
        local: crate::endpoint::Endpoint,
        axis_value: u32,
        mapped: crate::endpoint::Endpoint,
    }

    let axis_value = |p: &MappingProbe| -> u32 {
        match axis {
            Axis::DestIp => u32::from(p.remote.ip),
            Axis::DestPort => u32::from(p.remote.port),
        }
    };

    let mut anchor: Option<Anchor> = None;

    for probe in mapping.iter().filter(|p| !p.timeout) {
        let mapped = probe.mapped.expect("non-timeout probe always has mapped");
        match &anchor {
            None => {
                anchor = Some(Anchor {
                    local: probe.local,
                    axis_value: axis_value(probe),
                    mapped,
                });
            }
            Some(a) if a.local != probe.local => {
                anchor = Some(Anchor {
                    local: probe.local,
                    axis_value: axis_value(probe),
                    mapped,
                });
            }
            Some(a) if a.axis_value == axis_value(probe) => {
                // Same axis value as the anchor: uninformative, skip.
            }
            Some(a) => {
                if a.mapped != mapped {
                    return true;
                }
            }
        }
    }

    false
}

fn firewall_enforces(
    snapshot: &ProbeSnapshot,
    matches: impl Fn(&crate::endpoint::Endpoint, &crate::endpoint::Endpoint) -> bool,
) -> bool {
    let Some(firewall) = &snapshot.firewall else {
        return false;
    };
    // Vacuously true on an empty set: no counterexample was observed (§9).
    firewall.received.iter().all(|recv| matches(&firewall.remote, recv))
}

fn mapping_preserves_source_port(non_timeout: &[&MappingProbe]) -> bool {
    if non_timeout.is_empty() {
        return false;
    }
    let preserved = non_timeout
        .iter()
        .filter(|p| {
            p.local.port
                == p.mapped
                    .expect("non-timeout probe always has mapped")
                    .port
        })
        .count();
    (preserved as f64) / (non_timeout.len() as f64) >= PORT_PRESERVATION_THRESHOLD
}

fn multiple_public_ips(non_timeout: &[&MappingProbe]) -> bool {
    let ips: HashSet<_> = non_timeout
        .iter()
        .map(|p| p.mapped.expect("non-timeout probe always has mapped").ip)
        .collect();
    ips.len() > 1
}

fn filtered_egress(mapping: &[MappingProbe]) -> Vec<u16> {
    let mut working: HashSet<u16> = mapping
        .iter()
        .filter(|p| !p.timeout)
        .map(|p| p.remote.port)
        .collect();

    let mut filtered = Vec::new();
    for probe in mapping.iter().filter(|p| p.timeout) {
        let port = probe.remote.port;
        if working.insert(port) {
            filtered.push(port);
        }
    }
    filtered.sort_unstable();
    filtered
}

#[cfg(test)]
mod tests {
    use std::net::Ipv4Addr;

    use super::*;
    use crate::endpoint::Endpoint;

    fn ep(ip: [u8; 4], port: u16) -> Endpoint {
        Endpoint::new(Ipv4Addr::from(ip), port)
    }

    fn snapshot(local_ips: Vec<Ipv4Addr>, mapping: Vec<MappingProbe>, firewall: Option<crate::probe::FirewallProbe>) -> ProbeSnapshot {
        ProbeSnapshot {
            local_ips,
            mapping,
            firewall,
        }
    }

    #[test]
    fn scenario_1_empty_probes_means_no_data() {
        let snap = snapshot(vec![], vec![], None);
        assert!(analyze(&snap).no_data);
    }

    #[test]
    fn scenario_2_mapping_to_local_ip_means_no_nat() {
        let local = Ipv4Addr::new(1, 2, 3, 4);
        let probe = MappingProbe::received(ep([1, 2, 3, 4], 5000), ep([1, 2, 3, 4], 5000), ep([8, 8, 8, 8], 443));
        let snap = snapshot(vec![local], vec![probe], None);
        assert!(analyze(&snap).no_nat);
        assert!(!analyze(&snap).no_data);
    }

    #[test]
    fn scenario_3_varies_by_dest_ip_only() {
        let local = ep([10, 0, 0, 1], 5000);
        let p1 = MappingProbe::received(local, ep([9, 9, 9, 9], 6000), ep([1, 1, 1, 1], 443));
        let p2 = MappingProbe::received(local, ep([9, 9, 9, 10], 6000), ep([2, 2, 2, 2], 443));
        let snap = snapshot(vec![], vec![p1, p2], None);
        let analysis = analyze(&snap);
        assert!(analysis.mapping_varies_by_dest_ip);
        assert!(!analysis.mapping_varies_by_dest_port);
    }

    #[test]
    fn scenario_4_varies_by_dest_port_only() {
        let local = ep([10, 0, 0, 1], 5000);
        let p1 = MappingProbe::received(local, ep([9, 9, 9, 9], 6000), ep([3, 3, 3, 3], 80));
        let p2 = MappingProbe::received(local, ep([9, 9, 9, 9], 6001), ep([3, 3, 3, 3], 443));
        let snap = snapshot(vec![], vec![p1, p2], None);
        let analysis = analyze(&snap);
        assert!(analysis.mapping_varies_by_dest_port);
        assert!(!analysis.mapping_varies_by_dest_ip);
    }

    #[test]
    fn scenario_5_firewall_enforcement() {
        let remote = ep([8, 8, 8, 8], 443);
        let strict = crate::probe::FirewallProbe {
            local: ep([10, 0, 0, 1], 4000),
            remote,
            received: vec![ep([8, 8, 8, 8], 443)],
        };
        let snap = snapshot(vec![], vec![], Some(strict));
        let analysis = analyze(&snap);
        assert!(analysis.firewall_enforces_dest_ip);
        assert!(analysis.firewall_enforces_dest_port);

        let port_only = crate::probe::FirewallProbe {
            local: ep([10, 0, 0, 1], 4000),
            remote,
            received: vec![ep([8, 8, 8, 8], 443), ep([8, 8, 8, 8], 1000)],
        };
        let snap = snapshot(vec![], vec![], Some(port_only));
        let analysis = analyze(&snap);
        assert!(analysis.firewall_enforces_dest_ip);
        assert!(!analysis.firewall_enforces_dest_port);
    }

    #[test]
    fn firewall_enforcement_is_vacuously_true_on_empty_received() {
        let remote = ep([8, 8, 8, 8], 443);
        let empty = crate::probe::FirewallProbe {
            local: ep([10, 0, 0, 1], 4000),
            remote,
            received: vec![],
        };
        let snap = snapshot(vec![], vec![], Some(empty));
        let analysis = analyze(&snap);
        assert!(analysis.firewall_enforces_dest_ip);
        assert!(analysis.firewall_enforces_dest_port);
    }

    #[test]
    fn firewall_enforcement_is_false_without_a_firewall_probe() {
        let snap = snapshot(vec![], vec![], None);
        let analysis = analyze(&snap);
        assert!(!analysis.firewall_enforces_dest_ip);
        assert!(!analysis.firewall_enforces_dest_port);
    }

    #[test]
    fn scenario_6_filtered_egress() {
        let local = ep([10, 0, 0, 1], 5000);
        let mapping = vec![
            MappingProbe::received(local, ep([9, 9, 9, 9], 6000), ep([1, 1, 1, 1], 443)),
            MappingProbe::received(local, ep([9, 9, 9, 9], 6000), ep([2, 2, 2, 2], 80)),
            MappingProbe::timed_out(local, ep([3, 3, 3, 3], 5060)),
            MappingProbe::timed_out(local, ep([4, 4, 4, 4], 5060)),
        ];
        let snap = snapshot(vec![], mapping, None);
        assert_eq!(analyze(&snap).filtered_egress, vec![5060]);
    }

    #[test]
    fn port_preservation_threshold_and_zero_sample_case() {
        let local = ep([10, 0, 0, 1], 5000);
        // 4 out of 5 preserve the port == 0.8, right at the threshold.
        let mapping = vec![
            MappingProbe::received(local, ep([1, 1, 1, 1], 5000), ep([9, 9, 9, 9], 1)),
            MappingProbe::received(local, ep([1, 1, 1, 2], 5000), ep([9, 9, 9, 9], 2)),
            MappingProbe::received(local, ep([1, 1, 1, 3], 5000), ep([9, 9, 9, 9], 3)),
            MappingProbe::received(local, ep([1, 1, 1, 4], 5000), ep([9, 9, 9, 9], 4)),
            MappingProbe::received(local, ep([1, 1, 1, 5], 6001), ep([9, 9, 9, 9], 5)),
        ];
        let snap = snapshot(vec![], mapping, None);
        assert!(analyze(&snap).mapping_preserves_source_port);

        let snap_empty = snapshot(vec![], vec![], None);
        assert!(!analyze(&snap_empty).mapping_preserves_source_port);
    }

    #[test]
    fn multiple_public_ips_requires_more_than_one_distinct_mapped_ip() {
        let local = ep([10, 0, 0, 1], 5000);
        let one_ip = vec![
            MappingProbe::received(local, ep([9, 9, 9, 9], 1), ep([1, 1, 1, 1], 1)),
            MappingProbe::received(local, ep([9, 9, 9, 9], 2), ep([2, 2, 2, 2], 1)),
        ];
        assert!(!analyze(&snapshot(vec![], one_ip, None)).multiple_public_ips);

        let two_ips = vec![
            MappingProbe::received(local, ep([9, 9, 9, 9], 1), ep([1, 1, 1, 1], 1)),
            MappingProbe::received(local, ep([9, 9, 9, 8], 1), ep([2, 2, 2, 2], 1)),
        ];
        assert!(analyze(&snapshot(vec![], two_ips, None)).multiple_public_ips);
    }

    #[test]
    fn analysis_is_pure() {
        let local = ep([10, 0, 0, 1], 5000);
        let mapping = vec![MappingProbe::received(local, ep([9, 9, 9, 9], 1), ep([1, 1, 1, 1], 1))];
        let snap = snapshot(vec![Ipv4Addr::new(10, 0, 0, 1)], mapping, None);
        assert_eq!(analyze(&snap), analyze(&snap));
    }
}
