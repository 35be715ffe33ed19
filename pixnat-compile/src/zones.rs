//! Interface / zone resolver.
//!
//! Maps an address to the firewall interface whose configured network
//! zone contains it. Every stage that needs to know which interface an
//! object "belongs to" goes through here; callers treat a miss as a
//! fatal policy error ("does not belong to any known network zone"),
//! never as something to skip.
//!
//! Lookups repeat heavily across stages, so results are cached per
//! address for the lifetime of one compilation.

use std::collections::HashMap;
use std::net::Ipv4Addr;

use ipnet::Ipv4Net;
use natpolicy_core::{AddrSpec, Policy, PolicyError};

/// Zone networks of one interface, precomputed at resolver
/// construction.
#[derive(Debug, Clone)]
struct InterfaceZone {
    interface: String,
    networks: Vec<Ipv4Net>,
}

/// Per-compilation zone lookup with an address cache.
#[derive(Debug)]
pub struct ZoneResolver {
    zones: Vec<InterfaceZone>,
    cache: HashMap<Ipv4Addr, Option<String>>,
}

impl ZoneResolver {
    /// Precompute zone networks for every interface that has a
    /// configured zone object. Interfaces without one simply never
    /// match.
    pub fn new(policy: &Policy) -> Result<Self, PolicyError> {
        let mut zones = Vec::new();
        for iface in &policy.firewall.interfaces {
            if iface.netzone.is_none() {
                continue;
            }
            zones.push(InterfaceZone {
                interface: iface.name.clone(),
                networks: policy.zone_networks(iface)?,
            });
        }
        Ok(ZoneResolver {
            zones,
            cache: HashMap::new(),
        })
    }

    /// Interface whose zone contains `addr`, preferring the most
    /// specific matching network so a default zone (0.0.0.0/0) only
    /// wins when nothing narrower does.
    pub fn interface_for_addr(&mut self, addr: Ipv4Addr) -> Option<String> {
        if let Some(cached) = self.cache.get(&addr) {
            return cached.clone();
        }
        let mut best: Option<(u8, &str)> = None;
        for zone in &self.zones {
            for net in &zone.networks {
                if net.contains(&addr) {
                    let candidate = (net.prefix_len(), zone.interface.as_str());
                    if best.map_or(true, |(len, _)| candidate.0 > len) {
                        best = Some(candidate);
                    }
                }
            }
        }
        let found = best.map(|(_, name)| name.to_string());
        self.cache.insert(addr, found.clone());
        found
    }

    /// Interface serving an operand's zone. An interface operand is its
    /// own answer; anything else resolves through its representative
    /// address, with the wildcard falling into whichever zone holds
    /// 0.0.0.0 (conventionally the default/outside zone).
    pub fn interface_for(&mut self, spec: &AddrSpec) -> Option<String> {
        if let AddrSpec::Interface { name, .. } = spec {
            return Some(name.clone());
        }
        self.interface_for_addr(spec.address().unwrap_or(Ipv4Addr::UNSPECIFIED))
    }
}
