//! Address arithmetic shared by compiler stages and conflict detectors.
//!
//! The pipeline reduces every rule element to an [`AddrSpec`] before the
//! command model is built. An `AddrSpec` is a fully resolved operand: a
//! single host, a network, an inclusive address range, a firewall
//! interface, or the wildcard `Any`. All overlap and containment logic
//! used by the merge pass and the detectors lives here so the two agree
//! on what "overlaps" means.
//!
//! ## Overlap Semantics
//!
//! Testing an operand against a single address:
//! - equality for hosts and interfaces,
//! - endpoint/interior test for ranges,
//! - containment test for networks.
//!
//! Testing two operands against each other collapses both to inclusive
//! `[start, end]` spans and intersects the spans. `Any` never overlaps
//! anything; it is a match-all marker, not an address.

use std::fmt;
use std::net::Ipv4Addr;

use ipnet::Ipv4Net;
use serde::{Deserialize, Serialize};

/// A fully resolved address operand.
///
/// Produced by resolving rule-element references against the policy
/// index once rules are atomic. Commands and detectors compare these
/// structurally; two operands are the same if and only if they describe
/// the same addresses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AddrSpec {
    /// Match-all marker. Valid in original elements only.
    Any,
    /// A single IPv4 address.
    Host(Ipv4Addr),
    /// A network with its netmask.
    Network(Ipv4Net),
    /// An inclusive address range.
    Range { start: Ipv4Addr, end: Ipv4Addr },
    /// A firewall interface used as an address. `addr` is `None` when
    /// the interface acquires its address dynamically.
    Interface {
        name: String,
        addr: Option<Ipv4Addr>,
        dynamic: bool,
    },
}

impl AddrSpec {
    /// Representative single address of this operand, if it has one.
    ///
    /// Hosts and interfaces yield their address, networks their network
    /// address, ranges their start. `Any` and dynamic interfaces yield
    /// `None`.
    pub fn address(&self) -> Option<Ipv4Addr> {
        match self {
            AddrSpec::Any => None,
            AddrSpec::Host(a) => Some(*a),
            AddrSpec::Network(n) => Some(n.network()),
            AddrSpec::Range { start, .. } => Some(*start),
            AddrSpec::Interface { addr, .. } => *addr,
        }
    }

    /// Netmask used when the operand is rendered in a directive.
    ///
    /// Hosts and interfaces are single addresses (/32); `Any` renders
    /// as 0.0.0.0. Ranges have no netmask and yield `None`.
    pub fn netmask(&self) -> Option<Ipv4Addr> {
        match self {
            AddrSpec::Any => Some(Ipv4Addr::UNSPECIFIED),
            AddrSpec::Host(_) | AddrSpec::Interface { .. } => Some(Ipv4Addr::BROADCAST),
            AddrSpec::Network(n) => Some(n.netmask()),
            AddrSpec::Range { .. } => None,
        }
    }

    pub fn is_any(&self) -> bool {
        matches!(self, AddrSpec::Any)
    }

    pub fn is_interface(&self) -> bool {
        matches!(self, AddrSpec::Interface { .. })
    }

    /// Inclusive `[start, end]` span covered by this operand.
    ///
    /// `None` for `Any` and for dynamic interfaces, which cover no
    /// statically known addresses.
    pub fn span(&self) -> Option<(u32, u32)> {
        match self {
            AddrSpec::Any => None,
            AddrSpec::Host(a) => Some((u32::from(*a), u32::from(*a))),
            AddrSpec::Network(n) => Some((u32::from(n.network()), u32::from(n.broadcast()))),
            AddrSpec::Range { start, end } => Some((u32::from(*start), u32::from(*end))),
            AddrSpec::Interface { addr, .. } => addr.map(|a| (u32::from(a), u32::from(a))),
        }
    }

    /// Test this operand against a single address.
    ///
    /// Equality, then range endpoint/interior test if the operand is a
    /// range, else network containment.
    pub fn overlaps_addr(&self, point: Ipv4Addr) -> bool {
        match self {
            AddrSpec::Range { start, end } => {
                point == *start || point == *end || (point > *start && point < *end)
            }
            AddrSpec::Network(n) => n.network() == point || n.contains(&point),
            _ => self.address() == Some(point),
        }
    }

    /// Test two operands for any shared address.
    pub fn intersects(&self, other: &AddrSpec) -> bool {
        let (Some((a1, a2)), Some((b1, b2))) = (self.span(), other.span()) else {
            return false;
        };
        a1 <= b2 && b1 <= a2
    }
}

impl fmt::Display for AddrSpec {
    /// Diagnostic form: `start-end` for ranges, `addr/mask` otherwise.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AddrSpec::Any => write!(f, "any"),
            AddrSpec::Host(a) => write!(f, "{a}/255.255.255.255"),
            AddrSpec::Network(n) => write!(f, "{}/{}", n.network(), n.netmask()),
            AddrSpec::Range { start, end } => write!(f, "{start}-{end}"),
            AddrSpec::Interface { name, addr, .. } => match addr {
                Some(a) => write!(f, "interface {name} ({a})"),
                None => write!(f, "interface {name} (dynamic)"),
            },
        }
    }
}

/// First and last addresses a network contributes to an address pool.
///
/// The network and broadcast addresses are excluded for prefixes
/// shorter than /31; /31 and /32 use the full span.
pub fn pool_bounds(net: Ipv4Net) -> (Ipv4Addr, Ipv4Addr) {
    if net.prefix_len() >= 31 {
        return (net.network(), net.broadcast());
    }
    let first = Ipv4Addr::from(u32::from(net.network()) + 1);
    let last = Ipv4Addr::from(u32::from(net.broadcast()) - 1);
    (first, last)
}
