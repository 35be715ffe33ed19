//! Network object definitions.
//!
//! A [`NetworkObject`] is an addressable thing a rule element can
//! reference: a host, a network, an address range, a firewall
//! interface, a multi-address set, or a group of other objects. Objects
//! live in the policy index under a unique name and are referenced by
//! name from rule elements; the index is read-only during compilation.

use std::net::Ipv4Addr;

use ipnet::Ipv4Net;
use serde::{Deserialize, Serialize};

/// One entry in the policy's network object index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkObject {
    #[serde(flatten)]
    pub kind: NetworkObjectKind,
    /// Set when this object denotes the firewall being compiled. Rule
    /// elements referencing such an object are rewritten to concrete
    /// interfaces before command construction.
    #[serde(default, rename = "firewall")]
    pub is_firewall: bool,
}

/// The shape of a network object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum NetworkObjectKind {
    /// A single address.
    Host { addr: Ipv4Addr },
    /// A network with a netmask.
    Network { net: Ipv4Net },
    /// An inclusive address range.
    AddressRange { start: Ipv4Addr, end: Ipv4Addr },
    /// A reference to one of the firewall's interfaces by name.
    Interface { interface: String },
    /// A set of addresses. Run-time sets (resolved on the device, not
    /// at compile time) cannot be compiled and are rejected.
    MultiAddress {
        addrs: Vec<Ipv4Addr>,
        #[serde(default)]
        run_time: bool,
    },
    /// A named group of other network objects.
    Group { members: Vec<String> },
}

impl NetworkObject {
    pub fn is_group(&self) -> bool {
        matches!(self.kind, NetworkObjectKind::Group { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserializes_tagged_kinds() {
        let obj: NetworkObject =
            serde_json::from_str(r#"{ "type": "network", "net": "10.0.0.0/24" }"#).expect("json");
        assert!(matches!(obj.kind, NetworkObjectKind::Network { .. }));
        assert!(!obj.is_firewall);

        let fw: NetworkObject =
            serde_json::from_str(r#"{ "type": "host", "addr": "192.0.2.1", "firewall": true }"#)
                .expect("json");
        assert!(fw.is_firewall);
    }
}
