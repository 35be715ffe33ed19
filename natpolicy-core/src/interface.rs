//! Firewall and interface model.

use std::net::Ipv4Addr;

use ipnet::Ipv4Net;
use serde::{Deserialize, Serialize};

/// One firewall interface.
///
/// The `label` is the zone name used in emitted directives (for example
/// `inside`, `outside`, `dmz`). The `netzone` names the network object
/// that defines which addresses are reachable through this interface;
/// the zone resolver matches addresses against it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Interface {
    /// Device name (for example `ethernet0`).
    pub name: String,
    /// Zone label used in directives.
    pub label: String,
    /// Ordinal trust rank; higher means more trusted.
    pub security_level: u8,
    /// Configured address with netmask. `None` when `dynamic`.
    #[serde(default)]
    pub addr: Option<Ipv4Net>,
    /// Name of the network object defining this interface's zone.
    #[serde(default)]
    pub netzone: Option<String>,
    #[serde(default)]
    pub external: bool,
    #[serde(default)]
    pub loopback: bool,
    /// Address acquired at run time (DHCP/PPPoE).
    #[serde(default)]
    pub dynamic: bool,
}

impl Interface {
    pub fn address(&self) -> Option<Ipv4Addr> {
        self.addr.map(|n| n.addr())
    }

    pub fn broadcast(&self) -> Option<Ipv4Addr> {
        self.addr.map(|n| n.broadcast())
    }
}

/// The firewall a policy compiles for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Firewall {
    pub name: String,
    /// Target device family.
    #[serde(default = "default_platform")]
    pub platform: String,
    /// Target device OS version; gates several legacy validations.
    #[serde(default = "default_version")]
    pub version: String,
    pub interfaces: Vec<Interface>,
}

fn default_platform() -> String {
    "pix".to_string()
}

fn default_version() -> String {
    "6.3".to_string()
}

impl Firewall {
    pub fn interface(&self, name: &str) -> Option<&Interface> {
        self.interfaces.iter().find(|i| i.name == name)
    }

    /// External, non-loopback interfaces.
    pub fn external_interfaces(&self) -> impl Iterator<Item = &Interface> {
        self.interfaces
            .iter()
            .filter(|i| i.external && !i.loopback)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interface_address_and_broadcast_derive_from_net() {
        let iface: Interface = serde_json::from_str(
            r#"{ "name": "ethernet1", "label": "outside", "security_level": 0,
                 "addr": "192.0.2.1/24", "external": true }"#,
        )
        .expect("json");
        assert_eq!(iface.address(), Some(Ipv4Addr::new(192, 0, 2, 1)));
        assert_eq!(iface.broadcast(), Some(Ipv4Addr::new(192, 0, 2, 255)));
    }
}
