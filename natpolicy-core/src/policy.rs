//! Policy files and the read-only object index.
//!
//! A policy file is a JSON document with four parts: the firewall
//! (interfaces, platform, version), a network object index, a service
//! index, and the ordered NAT rule set. Rule elements reference index
//! entries by name; the special form `interface:<name>` references one
//! of the firewall's interfaces directly. The compiler treats the
//! loaded [`Policy`] as immutable and works on its own rule copies.
//!
//! ```json
//! {
//!   "firewall": { "name": "fw", "interfaces": [ ... ] },
//!   "objects":  { "lan-net": { "type": "network", "net": "10.0.0.0/24" } },
//!   "services": { "http": { "type": "tcp", "port": 80 } },
//!   "rules":    [ { "label": "0", "osrc": { "items": ["lan-net"] }, ... } ]
//! }
//! ```

use std::collections::BTreeMap;
use std::fs;
use std::net::Ipv4Addr;
use std::path::Path;

use ipnet::Ipv4Net;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::addr::AddrSpec;
use crate::interface::{Firewall, Interface};
use crate::object::{NetworkObject, NetworkObjectKind};
use crate::rule::NatRule;
use crate::service::ServiceObject;

/// Prefix marking a rule-element item as a direct interface reference.
pub const INTERFACE_REF_PREFIX: &str = "interface:";

/// Prefix marking a rule-element item as a literal host address.
/// Range and multi-address expansion synthesize these; policy files may
/// also use them directly.
pub const ADDR_REF_PREFIX: &str = "addr:";

/// Build an element item referencing a firewall interface by name.
pub fn interface_ref(name: &str) -> String {
    format!("{INTERFACE_REF_PREFIX}{name}")
}

/// Interface name behind an element item, when it is an interface
/// reference.
pub fn as_interface_ref(item: &str) -> Option<&str> {
    item.strip_prefix(INTERFACE_REF_PREFIX)
}

/// Build an element item holding a literal host address.
pub fn addr_ref(addr: Ipv4Addr) -> String {
    format!("{ADDR_REF_PREFIX}{addr}")
}

/// Literal address behind an element item, when it is one.
pub fn as_addr_ref(item: &str) -> Option<Result<Ipv4Addr, PolicyError>> {
    item.strip_prefix(ADDR_REF_PREFIX).map(|raw| {
        raw.parse()
            .map_err(|_| PolicyError::BadAddrLiteral(item.to_string()))
    })
}

/// Errors raised while loading or resolving a policy.
#[derive(Debug, Error)]
pub enum PolicyError {
    #[error("failed to read policy file: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid policy JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("unknown network object '{0}'")]
    UnknownObject(String),
    #[error("unknown service '{0}'")]
    UnknownService(String),
    #[error("unknown interface '{0}'")]
    UnknownInterface(String),
    #[error("interface '{0}' has no network zone object")]
    MissingNetzone(String),
    #[error("object '{name}' cannot be used as a network zone")]
    BadNetzone { name: String },
    #[error("malformed literal address item '{0}'")]
    BadAddrLiteral(String),
    #[error("address range '{0}' ends before it starts")]
    InvertedRange(String),
}

/// A loaded policy: the firewall, the shared read-only indexes, and
/// the ordered rule set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Policy {
    pub firewall: Firewall,
    #[serde(default)]
    pub objects: BTreeMap<String, NetworkObject>,
    #[serde(default)]
    pub services: BTreeMap<String, ServiceObject>,
    #[serde(default)]
    pub rules: Vec<NatRule>,
}

/// Parse a policy from JSON text and validate its references.
pub fn parse(text: &str) -> Result<Policy, PolicyError> {
    let policy: Policy = serde_json::from_str(text)?;
    policy.validate_references()?;
    Ok(policy)
}

/// Load a policy file from disk.
pub fn load(path: &Path) -> Result<Policy, PolicyError> {
    parse(&fs::read_to_string(path)?)
}

impl Policy {
    pub fn object(&self, name: &str) -> Result<&NetworkObject, PolicyError> {
        self.objects
            .get(name)
            .ok_or_else(|| PolicyError::UnknownObject(name.to_string()))
    }

    pub fn service(&self, name: &str) -> Result<&ServiceObject, PolicyError> {
        self.services
            .get(name)
            .ok_or_else(|| PolicyError::UnknownService(name.to_string()))
    }

    pub fn interface(&self, name: &str) -> Result<&Interface, PolicyError> {
        self.firewall
            .interface(name)
            .ok_or_else(|| PolicyError::UnknownInterface(name.to_string()))
    }

    /// True when the element item names an object flagged as the
    /// firewall itself.
    pub fn is_firewall_object(&self, item: &str) -> bool {
        self.objects.get(item).is_some_and(|o| o.is_firewall)
    }

    /// Resolve an atomic element item to a concrete address operand.
    ///
    /// Groups, multi-address sets, and unresolved references are left
    /// to earlier pipeline stages; reaching this function with one is a
    /// broken-rule condition surfaced as an error.
    pub fn resolve_addr(&self, item: &str) -> Result<AddrSpec, PolicyError> {
        if let Some(literal) = as_addr_ref(item) {
            return Ok(AddrSpec::Host(literal?));
        }
        if let Some(iface_name) = as_interface_ref(item) {
            let iface = self.interface(iface_name)?;
            return Ok(AddrSpec::Interface {
                name: iface.name.clone(),
                addr: iface.address(),
                dynamic: iface.dynamic,
            });
        }
        match &self.object(item)?.kind {
            NetworkObjectKind::Host { addr } => Ok(AddrSpec::Host(*addr)),
            NetworkObjectKind::Network { net } => Ok(AddrSpec::Network(*net)),
            NetworkObjectKind::AddressRange { start, end } => Ok(AddrSpec::Range {
                start: *start,
                end: *end,
            }),
            NetworkObjectKind::Interface { interface } => {
                let iface = self.interface(interface)?;
                Ok(AddrSpec::Interface {
                    name: iface.name.clone(),
                    addr: iface.address(),
                    dynamic: iface.dynamic,
                })
            }
            NetworkObjectKind::MultiAddress { .. } | NetworkObjectKind::Group { .. } => {
                Err(PolicyError::UnknownObject(item.to_string()))
            }
        }
    }

    /// Networks covered by an interface's configured zone.
    ///
    /// The zone object may be a network, a host, or a group of either;
    /// groups are flattened.
    pub fn zone_networks(&self, iface: &Interface) -> Result<Vec<Ipv4Net>, PolicyError> {
        let Some(zone_name) = iface.netzone.as_deref() else {
            return Err(PolicyError::MissingNetzone(iface.name.clone()));
        };
        let mut nets = Vec::new();
        self.collect_zone_networks(zone_name, &mut nets)?;
        Ok(nets)
    }

    fn collect_zone_networks(
        &self,
        name: &str,
        out: &mut Vec<Ipv4Net>,
    ) -> Result<(), PolicyError> {
        match &self.object(name)?.kind {
            NetworkObjectKind::Network { net } => out.push(*net),
            NetworkObjectKind::Host { addr } => {
                out.push(Ipv4Net::from(*addr));
            }
            NetworkObjectKind::Group { members } => {
                for member in members {
                    self.collect_zone_networks(member, out)?;
                }
            }
            NetworkObjectKind::AddressRange { .. }
            | NetworkObjectKind::Interface { .. }
            | NetworkObjectKind::MultiAddress { .. } => {
                return Err(PolicyError::BadNetzone {
                    name: name.to_string(),
                });
            }
        }
        Ok(())
    }

    /// Check that every reference in rules and interface zones resolves
    /// against the indexes.
    pub fn validate_references(&self) -> Result<(), PolicyError> {
        for (name, object) in &self.objects {
            if let NetworkObjectKind::AddressRange { start, end } = &object.kind {
                if start > end {
                    return Err(PolicyError::InvertedRange(name.clone()));
                }
            }
        }
        for iface in &self.firewall.interfaces {
            if let Some(zone) = iface.netzone.as_deref() {
                self.object(zone)?;
            }
        }
        for rule in &self.rules {
            for element in [&rule.osrc, &rule.odst, &rule.tsrc, &rule.tdst] {
                for item in &element.items {
                    if let Some(literal) = as_addr_ref(item) {
                        literal?;
                    } else if let Some(iface) = as_interface_ref(item) {
                        self.interface(iface)?;
                    } else {
                        self.object(item)?;
                    }
                }
            }
            for element in [&rule.osrv, &rule.tsrv] {
                for item in &element.items {
                    self.service(item)?;
                }
            }
        }
        Ok(())
    }
}
