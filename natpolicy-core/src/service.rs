//! Service object definitions.

use serde::{Deserialize, Serialize};

/// One entry in the policy's service index.
///
/// TCP and UDP services carry a destination port range; a single port
/// is a range of length one. `Any` matches every service and is the
/// implicit value of an empty service element.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ServiceObject {
    Any,
    Tcp {
        port: u16,
        #[serde(default)]
        port_end: Option<u16>,
    },
    Udp {
        port: u16,
        #[serde(default)]
        port_end: Option<u16>,
    },
    Icmp {
        #[serde(default)]
        icmp_type: Option<u8>,
    },
    Group { members: Vec<String> },
}

impl ServiceObject {
    pub fn is_any(&self) -> bool {
        matches!(self, ServiceObject::Any)
    }

    pub fn is_group(&self) -> bool {
        matches!(self, ServiceObject::Group { .. })
    }

    pub fn is_icmp(&self) -> bool {
        matches!(self, ServiceObject::Icmp { .. })
    }

    /// Destination port range for TCP/UDP services.
    pub fn port_range(&self) -> Option<(u16, u16)> {
        match self {
            ServiceObject::Tcp { port, port_end } | ServiceObject::Udp { port, port_end } => {
                Some((*port, port_end.unwrap_or(*port)))
            }
            _ => None,
        }
    }

    /// True when the service spans more than one destination port.
    pub fn spans_ports(&self) -> bool {
        self.port_range().is_some_and(|(lo, hi)| lo != hi)
    }

    /// Protocol keyword used in emitted directives.
    pub fn protocol_name(&self) -> &'static str {
        match self {
            ServiceObject::Any => "ip",
            ServiceObject::Tcp { .. } => "tcp",
            ServiceObject::Udp { .. } => "udp",
            ServiceObject::Icmp { .. } => "icmp",
            ServiceObject::Group { .. } => "group",
        }
    }

    /// True when both services use the same protocol.
    pub fn same_protocol(&self, other: &ServiceObject) -> bool {
        std::mem::discriminant(self) == std::mem::discriminant(other)
    }
}
