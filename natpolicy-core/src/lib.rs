//! Firewall NAT policy object model.
//!
//! This crate defines the data the NAT compiler operates on: network
//! and service objects, NAT rules with their six elements, the firewall
//! and its interfaces, and the address arithmetic shared by the merge
//! pass and the conflict detectors. It also loads policy files (JSON)
//! into a validated, read-only index.
//!
//! All compiler logic (pipeline stages, command model, emission) lives
//! in the `pixnat-compile` crate; this crate is the shared vocabulary.

pub mod addr;
pub mod interface;
pub mod object;
pub mod policy;
pub mod rule;
pub mod service;

pub use addr::{pool_bounds, AddrSpec};
pub use interface::{Firewall, Interface};
pub use object::{NetworkObject, NetworkObjectKind};
pub use policy::{
    addr_ref, as_addr_ref, as_interface_ref, interface_ref, load, parse, Policy, PolicyError,
};
pub use rule::{NatRule, NoNatForm, RuleElement, RuleScratch, RuleType};
pub use service::ServiceObject;
