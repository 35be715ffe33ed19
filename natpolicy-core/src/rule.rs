//! NAT rules and rule elements.
//!
//! A [`NatRule`] is an ordered set of six elements: original
//! source/destination/service and translated source/destination/service.
//! Each [`RuleElement`] holds object references by name, or nothing,
//! which means the wildcard "any". Rules enter the pipeline untyped;
//! the classification stage derives the [`RuleType`] and later stages
//! communicate through the typed [`RuleScratch`] attached to each rule
//! copy.

use serde::{Deserialize, Serialize};

/// One side of a rule: an ordered list of object references plus a
/// negation flag. An empty list is the wildcard "any".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleElement {
    #[serde(default)]
    pub items: Vec<String>,
    #[serde(default)]
    pub negated: bool,
}

impl RuleElement {
    pub fn any() -> Self {
        RuleElement::default()
    }

    pub fn single(name: impl Into<String>) -> Self {
        RuleElement {
            items: vec![name.into()],
            negated: false,
        }
    }

    pub fn is_any(&self) -> bool {
        self.items.is_empty()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// The element's only reference, when it is atomic.
    pub fn single_item(&self) -> Option<&str> {
        match self.items.as_slice() {
            [one] => Some(one.as_str()),
            _ => None,
        }
    }

    /// Clear all references, turning the element back into "any".
    pub fn set_any(&mut self) {
        self.items.clear();
    }
}

/// Rule type derived by the classification stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RuleType {
    /// Translation exemption.
    NoNat,
    /// Source address translation.
    SourceNat,
    /// Destination address translation.
    DestinationNat,
    /// Network-to-network source translation (same-size networks).
    NetSourceNat,
    /// Network-to-network destination translation.
    NetDestinationNat,
    /// Source translation to a dynamic interface address.
    Masquerade,
    /// Destination translation to the firewall itself.
    Redirect,
    /// Multiple translated destinations. Not supported by the target
    /// device; verification rejects it.
    LoadBalance,
}

/// Device form selected for a NoNat rule by the interface-assignment
/// stage, based on the security levels of the two zones involved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoNatForm {
    /// Bidirectional exemption (`nat 0 access-list`).
    Exempt,
    /// Identity static translation.
    StaticLike,
}

/// Typed per-rule scratch state written by pipeline stages.
///
/// Stages communicate exclusively through these fields on the
/// pipeline's own rule copies; the policy index is never mutated.
#[derive(Debug, Clone, Default)]
pub struct RuleScratch {
    /// Position of the originating policy rule; shared by every atomic
    /// rule split from it and used as the output-ordering group.
    pub order: usize,
    /// Interface serving the original-side zone.
    pub iface_orig: Option<String>,
    /// Interface serving the translated-side zone.
    pub iface_trn: Option<String>,
    /// Device form for NoNat rules.
    pub nonat_form: Option<NoNatForm>,
    /// Sequence number among exempt-form NoNat rules; the first one
    /// seen per interface prints the `nat 0` directive.
    pub exempt_seq: Option<usize>,
    /// Original source must be cleared after interface assignment
    /// (default-pool optimization, step one).
    pub clear_osrc: bool,
    /// Rule translates through the default pool (`0.0.0.0 0.0.0.0`).
    pub use_default_pool: bool,
    /// Index of the NAT command derived from this rule.
    pub nat_cmd: Option<usize>,
    /// Index of the static command derived from this rule.
    pub static_cmd: Option<usize>,
}

/// A NAT rule.
///
/// The `label` is stable across splits and names the rule in every
/// diagnostic. `rule_type` and `scratch` are pipeline state and never
/// part of the serialized policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NatRule {
    pub label: String,
    #[serde(default)]
    pub osrc: RuleElement,
    #[serde(default)]
    pub odst: RuleElement,
    #[serde(default)]
    pub osrv: RuleElement,
    #[serde(default)]
    pub tsrc: RuleElement,
    #[serde(default)]
    pub tdst: RuleElement,
    #[serde(default)]
    pub tsrv: RuleElement,
    #[serde(skip)]
    pub rule_type: Option<RuleType>,
    #[serde(skip)]
    pub scratch: RuleScratch,
}

impl NatRule {
    /// True when any element carries a negation flag.
    pub fn has_negation(&self) -> bool {
        self.elements().iter().any(|e| e.negated)
    }

    /// All six elements in canonical order.
    pub fn elements(&self) -> [&RuleElement; 6] {
        [
            &self.osrc, &self.odst, &self.osrv, &self.tsrc, &self.tdst, &self.tsrv,
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_element_is_any() {
        let el = RuleElement::any();
        assert!(el.is_any());
        assert_eq!(el.single_item(), None);

        let mut el = RuleElement::single("lan-net");
        assert_eq!(el.single_item(), Some("lan-net"));
        el.set_any();
        assert!(el.is_any());
    }

    #[test]
    fn rule_deserializes_with_missing_elements_as_any() {
        let rule: NatRule = serde_json::from_str(
            r#"{ "label": "0", "osrc": { "items": ["lan-net"] }, "tsrc": { "items": ["pool"] } }"#,
        )
        .expect("json");
        assert!(rule.odst.is_any());
        assert!(rule.tsrv.is_any());
        assert!(rule.rule_type.is_none());
    }
}
