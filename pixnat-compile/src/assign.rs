//! Interface assignment and NoNat form selection.
//!
//! Once rules are atomic, every rule is pinned to the pair of
//! interfaces its traffic crosses: the one serving the original
//! operand's zone and the one serving the translated operand's zone.
//! Everything downstream (command creation, merging, emission) reads
//! these assignments from the rule scratch.

use std::collections::BTreeSet;

use natpolicy_core::{NatRule, NoNatForm, RuleElement, RuleType};

use crate::context::CompileContext;
use crate::error::CompileError;
use crate::pipeline::Stage;

/// Pin each rule to its original-side and translated-side interfaces.
pub struct AssignInterfaces;

impl Stage for AssignInterfaces {
    fn name(&self) -> &'static str {
        "assign rules to interfaces"
    }

    fn run(
        &mut self,
        ctx: &mut CompileContext<'_>,
        mut rules: Vec<NatRule>,
    ) -> Result<Vec<NatRule>, CompileError> {
        for rule in &mut rules {
            let (orig, trn) = match rule.rule_type {
                Some(RuleType::SourceNat) => (rule.osrc.clone(), rule.tsrc.clone()),
                Some(RuleType::DestinationNat) => (rule.odst.clone(), rule.tdst.clone()),
                Some(RuleType::NoNat) => (rule.osrc.clone(), rule.odst.clone()),
                _ => continue,
            };
            rule.scratch.iface_orig = Some(zone_of(ctx, &orig, rule)?);
            rule.scratch.iface_trn = Some(zone_of(ctx, &trn, rule)?);
        }
        Ok(rules)
    }
}

fn zone_of(
    ctx: &mut CompileContext<'_>,
    element: &RuleElement,
    rule: &NatRule,
) -> Result<String, CompileError> {
    let spec = ctx.addr_of(element, rule)?;
    let object = element.single_item().unwrap_or("any").to_string();
    ctx.zone_for(&spec, &object, &rule.label)
}

/// Copy the original service into an empty translated service so the
/// `static` form always has a concrete service pair to render.
pub struct FillTranslatedService;

impl Stage for FillTranslatedService {
    fn name(&self) -> &'static str {
        "fill translated service"
    }

    fn run(
        &mut self,
        _ctx: &mut CompileContext<'_>,
        mut rules: Vec<NatRule>,
    ) -> Result<Vec<NatRule>, CompileError> {
        for rule in &mut rules {
            if !rule.osrv.is_any() && rule.tsrv.is_any() {
                rule.tsrv = rule.osrv.clone();
            }
        }
        Ok(rules)
    }
}

/// Choose the device form of every NoNat rule.
///
/// Traffic leaving a more secure zone for a less secure one is
/// exempted with `nat 0 access-list`; the opposite direction has no
/// exemption form and compiles as an identity `static`.
pub struct SelectNoNatForm;

impl Stage for SelectNoNatForm {
    fn name(&self) -> &'static str {
        "process no-nat rules"
    }

    fn run(
        &mut self,
        ctx: &mut CompileContext<'_>,
        mut rules: Vec<NatRule>,
    ) -> Result<Vec<NatRule>, CompileError> {
        for rule in &mut rules {
            if rule.rule_type != Some(RuleType::NoNat) {
                continue;
            }
            let orig = scratch_iface(rule.scratch.iface_orig.as_deref(), rule)?;
            let trn = scratch_iface(rule.scratch.iface_trn.as_deref(), rule)?;
            let orig_level = ctx.interface(&orig)?.security_level;
            let trn_level = ctx.interface(&trn)?.security_level;

            if orig_level > trn_level {
                rule.scratch.nonat_form = Some(NoNatForm::Exempt);
                let seq = ctx.next_exempt_seq();
                rule.scratch.exempt_seq = Some(seq);
                ctx.first_exempt.entry(orig.clone()).or_insert(seq);
                let acl = format!("nat0.{}", ctx.iface_label(&orig)?);
                ctx.register_acl_name(&acl);
            } else {
                rule.scratch.nonat_form = Some(NoNatForm::StaticLike);
            }
        }
        Ok(rules)
    }
}

/// Drop identity statics that repeat an earlier one.
///
/// Several NoNat rules can reduce to the same identity `static` once
/// atomic; only the first per (interface pair, destination) survives.
#[derive(Default)]
pub struct SuppressDuplicateNoNatStatics {
    seen: BTreeSet<String>,
}

impl Stage for SuppressDuplicateNoNatStatics {
    fn name(&self) -> &'static str {
        "eliminate duplicate no-nat statics"
    }

    fn run(
        &mut self,
        ctx: &mut CompileContext<'_>,
        rules: Vec<NatRule>,
    ) -> Result<Vec<NatRule>, CompileError> {
        let mut out = Vec::with_capacity(rules.len());
        for rule in rules {
            if rule.rule_type == Some(RuleType::NoNat)
                && rule.scratch.nonat_form == Some(NoNatForm::StaticLike)
            {
                let odst = ctx.addr_of(&rule.odst, &rule)?;
                let key = format!(
                    "{}|{}|{odst}",
                    rule.scratch.iface_orig.as_deref().unwrap_or(""),
                    rule.scratch.iface_trn.as_deref().unwrap_or(""),
                );
                if !self.seen.insert(key) {
                    continue;
                }
            }
            out.push(rule);
        }
        Ok(out)
    }
}

fn scratch_iface(name: Option<&str>, rule: &NatRule) -> Result<String, CompileError> {
    name.map(str::to_string).ok_or_else(|| {
        CompileError::broken("rule reached form selection unassigned", &rule.label)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::CompileOptions;
    use natpolicy_core::Policy;
    use pretty_assertions::assert_eq;

    fn policy() -> Policy {
        natpolicy_core::parse(
            r#"{
            "firewall": {
                "name": "fw",
                "interfaces": [
                    { "name": "ethernet0", "label": "outside", "security_level": 0,
                      "addr": "192.0.2.1/24", "netzone": "default-zone", "external": true },
                    { "name": "ethernet1", "label": "inside", "security_level": 100,
                      "addr": "10.0.0.1/24", "netzone": "lan-net" }
                ]
            },
            "objects": {
                "default-zone": { "type": "network", "net": "0.0.0.0/0" },
                "lan-net": { "type": "network", "net": "10.0.0.0/24" },
                "partner-net": { "type": "network", "net": "198.51.100.0/24" }
            },
            "rules": []
        }"#,
        )
        .expect("policy")
    }

    fn nonat(label: &str) -> NatRule {
        let mut rule: NatRule = serde_json::from_str(&format!(
            r#"{{ "label": "{label}", "osrc": {{ "items": ["lan-net"] }},
                 "odst": {{ "items": ["partner-net"] }} }}"#
        ))
        .expect("rule");
        rule.rule_type = Some(RuleType::NoNat);
        rule
    }

    #[test]
    fn interfaces_follow_the_operand_zones() {
        let policy = policy();
        let mut ctx = CompileContext::new(&policy, CompileOptions::default()).expect("ctx");
        let rules = AssignInterfaces.run(&mut ctx, vec![nonat("0")]).expect("assign");
        assert_eq!(rules[0].scratch.iface_orig.as_deref(), Some("ethernet1"));
        assert_eq!(rules[0].scratch.iface_trn.as_deref(), Some("ethernet0"));
    }

    #[test]
    fn outbound_nonat_selects_the_exempt_form_and_tracks_the_first() {
        let policy = policy();
        let mut ctx = CompileContext::new(&policy, CompileOptions::default()).expect("ctx");
        let rules = AssignInterfaces
            .run(&mut ctx, vec![nonat("0"), nonat("1")])
            .expect("assign");
        let rules = SelectNoNatForm.run(&mut ctx, rules).expect("select");

        assert_eq!(rules[0].scratch.nonat_form, Some(NoNatForm::Exempt));
        assert_eq!(rules[0].scratch.exempt_seq, Some(0));
        assert_eq!(rules[1].scratch.exempt_seq, Some(1));
        assert_eq!(ctx.first_exempt.get("ethernet1"), Some(&0));
    }

    #[test]
    fn duplicate_identity_statics_are_dropped() {
        let policy = policy();
        let mut ctx = CompileContext::new(&policy, CompileOptions::default()).expect("ctx");

        // Inbound direction, so both rules pick the static-like form.
        let mut a = nonat("0");
        a.osrc = RuleElement::single("partner-net");
        a.odst = RuleElement::single("lan-net");
        let mut b = a.clone();
        b.label = "1".to_string();

        let rules = AssignInterfaces.run(&mut ctx, vec![a, b]).expect("assign");
        let rules = SelectNoNatForm.run(&mut ctx, rules).expect("select");
        assert_eq!(rules[0].scratch.nonat_form, Some(NoNatForm::StaticLike));

        let rules = SuppressDuplicateNoNatStatics::default()
            .run(&mut ctx, rules)
            .expect("suppress");
        assert_eq!(rules.len(), 1);
        assert_eq!(rules[0].label, "0");
    }
}
