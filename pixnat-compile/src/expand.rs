//! Expansion stages: groups, multi-address sets, ranges, atomic split.
//!
//! These run before classification and guarantee the invariant the
//! rest of the pipeline relies on: past [`SplitToAtomic`], every rule
//! element holds exactly one concrete reference (or is the wildcard).
//! Splits always preserve the rule label and its output-ordering
//! group, so diagnostics and emission order stay stable.

use std::collections::BTreeSet;
use std::net::Ipv4Addr;

use natpolicy_core::{
    addr_ref, as_addr_ref, as_interface_ref, NatRule, NetworkObjectKind, RuleElement,
    ServiceObject,
};

use crate::context::CompileContext;
use crate::error::CompileError;
use crate::pipeline::Stage;

/// Expand group objects in every element, rejecting recursive and
/// empty groups.
pub struct ExpandGroups;

impl Stage for ExpandGroups {
    fn name(&self) -> &'static str {
        "expand groups"
    }

    fn run(
        &mut self,
        ctx: &mut CompileContext<'_>,
        mut rules: Vec<NatRule>,
    ) -> Result<Vec<NatRule>, CompileError> {
        for rule in &mut rules {
            let label = rule.label.clone();
            for element in [
                &mut rule.osrc,
                &mut rule.odst,
                &mut rule.tsrc,
                &mut rule.tdst,
            ] {
                element.items = expand_addr_items(ctx, &element.items, &label)?;
            }
            for element in [&mut rule.osrv, &mut rule.tsrv] {
                element.items = expand_service_items(ctx, &element.items, &label)?;
            }
        }
        Ok(rules)
    }
}

fn expand_addr_items(
    ctx: &CompileContext<'_>,
    items: &[String],
    rule: &str,
) -> Result<Vec<String>, CompileError> {
    let mut out = Vec::new();
    for item in items {
        let mut visiting = Vec::new();
        expand_addr_item(ctx, item, &mut out, &mut visiting, rule)?;
    }
    Ok(out)
}

fn expand_addr_item(
    ctx: &CompileContext<'_>,
    item: &str,
    out: &mut Vec<String>,
    visiting: &mut Vec<String>,
    rule: &str,
) -> Result<(), CompileError> {
    if as_interface_ref(item).is_some() || as_addr_ref(item).is_some() {
        out.push(item.to_string());
        return Ok(());
    }
    match &ctx.policy.object(item)?.kind {
        NetworkObjectKind::Group { members } => {
            if visiting.iter().any(|seen| seen == item) {
                return Err(CompileError::policy(
                    format!("Group '{item}' references itself"),
                    rule,
                ));
            }
            if members.is_empty() {
                return Err(CompileError::policy(format!("Group '{item}' is empty"), rule));
            }
            visiting.push(item.to_string());
            for member in members {
                expand_addr_item(ctx, member, out, visiting, rule)?;
            }
            visiting.pop();
        }
        _ => out.push(item.to_string()),
    }
    Ok(())
}

fn expand_service_items(
    ctx: &CompileContext<'_>,
    items: &[String],
    rule: &str,
) -> Result<Vec<String>, CompileError> {
    let mut out = Vec::new();
    for item in items {
        let mut visiting = Vec::new();
        expand_service_item(ctx, item, &mut out, &mut visiting, rule)?;
    }
    Ok(out)
}

fn expand_service_item(
    ctx: &CompileContext<'_>,
    item: &str,
    out: &mut Vec<String>,
    visiting: &mut Vec<String>,
    rule: &str,
) -> Result<(), CompileError> {
    match ctx.policy.service(item)? {
        ServiceObject::Group { members } => {
            if visiting.iter().any(|seen| seen == item) {
                return Err(CompileError::policy(
                    format!("Group '{item}' references itself"),
                    rule,
                ));
            }
            if members.is_empty() {
                return Err(CompileError::policy(format!("Group '{item}' is empty"), rule));
            }
            visiting.push(item.to_string());
            for member in members {
                expand_service_item(ctx, member, out, visiting, rule)?;
            }
            visiting.pop();
        }
        _ => out.push(item.to_string()),
    }
    Ok(())
}

/// Drop repeated references inside each element, keeping first
/// occurrences.
pub struct DeduplicateElements;

impl Stage for DeduplicateElements {
    fn name(&self) -> &'static str {
        "eliminate duplicate references"
    }

    fn run(
        &mut self,
        _ctx: &mut CompileContext<'_>,
        mut rules: Vec<NatRule>,
    ) -> Result<Vec<NatRule>, CompileError> {
        for rule in &mut rules {
            for element in all_elements(rule) {
                let mut seen = BTreeSet::new();
                element.items.retain(|item| seen.insert(item.clone()));
            }
        }
        Ok(rules)
    }
}

/// Reject multi-address objects resolved on the device at run time;
/// they have no compile-time members to expand.
pub struct RejectRunTimeTables;

impl Stage for RejectRunTimeTables {
    fn name(&self) -> &'static str {
        "reject run-time address tables"
    }

    fn run(
        &mut self,
        ctx: &mut CompileContext<'_>,
        rules: Vec<NatRule>,
    ) -> Result<Vec<NatRule>, CompileError> {
        for rule in &rules {
            for element in [&rule.osrc, &rule.odst, &rule.tsrc, &rule.tdst] {
                for item in &element.items {
                    if as_interface_ref(item).is_some() || as_addr_ref(item).is_some() {
                        continue;
                    }
                    if let NetworkObjectKind::MultiAddress { run_time: true, .. } =
                        ctx.policy.object(item)?.kind
                    {
                        return Err(CompileError::policy(
                            "Run-time address table objects are not supported",
                            &rule.label,
                        ));
                    }
                }
            }
        }
        Ok(rules)
    }
}

/// Inline compile-time multi-address sets as literal host items.
pub struct ExpandMultiAddress;

impl Stage for ExpandMultiAddress {
    fn name(&self) -> &'static str {
        "expand multi-address objects"
    }

    fn run(
        &mut self,
        ctx: &mut CompileContext<'_>,
        mut rules: Vec<NatRule>,
    ) -> Result<Vec<NatRule>, CompileError> {
        for rule in &mut rules {
            let label = rule.label.clone();
            for element in [
                &mut rule.osrc,
                &mut rule.odst,
                &mut rule.tsrc,
                &mut rule.tdst,
            ] {
                let mut items = Vec::new();
                for item in &element.items {
                    if as_interface_ref(item).is_some() || as_addr_ref(item).is_some() {
                        items.push(item.clone());
                        continue;
                    }
                    match &ctx.policy.object(item)?.kind {
                        NetworkObjectKind::MultiAddress { addrs, .. } => {
                            if addrs.is_empty() {
                                return Err(CompileError::policy(
                                    format!("Address table '{item}' is empty"),
                                    &label,
                                ));
                            }
                            items.extend(addrs.iter().map(|a| addr_ref(*a)));
                        }
                        _ => items.push(item.clone()),
                    }
                }
                element.items = items;
            }
        }
        Ok(rules)
    }
}

/// Expand address ranges in the original source and destination into
/// individual hosts. Translated elements keep their ranges; a range
/// there is an address pool, not a match list.
///
/// Ranges wider than [`MAX_RANGE_EXPANSION`] hosts are rejected; a
/// match list that size points at a misconfigured range, and the
/// expanded rule set would be unusable anyway.
pub struct ExpandAddressRanges;

pub const MAX_RANGE_EXPANSION: u32 = 65_536;

impl Stage for ExpandAddressRanges {
    fn name(&self) -> &'static str {
        "expand address ranges"
    }

    fn run(
        &mut self,
        ctx: &mut CompileContext<'_>,
        mut rules: Vec<NatRule>,
    ) -> Result<Vec<NatRule>, CompileError> {
        for rule in &mut rules {
            let label = rule.label.clone();
            for element in [&mut rule.osrc, &mut rule.odst] {
                let mut items = Vec::new();
                for item in &element.items {
                    if as_interface_ref(item).is_some() || as_addr_ref(item).is_some() {
                        items.push(item.clone());
                        continue;
                    }
                    match ctx.policy.object(item)?.kind {
                        NetworkObjectKind::AddressRange { start, end } => {
                            let (lo, hi) = (u32::from(start), u32::from(end));
                            if hi - lo >= MAX_RANGE_EXPANSION {
                                return Err(CompileError::policy(
                                    format!("Address range '{item}' is too large to expand"),
                                    &label,
                                ));
                            }
                            for raw in lo..=hi {
                                items.push(addr_ref(Ipv4Addr::from(raw)));
                            }
                        }
                        _ => items.push(item.clone()),
                    }
                }
                element.items = items;
            }
        }
        Ok(rules)
    }
}

/// Split every rule into atomic rules: one reference per element.
///
/// The split is a cartesian product in element order; children inherit
/// the parent's label, scratch state, and ordering group.
pub struct SplitToAtomic;

impl Stage for SplitToAtomic {
    fn name(&self) -> &'static str {
        "convert to atomic rules"
    }

    fn run(
        &mut self,
        _ctx: &mut CompileContext<'_>,
        rules: Vec<NatRule>,
    ) -> Result<Vec<NatRule>, CompileError> {
        let mut out = Vec::new();
        for rule in rules {
            split_rule(&rule, &mut out);
        }
        Ok(out)
    }
}

fn split_rule(rule: &NatRule, out: &mut Vec<NatRule>) {
    let choices = |element: &RuleElement| -> Vec<RuleElement> {
        if element.is_any() {
            vec![RuleElement::any()]
        } else {
            element
                .items
                .iter()
                .map(|item| RuleElement::single(item.clone()))
                .collect()
        }
    };

    for osrc in choices(&rule.osrc) {
        for odst in choices(&rule.odst) {
            for osrv in choices(&rule.osrv) {
                for tsrc in choices(&rule.tsrc) {
                    for tdst in choices(&rule.tdst) {
                        for tsrv in choices(&rule.tsrv) {
                            let mut atomic = rule.clone();
                            atomic.osrc = osrc.clone();
                            atomic.odst = odst.clone();
                            atomic.osrv = osrv.clone();
                            atomic.tsrc = tsrc.clone();
                            atomic.tdst = tdst.clone();
                            atomic.tsrv = tsrv;
                            out.push(atomic);
                        }
                    }
                }
            }
        }
    }
}

fn all_elements(rule: &mut NatRule) -> [&mut RuleElement; 6] {
    [
        &mut rule.osrc,
        &mut rule.odst,
        &mut rule.osrv,
        &mut rule.tsrc,
        &mut rule.tdst,
        &mut rule.tsrv,
    ]
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
            "firewall": { "name": "fw", "interfaces": [] },
            "objects": {
                "h1": { "type": "host", "addr": "10.0.0.1" },
                "h2": { "type": "host", "addr": "10.0.0.2" },
                "servers": { "type": "group", "members": ["h1", "h2"] },
                "nested": { "type": "group", "members": ["servers", "h1"] },
                "hole": { "type": "group", "members": [] },
                "short-range": { "type": "address-range",
                                 "start": "10.0.0.5", "end": "10.0.0.7" },
                "wide-range": { "type": "address-range",
                                "start": "10.0.0.0", "end": "10.255.255.255" },
                "table": { "type": "multi-address",
                           "addrs": ["10.1.0.1", "10.1.0.2"] },
                "live-table": { "type": "multi-address", "addrs": [], "run_time": true }
            },
            "rules": []
        }"#,
        )
        .expect("policy")
    }

    fn rule(osrc: &[&str]) -> NatRule {
        serde_json::from_str::<NatRule>(&format!(
            r#"{{ "label": "0", "osrc": {{ "items": {} }} }}"#,
            serde_json::to_string(&osrc).expect("json")
        ))
        .expect("rule")
    }

    #[test]
    fn groups_flatten_recursively_and_dedup() {
        let policy = policy();
        let mut ctx = CompileContext::new(&policy, CompileOptions::default()).expect("ctx");
        let rules = ExpandGroups
            .run(&mut ctx, vec![rule(&["nested"])])
            .expect("expand");
        assert_eq!(rules[0].osrc.items, vec!["h1", "h2", "h1"]);

        let rules = DeduplicateElements.run(&mut ctx, rules).expect("dedup");
        assert_eq!(rules[0].osrc.items, vec!["h1", "h2"]);
    }

    #[test]
    fn empty_group_is_fatal() {
        let policy = policy();
        let mut ctx = CompileContext::new(&policy, CompileOptions::default()).expect("ctx");
        let err = ExpandGroups
            .run(&mut ctx, vec![rule(&["hole"])])
            .expect_err("must fail");
        assert!(err.to_string().contains("Group 'hole' is empty"));
        assert!(err.to_string().contains("Rule 0"));
    }

    #[test]
    fn run_time_table_is_fatal_but_static_table_expands() {
        let policy = policy();
        let mut ctx = CompileContext::new(&policy, CompileOptions::default()).expect("ctx");
        let err = RejectRunTimeTables
            .run(&mut ctx, vec![rule(&["live-table"])])
            .expect_err("must fail");
        assert!(err.to_string().contains("Run-time address table"));

        let rules = ExpandMultiAddress
            .run(&mut ctx, vec![rule(&["table"])])
            .expect("expand");
        assert_eq!(rules[0].osrc.items, vec!["addr:10.1.0.1", "addr:10.1.0.2"]);
    }

    #[test]
    fn ranges_expand_to_hosts_in_original_elements_only() {
        let policy = policy();
        let mut ctx = CompileContext::new(&policy, CompileOptions::default()).expect("ctx");
        let mut input = rule(&["short-range"]);
        input.tsrc = RuleElement::single("short-range");
        let rules = ExpandAddressRanges.run(&mut ctx, vec![input]).expect("expand");
        assert_eq!(
            rules[0].osrc.items,
            vec!["addr:10.0.0.5", "addr:10.0.0.6", "addr:10.0.0.7"]
        );
        assert_eq!(rules[0].tsrc.items, vec!["short-range"]);
    }

    #[test]
    fn oversized_range_aborts_instead_of_expanding() {
        let policy = policy();
        let mut ctx = CompileContext::new(&policy, CompileOptions::default()).expect("ctx");
        let err = ExpandAddressRanges
            .run(&mut ctx, vec![rule(&["wide-range"])])
            .expect_err("must fail");
        assert!(err.to_string().contains("too large to expand"));
        assert!(err.to_string().contains("Rule 0"));
    }

    #[test]
    fn atomic_split_preserves_label_and_order_group() {
        let policy = policy();
        let mut ctx = CompileContext::new(&policy, CompileOptions::default()).expect("ctx");
        let mut input = rule(&["h1", "h2"]);
        input.scratch.order = 7;
        let rules = SplitToAtomic.run(&mut ctx, vec![input]).expect("split");
        assert_eq!(rules.len(), 2);
        assert!(rules.iter().all(|r| r.label == "0" && r.scratch.order == 7));
        assert_eq!(rules[0].osrc.single_item(), Some("h1"));
        assert_eq!(rules[1].osrc.single_item(), Some("h2"));
    }
}
