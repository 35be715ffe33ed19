//! Rule classification and firewall-object rewriting.
//!
//! Classification derives the rule type from which translated elements
//! are filled in and what they hold. The rewriting stages then replace
//! references to the firewall object itself with concrete interface
//! references, so every later stage only ever sees addresses and
//! interfaces.

use natpolicy_core::{
    as_addr_ref, as_interface_ref, interface_ref, AddrSpec, NatRule, RuleType,
};

use crate::context::CompileContext;
use crate::error::CompileError;
use crate::pipeline::Stage;

/// Derive the [`RuleType`] of every rule.
pub struct ClassifyRules;

impl Stage for ClassifyRules {
    fn name(&self) -> &'static str {
        "determine rule types"
    }

    fn run(
        &mut self,
        ctx: &mut CompileContext<'_>,
        mut rules: Vec<NatRule>,
    ) -> Result<Vec<NatRule>, CompileError> {
        for rule in &mut rules {
            rule.rule_type = Some(classify(ctx, rule)?);
        }
        Ok(rules)
    }
}

fn classify(ctx: &CompileContext<'_>, rule: &NatRule) -> Result<RuleType, CompileError> {
    let translates_src = !rule.tsrc.is_any() || !rule.tsrv.is_any();
    let translates_dst = !rule.tdst.is_any();

    if !translates_src && !translates_dst {
        return Ok(RuleType::NoNat);
    }
    if translates_src && translates_dst {
        return Err(CompileError::policy(
            "Can not translate both source and destination in the same rule",
            &rule.label,
        ));
    }

    if translates_dst {
        if rule.tdst.len() > 1 {
            return Ok(RuleType::LoadBalance);
        }
        if let Some(item) = rule.tdst.single_item() {
            if ctx.policy.is_firewall_object(item) {
                return Ok(RuleType::Redirect);
            }
            if is_network(ctx, item)?
                && rule
                    .odst
                    .single_item()
                    .map_or(false, |odst| is_network(ctx, odst).unwrap_or(false))
            {
                return Ok(RuleType::NetDestinationNat);
            }
        }
        return Ok(RuleType::DestinationNat);
    }

    if let Some(item) = rule.tsrc.single_item() {
        if !ctx.policy.is_firewall_object(item) {
            if let AddrSpec::Interface { dynamic: true, .. } = ctx.policy.resolve_addr(item)? {
                return Ok(RuleType::Masquerade);
            }
        }
        if is_network(ctx, item)?
            && rule
                .osrc
                .single_item()
                .map_or(false, |osrc| is_network(ctx, osrc).unwrap_or(false))
        {
            return Ok(RuleType::NetSourceNat);
        }
    }
    Ok(RuleType::SourceNat)
}

fn is_network(ctx: &CompileContext<'_>, item: &str) -> Result<bool, CompileError> {
    if as_interface_ref(item).is_some() || as_addr_ref(item).is_some() {
        return Ok(false);
    }
    if ctx.policy.is_firewall_object(item) {
        return Ok(false);
    }
    Ok(matches!(
        ctx.policy.resolve_addr(item)?,
        AddrSpec::Network(_)
    ))
}

/// In destination-translation rules, replace the firewall object in
/// the original destination with the external interfaces it stands
/// for.
pub struct ReplaceFirewallInODst;

impl Stage for ReplaceFirewallInODst {
    fn name(&self) -> &'static str {
        "replace fw object in odst"
    }

    fn run(
        &mut self,
        ctx: &mut CompileContext<'_>,
        mut rules: Vec<NatRule>,
    ) -> Result<Vec<NatRule>, CompileError> {
        for rule in &mut rules {
            if rule.rule_type != Some(RuleType::DestinationNat) {
                continue;
            }
            let holds_firewall = rule
                .odst
                .items
                .first()
                .map_or(false, |item| ctx.policy.is_firewall_object(item));
            if !holds_firewall {
                continue;
            }
            let replacement: Vec<String> = ctx
                .policy
                .firewall
                .external_interfaces()
                .map(|iface| interface_ref(&iface.name))
                .collect();
            if !replacement.is_empty() {
                rule.odst.items = replacement;
            }
        }
        Ok(rules)
    }
}

/// In source-translation rules, replace the firewall object in the
/// translated source with concrete interfaces.
///
/// When the original destination is known, the interface serving its
/// zone is the only sensible choice. When it is the wildcard, every
/// interface less secure than the source's own is a candidate and the
/// rule fans out across them at the atomic split.
pub struct ReplaceFirewallInTSrc;

impl Stage for ReplaceFirewallInTSrc {
    fn name(&self) -> &'static str {
        "replace fw object in tsrc"
    }

    fn run(
        &mut self,
        ctx: &mut CompileContext<'_>,
        mut rules: Vec<NatRule>,
    ) -> Result<Vec<NatRule>, CompileError> {
        for rule in &mut rules {
            if rule.rule_type != Some(RuleType::SourceNat) {
                continue;
            }
            let holds_firewall = rule
                .tsrc
                .items
                .first()
                .map_or(false, |item| ctx.policy.is_firewall_object(item));
            if !holds_firewall {
                continue;
            }

            let replacement: Vec<String> = if rule.odst.is_any() {
                let osrc_level = match rule.osrc.items.first() {
                    Some(item) => {
                        let spec = ctx.policy.resolve_addr(item)?;
                        let iface = ctx.zone_for(&spec, item, &rule.label)?;
                        ctx.interface(&iface)?.security_level
                    }
                    None => 100,
                };
                ctx.policy
                    .firewall
                    .interfaces
                    .iter()
                    .filter(|iface| iface.security_level < osrc_level)
                    .map(|iface| interface_ref(&iface.name))
                    .collect()
            } else {
                match rule.odst.items.first() {
                    Some(item) => {
                        let spec = ctx.policy.resolve_addr(item)?;
                        let iface = ctx.zone_for(&spec, item, &rule.label)?;
                        vec![interface_ref(&iface)]
                    }
                    None => Vec::new(),
                }
            };
            if !replacement.is_empty() {
                rule.tsrc.items = replacement;
            }
        }
        Ok(rules)
    }
}

/// Swap host references matching an interface address for the
/// interface itself, in the original destination and translated
/// source.
pub struct UseFirewallInterfaces;

impl Stage for UseFirewallInterfaces {
    fn name(&self) -> &'static str {
        "use interfaces instead of addresses"
    }

    fn run(
        &mut self,
        ctx: &mut CompileContext<'_>,
        mut rules: Vec<NatRule>,
    ) -> Result<Vec<NatRule>, CompileError> {
        for rule in &mut rules {
            for pick in [ElementPick::ODst, ElementPick::TSrc] {
                let element = match pick {
                    ElementPick::ODst => &rule.odst,
                    ElementPick::TSrc => &rule.tsrc,
                };
                if element.is_any() {
                    continue;
                }
                let mut swapped = None;
                for (pos, item) in element.items.iter().enumerate() {
                    if as_interface_ref(item).is_some() {
                        continue;
                    }
                    let addr = match ctx.policy.resolve_addr(item)? {
                        AddrSpec::Host(addr) => addr,
                        _ => continue,
                    };
                    if let Some(iface) = ctx
                        .policy
                        .firewall
                        .interfaces
                        .iter()
                        .find(|iface| iface.address() == Some(addr))
                    {
                        swapped = Some((pos, interface_ref(&iface.name)));
                        break;
                    }
                }
                if let Some((pos, item)) = swapped {
                    let element = match pick {
                        ElementPick::ODst => &mut rule.odst,
                        ElementPick::TSrc => &mut rule.tsrc,
                    };
                    element.items[pos] = item;
                }
            }
        }
        Ok(rules)
    }
}

enum ElementPick {
    ODst,
    TSrc,
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
                "mapped-net": { "type": "network", "net": "192.0.2.64/26" },
                "fw-itself": { "type": "host", "addr": "192.0.2.1", "firewall": true },
                "outside-if": { "type": "interface", "interface": "ethernet0" },
                "server": { "type": "host", "addr": "10.0.0.100" },
                "outside-addr": { "type": "host", "addr": "192.0.2.1" }
            },
            "rules": []
        }"#,
        )
        .expect("policy")
    }

    fn rule(json: &str) -> NatRule {
        serde_json::from_str(json).expect("rule")
    }

    #[test]
    fn classification_covers_the_basic_shapes() {
        let policy = policy();
        let mut ctx = CompileContext::new(&policy, CompileOptions::default()).expect("ctx");

        let cases = [
            (r#"{ "label": "0", "osrc": { "items": ["lan-net"] } }"#, RuleType::NoNat),
            (
                r#"{ "label": "1", "osrc": { "items": ["lan-net"] },
                     "tsrc": { "items": ["outside-addr"] } }"#,
                RuleType::SourceNat,
            ),
            (
                r#"{ "label": "2", "osrc": { "items": ["lan-net"] },
                     "tsrc": { "items": ["mapped-net"] } }"#,
                RuleType::NetSourceNat,
            ),
            (
                r#"{ "label": "3", "odst": { "items": ["outside-addr"] },
                     "tdst": { "items": ["server"] } }"#,
                RuleType::DestinationNat,
            ),
            (
                r#"{ "label": "4", "odst": { "items": ["outside-addr"] },
                     "tdst": { "items": ["fw-itself"] } }"#,
                RuleType::Redirect,
            ),
            (
                r#"{ "label": "5", "odst": { "items": ["outside-addr"] },
                     "tdst": { "items": ["server", "lan-net"] } }"#,
                RuleType::LoadBalance,
            ),
        ];
        for (json, expected) in cases {
            let rules = ClassifyRules.run(&mut ctx, vec![rule(json)]).expect("classify");
            assert_eq!(rules[0].rule_type, Some(expected), "rule {json}");
        }
    }

    #[test]
    fn translating_both_sides_is_fatal() {
        let policy = policy();
        let mut ctx = CompileContext::new(&policy, CompileOptions::default()).expect("ctx");
        let input = rule(
            r#"{ "label": "0", "tsrc": { "items": ["outside-addr"] },
                 "tdst": { "items": ["server"] } }"#,
        );
        let err = ClassifyRules.run(&mut ctx, vec![input]).expect_err("must fail");
        assert!(err.to_string().contains("both source and destination"));
    }

    #[test]
    fn firewall_in_tsrc_becomes_the_destination_zone_interface() {
        let policy = policy();
        let mut ctx = CompileContext::new(&policy, CompileOptions::default()).expect("ctx");
        let mut input = rule(
            r#"{ "label": "0", "osrc": { "items": ["lan-net"] },
                 "odst": { "items": ["outside-addr"] },
                 "tsrc": { "items": ["fw-itself"] } }"#,
        );
        input.rule_type = Some(RuleType::SourceNat);
        let rules = ReplaceFirewallInTSrc.run(&mut ctx, vec![input]).expect("replace");
        assert_eq!(rules[0].tsrc.items, vec!["interface:ethernet0"]);
    }

    #[test]
    fn host_matching_interface_address_is_swapped_for_it() {
        let policy = policy();
        let mut ctx = CompileContext::new(&policy, CompileOptions::default()).expect("ctx");
        let mut input = rule(
            r#"{ "label": "0", "osrc": { "items": ["lan-net"] },
                 "tsrc": { "items": ["outside-addr"] } }"#,
        );
        input.rule_type = Some(RuleType::SourceNat);
        let rules = UseFirewallInterfaces.run(&mut ctx, vec![input]).expect("swap");
        assert_eq!(rules[0].tsrc.items, vec!["interface:ethernet0"]);
    }
}
