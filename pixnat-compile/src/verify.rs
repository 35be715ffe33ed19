//! Rule verification.
//!
//! Two checkpoints. [`VerifyRules`] runs right after classification,
//! on rules that may still hold several references per element; it
//! rejects rule shapes the target cannot express and degrades the ones
//! old OS releases only partially support. [`VerifyRuleElements`] runs
//! after the atomic split and interface assignment, when every element
//! is a single resolved operand, and checks the operand-level
//! constraints of the `static` and `nat` directives.

use natpolicy_core::{AddrSpec, NatRule, RuleType};

use crate::context::CompileContext;
use crate::error::CompileError;
use crate::pipeline::Stage;

/// Shape-level checks and version degradations.
pub struct VerifyRules;

impl Stage for VerifyRules {
    fn name(&self) -> &'static str {
        "verify rules"
    }

    fn run(
        &mut self,
        ctx: &mut CompileContext<'_>,
        mut rules: Vec<NatRule>,
    ) -> Result<Vec<NatRule>, CompileError> {
        let lt_63 = ctx.older_than("6.3");
        for rule in &mut rules {
            let label = rule.label.clone();

            if rule.rule_type == Some(RuleType::LoadBalance) {
                return Err(CompileError::policy(
                    "Load balancing rules are not supported",
                    &label,
                ));
            }
            if rule.rule_type == Some(RuleType::NoNat)
                && (!rule.osrv.is_any() || !rule.tsrv.is_any())
            {
                return Err(CompileError::policy(
                    "'no nat' rules should have no services",
                    &label,
                ));
            }
            if rule.has_negation() {
                return Err(CompileError::policy(
                    "Negation is not supported in NAT rules",
                    &label,
                ));
            }

            if is_snat(rule) {
                if rule.tsrc.len() > 1 {
                    return Err(CompileError::policy(
                        "There should be no more than one object in translated source",
                        &label,
                    ));
                }
                if !rule.odst.is_any() && lt_63 {
                    ctx.warn(
                        "Original destination is ignored in 'nat' NAT rules \
                         when compiling for PIX v6.2 and earlier",
                        &label,
                    );
                    rule.odst.set_any();
                }
            }

            if is_dnat(rule) {
                if rule.odst.len() > 1 && lt_63 {
                    return Err(CompileError::policy(
                        "There should be no more than one object in original destination",
                        &label,
                    ));
                }
                if !rule.osrc.is_any() && lt_63 {
                    ctx.warn(
                        "Original source is ignored in 'static' NAT rules \
                         when compiling for PIX v6.2 and earlier",
                        &label,
                    );
                    rule.osrc.set_any();
                }
            }

            if rule.osrv.len() > 1 && !rule.tsrv.is_any() {
                return Err(CompileError::policy(
                    "Can not translate multiple services into one service in one rule",
                    &label,
                ));
            }
            if rule.tsrv.len() > 1 {
                return Err(CompileError::policy(
                    "Translated service should be 'Original' or should contain single object",
                    &label,
                ));
            }
            if let Some(item) = rule.tsrv.single_item() {
                if ctx.policy.service(item)?.is_group() {
                    return Err(CompileError::policy(
                        "Can not use group in translated service",
                        &label,
                    ));
                }
            }

            if rule.rule_type == Some(RuleType::NetSourceNat) {
                check_same_size_networks(
                    ctx,
                    &rule.osrc,
                    &rule.tsrc,
                    "Original and translated source should both be networks of the same size",
                    &label,
                )?;
            }
            if rule.rule_type == Some(RuleType::NetDestinationNat) {
                check_same_size_networks(
                    ctx,
                    &rule.odst,
                    &rule.tdst,
                    "Original and translated destination should both be networks of the same size",
                    &label,
                )?;
            }

            // Net-to-net and convenience types compile as the plain
            // forms from here on.
            rule.rule_type = match rule.rule_type {
                Some(RuleType::NetSourceNat) | Some(RuleType::Masquerade) => {
                    Some(RuleType::SourceNat)
                }
                Some(RuleType::NetDestinationNat) | Some(RuleType::Redirect) => {
                    Some(RuleType::DestinationNat)
                }
                other => other,
            };
        }
        Ok(rules)
    }
}

fn is_snat(rule: &NatRule) -> bool {
    matches!(
        rule.rule_type,
        Some(RuleType::SourceNat) | Some(RuleType::NetSourceNat) | Some(RuleType::Masquerade)
    )
}

fn is_dnat(rule: &NatRule) -> bool {
    matches!(
        rule.rule_type,
        Some(RuleType::DestinationNat)
            | Some(RuleType::NetDestinationNat)
            | Some(RuleType::Redirect)
    )
}

fn check_same_size_networks(
    ctx: &CompileContext<'_>,
    original: &natpolicy_core::RuleElement,
    translated: &natpolicy_core::RuleElement,
    message: &str,
    label: &str,
) -> Result<(), CompileError> {
    let prefix = |element: &natpolicy_core::RuleElement| -> Option<u8> {
        let item = element.items.first()?;
        match ctx.policy.resolve_addr(item).ok()? {
            AddrSpec::Network(net) => Some(net.prefix_len()),
            _ => None,
        }
    };
    match (prefix(original), prefix(translated)) {
        (Some(a), Some(b)) if a == b => Ok(()),
        _ => Err(CompileError::policy(message, label)),
    }
}

/// Operand-level checks on atomic rules.
pub struct VerifyRuleElements;

impl Stage for VerifyRuleElements {
    fn name(&self) -> &'static str {
        "verify rule elements"
    }

    fn run(
        &mut self,
        ctx: &mut CompileContext<'_>,
        rules: Vec<NatRule>,
    ) -> Result<Vec<NatRule>, CompileError> {
        let lt_63 = ctx.older_than("6.3");
        for rule in &rules {
            match rule.rule_type {
                Some(RuleType::SourceNat) => {
                    if (!rule.osrv.is_any() || !rule.tsrv.is_any()) && lt_63 {
                        return Err(CompileError::policy(
                            "only PIX v6.3 recognizes services in global NAT",
                            &rule.label,
                        ));
                    }
                }
                Some(RuleType::DestinationNat) => {
                    verify_static_operands(ctx, rule)?;
                }
                _ => {}
            }
        }
        Ok(rules)
    }
}

fn verify_static_operands(
    ctx: &CompileContext<'_>,
    rule: &NatRule,
) -> Result<(), CompileError> {
    let odst = ctx.addr_of(&rule.odst, rule)?;
    let tdst = ctx.addr_of(&rule.tdst, rule)?;

    if matches!(odst, AddrSpec::Range { .. }) || matches!(tdst, AddrSpec::Range { .. }) {
        return Err(CompileError::policy(
            "Address ranges are not supported in original destination \
             or translated destination",
            &rule.label,
        ));
    }

    // Interfaces count as host-sized operands for the size check.
    let sized = |spec: &AddrSpec| match spec {
        AddrSpec::Network(net) => Some(net.prefix_len()),
        AddrSpec::Interface { .. } => Some(32),
        _ => None,
    };
    if let (Some(a), Some(b)) = (sized(&odst), sized(&tdst)) {
        if a != b {
            return Err(CompileError::policy(
                "Original and translated destination must be of the same size",
                &rule.label,
            ));
        }
    }

    let osrv = ctx.service_of(&rule.osrv, rule)?;
    let tsrv = ctx.service_of(&rule.tsrv, rule)?;

    if !osrv.same_protocol(&tsrv) {
        return Err(CompileError::policy(
            "Original and translated services must be of the same type",
            &rule.label,
        ));
    }
    if osrv.is_icmp() {
        return Err(CompileError::policy(
            "ICMP services are not supported in static NAT",
            &rule.label,
        ));
    }
    for srv in [&osrv, &tsrv] {
        if srv.spans_ports() {
            return Err(CompileError::policy(
                "TCP or UDP service with a port range is not supported in NAT",
                &rule.label,
            ));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::CompileOptions;
    use natpolicy_core::Policy;

    fn policy(version: &str) -> Policy {
        natpolicy_core::parse(&format!(
            r#"{{
            "firewall": {{
                "name": "fw", "version": "{version}",
                "interfaces": [
                    {{ "name": "ethernet0", "label": "outside", "security_level": 0,
                      "addr": "192.0.2.1/24", "netzone": "default-zone", "external": true }},
                    {{ "name": "ethernet1", "label": "inside", "security_level": 100,
                      "addr": "10.0.0.1/24", "netzone": "lan-net" }}
                ]
            }},
            "objects": {{
                "default-zone": {{ "type": "network", "net": "0.0.0.0/0" }},
                "lan-net": {{ "type": "network", "net": "10.0.0.0/24" }},
                "mapped-24": {{ "type": "network", "net": "192.0.2.0/24" }},
                "mapped-26": {{ "type": "network", "net": "198.51.100.64/26" }},
                "server": {{ "type": "host", "addr": "10.0.0.100" }},
                "outside-addr": {{ "type": "host", "addr": "192.0.2.40" }}
            }},
            "services": {{
                "http": {{ "type": "tcp", "port": 80 }},
                "high-ports": {{ "type": "tcp", "port": 1024, "port_end": 65535 }},
                "dns": {{ "type": "udp", "port": 53 }},
                "ping": {{ "type": "icmp", "icmp_type": 8 }}
            }},
            "rules": []
        }}"#
        ))
        .expect("policy")
    }

    fn rule(json: &str) -> NatRule {
        serde_json::from_str(json).expect("rule")
    }

    #[test]
    fn negation_is_rejected() {
        let policy = policy("6.3");
        let mut ctx = CompileContext::new(&policy, CompileOptions::default()).expect("ctx");
        let mut input = rule(
            r#"{ "label": "3", "osrc": { "items": ["lan-net"], "negated": true },
                 "tsrc": { "items": ["outside-addr"] } }"#,
        );
        input.rule_type = Some(RuleType::SourceNat);
        let err = VerifyRules.run(&mut ctx, vec![input]).expect_err("must fail");
        assert_eq!(
            err.to_string(),
            "Negation is not supported in NAT rules. Rule 3"
        );
    }

    #[test]
    fn old_os_degrades_odst_with_a_warning() {
        let policy = policy("6.2");
        let mut ctx = CompileContext::new(&policy, CompileOptions::default()).expect("ctx");
        let mut input = rule(
            r#"{ "label": "0", "osrc": { "items": ["lan-net"] },
                 "odst": { "items": ["outside-addr"] },
                 "tsrc": { "items": ["outside-addr"] } }"#,
        );
        input.rule_type = Some(RuleType::SourceNat);
        let rules = VerifyRules.run(&mut ctx, vec![input]).expect("verify");
        assert!(rules[0].odst.is_any());
        assert_eq!(ctx.warnings.len(), 1);
        assert!(ctx.warnings[0].message.contains("Original destination is ignored"));
    }

    #[test]
    fn net_translation_requires_same_size_networks() {
        let policy = policy("6.3");
        let mut ctx = CompileContext::new(&policy, CompileOptions::default()).expect("ctx");
        let mut input = rule(
            r#"{ "label": "0", "osrc": { "items": ["lan-net"] },
                 "tsrc": { "items": ["mapped-26"] } }"#,
        );
        input.rule_type = Some(RuleType::NetSourceNat);
        let err = VerifyRules.run(&mut ctx, vec![input]).expect_err("must fail");
        assert!(err.to_string().contains("networks of the same size"));

        let mut input = rule(
            r#"{ "label": "1", "osrc": { "items": ["lan-net"] },
                 "tsrc": { "items": ["mapped-24"] } }"#,
        );
        input.rule_type = Some(RuleType::NetSourceNat);
        let rules = VerifyRules.run(&mut ctx, vec![input]).expect("verify");
        assert_eq!(rules[0].rule_type, Some(RuleType::SourceNat));
    }

    #[test]
    fn static_rules_reject_icmp_and_port_spans() {
        let policy = policy("6.3");
        let mut ctx = CompileContext::new(&policy, CompileOptions::default()).expect("ctx");

        let mut input = rule(
            r#"{ "label": "0", "odst": { "items": ["outside-addr"] },
                 "osrv": { "items": ["ping"] },
                 "tdst": { "items": ["server"] },
                 "tsrv": { "items": ["ping"] } }"#,
        );
        input.rule_type = Some(RuleType::DestinationNat);
        let err = VerifyRuleElements
            .run(&mut ctx, vec![input])
            .expect_err("must fail");
        assert!(err.to_string().contains("ICMP services are not supported"));

        let mut input = rule(
            r#"{ "label": "1", "odst": { "items": ["outside-addr"] },
                 "osrv": { "items": ["high-ports"] },
                 "tdst": { "items": ["server"] },
                 "tsrv": { "items": ["high-ports"] } }"#,
        );
        input.rule_type = Some(RuleType::DestinationNat);
        let err = VerifyRuleElements
            .run(&mut ctx, vec![input])
            .expect_err("must fail");
        assert!(err.to_string().contains("port range is not supported"));
    }

    #[test]
    fn services_in_global_nat_require_63() {
        let policy = policy("6.2");
        let mut ctx = CompileContext::new(&policy, CompileOptions::default()).expect("ctx");
        let mut input = rule(
            r#"{ "label": "0", "osrc": { "items": ["lan-net"] },
                 "osrv": { "items": ["http"] },
                 "tsrc": { "items": ["outside-addr"] } }"#,
        );
        input.rule_type = Some(RuleType::SourceNat);
        let err = VerifyRuleElements
            .run(&mut ctx, vec![input])
            .expect_err("must fail");
        assert!(err.to_string().contains("v6.3 recognizes services"));
    }
}
