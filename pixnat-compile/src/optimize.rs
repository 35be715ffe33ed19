//! Default-pool optimization.
//!
//! A source-translation rule whose original source is exactly the
//! network zone of an internal interface does not need to match the
//! source again: only packets from that network can arrive on the
//! interface. Such rules compile to the catch-all
//! `nat (...) N 0.0.0.0 0.0.0.0` form.
//!
//! Two steps. [`MarkDefaultPool`] runs before any expansion and swaps
//! the zone object in the original source for the interface itself,
//! setting the scratch flags; [`ClearOptimizedSource`] runs after
//! interface assignment and clears the element, leaving the wildcard
//! the emitter expects.

use natpolicy_core::{interface_ref, NatRule};

use crate::context::CompileContext;
use crate::error::CompileError;
use crate::pipeline::Stage;

/// Mark rules eligible for the default pool (step one).
pub struct MarkDefaultPool;

impl Stage for MarkDefaultPool {
    fn name(&self) -> &'static str {
        "mark default pool"
    }

    fn run(
        &mut self,
        ctx: &mut CompileContext<'_>,
        mut rules: Vec<NatRule>,
    ) -> Result<Vec<NatRule>, CompileError> {
        for rule in &mut rules {
            let Some(osrc) = rule.osrc.single_item() else {
                continue;
            };
            if !rule.osrv.is_any() || !rule.odst.is_any() {
                continue;
            }
            // Only shapes that classify as source translation or
            // translation exemption qualify; types are not derived
            // yet this early.
            let snat_shape = !rule.tsrc.is_any() && rule.tdst.is_any();
            let nonat_shape =
                rule.tsrc.is_any() && rule.tdst.is_any() && rule.tsrv.is_any();
            if !snat_shape && !nonat_shape {
                continue;
            }
            let matching = ctx
                .policy
                .firewall
                .interfaces
                .iter()
                .find(|iface| iface.netzone.as_deref() == Some(osrc));
            if let Some(iface) = matching {
                rule.scratch.clear_osrc = true;
                rule.scratch.use_default_pool = true;
                rule.osrc.items = vec![interface_ref(&iface.name)];
            }
        }
        Ok(rules)
    }
}

/// Clear the marked original source (step two).
pub struct ClearOptimizedSource;

impl Stage for ClearOptimizedSource {
    fn name(&self) -> &'static str {
        "clear optimized source"
    }

    fn run(
        &mut self,
        _ctx: &mut CompileContext<'_>,
        mut rules: Vec<NatRule>,
    ) -> Result<Vec<NatRule>, CompileError> {
        for rule in &mut rules {
            if rule.scratch.clear_osrc {
                rule.osrc.set_any();
            }
        }
        Ok(rules)
    }
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
                "other-net": { "type": "network", "net": "172.16.0.0/24" },
                "outside-addr": { "type": "host", "addr": "192.0.2.40" },
                "web": { "type": "host", "addr": "192.0.2.80" }
            },
            "services": { "http": { "type": "tcp", "port": 80 } },
            "rules": []
        }"#,
        )
        .expect("policy")
    }

    fn rule(json: &str) -> NatRule {
        serde_json::from_str(json).expect("rule")
    }

    #[test]
    fn zone_matching_source_is_marked_and_later_cleared() {
        let policy = policy();
        let mut ctx = CompileContext::new(&policy, CompileOptions::default()).expect("ctx");
        let input = rule(
            r#"{ "label": "0", "osrc": { "items": ["lan-net"] },
                 "tsrc": { "items": ["outside-addr"] } }"#,
        );
        let rules = MarkDefaultPool.run(&mut ctx, vec![input]).expect("mark");
        assert!(rules[0].scratch.use_default_pool);
        assert_eq!(rules[0].osrc.items, vec!["interface:ethernet1"]);

        let rules = ClearOptimizedSource.run(&mut ctx, rules).expect("clear");
        assert!(rules[0].osrc.is_any());
    }

    #[test]
    fn concrete_destination_or_service_disables_the_optimization() {
        let policy = policy();
        let mut ctx = CompileContext::new(&policy, CompileOptions::default()).expect("ctx");

        let with_dst = rule(
            r#"{ "label": "0", "osrc": { "items": ["lan-net"] },
                 "odst": { "items": ["web"] },
                 "tsrc": { "items": ["outside-addr"] } }"#,
        );
        let with_srv = rule(
            r#"{ "label": "1", "osrc": { "items": ["lan-net"] },
                 "osrv": { "items": ["http"] },
                 "tsrc": { "items": ["outside-addr"] } }"#,
        );
        let other_net = rule(
            r#"{ "label": "2", "osrc": { "items": ["other-net"] },
                 "tsrc": { "items": ["outside-addr"] } }"#,
        );
        let rules = MarkDefaultPool
            .run(&mut ctx, vec![with_dst, with_srv, other_net])
            .expect("mark");
        assert!(rules.iter().all(|r| !r.scratch.use_default_pool));
    }
}
