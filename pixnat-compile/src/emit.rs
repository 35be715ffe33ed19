//! Device code generation.
//!
//! Renders the surviving commands as PIX configuration text, one rule
//! at a time in rule order. Suppression flags set by the merge pass
//! decide which directives a command still contributes: a command with
//! a shared access list keeps emitting `access-list` entries after its
//! own `nat` or `static` directive has been suppressed.
//!
//! The optional regrouping pass is purely textual: it drops comment
//! lines and re-orders the rest into fixed buckets by directive
//! keyword, never touching line content.

use natpolicy_core::{pool_bounds, AddrSpec, NatRule, NoNatForm, RuleType, ServiceObject};

use crate::commands::{NatCmd, PoolKind, StaticCmd};
use crate::context::CompileContext;
use crate::error::CompileError;
use crate::pipeline::Stage;

/// Final pipeline stage: fill the context's line buffer.
pub struct EmitCommands;

impl Stage for EmitCommands {
    fn name(&self) -> &'static str {
        "generate device code"
    }

    fn run(
        &mut self,
        ctx: &mut CompileContext<'_>,
        rules: Vec<NatRule>,
    ) -> Result<Vec<NatRule>, CompileError> {
        let mut last_label: Option<String> = None;
        for rule in &rules {
            let lines = emit_rule(ctx, rule)?;
            if lines.is_empty() {
                continue;
            }
            if last_label.as_deref() != Some(rule.label.as_str()) {
                ctx.lines.push(format!("! rule {}", rule.label));
                last_label = Some(rule.label.clone());
            }
            ctx.lines.extend(lines);
        }
        Ok(rules)
    }
}

fn emit_rule(ctx: &CompileContext<'_>, rule: &NatRule) -> Result<Vec<String>, CompileError> {
    match rule.rule_type {
        Some(RuleType::NoNat) => emit_nonat(ctx, rule),
        Some(RuleType::SourceNat) => match rule.scratch.nat_cmd {
            Some(idx) => emit_nat(ctx, &ctx.nat_commands[idx]),
            None => Ok(Vec::new()),
        },
        Some(RuleType::DestinationNat) => match rule.scratch.static_cmd {
            Some(idx) => emit_static(ctx, &ctx.static_commands[idx]),
            None => Ok(Vec::new()),
        },
        _ => Ok(Vec::new()),
    }
}

fn emit_nonat(ctx: &CompileContext<'_>, rule: &NatRule) -> Result<Vec<String>, CompileError> {
    let orig = rule
        .scratch
        .iface_orig
        .as_deref()
        .ok_or_else(|| CompileError::broken("no-nat rule left unassigned", &rule.label))?;
    let trn = rule
        .scratch
        .iface_trn
        .as_deref()
        .ok_or_else(|| CompileError::broken("no-nat rule left unassigned", &rule.label))?;

    let osrc = ctx.addr_of(&rule.osrc, rule)?;
    let odst = ctx.addr_of(&rule.odst, rule)?;

    let mut lines = Vec::new();
    match rule.scratch.nonat_form {
        Some(NoNatForm::Exempt) => {
            let label = ctx.iface_label(orig)?;
            let acl = format!("nat0.{label}");
            lines.push(format!(
                "access-list {acl} permit ip {} {}",
                acl_clause(&osrc),
                acl_clause(&odst),
            ));
            // The nat 0 directive binds the whole list once, with the
            // first exempt rule on this interface.
            if ctx.first_exempt.get(orig) == rule.scratch.exempt_seq.as_ref() {
                lines.push(format!("nat ({label}) 0 access-list {acl}"));
            }
        }
        Some(NoNatForm::StaticLike) => {
            let (Some(addr), Some(mask)) = (odst.address(), odst.netmask()) else {
                return Err(CompileError::broken(
                    "identity static needs a concrete destination",
                    &rule.label,
                ));
            };
            lines.push(format!(
                "static ({},{}) {addr} {addr} netmask {mask}",
                ctx.iface_label(trn)?,
                ctx.iface_label(orig)?,
            ));
        }
        None => {
            return Err(CompileError::broken(
                "no-nat rule has no device form",
                &rule.label,
            ));
        }
    }
    Ok(lines)
}

fn emit_nat(ctx: &CompileContext<'_>, cmd: &NatCmd) -> Result<Vec<String>, CompileError> {
    if cmd.ignore_nat {
        return Ok(Vec::new());
    }
    let o_label = ctx.iface_label(&cmd.o_iface)?;
    let t_label = ctx.iface_label(&cmd.t_iface)?;
    let mut lines = Vec::new();

    let needs_acl =
        !cmd.use_default_pool && (!cmd.o_dst.is_any() || !cmd.o_srv.is_any());
    if needs_acl {
        lines.push(format!(
            "access-list {} permit {} {} {}{}",
            cmd.acl_name,
            cmd.o_srv.protocol_name(),
            acl_clause(&cmd.o_src),
            acl_clause(&cmd.o_dst),
            port_clause(&cmd.o_srv),
        ));
        if !cmd.ignore_nat_keep_acl {
            lines.push(format!(
                "nat ({o_label}) {} access-list {}",
                cmd.pool_id, cmd.acl_name
            ));
        }
    } else if cmd.use_default_pool {
        lines.push(format!("nat ({o_label}) {} 0.0.0.0 0.0.0.0", cmd.pool_id));
    } else {
        lines.push(format!(
            "nat ({o_label}) {} {}",
            cmd.pool_id,
            masked_clause(&cmd.o_src),
        ));
    }

    if !cmd.ignore_global {
        lines.push(global_line(t_label, cmd)?);
    }
    Ok(lines)
}

fn global_line(t_label: &str, cmd: &NatCmd) -> Result<String, CompileError> {
    let line = match cmd.pool_kind {
        PoolKind::Interface => format!("global ({t_label}) {} interface", cmd.pool_id),
        PoolKind::AddressRange => {
            let AddrSpec::Range { start, end } = &cmd.t_addr else {
                return Err(CompileError::Internal(format!(
                    "range pool without a range address in rule {}",
                    cmd.rule_label
                )));
            };
            format!("global ({t_label}) {} {start}-{end}", cmd.pool_id)
        }
        PoolKind::Network => {
            let AddrSpec::Network(net) = &cmd.t_addr else {
                return Err(CompileError::Internal(format!(
                    "network pool without a network address in rule {}",
                    cmd.rule_label
                )));
            };
            let (first, last) = pool_bounds(*net);
            format!(
                "global ({t_label}) {} {first}-{last} netmask {}",
                cmd.pool_id,
                net.netmask()
            )
        }
        PoolKind::SingleAddress => {
            let Some(addr) = cmd.t_addr.address() else {
                return Err(CompileError::Internal(format!(
                    "single-address pool without an address in rule {}",
                    cmd.rule_label
                )));
            };
            format!(
                "global ({t_label}) {} {addr} netmask 255.255.255.255",
                cmd.pool_id
            )
        }
    };
    Ok(line)
}

fn emit_static(ctx: &CompileContext<'_>, cmd: &StaticCmd) -> Result<Vec<String>, CompileError> {
    let i_label = ctx.iface_label(&cmd.i_iface)?;
    let o_label = ctx.iface_label(&cmd.o_iface)?;
    let mut lines = Vec::new();

    // Real addresses go in the source of NAT access lists, so the
    // inside address and the original source are swapped relative to
    // the rule.
    lines.push(format!(
        "access-list {} permit {} {}{} {}",
        cmd.acl_name,
        cmd.t_srv.protocol_name(),
        acl_clause(&cmd.in_addr),
        port_clause(&cmd.t_srv),
        acl_clause(&cmd.o_src),
    ));

    if !cmd.ignore_static {
        let out = match &cmd.out_addr {
            AddrSpec::Interface { .. } => "interface".to_string(),
            other => match other.address() {
                Some(addr) => addr.to_string(),
                None => {
                    return Err(CompileError::broken(
                        "static command without an outside address",
                        &cmd.rule_label,
                    ));
                }
            },
        };
        lines.push(format!(
            "static ({i_label},{o_label}) {out} access-list {}",
            cmd.acl_name
        ));
    }
    Ok(lines)
}

/// Address clause in access-list lines.
fn acl_clause(spec: &AddrSpec) -> String {
    match spec {
        AddrSpec::Any => "any".to_string(),
        AddrSpec::Host(a) => format!("host {a}"),
        AddrSpec::Network(n) => format!("{} {}", n.network(), n.netmask()),
        AddrSpec::Range { start, end } => format!("range {start} {end}"),
        AddrSpec::Interface { addr: Some(a), .. } => format!("host {a}"),
        AddrSpec::Interface { addr: None, .. } => "any".to_string(),
    }
}

/// Address clause in `nat` directives: address and netmask.
fn masked_clause(spec: &AddrSpec) -> String {
    match (spec.address(), spec.netmask()) {
        (Some(addr), Some(mask)) => format!("{addr} {mask}"),
        _ => "0.0.0.0 0.0.0.0".to_string(),
    }
}

fn port_clause(srv: &ServiceObject) -> String {
    match srv.port_range() {
        Some((lo, _)) => format!(" eq {lo}"),
        None => String::new(),
    }
}

const BUCKET_PREFIXES: [&str; 4] = ["access-list ", "global ", "nat ", "static "];

/// Regroup emitted lines into directive buckets.
///
/// Lines matching none of the known prefixes come first in their
/// original order, then each bucket in the fixed order above. Comment
/// lines are dropped; directive content and count are unchanged.
pub fn regroup(lines: &[String]) -> Vec<String> {
    let mut rest = Vec::new();
    let mut buckets: [Vec<&String>; 4] = Default::default();
    for line in lines {
        if line.starts_with('!') {
            continue;
        }
        match BUCKET_PREFIXES
            .iter()
            .position(|prefix| line.starts_with(prefix))
        {
            Some(idx) => buckets[idx].push(line),
            None => rest.push(line),
        }
    }
    rest.into_iter()
        .chain(buckets.into_iter().flatten())
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::net::Ipv4Addr;

    #[test]
    fn regroup_reorders_without_changing_content_or_count() {
        let lines = vec![
            "nat (inside) 1 10.0.0.0 255.255.255.0".to_string(),
            "access-list id80X.0 permit tcp any any eq 80".to_string(),
            "global (outside) 1 192.0.2.10-192.0.2.20".to_string(),
        ];
        let grouped = regroup(&lines);
        assert_eq!(
            grouped,
            vec![
                "access-list id80X.0 permit tcp any any eq 80".to_string(),
                "global (outside) 1 192.0.2.10-192.0.2.20".to_string(),
                "nat (inside) 1 10.0.0.0 255.255.255.0".to_string(),
            ]
        );
    }

    #[test]
    fn regroup_drops_comments_and_keeps_unknown_lines_first() {
        let lines = vec![
            "! rule 0".to_string(),
            "nat (inside) 1 0.0.0.0 0.0.0.0".to_string(),
            "clear xlate".to_string(),
        ];
        let grouped = regroup(&lines);
        assert_eq!(
            grouped,
            vec![
                "clear xlate".to_string(),
                "nat (inside) 1 0.0.0.0 0.0.0.0".to_string(),
            ]
        );
    }

    #[test]
    fn global_lines_follow_the_pool_kind() {
        let base = NatCmd {
            pool_id: 2,
            rule_label: "0".to_string(),
            o_src: AddrSpec::Any,
            o_dst: AddrSpec::Any,
            o_srv: ServiceObject::Any,
            o_iface: "ethernet1".to_string(),
            t_iface: "ethernet0".to_string(),
            t_addr: AddrSpec::Network("192.0.2.0/24".parse().expect("net")),
            pool_kind: PoolKind::Network,
            acl_name: "0.0".to_string(),
            use_default_pool: false,
            ignore_nat: false,
            ignore_global: false,
            ignore_nat_keep_acl: false,
        };
        assert_eq!(
            global_line("outside", &base).expect("line"),
            "global (outside) 2 192.0.2.1-192.0.2.254 netmask 255.255.255.0"
        );

        let mut host = base.clone();
        host.pool_kind = PoolKind::SingleAddress;
        host.t_addr = AddrSpec::Host(Ipv4Addr::new(192, 0, 2, 40));
        assert_eq!(
            global_line("outside", &host).expect("line"),
            "global (outside) 2 192.0.2.40 netmask 255.255.255.255"
        );

        let mut iface = base;
        iface.pool_kind = PoolKind::Interface;
        assert_eq!(
            global_line("outside", &iface).expect("line"),
            "global (outside) 2 interface"
        );
    }
}
