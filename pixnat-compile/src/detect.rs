//! Conflict detectors.
//!
//! All detectors run after the merge pass, over the final command
//! model, and only look at commands the merge left visible. Each is
//! optional and enabled by its own compile option; a finding aborts
//! the compilation naming both rules involved.

use natpolicy_core::{AddrSpec, NatRule};

use crate::commands::{NatCmd, PoolKind, StaticCmd};
use crate::context::CompileContext;
use crate::error::CompileError;
use crate::pipeline::Stage;

/// Two visible NAT commands that translate the same original traffic
/// behind the same interface.
pub struct DuplicateNat;

impl Stage for DuplicateNat {
    fn name(&self) -> &'static str {
        "detect duplicate nat"
    }

    fn run(
        &mut self,
        ctx: &mut CompileContext<'_>,
        rules: Vec<NatRule>,
    ) -> Result<Vec<NatRule>, CompileError> {
        let nats = &ctx.nat_commands;
        for i in 0..nats.len() {
            if nats[i].ignore_nat {
                continue;
            }
            for j in 0..i {
                if nats[j].ignore_nat {
                    continue;
                }
                let same = nats[i].t_iface == nats[j].t_iface
                    && nats[i].o_src == nats[j].o_src
                    && nats[i].o_dst == nats[j].o_dst
                    && nats[i].o_srv == nats[j].o_srv;
                if same {
                    return Err(CompileError::Policy(format!(
                        "Duplicate NAT detected: rules {} and {} : {} {} -> {}",
                        nats[i].rule_label,
                        nats[j].rule_label,
                        nats[i].o_src,
                        nats[i].o_srv.protocol_name(),
                        nats[i].o_dst,
                    )));
                }
            }
        }
        Ok(rules)
    }
}

/// Address pools that cover their interface's own addresses or each
/// other.
pub struct GlobalPoolOverlap;

impl Stage for GlobalPoolOverlap {
    fn name(&self) -> &'static str {
        "detect global pool problems"
    }

    fn run(
        &mut self,
        ctx: &mut CompileContext<'_>,
        rules: Vec<NatRule>,
    ) -> Result<Vec<NatRule>, CompileError> {
        let mut warnings = Vec::new();
        let nats = &ctx.nat_commands;
        for i in 0..nats.len() {
            let cmd = &nats[i];
            if cmd.ignore_global {
                continue;
            }
            if cmd.pool_kind != PoolKind::Interface {
                let iface = ctx.interface(&cmd.t_iface)?;
                if let Some(addr) = iface.address() {
                    if cmd.t_addr.overlaps_addr(addr) {
                        return Err(CompileError::policy(
                            format!("Global pool {} overlaps with interface address", cmd.t_addr),
                            &cmd.rule_label,
                        ));
                    }
                }
                if let Some(bcast) = iface.broadcast() {
                    if cmd.t_addr.overlaps_addr(bcast) {
                        warnings.push((
                            format!("Global pool {} overlaps with broadcast address", cmd.t_addr),
                            cmd.rule_label.clone(),
                        ));
                    }
                }
            }
            for j in 0..i {
                if nats[j].ignore_global {
                    continue;
                }
                if cmd.t_iface == nats[j].t_iface && cmd.t_addr.intersects(&nats[j].t_addr) {
                    return Err(CompileError::Policy(format!(
                        "Global pool overlapping: {} : {} and {} : {}",
                        cmd.rule_label, cmd.t_addr, nats[j].rule_label, nats[j].t_addr,
                    )));
                }
            }
        }
        for (message, rule) in warnings {
            ctx.warn(message, &rule);
        }
        Ok(rules)
    }
}

/// Static translations that overlap or repeat one another.
pub struct OverlappingStatics;

impl Stage for OverlappingStatics {
    fn name(&self) -> &'static str {
        "detect overlapping statics"
    }

    fn run(
        &mut self,
        ctx: &mut CompileContext<'_>,
        rules: Vec<NatRule>,
    ) -> Result<Vec<NatRule>, CompileError> {
        let statics = &ctx.static_commands;
        for i in 0..statics.len() {
            if statics[i].ignore_static {
                continue;
            }
            for j in 0..i {
                if statics[j].ignore_static {
                    continue;
                }
                let (a, b) = (&statics[i], &statics[j]);
                let same_traffic =
                    a.o_srv == b.o_srv && a.t_srv == b.t_srv && a.o_src == b.o_src;
                if !same_traffic {
                    continue;
                }
                let conflict = match (&a.out_addr, &b.out_addr) {
                    // Interface outsides clash only when it is the
                    // same interface.
                    (
                        AddrSpec::Interface { name: n1, .. },
                        AddrSpec::Interface { name: n2, .. },
                    ) => n1 == n2,
                    _ => {
                        a.in_addr.intersects(&b.in_addr) || a.out_addr.intersects(&b.out_addr)
                    }
                };
                if conflict {
                    return Err(CompileError::Policy(format!(
                        "Static NAT rules overlap or are redundant: rules {} and {} : \
                         outside address: {} inside address: {}",
                        b.rule_label, a.rule_label, a.out_addr, a.in_addr,
                    )));
                }
            }
        }
        Ok(rules)
    }
}

/// Address pools that cover a static translation's outside address.
pub struct GlobalPoolsVsStatics;

impl Stage for GlobalPoolsVsStatics {
    fn name(&self) -> &'static str {
        "detect global pool and static conflicts"
    }

    fn run(
        &mut self,
        ctx: &mut CompileContext<'_>,
        rules: Vec<NatRule>,
    ) -> Result<Vec<NatRule>, CompileError> {
        for scmd in &ctx.static_commands {
            for natcmd in &ctx.nat_commands {
                if natcmd.ignore_global {
                    continue;
                }
                if let Some(conflict) = pool_covers_static(natcmd, scmd) {
                    return Err(CompileError::Policy(conflict));
                }
            }
        }
        Ok(rules)
    }
}

fn pool_covers_static(natcmd: &NatCmd, scmd: &StaticCmd) -> Option<String> {
    // A dynamic interface pool has no known address to compare, and a
    // pool on the very interface the static maps through is legal.
    if let AddrSpec::Interface { name, addr, dynamic } = &natcmd.t_addr {
        if *dynamic || addr.is_none() {
            return None;
        }
        if let AddrSpec::Interface { name: out_name, .. } = &scmd.out_addr {
            if name == out_name {
                return None;
            }
        }
    }

    // Interface pools hold a single address regardless of the
    // interface netmask.
    let pool = if natcmd.pool_kind == PoolKind::Interface {
        AddrSpec::Host(natcmd.t_addr.address()?)
    } else {
        natcmd.t_addr.clone()
    };

    let out = &scmd.out_addr;
    let overlap = out
        .address()
        .map_or(false, |a| pool.overlaps_addr(a))
        || pool.address().map_or(false, |a| out.overlaps_addr(a));
    if overlap {
        Some(format!(
            "Global pool {} from rule {} overlaps with static translation address in rule {}",
            pool, natcmd.rule_label, scmd.rule_label,
        ))
    } else {
        None
    }
}
