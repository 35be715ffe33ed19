//! Command merging.
//!
//! Runs once over the fully materialized command model, before the
//! detectors. Merges only ever look backwards: for each command,
//! earlier commands are scanned in creation order and the first match
//! wins, so the earliest command always survives and later ones are
//! suppressed. Three NAT merges and one static merge exist:
//!
//! - equal static translations share one access list, with the later
//!   `static` directive suppressed;
//! - NAT commands translating to the same pool address behind the same
//!   interface share one pool id, with the later `global` suppressed;
//! - NAT commands with equal original operands on the same interface
//!   are fully redundant and the later one emits nothing;
//! - NAT commands that already share a pool id, pool address, and
//!   original interface share one access list, with the later `nat`
//!   directive suppressed.
//!
//! Pool-id rewrites collapse whole chains: every command holding the
//! retired id is rewritten, so a pool shared three ways ends up with a
//! single id.

use natpolicy_core::NatRule;

use crate::context::CompileContext;
use crate::error::CompileError;
use crate::pipeline::Stage;

pub struct MergeCommands;

impl Stage for MergeCommands {
    fn name(&self) -> &'static str {
        "merge nat and static commands"
    }

    fn run(
        &mut self,
        ctx: &mut CompileContext<'_>,
        rules: Vec<NatRule>,
    ) -> Result<Vec<NatRule>, CompileError> {
        merge_statics(ctx);
        merge_nats(ctx);
        Ok(rules)
    }
}

fn merge_statics(ctx: &mut CompileContext<'_>) {
    let statics = &mut ctx.static_commands;
    for i in 0..statics.len() {
        for j in 0..i {
            let same = statics[i].out_addr == statics[j].out_addr
                && statics[i].in_addr == statics[j].in_addr
                && statics[i].o_srv == statics[j].o_srv
                && statics[i].t_srv == statics[j].t_srv;
            if same {
                statics[i].acl_name = statics[j].acl_name.clone();
                statics[i].ignore_static = true;
                break;
            }
        }
    }
}

fn merge_nats(ctx: &mut CompileContext<'_>) {
    let nats = &mut ctx.nat_commands;

    // Pool sharing: same translated address behind the same interface.
    for i in 0..nats.len() {
        for j in 0..i {
            if nats[i].t_addr == nats[j].t_addr && nats[i].t_iface == nats[j].t_iface {
                nats[i].ignore_global = true;
                let (from, to) = (nats[i].pool_id, nats[j].pool_id);
                collapse_pool(nats, from, to);
                break;
            }
        }
    }

    // Redundancy: equal original operands on the same interface.
    for i in 0..nats.len() {
        for j in 0..i {
            if nats[j].ignore_nat {
                continue;
            }
            let same = nats[i].o_src == nats[j].o_src
                && nats[i].o_dst == nats[j].o_dst
                && nats[i].o_srv == nats[j].o_srv
                && nats[i].o_iface == nats[j].o_iface;
            if same {
                nats[i].ignore_nat = true;
                let (from, to) = (nats[i].pool_id, nats[j].pool_id);
                collapse_pool(nats, from, to);
                break;
            }
        }
    }

    // Access-list sharing within one pool. Commands translating through
    // the default pool carry no access list and never participate.
    for i in 0..nats.len() {
        if nats[i].use_default_pool || nats[i].ignore_nat {
            continue;
        }
        for j in 0..i {
            if nats[j].ignore_nat || nats[j].use_default_pool {
                continue;
            }
            if nats[i].pool_id == nats[j].pool_id
                && nats[i].t_addr == nats[j].t_addr
                && nats[i].o_iface == nats[j].o_iface
            {
                nats[i].acl_name = nats[j].acl_name.clone();
                nats[i].ignore_nat_keep_acl = true;
                break;
            }
        }
    }
}

/// Rewrite every command holding `from` to `to`, collapsing merge
/// chains into a single surviving pool id.
fn collapse_pool(nats: &mut [crate::commands::NatCmd], from: usize, to: usize) {
    for cmd in nats.iter_mut() {
        if cmd.pool_id == from {
            cmd.pool_id = to;
        }
    }
}
