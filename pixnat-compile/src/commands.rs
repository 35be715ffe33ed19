//! The command model and the stages that build it.
//!
//! Past interface assignment, source-translation rules materialize as
//! [`NatCmd`] entries and destination-translation rules as
//! [`StaticCmd`] entries. Both lists live on the compile context, are
//! append-only, and are indexed by position; the merge pass and the
//! detectors flip suppression flags on entries but never remove them,
//! so a rule's `scratch.nat_cmd` / `scratch.static_cmd` index stays
//! valid for the whole run.

use natpolicy_core::{AddrSpec, NatRule, RuleType, ServiceObject};

use crate::context::CompileContext;
use crate::error::CompileError;
use crate::pipeline::Stage;

/// Shape of the address pool a NAT command translates into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolKind {
    /// Translate to the outside interface's own address.
    Interface,
    /// A whole network; emitted as a first-last address range.
    Network,
    /// An explicit address range.
    AddressRange,
    /// A single host address.
    SingleAddress,
}

/// One `nat`/`global` directive pair in the making.
#[derive(Debug, Clone)]
pub struct NatCmd {
    /// Pool-grouping key shared by the `nat` directive and its
    /// `global` pools. Rewritten when pools merge.
    pub pool_id: usize,
    pub rule_label: String,
    pub o_src: AddrSpec,
    pub o_dst: AddrSpec,
    pub o_srv: ServiceObject,
    /// Interface serving the original source's zone.
    pub o_iface: String,
    /// Interface the translated address lives behind.
    pub t_iface: String,
    pub t_addr: AddrSpec,
    pub pool_kind: PoolKind,
    pub acl_name: String,
    pub use_default_pool: bool,
    /// Fully redundant with an earlier command; emits nothing.
    pub ignore_nat: bool,
    /// Shares an earlier command's pool; emits no `global` directive.
    pub ignore_global: bool,
    /// Shares an earlier command's access list; emits the list's
    /// entries but no `nat` directive of its own.
    pub ignore_nat_keep_acl: bool,
}

/// One `static` directive in the making.
#[derive(Debug, Clone)]
pub struct StaticCmd {
    pub rule_label: String,
    pub acl_name: String,
    /// Address visible on the outside (original destination).
    pub out_addr: AddrSpec,
    /// Real inside address (translated destination).
    pub in_addr: AddrSpec,
    pub o_src: AddrSpec,
    pub o_srv: ServiceObject,
    pub t_srv: ServiceObject,
    /// Inside interface, where the real address lives.
    pub i_iface: String,
    /// Outside interface, where the mapped address is visible.
    pub o_iface: String,
    /// Merged into an earlier command; emits only access-list entries.
    pub ignore_static: bool,
}

/// Build a [`NatCmd`] for every source-translation rule.
pub struct CreateNatCommands;

impl Stage for CreateNatCommands {
    fn name(&self) -> &'static str {
        "create nat commands"
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
            let o_iface = scratch_iface(rule.scratch.iface_orig.as_deref(), rule)?;
            let t_iface = scratch_iface(rule.scratch.iface_trn.as_deref(), rule)?;
            let t_addr = ctx.addr_of(&rule.tsrc, rule)?;

            let pool_kind = if t_addr.is_interface() || ctx.interface(&t_iface)?.dynamic {
                PoolKind::Interface
            } else {
                match t_addr {
                    AddrSpec::Network(_) => PoolKind::Network,
                    AddrSpec::Range { .. } => PoolKind::AddressRange,
                    _ => PoolKind::SingleAddress,
                }
            };

            // Translating a source that lives behind a lower-security
            // interface is the bidirectional form; old OS releases
            // lack it.
            let o_level = ctx.interface(&o_iface)?.security_level;
            let t_level = ctx.interface(&t_iface)?.security_level;
            if o_level < t_level && ctx.older_than("6.2") {
                return Err(CompileError::policy(
                    "Bi-Directional NAT of source addresses is only supported in PIX 6.2 and newer",
                    &rule.label,
                ));
            }

            let cmd = NatCmd {
                pool_id: ctx.next_pool_id(),
                rule_label: rule.label.clone(),
                o_src: ctx.addr_of(&rule.osrc, rule)?,
                o_dst: ctx.addr_of(&rule.odst, rule)?,
                o_srv: ctx.service_of(&rule.osrv, rule)?,
                o_iface,
                t_iface,
                t_addr,
                pool_kind,
                acl_name: ctx.alloc_acl_name(&rule.label),
                use_default_pool: rule.scratch.use_default_pool,
                ignore_nat: false,
                ignore_global: false,
                ignore_nat_keep_acl: false,
            };
            rule.scratch.nat_cmd = Some(ctx.nat_commands.len());
            ctx.nat_commands.push(cmd);
        }
        Ok(rules)
    }
}

/// Build a [`StaticCmd`] for every destination-translation rule.
pub struct CreateStaticCommands;

impl Stage for CreateStaticCommands {
    fn name(&self) -> &'static str {
        "create static commands"
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
            let cmd = StaticCmd {
                rule_label: rule.label.clone(),
                acl_name: ctx.alloc_acl_name(&rule.label),
                out_addr: ctx.addr_of(&rule.odst, rule)?,
                in_addr: ctx.addr_of(&rule.tdst, rule)?,
                o_src: ctx.addr_of(&rule.osrc, rule)?,
                o_srv: ctx.service_of(&rule.osrv, rule)?,
                t_srv: ctx.service_of(&rule.tsrv, rule)?,
                i_iface: scratch_iface(rule.scratch.iface_trn.as_deref(), rule)?,
                o_iface: scratch_iface(rule.scratch.iface_orig.as_deref(), rule)?,
                ignore_static: false,
            };
            rule.scratch.static_cmd = Some(ctx.static_commands.len());
            ctx.static_commands.push(cmd);
        }
        Ok(rules)
    }
}

fn scratch_iface(name: Option<&str>, rule: &NatRule) -> Result<String, CompileError> {
    name.map(str::to_string)
        .ok_or_else(|| CompileError::broken("rule reached command creation unassigned", &rule.label))
}
