//! Per-compilation state.
//!
//! One [`CompileContext`] exists per firewall compilation and owns
//! everything the stages share: the read-only policy, the effective
//! options, the zone resolver with its cache, the append-only command
//! lists, the access-list name registry, the pool-id counter, collected
//! warnings, and the output line buffer. Independent compilations own
//! independent contexts, so nothing here is process-global.

use std::collections::{BTreeMap, BTreeSet};

use natpolicy_core::{AddrSpec, Interface, NatRule, Policy, RuleElement, ServiceObject};

use crate::commands::{NatCmd, StaticCmd};
use crate::error::{CompileError, Warning};
use crate::options::{version_lt, CompileOptions};
use crate::zones::ZoneResolver;

/// Shared state for one compilation run.
pub struct CompileContext<'p> {
    pub policy: &'p Policy,
    pub options: CompileOptions,
    /// Effective target OS version (options override or firewall's).
    pub version: String,
    resolver: ZoneResolver,
    /// NAT commands in creation order. Append-only; merge stages flip
    /// suppression flags but never remove entries.
    pub nat_commands: Vec<NatCmd>,
    /// Static commands in creation order. Append-only as above.
    pub static_commands: Vec<StaticCmd>,
    /// First exempt-form NoNat rule seen per interface; that rule
    /// carries the `nat 0` directive at emission.
    pub first_exempt: BTreeMap<String, usize>,
    pub warnings: Vec<Warning>,
    /// Emitted directive lines, in rule order.
    pub lines: Vec<String>,
    acl_names: BTreeSet<String>,
    pool_counter: usize,
    exempt_counter: usize,
}

impl<'p> CompileContext<'p> {
    pub fn new(policy: &'p Policy, options: CompileOptions) -> Result<Self, CompileError> {
        // A zone object that cannot be interpreted is a configuration
        // error, not an internal one.
        let resolver =
            ZoneResolver::new(policy).map_err(|err| CompileError::Policy(err.to_string()))?;
        let version = options
            .target_version
            .clone()
            .unwrap_or_else(|| policy.firewall.version.clone());
        Ok(CompileContext {
            policy,
            options,
            version,
            resolver,
            nat_commands: Vec::new(),
            static_commands: Vec::new(),
            first_exempt: BTreeMap::new(),
            warnings: Vec::new(),
            lines: Vec::new(),
            acl_names: BTreeSet::new(),
            pool_counter: 1,
            exempt_counter: 0,
        })
    }

    /// True when the target is a PIX older than `version`. FWSM-class
    /// devices never gate on these legacy checks.
    pub fn older_than(&self, version: &str) -> bool {
        self.policy.firewall.platform == "pix" && version_lt(&self.version, version)
    }

    pub fn warn(&mut self, message: impl Into<String>, rule: &str) {
        self.warnings.push(Warning::new(message, rule));
    }

    /// Next pool-grouping key. Starts at 1; 0 is reserved for the
    /// translation-exemption form.
    pub fn next_pool_id(&mut self) -> usize {
        let id = self.pool_counter;
        self.pool_counter += 1;
        id
    }

    /// Sequence number for an exempt-form NoNat rule.
    pub fn next_exempt_seq(&mut self) -> usize {
        let seq = self.exempt_counter;
        self.exempt_counter += 1;
        seq
    }

    /// Allocate a fresh access-list name derived from a rule label.
    pub fn alloc_acl_name(&mut self, label: &str) -> String {
        let mut n = 0;
        loop {
            let candidate = format!("{label}.{n}");
            if self.acl_names.insert(candidate.clone()) {
                return candidate;
            }
            n += 1;
        }
    }

    /// Record an externally shaped access-list name (exempt lists).
    pub fn register_acl_name(&mut self, name: &str) {
        self.acl_names.insert(name.to_string());
    }

    pub fn interface(&self, name: &str) -> Result<&Interface, CompileError> {
        self.policy
            .firewall
            .interface(name)
            .ok_or_else(|| CompileError::Internal(format!("unknown interface '{name}'")))
    }

    /// Zone label an interface contributes to directives.
    pub fn iface_label(&self, name: &str) -> Result<&str, CompileError> {
        Ok(self.interface(name)?.label.as_str())
    }

    /// Interface serving an operand's zone; a miss is a fatal policy
    /// error naming the object and the rule.
    pub fn zone_for(
        &mut self,
        spec: &AddrSpec,
        object: &str,
        rule: &str,
    ) -> Result<String, CompileError> {
        self.resolver.interface_for(spec).ok_or_else(|| {
            CompileError::policy(
                format!("Object '{object}' does not belong to any known network zone"),
                rule,
            )
        })
    }

    /// Resolve an address element that must be atomic by now.
    pub fn addr_of(&self, element: &RuleElement, rule: &NatRule) -> Result<AddrSpec, CompileError> {
        if element.is_any() {
            return Ok(AddrSpec::Any);
        }
        let item = element.single_item().ok_or_else(|| {
            CompileError::broken(
                format!("rule element holds {} objects, expected one", element.len()),
                &rule.label,
            )
        })?;
        Ok(self.policy.resolve_addr(item)?)
    }

    /// Resolve a service element that must be atomic by now.
    pub fn service_of(
        &self,
        element: &RuleElement,
        rule: &NatRule,
    ) -> Result<ServiceObject, CompileError> {
        if element.is_any() {
            return Ok(ServiceObject::Any);
        }
        let item = element.single_item().ok_or_else(|| {
            CompileError::broken(
                format!("service element holds {} objects, expected one", element.len()),
                &rule.label,
            )
        })?;
        let service = self.policy.service(item)?;
        if service.is_group() {
            return Err(CompileError::broken(
                format!("service group '{item}' survived expansion"),
                &rule.label,
            ));
        }
        Ok(service.clone())
    }
}
