//! Compilation entry point.
//!
//! One call compiles one firewall's NAT policy: build a fresh context,
//! assemble the pipeline from the options, run it over a copy of the
//! policy's rules, and collect the emitted text and warnings. Given the
//! same policy and options the output is byte-identical across runs;
//! nothing here depends on ambient state.

use natpolicy_core::Policy;

use crate::context::CompileContext;
use crate::emit;
use crate::error::{CompileError, Warning};
use crate::options::CompileOptions;
use crate::pipeline;

/// Result of a successful compilation.
#[derive(Debug, Clone)]
pub struct CompileOutput {
    /// Generated configuration text, newline-terminated.
    pub text: String,
    pub warnings: Vec<Warning>,
}

/// Compile a policy into device configuration text.
pub fn compile(policy: &Policy, options: CompileOptions) -> Result<CompileOutput, CompileError> {
    let regroup = options.regroup_output;
    let mut ctx = CompileContext::new(policy, options)?;

    let mut rules = policy.rules.clone();
    for (order, rule) in rules.iter_mut().enumerate() {
        rule.scratch.order = order;
    }

    let mut pipeline = pipeline::build(&ctx.options);
    pipeline.run(&mut ctx, rules)?;

    let lines = if regroup {
        emit::regroup(&ctx.lines)
    } else {
        ctx.lines.clone()
    };

    let mut text = lines.join("\n");
    if !text.is_empty() {
        text.push('\n');
    }
    Ok(CompileOutput {
        text,
        warnings: ctx.warnings,
    })
}
