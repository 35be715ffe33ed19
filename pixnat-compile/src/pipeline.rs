//! The rule-processor pipeline.
//!
//! A compilation is an ordered sequence of named stages, each consuming
//! the rule queue and producing the next one. Two disciplines exist:
//! streaming stages transform one rule at a time (written as a loop
//! over the queue), barrier stages need the whole queue or the fully
//! materialized command model before deciding anything. The sequence
//! is fixed and dependency-ordered; optional stages are included or
//! skipped when the pipeline is assembled from the options, never
//! toggled mid-run.
//!
//! A stage returning an error aborts the whole compilation immediately
//! with no output (fail-fast); non-fatal findings are recorded as
//! warnings on the context and the rule is degraded instead.

use natpolicy_core::NatRule;

use crate::context::CompileContext;
use crate::error::CompileError;
use crate::options::CompileOptions;
use crate::{assign, classify, commands, detect, emit, expand, merge, optimize, verify};

/// One pipeline stage.
pub trait Stage {
    /// Progress-reporting name; never part of diagnostics.
    fn name(&self) -> &'static str;

    /// Consume the rule queue, produce the next one.
    fn run(
        &mut self,
        ctx: &mut CompileContext<'_>,
        rules: Vec<NatRule>,
    ) -> Result<Vec<NatRule>, CompileError>;
}

/// A named, ordered list of stages assembled once per compilation.
#[derive(Default)]
pub struct Pipeline {
    stages: Vec<Box<dyn Stage>>,
}

impl Pipeline {
    pub fn new() -> Self {
        Pipeline::default()
    }

    pub fn push(&mut self, stage: Box<dyn Stage>) {
        self.stages.push(stage);
    }

    /// Stage names in execution order.
    pub fn stage_names(&self) -> Vec<&'static str> {
        self.stages.iter().map(|s| s.name()).collect()
    }

    /// Run every stage in order over the rule queue.
    pub fn run(
        &mut self,
        ctx: &mut CompileContext<'_>,
        mut rules: Vec<NatRule>,
    ) -> Result<Vec<NatRule>, CompileError> {
        for stage in &mut self.stages {
            rules = stage.run(ctx, rules)?;
        }
        Ok(rules)
    }
}

/// Assemble the stage sequence for one compilation.
///
/// The order is load-bearing: expansion must precede classification,
/// classification precedes interface assignment, commands are built
/// only from atomic classified rules, and the merge pass and detectors
/// require the complete command model.
pub fn build(options: &CompileOptions) -> Pipeline {
    let mut pipeline = Pipeline::new();

    if options.default_pool_optimization {
        pipeline.push(Box::new(optimize::MarkDefaultPool));
    }

    pipeline.push(Box::new(expand::ExpandGroups));
    pipeline.push(Box::new(expand::DeduplicateElements));
    pipeline.push(Box::new(expand::RejectRunTimeTables));
    pipeline.push(Box::new(expand::ExpandMultiAddress));
    pipeline.push(Box::new(expand::ExpandAddressRanges));

    pipeline.push(Box::new(classify::ClassifyRules));
    pipeline.push(Box::new(verify::VerifyRules));
    pipeline.push(Box::new(classify::ReplaceFirewallInODst));
    pipeline.push(Box::new(classify::ReplaceFirewallInTSrc));
    pipeline.push(Box::new(classify::UseFirewallInterfaces));
    pipeline.push(Box::new(expand::SplitToAtomic));

    pipeline.push(Box::new(assign::AssignInterfaces));
    pipeline.push(Box::new(assign::FillTranslatedService));
    pipeline.push(Box::new(verify::VerifyRuleElements));
    pipeline.push(Box::new(assign::SelectNoNatForm));

    if options.default_pool_optimization {
        pipeline.push(Box::new(optimize::ClearOptimizedSource));
    }

    pipeline.push(Box::new(commands::CreateNatCommands));
    pipeline.push(Box::new(commands::CreateStaticCommands));
    pipeline.push(Box::new(merge::MergeCommands));
    pipeline.push(Box::new(assign::SuppressDuplicateNoNatStatics::default()));

    if options.check_duplicate_nat {
        pipeline.push(Box::new(detect::DuplicateNat));
    }
    if options.check_global_pool_overlap {
        pipeline.push(Box::new(detect::GlobalPoolOverlap));
    }
    if options.check_overlapping_statics {
        pipeline.push(Box::new(detect::OverlappingStatics));
    }
    if options.check_global_static_overlap {
        pipeline.push(Box::new(detect::GlobalPoolsVsStatics));
    }

    pipeline.push(Box::new(emit::EmitCommands));
    pipeline
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detectors_appear_only_when_enabled() {
        let bare = build(&CompileOptions::default());
        assert!(!bare.stage_names().contains(&"detect duplicate nat"));

        let opts = CompileOptions {
            check_duplicate_nat: true,
            default_pool_optimization: true,
            ..CompileOptions::default()
        };
        let names = build(&opts).stage_names();
        assert_eq!(names.first().copied(), Some("mark default pool"));
        assert!(names.contains(&"detect duplicate nat"));
        assert_eq!(names.last().copied(), Some("generate device code"));
    }
}
