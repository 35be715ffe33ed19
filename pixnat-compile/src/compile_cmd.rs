use std::fs;

use anyhow::{bail, Context, Result};
use colored::Colorize;
use pixnat_compile::{compile, CompileOptions};

use crate::cli::CompileArgs;

pub fn run_compile(args: CompileArgs) -> Result<()> {
    let policy = natpolicy_core::load(&args.policy)
        .with_context(|| format!("failed to load {}", args.policy.display()))?;

    if let Some(expected) = &args.firewall {
        if policy.firewall.name != *expected {
            bail!(
                "policy file is for firewall '{}', expected '{expected}'",
                policy.firewall.name
            );
        }
    }

    let mut options = match &args.options {
        Some(path) => pixnat_compile::load_options(path)
            .with_context(|| format!("failed to load {}", path.display()))?,
        None => CompileOptions::default(),
    };
    options.regroup_output |= args.regroup;
    options.check_duplicate_nat |= args.check_duplicate_nat;
    options.check_global_pool_overlap |= args.check_global_pool_overlap;
    options.check_overlapping_statics |= args.check_overlapping_statics;
    options.check_global_static_overlap |= args.check_global_static_overlap;
    options.default_pool_optimization |= args.default_pool_optimization;
    if args.target_version.is_some() {
        options.target_version = args.target_version.clone();
    }

    let out = compile(&policy, options)?;

    for warning in &out.warnings {
        eprintln!("{} {warning}", "warning:".yellow().bold());
    }

    match &args.output {
        Some(path) => fs::write(path, &out.text)
            .with_context(|| format!("failed to write {}", path.display()))?,
        None => print!("{}", out.text),
    }
    Ok(())
}
