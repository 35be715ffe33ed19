use std::path::PathBuf;

use clap::Parser;

#[derive(Parser, Debug)]
#[command(name = "pixnat-compile")]
#[command(about = "Compile firewall NAT policies into PIX configuration")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(clap::Subcommand, Debug)]
pub enum Command {
    /// Compile a policy file into device configuration text.
    Compile(CompileArgs),
    /// Show a policy file's firewall, interfaces, and object counts.
    Inspect(InspectArgs),
}

#[derive(Parser, Debug)]
pub struct CompileArgs {
    /// Policy file (JSON).
    pub policy: PathBuf,
    /// Expected firewall name; compilation fails on mismatch.
    #[arg(long)]
    pub firewall: Option<String>,
    /// Write output here instead of stdout.
    #[arg(short, long)]
    pub output: Option<PathBuf>,
    /// Options file (TOML); flags below override its values.
    #[arg(long)]
    pub options: Option<PathBuf>,
    /// Reorder output into directive buckets.
    #[arg(long)]
    pub regroup: bool,
    #[arg(long)]
    pub check_duplicate_nat: bool,
    #[arg(long)]
    pub check_global_pool_overlap: bool,
    #[arg(long)]
    pub check_overlapping_statics: bool,
    #[arg(long)]
    pub check_global_static_overlap: bool,
    /// Compile eligible rules to the `0.0.0.0 0.0.0.0` default pool.
    #[arg(long)]
    pub default_pool_optimization: bool,
    /// Override the target OS version from the policy file.
    #[arg(long)]
    pub target_version: Option<String>,
}

#[derive(Parser, Debug)]
pub struct InspectArgs {
    /// Policy file (JSON).
    pub policy: PathBuf,
    /// List every rule with its elements.
    #[arg(long)]
    pub rules: bool,
}
