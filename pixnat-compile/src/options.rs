//! Compile options.
//!
//! Options are read once per compilation from an optional TOML file and
//! overridden by CLI flags. Every field defaults to off, matching a
//! plain compile with no detectors and no output regrouping.
//!
//! ```toml
//! default_pool_optimization = true
//! check_duplicate_nat = true
//! regroup_output = true
//! target_version = "6.3"
//! ```

use std::fs;
use std::path::Path;

use serde::Deserialize;
use thiserror::Error;

/// Per-compilation configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CompileOptions {
    /// Translate zone-matching sources through the default pool
    /// (`0.0.0.0 0.0.0.0`) instead of a literal address match.
    pub default_pool_optimization: bool,
    /// Abort on two equivalent non-suppressed NAT commands.
    pub check_duplicate_nat: bool,
    /// Abort on address pools overlapping interface addresses or each
    /// other.
    pub check_global_pool_overlap: bool,
    /// Abort on static translations that overlap or are redundant.
    pub check_overlapping_statics: bool,
    /// Abort on address pools overlapping static outside addresses.
    pub check_global_static_overlap: bool,
    /// Reorder emitted text into directive buckets.
    pub regroup_output: bool,
    /// Overrides the firewall's target OS version.
    pub target_version: Option<String>,
}

/// Errors raised while loading an options file.
#[derive(Debug, Error)]
pub enum OptionsError {
    #[error("failed to read options file: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid options TOML: {0}")]
    Toml(#[from] toml::de::Error),
}

/// Load options from a TOML file.
pub fn load(path: &Path) -> Result<CompileOptions, OptionsError> {
    Ok(toml::from_str(&fs::read_to_string(path)?)?)
}

/// Compare two dotted numeric versions; true when `a` is older than
/// `b`. Missing components count as zero, so "6" equals "6.0".
pub fn version_lt(a: &str, b: &str) -> bool {
    let parts = |v: &str| -> Vec<u32> {
        v.split('.')
            .map(|p| p.trim().parse().unwrap_or(0))
            .collect()
    };
    let (mut left, mut right) = (parts(a), parts(b));
    let width = left.len().max(right.len());
    left.resize(width, 0);
    right.resize(width, 0);
    left < right
}
