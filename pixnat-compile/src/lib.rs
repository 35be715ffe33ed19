//! NAT policy compiler for Cisco PIX-family firewalls.
//!
//! Takes a JSON policy file (see [`natpolicy_core`]) and compiles its
//! NAT rule set into `nat`, `global`, `static`, and `access-list`
//! directives. The compiler is a fixed pipeline of rule-processing
//! stages: expansion, classification, verification, interface
//! assignment, command creation, merging, optional conflict detection,
//! and emission.
//!
//! ## Library Usage
//!
//! ```no_run
//! use pixnat_compile::{compile, CompileOptions};
//!
//! # fn main() -> anyhow::Result<()> {
//! let policy = natpolicy_core::load(std::path::Path::new("policy.json"))?;
//! let out = compile(&policy, CompileOptions::default())?;
//! print!("{}", out.text);
//! # Ok(())
//! # }
//! ```

pub mod assign;
pub mod classify;
pub mod commands;
pub mod compile;
pub mod context;
pub mod detect;
pub mod emit;
pub mod error;
pub mod expand;
pub mod merge;
pub mod optimize;
pub mod options;
pub mod pipeline;
pub mod verify;
pub mod zones;

pub use compile::{compile, CompileOutput};
pub use context::CompileContext;
pub use error::{CompileError, Warning};
pub use options::{load as load_options, CompileOptions, OptionsError};
pub use pipeline::{Pipeline, Stage};
