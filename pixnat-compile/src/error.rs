//! Compilation errors and warnings.
//!
//! Two severities exist. A fatal error ([`CompileError`]) halts the
//! compilation of one firewall with no output produced; a
//! [`Warning`] is collected in the compile context and the run
//! continues, possibly with a degraded rule. Every diagnostic carries
//! the label of the rule it originates from.
//!
//! `CompileError::Internal` is the broken-rule class: an element that
//! should hold exactly one resolved object holds zero, or a reference
//! fails to resolve after the expansion stages. It signals a bug in an
//! upstream stage, not a policy mistake, and is worded accordingly.

use std::fmt;

use natpolicy_core::PolicyError;
use thiserror::Error;

/// Fatal compilation failure. No output is produced.
#[derive(Debug, Error)]
pub enum CompileError {
    /// A policy violation the user must fix; the message names the
    /// offending rule.
    #[error("{0}")]
    Policy(String),
    /// An inconsistency produced by an earlier stage (broken rule).
    #[error("internal error: {0}")]
    Internal(String),
}

impl CompileError {
    /// Fatal policy error bound to a rule label.
    pub fn policy(message: impl fmt::Display, rule: &str) -> Self {
        CompileError::Policy(format!("{message}. Rule {rule}"))
    }

    /// Broken-rule error bound to a rule label.
    pub fn broken(message: impl fmt::Display, rule: &str) -> Self {
        CompileError::Internal(format!("{message} in rule {rule}"))
    }
}

impl From<PolicyError> for CompileError {
    /// Resolution failures past validation are upstream-stage bugs.
    fn from(err: PolicyError) -> Self {
        CompileError::Internal(err.to_string())
    }
}

/// Non-fatal diagnostic; compilation continues.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Warning {
    pub rule: String,
    pub message: String,
}

impl Warning {
    pub fn new(message: impl Into<String>, rule: &str) -> Self {
        Warning {
            rule: rule.to_string(),
            message: message.into(),
        }
    }
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}. Rule {}", self.message, self.rule)
    }
}
