//! Error taxonomy for decomposition runs.
//!
//! All errors are file-scoped: a failing file is recorded in its manifest
//! and the surrounding run continues. `UnresolvedDependency` is a warning,
//! not an error; it is accumulated in the run context and never blocks
//! synthesis.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DecomposeError {
    /// Malformed source; the file is skipped and the run continues
    #[error("parse error at line {line}: {reason}")]
    Parse { reason: String, line: usize },

    /// Invariant violation during emission; aborts this file, original untouched
    #[error("synthesis failed: {reason}")]
    Synthesis { reason: String },

    /// Per-file analysis budget exceeded; the file is skipped, never retried
    #[error("analysis timed out after {secs}s")]
    Timeout { secs: u64 },

    /// Configuration rejected before the pipeline ran
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl DecomposeError {
    pub fn synthesis(reason: impl Into<String>) -> Self {
        DecomposeError::Synthesis {
            reason: reason.into(),
        }
    }
}

/// A call whose target could not be resolved statically.
///
/// Dynamic dispatch and reflective attribute access degrade to these
/// conservative records instead of guessed edges.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnresolvedDependency {
    /// Qualified name of the calling unit
    pub unit: String,
    /// Callee name as written at the call site
    pub target: String,
}

impl fmt::Display for UnresolvedDependency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "dynamic call from {} to {} could not be resolved",
            self.unit, self.target
        )
    }
}
