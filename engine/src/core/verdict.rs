//! Final classified outcome of one stress-test run.

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, ErrorKind};

/// Which party of the comparison failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    Reference,
    Candidate,
    /// The generator/oracle itself.
    Oracle,
}

/// Raw material needed to reproduce and inspect a mismatch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Evidence {
    pub input: String,
    pub reference_output: String,
    pub candidate_output: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Verdict {
    /// Outputs diverged on `seed`.
    Hacked { seed: u64, evidence: Evidence },
    /// The budget ran out without a mismatch.
    Exhausted { seeds_tried: u64 },
    ExecutionError {
        side: Side,
        kind: ErrorKind,
        /// Seed being processed when the failure happened, if any.
        seed: Option<u64>,
        message: String,
    },
}

impl Verdict {
    pub fn execution_error(side: Side, seed: Option<u64>, err: &EngineError) -> Self {
        Verdict::ExecutionError {
            side,
            kind: err.kind(),
            seed,
            message: describe(err),
        }
    }

    pub fn is_hacked(&self) -> bool {
        matches!(self, Verdict::Hacked { .. })
    }

    pub fn seed(&self) -> Option<u64> {
        match self {
            Verdict::Hacked { seed, .. } => Some(*seed),
            Verdict::ExecutionError { seed, .. } => *seed,
            Verdict::Exhausted { .. } => None,
        }
    }
}

/// Error text plus any captured stderr, which is often the only useful clue.
fn describe(err: &EngineError) -> String {
    let stderr = match err {
        EngineError::Build { stderr, .. } | EngineError::Runtime { stderr, .. } => stderr.trim(),
        _ => "",
    };
    if stderr.is_empty() {
        err.to_string()
    } else {
        format!("{err}\n{stderr}")
    }
}
