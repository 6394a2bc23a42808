//! calibration::types — results reported by a calibration run.
//!
//! Purpose
//! -------
//! Define the value objects a calibration returns: one
//! [`OptimizationResult`] per executed phase, collected into a history of
//! [`PhaseRecord`]s, plus the final [`CalibrationOutcome`].
//!
//! Conventions
//! -----------
//! - `par` is always in the caller's original structure; `theta` is the same
//!   point as a flat canonical vector of length `n`.
//! - Results are immutable once built. Each phase produces a new record.
//! - `message` carries the text of the error that made a phase fail, and is
//!   otherwise the backend's status for the last solver of the chain.
use crate::{
    errors::CalibError,
    params::codec::ParameterVector,
    solvers::traits::{Convergence, Counts},
    types::{Hessian, Theta},
};
use std::time::Duration;

/// Result of one phase (or of the whole run, for the final phase).
#[derive(Debug, Clone, PartialEq)]
pub struct OptimizationResult {
    pub par: ParameterVector,
    pub theta: Theta,
    pub value: f64,
    pub convergence: Convergence,
    pub counts: Counts,
    pub elapsed: Duration,
    /// Solver chain joined with `,`; empty when no solver ran.
    pub method: String,
    pub message: Option<String>,
}

impl OptimizationResult {
    pub fn is_failed(&self) -> bool {
        self.convergence.is_failed()
    }
}

/// History entry for one executed phase.
#[derive(Debug, Clone, PartialEq)]
pub struct PhaseRecord {
    pub phase: i64,
    /// Canonical indices active during this phase.
    pub active: Vec<usize>,
    pub replicates: usize,
    pub result: OptimizationResult,
    /// Error that made the phase fail, if any.
    pub error: Option<CalibError>,
}

/// Everything `calibrate` returns.
#[derive(Debug, Clone, PartialEq)]
pub struct CalibrationOutcome {
    /// Result of the last executed phase, `par` in the caller's structure.
    pub result: OptimizationResult,
    /// Final parameters in the caller's structure (same as `result.par`).
    pub par: ParameterVector,
    pub history: Vec<PhaseRecord>,
    /// `n × n` finite-difference Hessian when requested and computable.
    pub hessian: Option<Hessian>,
    /// Why the requested Hessian could not be computed.
    pub hessian_error: Option<CalibError>,
    /// True when `FailurePolicy::Abort` stopped the run early.
    pub aborted: bool,
}

impl CalibrationOutcome {
    pub fn value(&self) -> f64 {
        self.result.value
    }

    pub fn convergence(&self) -> Convergence {
        self.result.convergence
    }

    /// Worst convergence status over every executed phase.
    pub fn worst_convergence(&self) -> Convergence {
        self.history
            .iter()
            .fold(Convergence::Converged, |acc, record| acc.worst(record.result.convergence))
    }

    /// Counts summed over every phase.
    pub fn total_counts(&self) -> Counts {
        let mut total = Counts::default();
        for record in &self.history {
            total += record.result.counts;
        }
        total
    }
}
