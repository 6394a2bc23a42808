//! Solver plugin contract.
//!
//! - [`Solver`]: trait every backend implements (built-in or registered).
//! - [`Capabilities`]: what a backend can honor (bounds, gradients).
//! - [`NativeResult`] / [`NativeTermination`]: the backend's own report.
//! - [`SolverOutcome`] / [`Convergence`] / [`Counts`]: the canonical form.
//!
//! Backends always *minimize* the reduced objective. They never see the mask
//! or the full parameter vector; [`ReducedProblem`] hides both.
use crate::{
    calibration::control::Control,
    errors::{CalibError, CalibResult},
    objective::validation::validate_value,
    params::bounds::Bounds,
    solvers::problem::ReducedProblem,
    types::{FnEvalMap, Theta},
};
use argmin::core::{TerminationReason, TerminationStatus};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Capability descriptor of a registered backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Capabilities {
    /// Honors box bounds itself.
    pub supports_bounds: bool,
    /// Consumes gradients; a gradient oracle is only built when set.
    pub supports_gradient: bool,
    /// Cannot run at all without finite bounds on every active parameter.
    pub requires_finite_bounds: bool,
    /// Draws random numbers from the problem seed.
    pub stochastic: bool,
}

impl Capabilities {
    pub const fn gradient_based() -> Self {
        Self {
            supports_bounds: false,
            supports_gradient: true,
            requires_finite_bounds: false,
            stochastic: false,
        }
    }

    pub const fn derivative_free() -> Self {
        Self {
            supports_bounds: false,
            supports_gradient: false,
            requires_finite_bounds: false,
            stochastic: false,
        }
    }
}

/// How a backend reports termination.
#[derive(Debug, Clone, PartialEq)]
pub enum NativeTermination {
    /// argmin executor status.
    Argmin(TerminationStatus),
    /// optim-style integer code: 0 converged, 1 iteration limit, other failure.
    Code { code: i32, message: String },
}

/// Raw result returned by [`Solver::invoke`].
#[derive(Debug, Clone, PartialEq)]
pub struct NativeResult {
    pub best_param: Option<Theta>,
    pub best_cost: f64,
    pub termination: NativeTermination,
    pub iterations: u64,
    pub fn_evals: FnEvalMap,
}

/// Canonical convergence status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Convergence {
    Converged,
    MaxIterations,
    Failed,
}

impl Convergence {
    pub fn is_failed(self) -> bool {
        matches!(self, Convergence::Failed)
    }

    /// Worst of two statuses: `Failed` > `MaxIterations` > `Converged`.
    pub fn worst(self, other: Convergence) -> Convergence {
        match (self, other) {
            (Convergence::Failed, _) | (_, Convergence::Failed) => Convergence::Failed,
            (Convergence::MaxIterations, _) | (_, Convergence::MaxIterations) => {
                Convergence::MaxIterations
            }
            _ => Convergence::Converged,
        }
    }

    /// Integer code in the optim convention.
    pub fn code(self) -> i32 {
        match self {
            Convergence::Converged => 0,
            Convergence::MaxIterations => 1,
            Convergence::Failed => 2,
        }
    }
}

impl fmt::Display for Convergence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Convergence::Converged => "converged",
            Convergence::MaxIterations => "max_iterations",
            Convergence::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Evaluation counters.
///
/// - `function`: objective evaluations requested by solvers (each may average
///   several trials).
/// - `gradient`: gradient evaluations requested by solvers.
/// - `trials`: calls into the user function, including finite-difference
///   difference points and replicates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Counts {
    pub function: u64,
    pub gradient: u64,
    pub trials: u64,
}

impl std::ops::AddAssign for Counts {
    fn add_assign(&mut self, rhs: Self) {
        self.function += rhs.function;
        self.gradient += rhs.gradient;
        self.trials += rhs.trials;
    }
}

/// Normalized outcome of one backend run.
#[derive(Debug, Clone, PartialEq)]
pub struct SolverOutcome {
    pub par: Theta,
    pub value: f64,
    pub convergence: Convergence,
    pub iterations: u64,
    pub status: String,
}

/// Pluggable minimization backend.
///
/// Required:
/// - `capabilities()`: static descriptor consulted during validation.
/// - `invoke(problem, theta0, bounds, control)`: minimize from `theta0`.
///   `bounds` are the reduced bounds of the current phase; a backend without
///   `supports_bounds` may ignore them because `problem` already clips.
///
/// Optional:
/// - `normalize(native)`: translate the native report. The default accepts
///   both argmin statuses and integer codes.
pub trait Solver: Send + Sync {
    fn capabilities(&self) -> Capabilities;

    fn invoke(
        &self, problem: &ReducedProblem<'_>, theta0: Theta, bounds: &Bounds, control: &Control,
    ) -> CalibResult<NativeResult>;

    fn normalize(&self, native: NativeResult) -> CalibResult<SolverOutcome> {
        normalize_native(native)
    }
}

/// Default translation of a [`NativeResult`].
///
/// # Errors
/// - [`CalibError::Backend`] if the backend reported no parameter vector or
///   a non-finite one.
/// - [`CalibError::NonFiniteValue`] if the best cost is not finite.
pub fn normalize_native(native: NativeResult) -> CalibResult<SolverOutcome> {
    let par = native
        .best_param
        .ok_or_else(|| CalibError::Backend { text: "solver returned no parameter vector".into() })?;
    if par.iter().any(|v| !v.is_finite()) {
        return Err(CalibError::Backend { text: "solver returned a non-finite parameter".into() });
    }
    let value = validate_value(native.best_cost)?;
    let (convergence, status) = match native.termination {
        NativeTermination::Argmin(status) => (map_status(&status), format!("{status:?}")),
        NativeTermination::Code { code, message } => (map_code(code), message),
    };
    Ok(SolverOutcome { par, value, convergence, iterations: native.iterations, status })
}

fn map_status(status: &TerminationStatus) -> Convergence {
    match status {
        TerminationStatus::Terminated(reason) => match reason {
            TerminationReason::MaxItersReached => Convergence::MaxIterations,
            TerminationReason::SolverConverged
            | TerminationReason::TargetCostReached
            | TerminationReason::SolverExit(_) => Convergence::Converged,
            // Interrupts and timeouts.
            _ => Convergence::Failed,
        },
        TerminationStatus::NotTerminated => Convergence::Failed,
    }
}

fn map_code(code: i32) -> Convergence {
    match code {
        0 => Convergence::Converged,
        1 => Convergence::MaxIterations,
        _ => Convergence::Failed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn native(termination: NativeTermination) -> NativeResult {
        NativeResult {
            best_param: Some(array![0.0, 1.0]),
            best_cost: 1.5,
            termination,
            iterations: 12,
            fn_evals: FnEvalMap::new(),
        }
    }

    #[test]
    // Purpose
    // -------
    // Heterogeneous termination reports map onto the three canonical
    // statuses.
    fn normalize_maps_argmin_and_code_terminations() {
        let cases = [
            (
                NativeTermination::Argmin(TerminationStatus::Terminated(
                    TerminationReason::SolverConverged,
                )),
                Convergence::Converged,
            ),
            (
                NativeTermination::Argmin(TerminationStatus::Terminated(
                    TerminationReason::MaxItersReached,
                )),
                Convergence::MaxIterations,
            ),
            (NativeTermination::Argmin(TerminationStatus::NotTerminated), Convergence::Failed),
            (NativeTermination::Code { code: 0, message: "ok".into() }, Convergence::Converged),
            (
                NativeTermination::Code { code: 1, message: "maxit".into() },
                Convergence::MaxIterations,
            ),
            (NativeTermination::Code { code: 10, message: "degenerate".into() }, Convergence::Failed),
        ];

        for (termination, expected) in cases {
            let out = normalize_native(native(termination)).unwrap();
            assert_eq!(out.convergence, expected);
            assert_eq!(out.iterations, 12);
        }
    }

    #[test]
    fn normalize_rejects_missing_or_non_finite_results() {
        let mut missing = native(NativeTermination::Code { code: 0, message: String::new() });
        missing.best_param = None;
        let mut nan_cost = native(NativeTermination::Code { code: 0, message: String::new() });
        nan_cost.best_cost = f64::NAN;

        assert!(matches!(normalize_native(missing), Err(CalibError::Backend { .. })));
        assert!(matches!(normalize_native(nan_cost), Err(CalibError::NonFiniteValue { .. })));
    }

    #[test]
    fn worst_convergence_prefers_failure() {
        assert_eq!(Convergence::Converged.worst(Convergence::MaxIterations), Convergence::MaxIterations);
        assert_eq!(Convergence::MaxIterations.worst(Convergence::Failed), Convergence::Failed);
        assert_eq!(Convergence::Converged.worst(Convergence::Converged), Convergence::Converged);
    }
}
