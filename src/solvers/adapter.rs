//! solvers::adapter — run a solver chain within one phase.
//!
//! Purpose
//! -------
//! Translate the canonical call of one phase into backend invocations,
//! normalize what they return, and keep backend failures contained so a
//! multi-phase run can decide what to do with them.
//!
//! Key behaviors
//! -------------
//! - [`SolverAdapter::check_methods`] validates a chain eagerly: unknown
//!   names, bounded requests to bounds-incapable backends under
//!   [`BoundsPolicy::Reject`], and missing finite bounds for backends that
//!   require them.
//! - [`SolverAdapter::run`] runs the chain in order, feeding each backend's
//!   best point to the next. The first backend that errors or panics ends
//!   the chain with `Convergence::Failed`; the outcome then carries the last
//!   successful point and the triggering error.
//! - Counts are summed over the chain; `trials` counts calls into the user
//!   function, including finite-difference points and replicates.
//!
//! Invariants & assumptions
//! ------------------------
//! - Validation errors are returned as `Err`; execution failures are
//!   returned as `Ok(ChainOutcome)` with `convergence == Failed`.
//! - A panic inside a backend never unwinds past this module.
use crate::{
    calibration::control::{BoundsPolicy, Control},
    errors::{CalibError, CalibResult},
    params::bounds::Bounds,
    solvers::{
        problem::PhaseProblem,
        registry::SolverRegistry,
        traits::{Convergence, Counts, SolverOutcome},
    },
    objective::replicate::splitmix64,
    types::Theta,
};
use std::any::Any;
use std::panic::{AssertUnwindSafe, catch_unwind};

/// Canonical result of a solver chain over the reduced parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct ChainOutcome {
    pub par: Theta,
    /// Objective value at `par`; NaN if no backend succeeded and the start
    /// value was not supplied.
    pub value: f64,
    pub convergence: Convergence,
    pub iterations: u64,
    pub counts: Counts,
    /// Methods joined with `,`.
    pub method: String,
    pub status: String,
    pub error: Option<CalibError>,
}

pub struct SolverAdapter<'r> {
    registry: &'r SolverRegistry,
    policy: BoundsPolicy,
}

impl<'r> SolverAdapter<'r> {
    pub fn new(registry: &'r SolverRegistry, policy: BoundsPolicy) -> Self {
        Self { registry, policy }
    }

    /// Validate a solver chain against the reduced bounds of a phase.
    ///
    /// # Errors
    /// - [`CalibError::InvalidControl`] for an empty chain.
    /// - [`CalibError::UnknownMethod`] for an unregistered name.
    /// - [`CalibError::UnsupportedConstraint`] under `BoundsPolicy::Reject`
    ///   when a bounds-incapable backend meets finite bounds.
    /// - [`CalibError::Bounds`] when a backend requires finite bounds and an
    ///   active parameter lacks one.
    pub fn check_methods(&self, methods: &[String], bounds: &Bounds) -> CalibResult<()> {
        if methods.is_empty() {
            return Err(CalibError::InvalidControl {
                key: "method".to_string(),
                reason: "solver chain is empty".to_string(),
            });
        }
        for name in methods {
            let caps = self.registry.lookup(name)?.capabilities;
            let n_bounded = bounds.n_bounded();
            if n_bounded > 0 && !caps.supports_bounds && self.policy == BoundsPolicy::Reject {
                return Err(CalibError::UnsupportedConstraint {
                    method: name.clone(),
                    active: n_bounded,
                });
            }
            if caps.requires_finite_bounds && !bounds.is_finite_box() {
                let index = (0..bounds.len())
                    .find(|&i| !(bounds.lower()[i].is_finite() && bounds.upper()[i].is_finite()))
                    .unwrap_or(0);
                return Err(CalibError::Bounds {
                    index,
                    name: name.clone(),
                    reason: "method requires finite bounds on every active parameter",
                });
            }
        }
        Ok(())
    }

    /// Run `methods` in order from `theta0`.
    ///
    /// # Parameters
    /// - `methods`: solver chain; each backend starts from the previous
    ///   backend's best point.
    /// - `problem`: the phase problem over the active parameters.
    /// - `theta0`: reduced starting point.
    /// - `start_value`: objective value at `theta0` if known. It is reported
    ///   when the first backend fails.
    /// - `control`: run control forwarded to every backend.
    ///
    /// # Returns
    /// A [`ChainOutcome`] with counts summed over the chain and the worst
    /// status of the steps that ran. The chain stops at the first failing
    /// step; the outcome then keeps the last successful point and carries
    /// the error.
    ///
    /// # Panics
    /// Never propagates a backend panic: it is caught and reported as
    /// [`CalibError::SolverExecution`].
    ///
    /// # Errors
    /// - [`CalibError::UnknownMethod`] if a name is not registered. All other
    ///   failures are recorded in the returned outcome.
    pub fn run(
        &self, methods: &[String], problem: &PhaseProblem<'_>, theta0: Theta,
        start_value: Option<f64>, control: &Control,
    ) -> CalibResult<ChainOutcome> {
        let trials_before = problem.objective().trials();
        let mut counts = Counts::default();
        let mut par = theta0;
        let mut value = start_value.unwrap_or(f64::NAN);
        let mut convergence = Convergence::Converged;
        let mut iterations = 0;
        let mut status = String::new();
        let mut error = None;

        for (position, name) in methods.iter().enumerate() {
            let entry = self.registry.lookup(name)?;
            let seed = splitmix64(problem.seed() ^ position as u64);
            let reduced = problem.for_solver(entry.capabilities, seed);
            log::debug!("solver chain step {position}: '{name}' on {} parameters", problem.dim());

            let attempt = catch_unwind(AssertUnwindSafe(|| {
                let native = entry.solver.invoke(&reduced, par.clone(), problem.bounds(), control)?;
                log::debug!("'{name}' native evaluation counters: {:?}", native.fn_evals);
                entry.solver.normalize(native)
            }));
            counts += reduced.counts();

            match attempt {
                Ok(Ok(SolverOutcome { par: p, value: v, convergence: c, iterations: it, status: s })) => {
                    par = p;
                    value = v;
                    convergence = convergence.worst(c);
                    iterations += it;
                    status = s;
                }
                Ok(Err(e)) => {
                    log::warn!("solver '{name}' failed: {e}");
                    convergence = Convergence::Failed;
                    status = e.to_string();
                    error = Some(e);
                    break;
                }
                Err(payload) => {
                    let e = CalibError::SolverExecution {
                        method: name.clone(),
                        reason: panic_message(payload.as_ref()),
                    };
                    log::warn!("{e}");
                    convergence = Convergence::Failed;
                    status = e.to_string();
                    error = Some(e);
                    break;
                }
            }
        }
        counts.trials = problem.objective().trials() - trials_before;

        Ok(ChainOutcome {
            par,
            value,
            convergence,
            iterations,
            counts,
            method: methods.join(","),
            status,
            error,
        })
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "backend panicked".to_string()
    }
}
