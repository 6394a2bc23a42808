//! calibration::engine — the `calibrate` entry point.
//!
//! Purpose
//! -------
//! Validate a calibration request, run its phases and assemble the final
//! outcome, including the optional Hessian at the solution.
//!
//! Key behaviors
//! -------------
//! - Everything that can be checked without evaluating the objective is
//!   checked first: control values, parameter structure, bounds, phases,
//!   per-phase settings and every solver chain.
//! - The caller's worker pool is borrowed, never created. Parallel
//!   evaluation is used only when requested and a pool with more than one
//!   effective worker is supplied.
//! - The final result is the result of the last executed phase, unchanged
//!   apart from `par` being reported in the caller's structure. Run-level
//!   totals are available through [`CalibrationOutcome::total_counts`] and
//!   [`CalibrationOutcome::worst_convergence`].
//! - A Hessian failure does not fail the call; it is recorded in
//!   `hessian_error`.
//!
//! Downstream usage
//! ----------------
//! - Most callers use [`calibrate`]. [`calibrate_with_registry`] accepts a
//!   registry with additional backends.
use crate::{
    calibration::{
        hessian::final_hessian,
        options::CalibrationOptions,
        phases::PhaseScheduler,
        types::{CalibrationOutcome, OptimizationResult},
        validation::resolve,
    },
    errors::{CalibError, CalibResult},
    objective::{
        pool::{Dispatch, WorkerPool},
        traits::Objective,
    },
    params::codec::ParameterVector,
    solvers::{adapter::SolverAdapter, registry::SolverRegistry},
};
use std::time::Instant;

/// Calibrate `objective` from the initial parameters `par` with the built-in
/// solver registry.
///
/// # Parameters
/// - `par`: initial parameters, flat or named. Missing entries take the
///   midpoint of their finite bounds.
/// - `objective`: the function to minimize. It always receives the full
///   parameter vector, fixed entries included.
/// - `options`: methods, bounds, phases, replicates, control and the Hessian
///   flag. See [`CalibrationOptions`].
/// - `pool`: caller-owned worker pool. Used only when `parallel` is set on
///   the options or the control and more than one worker is effective.
///
/// # Returns
/// A [`CalibrationOutcome`] whose `result` is the last executed phase's
/// result, with `par` in the structure of the input. `history` holds one
/// record per executed phase; `hessian` is set when requested and
/// computable.
///
/// # Errors
/// - Validation errors ([`CalibError::is_validation`]) before any
///   evaluation: malformed structure or lengths, invalid bounds or control
///   values, zero replicates, unknown methods, and bounds the chosen
///   backends cannot honor.
/// - Execution failures are reported through the outcome's `convergence`
///   and history rather than as `Err`.
pub fn calibrate<O: Objective>(
    par: &ParameterVector, objective: &O, options: &CalibrationOptions, pool: Option<&WorkerPool>,
) -> CalibResult<CalibrationOutcome> {
    calibrate_with_registry(par, objective, options, pool, &SolverRegistry::with_defaults())
}

/// [`calibrate`] with a caller-supplied registry.
pub fn calibrate_with_registry<O: Objective>(
    par: &ParameterVector, objective: &O, options: &CalibrationOptions, pool: Option<&WorkerPool>,
    registry: &SolverRegistry,
) -> CalibResult<CalibrationOutcome> {
    let started = Instant::now();
    let control = &options.control;
    control.validate()?;
    let problem = resolve(par, options)?;
    let dispatch = Dispatch::resolve(pool, options.parallel || control.parallel, control.ncores);
    let adapter = SolverAdapter::new(registry, control.bounds_policy);
    let scheduler = PhaseScheduler::new(objective, &problem, options, adapter, dispatch)?;
    log::debug!(
        "calibrating {} parameters over {} phase(s)",
        problem.codec.len(),
        scheduler.plan().len()
    );

    let schedule = scheduler.run()?;
    let last = schedule
        .history
        .last()
        .ok_or_else(|| CalibError::Backend { text: "no phase was executed".to_string() })?;

    let (hessian, hessian_error) = if options.hessian && !schedule.aborted {
        match final_hessian(
            objective,
            &schedule.theta,
            &problem.phases,
            last.replicates,
            control,
            dispatch,
        ) {
            Ok(h) => (Some(h), None),
            Err(e) => {
                log::warn!("Hessian could not be computed: {e}");
                (None, Some(e))
            }
        }
    } else {
        (None, None)
    };

    let result = OptimizationResult {
        par: problem.codec.unflatten(&schedule.theta)?,
        theta: schedule.theta.clone(),
        ..last.result.clone()
    };
    let outcome = CalibrationOutcome {
        par: result.par.clone(),
        result,
        history: schedule.history,
        hessian,
        hessian_error,
        aborted: schedule.aborted,
    };
    let totals = outcome.total_counts();
    log::info!(
        "calibration finished in {:.3?}: value={:.6e}, convergence={} (worst {}), {} function / {} gradient evaluations",
        started.elapsed(),
        outcome.value(),
        outcome.convergence(),
        outcome.worst_convergence(),
        totals.function,
        totals.gradient
    );
    Ok(outcome)
}
