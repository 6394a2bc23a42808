//! calibration::phases — the phase state machine.
//!
//! Purpose
//! -------
//! Execute the ordered phases of a calibration. Each phase optimizes the
//! parameters activated so far, starting from the best full vector of the
//! previous phase, and records its own [`OptimizationResult`].
//!
//! Key behaviors
//! -------------
//! - The phase order is the sorted set of distinct positive phase numbers
//!   (`[1]` when none is declared). Phase `p` activates every parameter with
//!   `0 < phase[i] <= p`.
//! - [`PhaseScheduler::new`] builds the whole plan and validates every
//!   phase's solver chain and replicate count before anything is evaluated.
//! - A phase with no active parameters evaluates the objective once at the
//!   seed and is recorded as converged without a solver call.
//! - A failed phase keeps the last successful point as the seed for the next
//!   phase. If no backend produced a value, that point is evaluated once so
//!   the record carries `f` at the kept point. Under
//!   [`FailurePolicy::Abort`] the run stops after it.
//!
//! Invariants & assumptions
//! ------------------------
//! - Phases run strictly in order; each phase builds a fresh mask.
//! - Fixed parameters are never written: the full vector is only updated
//!   through [`ActiveMask::expand`].
//! - Every phase gets its own seed mixed from `Control::seed` and the phase
//!   number, so a run is reproducible for a given seed.
use crate::{
    calibration::{
        control::{Control, FailurePolicy},
        options::CalibrationOptions,
        types::{OptimizationResult, PhaseRecord},
        validation::ResolvedProblem,
    },
    errors::{CalibError, CalibResult},
    objective::{
        finite_diff::GradientEstimator,
        pool::Dispatch,
        replicate::{ReplicatedObjective, splitmix64},
        traits::Objective,
    },
    params::mask::ActiveMask,
    solvers::{
        adapter::SolverAdapter,
        problem::PhaseProblem,
        registry::{ES, LBFGS},
        traits::{Convergence, Counts},
    },
    types::Theta,
};
use std::time::Instant;

/// Plan entry for one executed phase.
#[derive(Debug, Clone, PartialEq)]
pub struct PhaseSpec {
    pub phase: i64,
    pub methods: Vec<String>,
    pub replicates: usize,
}

/// What the scheduler hands back to the engine.
#[derive(Debug, Clone, PartialEq)]
pub struct Schedule {
    pub theta: Theta,
    pub history: Vec<PhaseRecord>,
    pub aborted: bool,
}

pub struct PhaseScheduler<'a> {
    objective: &'a dyn Objective,
    problem: &'a ResolvedProblem,
    control: &'a Control,
    adapter: SolverAdapter<'a>,
    dispatch: Dispatch<'a>,
    plan: Vec<PhaseSpec>,
}

impl<'a> PhaseScheduler<'a> {
    /// Build and validate the phase plan.
    ///
    /// # Errors
    /// - [`CalibError::Shape`] if a per-phase `method` or `replicates` list
    ///   does not have one entry per executed phase.
    /// - [`CalibError::InvalidReplicates`] for a zero replicate count.
    /// - Any error of [`SolverAdapter::check_methods`] for any phase.
    pub fn new(
        objective: &'a dyn Objective, problem: &'a ResolvedProblem, options: &'a CalibrationOptions,
        adapter: SolverAdapter<'a>, dispatch: Dispatch<'a>,
    ) -> CalibResult<Self> {
        let plan = build_plan(&problem.phases, options)?;
        for spec in &plan {
            let mask = ActiveMask::for_phase(&problem.phases, spec.phase);
            let bounds = mask.project_bounds(&problem.bounds)?;
            adapter.check_methods(&spec.methods, &bounds)?;
        }
        Ok(Self { objective, problem, control: &options.control, adapter, dispatch, plan })
    }

    pub fn plan(&self) -> &[PhaseSpec] {
        &self.plan
    }

    /// Execute every phase in order.
    ///
    /// # Errors
    /// - Only internal shape errors. Objective and solver failures are
    ///   recorded in the history.
    pub fn run(&self) -> CalibResult<Schedule> {
        let mut current = self.problem.theta0.clone();
        let mut current_value: Option<f64> = None;
        let mut history = Vec::with_capacity(self.plan.len());
        let mut aborted = false;

        for (position, spec) in self.plan.iter().enumerate() {
            let mask = ActiveMask::for_phase(&self.problem.phases, spec.phase);
            let seed = splitmix64(self.control.seed ^ spec.phase as u64);
            log::info!(
                "phase {} ({}/{}) started: {} of {} parameters active, {} replicate(s), method {}",
                spec.phase,
                position + 1,
                self.plan.len(),
                mask.n_active(),
                mask.len(),
                spec.replicates,
                spec.methods.join(",")
            );
            log::debug!("phase {} seed {seed:#018x}", spec.phase);

            let started = Instant::now();
            let run = self.run_phase(spec, &mask, &current, current_value, seed)?;

            current = run.theta.clone();
            if run.value.is_finite() {
                current_value = Some(run.value);
            }
            let result = OptimizationResult {
                par: self.problem.codec.unflatten(&run.theta)?,
                theta: run.theta,
                value: run.value,
                convergence: run.convergence,
                counts: run.counts,
                elapsed: started.elapsed(),
                method: run.method,
                message: run.message,
            };
            log::info!(
                "phase {} finished: value={:.6e}, convergence={}, {} evaluations",
                spec.phase,
                result.value,
                result.convergence,
                result.counts.function
            );
            let failed = result.is_failed();
            if failed {
                log::warn!(
                    "phase {} failed ({}); continuing from the last successful point",
                    spec.phase,
                    result.message.as_deref().unwrap_or("unknown error")
                );
            }
            history.push(PhaseRecord {
                phase: spec.phase,
                active: mask.indices().to_vec(),
                replicates: spec.replicates,
                result,
                error: run.error,
            });

            if failed && self.control.on_failure == FailurePolicy::Abort {
                log::warn!("aborting after failed phase {}", spec.phase);
                aborted = true;
                break;
            }
        }

        Ok(Schedule { theta: current, history, aborted })
    }

    fn run_phase(
        &self, spec: &PhaseSpec, mask: &ActiveMask, template: &Theta, start_value: Option<f64>,
        seed: u64,
    ) -> CalibResult<PhaseRun> {
        let objective = ReplicatedObjective::new(
            self.objective,
            mask,
            template,
            spec.replicates,
            seed,
            self.dispatch,
        )?;

        if mask.is_empty() {
            log::debug!("phase {} has no active parameters; evaluating the seed only", spec.phase);
            let evaluated = objective.evaluate(&Theta::zeros(0));
            let mut run = PhaseRun {
                theta: template.clone(),
                value: start_value.unwrap_or(f64::NAN),
                convergence: Convergence::Converged,
                counts: Counts { function: 1, gradient: 0, trials: objective.trials() },
                method: String::new(),
                message: None,
                error: None,
            };
            match evaluated {
                Ok(value) => run.value = value,
                Err(e) => {
                    run.convergence = Convergence::Failed;
                    run.message = Some(e.to_string());
                    run.error = Some(e);
                }
            }
            return Ok(run);
        }

        let bounds = mask.project_bounds(&self.problem.bounds)?;
        let estimator =
            GradientEstimator::new(self.control.gr_method, self.control.gr_step, self.dispatch)?;
        let phase_problem = PhaseProblem::new(&objective, bounds, estimator, seed)?;
        let theta0 = mask.project(template)?;

        let mut outcome =
            self.adapter.run(&spec.methods, &phase_problem, theta0, start_value, self.control)?;
        if outcome.error.is_some() && !outcome.value.is_finite() {
            // The chain failed before any backend reported a value at the kept point.
            let trials_before = objective.trials();
            match objective.evaluate(&outcome.par) {
                Ok(value) => {
                    outcome.value = value;
                    outcome.counts.function += 1;
                }
                Err(e) => log::debug!("phase {} start point could not be evaluated: {e}", spec.phase),
            }
            outcome.counts.trials += objective.trials() - trials_before;
        }
        let theta = mask.expand(&outcome.par, template)?;
        let message = match &outcome.error {
            Some(e) => Some(e.to_string()),
            None if outcome.status.is_empty() => None,
            None => Some(outcome.status.clone()),
        };
        Ok(PhaseRun {
            theta,
            value: outcome.value,
            convergence: outcome.convergence,
            counts: outcome.counts,
            method: outcome.method,
            message,
            error: outcome.error,
        })
    }
}

struct PhaseRun {
    theta: Theta,
    value: f64,
    convergence: Convergence,
    counts: Counts,
    method: String,
    message: Option<String>,
    error: Option<CalibError>,
}

/// Sorted distinct positive phase numbers, `[1]` if there are none.
pub fn phase_order(phases: &[i64]) -> Vec<i64> {
    let mut order: Vec<i64> = phases.iter().copied().filter(|&p| p > 0).collect();
    order.sort_unstable();
    order.dedup();
    if order.is_empty() {
        order.push(1);
    }
    order
}

fn build_plan(phases: &[i64], options: &CalibrationOptions) -> CalibResult<Vec<PhaseSpec>> {
    let order = phase_order(phases);
    let n_phases = order.len();
    options.replicates.check_len("replicates", n_phases)?;
    if let Some(method) = &options.method {
        method.check_len("method", n_phases)?;
    }
    let default_method = if options.uses_replicates() { ES } else { LBFGS };

    order
        .into_iter()
        .enumerate()
        .map(|(position, phase)| {
            let replicates = options.replicates.at(position).copied().unwrap_or(1);
            if replicates == 0 {
                return Err(CalibError::InvalidReplicates { position, value: replicates });
            }
            let methods = match options.method.as_ref().and_then(|m| m.at(position)) {
                Some(chain) => chain.clone(),
                None => vec![default_method.to_string()],
            };
            Ok(PhaseSpec { phase, methods, replicates })
        })
        .collect()
}
