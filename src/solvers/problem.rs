//! solvers::problem — the reduced minimization problem handed to backends.
//!
//! Purpose
//! -------
//! Package everything a backend needs for one phase (the replicated
//! objective over the active parameters, the projected bounds, the gradient
//! oracle and the phase seed) behind a small API, and bridge it into
//! argmin's `CostFunction` / `Gradient` traits.
//!
//! Key behaviors
//! -------------
//! - [`PhaseProblem`] is built once per phase. [`PhaseProblem::for_solver`]
//!   derives a [`ReducedProblem`] per backend in the solver chain, with the
//!   gradient oracle enabled only for gradient-capable backends.
//! - Under the clip policy, every evaluation is taken at the coordinate-wise
//!   projection of the candidate onto the box, and finite-difference points
//!   are clipped the same way. An analytic gradient is zeroed in coordinates
//!   where the candidate lies outside the box, matching the clipped surface.
//! - The gradient oracle prefers the objective's analytic gradient and falls
//!   back to the [`GradientEstimator`], with all points of one gradient on
//!   one random stream.
//!
//! Invariants & assumptions
//! ------------------------
//! - Counters are atomic so backends may evaluate in parallel.
//! - Errors crossing into argmin are `CalibError` values wrapped in
//!   `argmin::core::Error`; [`CalibError::from`] recovers them afterwards.
use crate::{
    errors::{CalibError, CalibResult},
    objective::{finite_diff::GradientEstimator, replicate::ReplicatedObjective},
    params::bounds::Bounds,
    solvers::traits::{Capabilities, Counts},
    types::{Cost, Grad, Theta},
};
use argmin::core::{CostFunction, Error, Gradient};
use std::sync::atomic::{AtomicU64, Ordering};

/// Per-phase problem shared by every backend in the solver chain.
pub struct PhaseProblem<'a> {
    objective: &'a ReplicatedObjective<'a>,
    bounds: Bounds,
    estimator: GradientEstimator<'a>,
    seed: u64,
    clip: bool,
}

impl<'a> PhaseProblem<'a> {
    /// # Errors
    /// - [`CalibError::Shape`] if `bounds` do not match the active dimension.
    pub fn new(
        objective: &'a ReplicatedObjective<'a>, bounds: Bounds, estimator: GradientEstimator<'a>,
        seed: u64,
    ) -> CalibResult<Self> {
        if bounds.len() != objective.dim() {
            return Err(CalibError::Shape {
                what: "reduced bounds",
                expected: objective.dim(),
                found: bounds.len(),
            });
        }
        let clip = bounds.is_bounded();
        Ok(Self { objective, bounds, estimator, seed, clip })
    }

    pub fn dim(&self) -> usize {
        self.objective.dim()
    }

    pub fn bounds(&self) -> &Bounds {
        &self.bounds
    }

    pub fn objective(&self) -> &ReplicatedObjective<'a> {
        self.objective
    }

    /// Reduced problem seen by one backend of the chain.
    pub fn for_solver(&self, capabilities: Capabilities, seed: u64) -> ReducedProblem<'_> {
        ReducedProblem {
            phase: self,
            gradient: capabilities.supports_gradient,
            seed,
            cost_calls: AtomicU64::new(0),
            gradient_calls: AtomicU64::new(0),
        }
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }
}

/// The problem a single backend minimizes.
pub struct ReducedProblem<'p> {
    phase: &'p PhaseProblem<'p>,
    gradient: bool,
    seed: u64,
    cost_calls: AtomicU64,
    gradient_calls: AtomicU64,
}

impl<'p> ReducedProblem<'p> {
    pub fn dim(&self) -> usize {
        self.phase.dim()
    }

    pub fn bounds(&self) -> &Bounds {
        &self.phase.bounds
    }

    /// Seed for backends that draw their own random numbers.
    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Point at which the objective is actually evaluated for `x`.
    pub fn admissible(&self, x: &Theta) -> Theta {
        if self.phase.clip { self.phase.bounds.clip(x) } else { x.clone() }
    }

    /// Replicate-averaged objective at `admissible(x)`.
    pub fn evaluate(&self, x: &Theta) -> CalibResult<Cost> {
        self.cost_calls.fetch_add(1, Ordering::Relaxed);
        self.phase.objective.evaluate(&self.admissible(x))
    }

    /// Gradient of the (clipped) reduced objective at `x`.
    ///
    /// # Errors
    /// - [`CalibError::GradientNotImplemented`] if the backend did not
    ///   declare gradient support.
    /// - [`CalibError::GradientEvaluation`] if a finite-difference evaluation
    ///   fails.
    pub fn evaluate_gradient(&self, x: &Theta) -> CalibResult<Grad> {
        if !self.gradient {
            return Err(CalibError::GradientNotImplemented);
        }
        self.gradient_calls.fetch_add(1, Ordering::Relaxed);
        let objective = self.phase.objective;
        let point = self.admissible(x);
        if let Some(mut g) = objective.analytic_gradient(&point)? {
            if self.phase.clip {
                for (i, gi) in g.iter_mut().enumerate() {
                    if point[i] != x[i] {
                        *gi = 0.0;
                    }
                }
            }
            return Ok(g);
        }
        let stream = objective.next_stream();
        self.phase
            .estimator
            .gradient(|p| objective.evaluate_stream(&self.admissible(p), stream), x)
    }

    /// Counters accumulated by this backend run, excluding trials.
    pub fn counts(&self) -> Counts {
        Counts {
            function: self.cost_calls.load(Ordering::Relaxed),
            gradient: self.gradient_calls.load(Ordering::Relaxed),
            trials: 0,
        }
    }
}

/// argmin view of a [`ReducedProblem`].
pub struct ArgminBridge<'p> {
    problem: &'p ReducedProblem<'p>,
}

impl<'p> ArgminBridge<'p> {
    pub fn new(problem: &'p ReducedProblem<'p>) -> Self {
        Self { problem }
    }
}

impl CostFunction for ArgminBridge<'_> {
    type Param = Theta;
    type Output = Cost;

    fn cost(&self, theta: &Self::Param) -> Result<Self::Output, Error> {
        Ok(self.problem.evaluate(theta)?)
    }
}

impl Gradient for ArgminBridge<'_> {
    type Param = Theta;
    type Gradient = Grad;

    fn gradient(&self, theta: &Self::Param) -> Result<Self::Gradient, Error> {
        Ok(self.problem.evaluate_gradient(theta)?)
    }
}
