//! solvers::argmin_backends — built-in backends driven by argmin's executor.
//!
//! Purpose
//! -------
//! Wire configured argmin solvers (see [`builders`](super::builders)) to the
//! reduced problem and report their raw state as a [`NativeResult`].
//!
//! Key behaviors
//! -------------
//! - [`LbfgsSolver`]: L-BFGS with More–Thuente or Hager–Zhang line search,
//!   gradient-based and unbounded (bounds are handled by clipping).
//! - [`NelderMeadSolver`]: derivative-free simplex search, unbounded.
//! - [`ParticleSwarmSolver`]: population search over a finite box, with a
//!   generator seeded from the problem seed. The starting point is kept if
//!   no particle improves on it.
//! - `maxit` caps iterations; each backend has its own default.
//! - With the `obs_slog` feature and `Control::verbose`, iteration-based
//!   runs attach argmin's slog observer.
//!
//! Invariants & assumptions
//! ------------------------
//! - Errors raised inside argmin (objective or gradient failures) come back
//!   as `argmin::core::Error` and are converted into `CalibError`, keeping
//!   the original variant where one was wrapped.
use crate::{
    calibration::control::Control,
    errors::CalibResult,
    params::bounds::Bounds,
    solvers::{
        builders::{
            build_lbfgs_hager_zhang, build_lbfgs_more_thuente, build_nelder_mead,
            build_particle_swarm,
        },
        problem::{ArgminBridge, ReducedProblem},
        traits::{Capabilities, NativeResult, NativeTermination, Solver},
    },
    types::{Cost, Theta},
};
use argmin::core::{Executor, IterState, State};

pub const DEFAULT_LBFGS_MAXIT: u64 = 100;
pub const DEFAULT_NM_MAXIT: u64 = 500;
pub const DEFAULT_PSO_MAXIT: u64 = 100;

/// Line search used by [`LbfgsSolver`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineSearcher {
    MoreThuente,
    HagerZhang,
}

#[derive(Debug, Clone, Copy)]
pub struct LbfgsSolver {
    pub line_searcher: LineSearcher,
}

impl Solver for LbfgsSolver {
    fn capabilities(&self) -> Capabilities {
        Capabilities::gradient_based()
    }

    fn invoke(
        &self, problem: &ReducedProblem<'_>, theta0: Theta, _bounds: &Bounds, control: &Control,
    ) -> CalibResult<NativeResult> {
        let maxit = control.maxit_or(DEFAULT_LBFGS_MAXIT);
        match self.line_searcher {
            LineSearcher::MoreThuente => {
                run_iter_solver(problem, theta0, control, build_lbfgs_more_thuente(control)?, maxit)
            }
            LineSearcher::HagerZhang => {
                run_iter_solver(problem, theta0, control, build_lbfgs_hager_zhang(control)?, maxit)
            }
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NelderMeadSolver;

impl Solver for NelderMeadSolver {
    fn capabilities(&self) -> Capabilities {
        Capabilities::derivative_free()
    }

    fn invoke(
        &self, problem: &ReducedProblem<'_>, theta0: Theta, _bounds: &Bounds, control: &Control,
    ) -> CalibResult<NativeResult> {
        let solver = build_nelder_mead(&theta0, control)?;
        run_iter_solver(problem, theta0, control, solver, control.maxit_or(DEFAULT_NM_MAXIT))
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ParticleSwarmSolver;

impl Solver for ParticleSwarmSolver {
    fn capabilities(&self) -> Capabilities {
        Capabilities {
            supports_bounds: true,
            supports_gradient: false,
            requires_finite_bounds: true,
            stochastic: true,
        }
    }

    fn invoke(
        &self, problem: &ReducedProblem<'_>, theta0: Theta, bounds: &Bounds, control: &Control,
    ) -> CalibResult<NativeResult> {
        let solver = build_particle_swarm(bounds, control, problem.seed())?;
        let maxit = control.maxit_or(DEFAULT_PSO_MAXIT);
        let start_cost = problem.evaluate(&theta0)?;

        let result = Executor::new(ArgminBridge::new(problem), solver)
            .configure(|state| state.max_iters(maxit))
            .run()?;
        let state = result.state();
        let mut best_param = state.get_best_param().map(|p| problem.admissible(&p.position));
        let mut best_cost = state.get_best_cost();
        if best_param.is_none() || start_cost <= best_cost {
            best_param = Some(problem.admissible(&theta0));
            best_cost = start_cost;
        }
        Ok(NativeResult {
            best_param,
            best_cost,
            termination: NativeTermination::Argmin(state.get_termination_status().clone()),
            iterations: state.get_iter(),
            fn_evals: state.get_func_counts().clone(),
        })
    }
}

/// Run an argmin solver whose state is an `IterState` over `Theta`.
#[cfg_attr(not(feature = "obs_slog"), allow(unused_variables))]
fn run_iter_solver<'p, S, G>(
    problem: &'p ReducedProblem<'p>, theta0: Theta, control: &Control, solver: S, maxit: u64,
) -> CalibResult<NativeResult>
where
    S: argmin::core::Solver<ArgminBridge<'p>, IterState<Theta, G, (), (), (), Cost>>
        + Send
        + 'static,
    G: Clone,
{
    let executor = Executor::new(ArgminBridge::new(problem), solver)
        .configure(|state| state.param(theta0).max_iters(maxit));
    #[cfg(feature = "obs_slog")]
    let executor = if control.verbose {
        let observer = argmin_observer_slog::SlogLogger::term_noblock();
        executor.add_observer(observer, argmin::core::observers::ObserverMode::Always)
    } else {
        executor
    };

    let mut state = executor.run()?.state().clone();
    let iterations = state.get_iter();
    let fn_evals = state.get_func_counts().clone();
    let termination = NativeTermination::Argmin(state.get_termination_status().clone());
    log::debug!("argmin run finished after {iterations} iterations ({termination:?})");
    Ok(NativeResult {
        best_param: state.take_best_param().map(|p| problem.admissible(&p)),
        best_cost: state.get_best_cost(),
        termination,
        iterations,
        fn_evals,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calibration::control::ControlValue;
    use crate::objective::{
        finite_diff::{GradMethod, GradientEstimator},
        pool::Dispatch,
        replicate::ReplicatedObjective,
        traits::Deterministic,
    };
    use crate::params::mask::ActiveMask;
    use crate::solvers::problem::PhaseProblem;
    use crate::solvers::traits::{Convergence, normalize_native};
    use ndarray::array;

    // -------------------------------------------------------------------------
    // Scope
    // -----
    // These tests cover:
    // - Each built-in argmin backend minimizing a shifted quadratic.
    // - Iteration caps mapping to `MaxIterations`.
    // - Clipping of reported parameters under finite bounds.
    // -------------------------------------------------------------------------

    fn shifted_quadratic(x: &Theta) -> f64 {
        (x[0] - 1.0).powi(2) + 2.0 * (x[1] + 0.5).powi(2)
    }

    fn run(solver: &dyn Solver, bounds: Bounds, theta0: Theta, control: &Control) -> NativeResult {
        let f = Deterministic(shifted_quadratic);
        let mask = ActiveMask::all(2);
        let template = array![0.0, 0.0];
        let obj = ReplicatedObjective::new(&f, &mask, &template, 1, 3, Dispatch::Sequential).unwrap();
        let est = GradientEstimator::new(GradMethod::Central, None, Dispatch::Sequential).unwrap();
        let phase = PhaseProblem::new(&obj, bounds.clone(), est, 3).unwrap();
        let rp = phase.for_solver(solver.capabilities(), 3);
        solver.invoke(&rp, theta0, &bounds, control).unwrap()
    }

    #[test]
    // Purpose
    // -------
    // Every argmin-backed solver finds the minimizer (1, -0.5).
    fn argmin_backends_minimize_shifted_quadratic() {
        let box_bounds = Bounds::new(array![-5.0, -5.0], array![5.0, 5.0]).unwrap();
        let solvers: Vec<(Box<dyn Solver>, Bounds, f64)> = vec![
            (Box::new(LbfgsSolver { line_searcher: LineSearcher::MoreThuente }), Bounds::unbounded(2), 1e-5),
            (Box::new(LbfgsSolver { line_searcher: LineSearcher::HagerZhang }), Bounds::unbounded(2), 1e-5),
            (Box::new(NelderMeadSolver), Bounds::unbounded(2), 1e-4),
            (Box::new(ParticleSwarmSolver), box_bounds, 5e-2),
        ];
        let control = Control::from_pairs([("maxit", ControlValue::from(400i64))]).unwrap();

        for (solver, bounds, tol) in solvers {
            let out = normalize_native(run(solver.as_ref(), bounds, array![3.0, 2.0], &control)).unwrap();

            assert!((out.par[0] - 1.0).abs() < tol, "par {:?}", out.par);
            assert!((out.par[1] + 0.5).abs() < tol, "par {:?}", out.par);
            assert!(out.value < 1e-2);
        }
    }

    #[test]
    fn iteration_cap_maps_to_max_iterations() {
        let control = Control::from_pairs([("maxit", ControlValue::from(3i64))]).unwrap();

        let native = run(&NelderMeadSolver, Bounds::unbounded(2), array![30.0, 20.0], &control);
        let out = normalize_native(native).unwrap();

        assert_eq!(out.convergence, Convergence::MaxIterations);
        assert_eq!(out.iterations, 3);
    }

    #[test]
    // Purpose
    // -------
    // Under finite bounds, an unbounded backend reports a point inside the box
    // even when the unconstrained optimum lies outside.
    //
    // Given
    // -----
    // - Minimizer (1, -0.5), bounds x₀ ∈ [2, 3], x₁ ∈ [-1, 1].
    //
    // Expect
    // ------
    // - Reported x₀ ≈ 2 (the clipped optimum), x₁ ≈ -0.5.
    fn unbounded_backend_reports_clipped_point() {
        let bounds = Bounds::new(array![2.0, -1.0], array![3.0, 1.0]).unwrap();

        let native = run(&NelderMeadSolver, bounds.clone(), array![2.5, 0.5], &Control::default());
        let out = normalize_native(native).unwrap();

        assert!(bounds.contains(&out.par));
        assert!((out.par[0] - 2.0).abs() < 1e-6);
        assert!((out.par[1] + 0.5).abs() < 1e-3);
    }
}
