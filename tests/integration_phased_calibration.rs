//! Integration tests for phased calibration.
//!
//! Purpose
//! -------
//! - Validate the end-to-end calibration pipeline: from caller parameters
//!   and options, through eager validation and the phase state machine, to
//!   solver chains, the final result, and the optional Hessian.
//! - Exercise the documented behavioral properties on deterministic and
//!   stochastic objectives rather than toy edge cases only.
//!
//! Coverage
//! --------
//! - `params`: mask round-trip law.
//! - `calibration::engine::calibrate`: both documented end-to-end scenarios,
//!   fixed-phase invariance across every built-in backend, phase
//!   monotonicity, named structures and solver chains.
//! - Error policy: unknown methods and the reject bounds policy fail before
//!   any evaluation; failed phases follow the failure policy.
//! - `objective`: replicate defaults and parallel evaluation on a caller
//!   pool.
//!
//! Exclusions
//! ----------
//! - Fine-grained behavior of individual backends, finite differences and
//!   control parsing; those are covered by unit tests.
use approx::assert_abs_diff_eq;
use ndarray::Array1;
use phased_calibration::{
    params::ActiveMask,
    prelude::*,
    solvers::{ES, LBFGS, NELDER_MEAD, PARTICLE_SWARM},
};
use proptest::prelude::*;
use rand::rngs::StdRng;
use rand_distr::{Distribution, Normal};
use std::sync::atomic::{AtomicUsize, Ordering};

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn sum_sq(x: &Theta) -> f64 {
    x.dot(x)
}

fn control(pairs: &[(&str, ControlValue)]) -> Control {
    Control::from_pairs(pairs.iter().cloned()).unwrap()
}

/// Purpose
/// -------
/// Objective that counts how often it is called.
struct Counting<'c> {
    calls: &'c AtomicUsize,
}

impl Objective for Counting<'_> {
    fn value(&self, theta: &Theta, _rng: &mut StdRng) -> CalibResult<f64> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        Ok(sum_sq(theta))
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(128))]

    #[test]
    // Purpose
    // -------
    // expand(project(full, active), full, active) == full for any vector and
    // any mask.
    fn mask_round_trip_law(
        pairs in prop::collection::vec((-1e6f64..1e6, any::<bool>()), 0..24)
    ) {
        let full: Theta = pairs.iter().map(|(v, _)| *v).collect();
        let mask = ActiveMask::new(pairs.iter().map(|(_, a)| *a).collect());

        let reduced = mask.project(&full).unwrap();
        let back = mask.expand(&reduced, &full).unwrap();

        prop_assert_eq!(reduced.len(), mask.n_active());
        prop_assert_eq!(back, full);
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    // Purpose
    // -------
    // Entries with phase <= 0 come back bit-identical whatever their value.
    fn fixed_entries_are_returned_unchanged(
        start in prop::collection::vec(-3.0f64..3.0, 4),
        fixed in 0usize..4,
    ) {
        let mut phases = vec![1i64, 2, 1, 2];
        phases[fixed] = -1;
        let options = CalibrationOptions::default()
            .with_phases(&phases)
            .with_method(&[NELDER_MEAD])
            .with_control(control(&[("maxit", ControlValue::from(60i64))]));

        let out = calibrate(&ParameterVector::flat(&start), &Deterministic(sum_sq), &options, None).unwrap();

        prop_assert_eq!(out.result.theta[fixed].to_bits(), start[fixed].to_bits());
        for record in &out.history {
            prop_assert_eq!(record.result.theta[fixed].to_bits(), start[fixed].to_bits());
        }
    }
}

#[test]
// Purpose
// -------
// First documented scenario: a missing value resolved from bounds, three
// phases, and convergence to the origin.
//
// Given
// -----
// - par = [1, 2, 3, NA, 5], f = Σxᵢ², bounds ±100, phases [1, 2, 3, 2, 1].
//
// Expect
// ------
// - Three phases executed in order, final value ≈ 0, every parameter ≈ 0.
fn end_to_end_missing_value_and_three_phases() {
    init_logging();
    let par = ParameterVector::flat_with_missing(vec![Some(1.0), Some(2.0), Some(3.0), None, Some(5.0)]);
    let options = CalibrationOptions::default()
        .with_bounds(vec![-100.0; 5], vec![100.0; 5])
        .with_phases(&[1, 2, 3, 2, 1]);

    let out = calibrate(&par, &Deterministic(sum_sq), &options, None).unwrap();

    assert_eq!(out.history.iter().map(|r| r.phase).collect::<Vec<_>>(), vec![1, 2, 3]);
    assert_eq!(out.history[0].active, vec![0, 4]);
    assert_eq!(out.history[1].active, vec![0, 1, 3, 4]);
    assert_eq!(out.history[2].active, vec![0, 1, 2, 3, 4]);
    assert!(out.value() < 1e-8, "value {}", out.value());
    for v in out.result.theta.iter() {
        assert!(v.abs() < 1e-4, "theta {:?}", out.result.theta);
    }
    assert!(!out.convergence().is_failed());
    assert_eq!(out.result.method, LBFGS);
}

#[test]
// Purpose
// -------
// Second documented scenario: inactive entries stay at their initial value.
//
// Given
// -----
// - par = [1, 1, 1, 1, 1], f = Σxᵢ², active = [T, T, F, F, T].
//
// Expect
// ------
// - Positions 2 and 3 (0-based) stay exactly 1; the others go to 0.
fn end_to_end_active_flags() {
    let par = ParameterVector::flat(&[1.0; 5]);
    let options =
        CalibrationOptions { active: Some(vec![true, true, false, false, true]), ..Default::default() };

    let out = calibrate(&par, &Deterministic(sum_sq), &options, None).unwrap();
    let theta = &out.result.theta;

    assert_eq!(theta[2], 1.0);
    assert_eq!(theta[3], 1.0);
    for i in [0, 1, 4] {
        assert!(theta[i].abs() < 1e-4, "theta {theta:?}");
    }
    assert_abs_diff_eq!(out.value(), 2.0, epsilon = 1e-8);
}

#[test]
// Purpose
// -------
// A permanently fixed parameter never changes, for any backend.
//
// Given
// -----
// - phases = [1, 2, -1, 2, 1] and an objective coupling x₂ to the others.
// - Every built-in backend, with finite bounds for the swarm.
//
// Expect
// ------
// - x₂ equals its initial value in every phase record and the final result.
fn fixed_phase_invariance_for_every_backend() {
    let f = Deterministic(|x: &Theta| {
        (x[0] - 1.0).powi(2) + (x[1] + 2.0).powi(2) + x[2] * x[0] + (x[3] - x[2]).powi(2) + x[4].powi(2)
    });
    let par = ParameterVector::flat(&[0.5, 0.5, 0.75, 0.5, 0.5]);
    let ctl = control(&[("maxit", ControlValue::from(150i64))]);

    for method in [LBFGS, "L-BFGS-HZ", NELDER_MEAD, PARTICLE_SWARM, ES] {
        let options = CalibrationOptions::default()
            .with_bounds(vec![-5.0; 5], vec![5.0; 5])
            .with_phases(&[1, 2, -1, 2, 1])
            .with_method(&[method])
            .with_control(ctl.clone());

        let out = calibrate(&par, &f, &options, None).unwrap();

        assert_eq!(out.history.len(), 2, "{method}");
        for record in &out.history {
            assert_eq!(record.result.theta[2], 0.75, "{method} phase {}", record.phase);
            assert!(!record.active.contains(&2));
        }
        assert_eq!(out.result.theta[2], 0.75, "{method}");
    }
}

#[test]
// Purpose
// -------
// On a convex deterministic objective, later phases never end worse.
fn phase_monotonicity_on_convex_objective() {
    let f = Deterministic(|x: &Theta| {
        x.iter().enumerate().map(|(i, v)| (i as f64 + 1.0) * (v - i as f64).powi(2)).sum::<f64>()
    });
    let par = ParameterVector::flat(&[3.0, -1.0, 4.0, 0.0, 2.5]);

    for method in [LBFGS, NELDER_MEAD] {
        let options = CalibrationOptions::default()
            .with_phases(&[1, 3, 2, 4, 5])
            .with_method(&[method])
            .with_control(control(&[("maxit", ControlValue::from(1000i64))]));

        let out = calibrate(&par, &f, &options, None).unwrap();
        let values: Vec<f64> = out.history.iter().map(|r| r.result.value).collect();

        assert_eq!(values.len(), 5);
        for pair in values.windows(2) {
            assert!(pair[1] <= pair[0] + 1e-9, "{method}: {values:?}");
        }
    }
}

#[test]
// Purpose
// -------
// Named structures keep their shape, and a solver chain runs in order
// within a phase.
fn named_structure_and_solver_chain() {
    let par = ParameterVector::named(vec![
        ("alpha", ParameterNode::scalar(2.0)),
        ("beta", ParameterNode::Sequence(vec![Some(-1.0), None])),
        ("noise", ParameterNode::group(vec![("sd", ParameterNode::scalar(0.5))])),
    ]);
    let f = Deterministic(|x: &Theta| (x[0] - 1.0).powi(2) + (x[1] - 2.0).powi(2) + (x[2] - 3.0).powi(2) + x[3]);
    let options = CalibrationOptions::default()
        .with_bounds(vec![-10.0, -10.0, -10.0, 0.1], vec![10.0, 10.0, 10.0, 1.0])
        .with_phases(&[1, 1, 2, -1])
        .with_method(&[NELDER_MEAD, LBFGS]);

    let out = calibrate(&par, &f, &options, None).unwrap();

    assert_eq!(out.result.method, "Nelder-Mead,L-BFGS");
    match out.par.get("beta") {
        Some(ParameterNode::Sequence(values)) => {
            assert_eq!(values.len(), 2);
            assert!((values[0].unwrap() - 2.0).abs() < 1e-4);
            assert!((values[1].unwrap() - 3.0).abs() < 1e-4);
        }
        other => panic!("Expected a sequence for 'beta', got {other:?}"),
    }
    assert_eq!(out.par.get("noise"), Some(&ParameterNode::group(vec![("sd", ParameterNode::scalar(0.5))])));
}

#[test]
// Purpose
// -------
// Unknown method names and rejected bounds fail before the objective is
// ever called.
fn eager_errors_happen_before_any_evaluation() {
    let calls = AtomicUsize::new(0);
    let f = Counting { calls: &calls };
    let par = ParameterVector::flat(&[1.0, 2.0]);
    let unknown = CalibrationOptions::default().with_phases(&[1, 2]).with_method(&["downhill-simplex"]);
    let mut reject = CalibrationOptions::default()
        .with_bounds(vec![-5.0, f64::NEG_INFINITY], vec![5.0, f64::INFINITY])
        .with_method(&[NELDER_MEAD]);
    reject.control.bounds_policy = BoundsPolicy::Reject;

    assert_eq!(
        calibrate(&par, &f, &unknown, None).unwrap_err(),
        CalibError::UnknownMethod { name: "downhill-simplex".to_string() }
    );
    assert_eq!(
        calibrate(&par, &f, &reject, None).unwrap_err(),
        CalibError::UnsupportedConstraint { method: NELDER_MEAD.to_string(), active: 1 }
    );
    assert_eq!(calls.load(Ordering::Relaxed), 0);

    // Without finite bounds the reject policy has nothing to reject.
    let mut open = CalibrationOptions::default().with_method(&[NELDER_MEAD]);
    open.control.bounds_policy = BoundsPolicy::Reject;
    assert!(calibrate(&par, &f, &open, None).is_ok());
}

#[test]
// Purpose
// -------
// A backend failure marks its phase failed. `Continue` runs later phases
// from the last good point; `Abort` stops and reports the failure.
fn failure_policies_end_to_end() {
    init_logging();
    let mut registry = SolverRegistry::with_defaults();
    registry.register_fn("unstable", Capabilities::derivative_free(), |_, _, _, _| {
        Err(CalibError::SolverExecution { method: "unstable".to_string(), reason: "singular simplex".to_string() })
    });
    let par = ParameterVector::flat(&[1.0, 2.0, 3.0]);
    let base = CalibrationOptions {
        method: Some(PhaseSetting::PerPhase(vec![
            vec![NELDER_MEAD.to_string()],
            vec!["unstable".to_string()],
            vec![NELDER_MEAD.to_string()],
        ])),
        ..CalibrationOptions::default().with_phases(&[1, 2, 3])
    };
    let mut abort = base.clone();
    abort.control.on_failure = FailurePolicy::Abort;
    let f = Deterministic(sum_sq);

    let cont = calibrate_with_registry(&par, &f, &base, None, &registry).unwrap();
    let stop = calibrate_with_registry(&par, &f, &abort, None, &registry).unwrap();

    assert_eq!(cont.history.len(), 3);
    assert!(cont.history[1].result.is_failed());
    assert!(cont.history[1].result.message.as_deref().unwrap_or("").contains("singular simplex"));
    assert_eq!(cont.history[1].result.theta, cont.history[0].result.theta);
    assert!(!cont.history[2].result.is_failed());
    assert_eq!(cont.convergence(), cont.history[2].result.convergence);
    assert!(!cont.convergence().is_failed());
    assert_eq!(cont.worst_convergence(), Convergence::Failed);
    assert_eq!(cont.result.counts, cont.history[2].result.counts);
    assert!(cont.value() < 1e-4, "value {}", cont.value());
    assert!(!cont.aborted);

    assert_eq!(stop.history.len(), 2);
    assert!(stop.aborted);
    assert_eq!(stop.convergence(), Convergence::Failed);
    assert!(stop.result.value.is_finite());
    assert_eq!(stop.result.theta[2], 3.0);
}

#[test]
fn control_from_json_drives_a_run() {
    let json = r#"{
        "maxit": 400,
        "gr.method": "richardson",
        "seed": 11,
        "bounds_policy": "reject",
        "lbfgs.m": 5,
        "tol.grad": 1e-8
    }"#;
    let ctl: Control = serde_json::from_str(json).unwrap();
    ctl.validate().unwrap();

    assert_eq!(ctl.maxit, Some(400));
    assert_eq!(ctl.gr_method, GradMethod::Richardson);
    assert_eq!(ctl.bounds_policy, BoundsPolicy::Reject);
    assert_eq!(ctl.extra_count("lbfgs.m").unwrap(), Some(5));

    let options = CalibrationOptions::default().with_control(ctl);
    let out = calibrate(&ParameterVector::flat(&[4.0, -3.0]), &Deterministic(sum_sq), &options, None).unwrap();
    assert!(out.value() < 1e-8);
}

#[test]
// Purpose
// -------
// The Hessian is computed over free parameters only, with zero rows and
// columns for the fixed ones, and feeds standard errors.
//
// Given
// -----
// - f = Σxᵢ², par = [1, 2, 0.5], phases [1, 1, -1], hessian = true.
//
// Expect
// ------
// - H ≈ diag(2, 2, 0) with H[2, ·] = H[·, 2] = 0; SEs ≈ [1/√2, 1/√2, NaN].
fn hessian_has_zero_rows_for_fixed_parameters() {
    let par = ParameterVector::flat(&[1.0, 2.0, 0.5]);
    let options = CalibrationOptions { hessian: true, ..CalibrationOptions::default().with_phases(&[1, 1, -1]) };

    let out = calibrate(&par, &Deterministic(sum_sq), &options, None).unwrap();
    let h = out.hessian.as_ref().unwrap();

    assert!(out.hessian_error.is_none());
    assert_abs_diff_eq!(h[[0, 0]], 2.0, epsilon = 1e-2);
    assert_abs_diff_eq!(h[[1, 1]], 2.0, epsilon = 1e-2);
    assert_abs_diff_eq!(h[[0, 1]], 0.0, epsilon = 1e-2);
    for j in 0..3 {
        assert_eq!(h[[2, j]], 0.0);
        assert_eq!(h[[j, 2]], 0.0);
    }

    let se = standard_errors(h).unwrap();
    assert_abs_diff_eq!(se[0], 0.5_f64.sqrt(), epsilon = 1e-2);
    assert_abs_diff_eq!(se[1], 0.5_f64.sqrt(), epsilon = 1e-2);
    assert!(se[2].is_nan());
}

fn noisy_quadratic(x: &Theta, rng: &mut StdRng) -> f64 {
    let noise = Normal::new(0.0, 0.1).unwrap();
    x.iter().map(|v| (v - 1.0).powi(2)).sum::<f64>() + noise.sample(rng)
}

#[test]
// Purpose
// -------
// Without an explicit method, replicate averaging selects the evolution
// strategy, and every solver evaluation averages `r` trials.
fn replicates_default_to_evolution_strategy() {
    let par = ParameterVector::flat(&[-2.0, 3.0]);
    let options = CalibrationOptions::default()
        .with_bounds(vec![-5.0; 2], vec![5.0; 2])
        .with_replicates(PhaseSetting::All(10))
        .with_control(control(&[("maxit", ControlValue::from(200i64))]));

    let out = calibrate(&par, &Stochastic(noisy_quadratic), &options, None).unwrap();

    assert_eq!(out.result.method, ES);
    assert_eq!(out.history[0].replicates, 10);
    assert_eq!(out.result.counts.trials, 10 * out.result.counts.function);
    assert_eq!(out.result.counts.gradient, 0);
    assert!(!out.convergence().is_failed());
    for v in out.result.theta.iter() {
        assert!((v - 1.0).abs() < 0.5, "theta {:?}", out.result.theta);
    }
}

#[test]
// Purpose
// -------
// Evaluation on a caller-owned pool gives the same result as sequential
// evaluation for the same seed, and the same run is reproducible.
fn parallel_pool_matches_sequential_run() {
    let pool = WorkerPool::new(4).unwrap();
    let par = ParameterVector::flat(&[0.0, 0.0, 2.0]);
    let sequential = CalibrationOptions::default()
        .with_bounds(vec![-5.0; 3], vec![5.0; 3])
        .with_replicates(PhaseSetting::All(8))
        .with_control(control(&[("maxit", ControlValue::from(40i64)), ("seed", ControlValue::from(2024i64))]));
    let parallel = CalibrationOptions { parallel: true, ..sequential.clone() };
    let f = Stochastic(noisy_quadratic);

    let a = calibrate(&par, &f, &sequential, None).unwrap();
    let b = calibrate(&par, &f, &parallel, Some(&pool)).unwrap();
    let c = calibrate(&par, &f, &parallel, Some(&pool)).unwrap();

    assert_eq!(a.result.theta, b.result.theta);
    assert_eq!(a.value(), b.value());
    assert_eq!(a.result.counts, b.result.counts);
    assert_eq!(b.result.theta, c.result.theta);
}

#[test]
fn analytic_gradient_is_used_when_available() {
    let grads = AtomicUsize::new(0);
    let f = WithGradient(sum_sq, |x: &Theta| {
        grads.fetch_add(1, Ordering::Relaxed);
        x.mapv(|v| 2.0 * v)
    });
    let par = ParameterVector::flat(&[3.0, -1.0, 2.0]);
    let options = CalibrationOptions::default().with_phases(&[1, 1, 2]);

    let out = calibrate(&par, &f, &options, None).unwrap();

    assert!(grads.load(Ordering::Relaxed) > 0);
    assert_eq!(out.result.counts.trials, out.result.counts.function);
    let origin: Array1<f64> = Array1::zeros(3);
    assert!((&out.result.theta - &origin).iter().all(|v| v.abs() < 1e-5));
}
