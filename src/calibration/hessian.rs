//! calibration::hessian — finite-difference Hessian at the final solution.
//!
//! Purpose
//! -------
//! Compute the second-order curvature of the full objective around the
//! calibrated parameters and, when the objective is a negative
//! log-likelihood, turn it into standard errors.
//!
//! Key behaviors
//! -------------
//! - [`final_hessian`] differences the central finite-difference gradient of
//!   the objective over every parameter that is not permanently fixed
//!   (phase `> 0`), using [`compute_hessian`] with its central-to-forward
//!   fallback and symmetrization. The result is embedded into an `n × n`
//!   matrix whose rows and columns for fixed parameters are zero.
//! - [`standard_errors`] returns `sqrt(diag(H⁺))` from a symmetric
//!   eigendecomposition of the non-zero block, discarding eigenvalues at or
//!   below [`EIGEN_EPS`]. Parameters with an all-zero row get `NaN`.
//!
//! Invariants & assumptions
//! ------------------------
//! - Every point of every gradient evaluated for the Hessian uses the same
//!   random stream, so the Hessian of a replicated stochastic objective is
//!   differenced on common random numbers.
//! - No explicit matrix inverse is formed.
use crate::{
    calibration::control::Control,
    errors::{CalibError, CalibResult},
    objective::{
        finite_diff::{GradMethod, GradientEstimator, compute_hessian},
        pool::Dispatch,
        replicate::{ReplicatedObjective, splitmix64},
        traits::Objective,
        validation::validate_hessian,
    },
    params::mask::ActiveMask,
    types::{Hessian, Theta},
};
use nalgebra::DMatrix;

/// Eigenvalues at or below this are treated as zero in the pseudo-inverse.
pub const EIGEN_EPS: f64 = 1e-12;

/// Stream tag mixed into the run seed for Hessian evaluations.
const HESSIAN_STREAM: u64 = 0x4E55_1A11;

/// Finite-difference Hessian of the full objective at `theta`.
///
/// `phases` gives the phase number of each parameter; entries `<= 0` are
/// held fixed and contribute zero rows and columns.
///
/// # Errors
/// - [`CalibError::GradientEvaluation`] if a gradient evaluation fails.
/// - [`CalibError::InvalidHessian`] if neither the central nor the forward
///   Hessian is finite.
pub fn final_hessian(
    objective: &dyn Objective, theta: &Theta, phases: &[i64], replicates: usize,
    control: &Control, dispatch: Dispatch<'_>,
) -> CalibResult<Hessian> {
    let n = theta.len();
    let mask = ActiveMask::new(phases.iter().map(|&p| p > 0).collect());
    let mut full = Hessian::zeros((n, n));
    if mask.is_empty() {
        return Ok(full);
    }

    let seed = splitmix64(control.seed ^ HESSIAN_STREAM);
    let replicated = ReplicatedObjective::new(objective, &mask, theta, replicates, seed, dispatch)?;
    let estimator = GradientEstimator::new(GradMethod::Central, control.gr_step, dispatch)?;
    let reduced = mask.project(theta)?;
    log::debug!("computing Hessian over {} of {n} parameters", mask.n_active());

    let stream = replicated.next_stream();
    let grad = |x: &Theta| estimator.gradient(|p| replicated.evaluate_stream(p, stream), x);
    let block = compute_hessian(grad, &reduced)?;

    let idx = mask.indices();
    for (a, &i) in idx.iter().enumerate() {
        for (b, &j) in idx.iter().enumerate() {
            full[[i, j]] = block[[a, b]];
        }
    }
    Ok(full)
}

/// Standard errors `sqrt(diag(H⁺))` of a symmetric Hessian.
///
/// # Errors
/// - [`CalibError::HessianDimMismatch`] if `hessian` is not square.
/// - [`CalibError::InvalidHessian`] if an entry is not finite.
pub fn standard_errors(hessian: &Hessian) -> CalibResult<Theta> {
    let n = hessian.nrows();
    if hessian.ncols() != n {
        return Err(CalibError::HessianDimMismatch { expected: n, found: hessian.dim() });
    }
    validate_hessian(hessian, n)?;

    let live: Vec<usize> = (0..n).filter(|&i| hessian.row(i).iter().any(|&v| v != 0.0)).collect();
    let k = live.len();
    let mut block = DMatrix::<f64>::zeros(k, k);
    for (a, &i) in live.iter().enumerate() {
        for (b, &j) in live.iter().enumerate() {
            block[(a, b)] = hessian[[i, j]];
        }
    }

    let mut se = Theta::from_elem(n, f64::NAN);
    if k == 0 {
        return Ok(se);
    }
    let eigen = block.symmetric_eigen();
    let q = eigen.eigenvectors;
    for (a, &i) in live.iter().enumerate() {
        let var: f64 = eigen
            .eigenvalues
            .iter()
            .enumerate()
            .filter(|(_, lambda)| **lambda > EIGEN_EPS)
            .map(|(c, &lambda)| q[(a, c)] * q[(a, c)] / lambda)
            .sum();
        se[i] = var.sqrt();
    }
    Ok(se)
}
