//! objective::finite_diff — finite-difference gradients and Hessians.
//!
//! Purpose
//! -------
//! Approximate derivatives of the reduced objective when the user does not
//! supply an analytic gradient, optionally spreading the perturbation
//! evaluations over the worker pool.
//!
//! Key behaviors
//! -------------
//! - [`GradientEstimator::gradient`] supports three schemes selected by
//!   [`GradMethod`]:
//!   - `Forward`:    (f(x + hᵢeᵢ) − f(x)) / hᵢ, `n + 1` evaluations.
//!   - `Central`:    (f(x + hᵢeᵢ) − f(x − hᵢeᵢ)) / 2hᵢ, `2n` evaluations.
//!   - `Richardson`: (4·D(hᵢ/2) − D(hᵢ)) / 3 over central differences D,
//!     `4n` evaluations.
//! - Per-coordinate steps are `hᵢ = step · max(|xᵢ|, 1)`.
//! - [`compute_hessian`] prefers a central-difference Hessian of a gradient
//!   function and falls back to forward differences when validation fails.
//!   The result is symmetrized in place.
//!
//! Invariants & assumptions
//! ------------------------
//! - All perturbation points are built before any evaluation, and results
//!   are gathered in evaluation order, so the assembled gradient is identical for
//!   sequential and parallel dispatch.
//! - A failing or non-finite perturbed value aborts the gradient with
//!   [`CalibError::GradientEvaluation`] naming the coordinate.
//!
//! Conventions
//! -----------
//! - Errors raised inside the `finitediff` closures are captured through a
//!   `RefCell` side channel and surfaced after the call returns.
//!
//! Testing notes
//! -------------
//! - Unit tests check each scheme on polynomials with known derivatives,
//!   the accuracy ordering of Richardson vs central, error propagation, and
//!   parallel/sequential agreement.
use crate::{
    errors::{CalibError, CalibResult},
    objective::{
        pool::Dispatch,
        validation::{validate_grad, validate_hessian},
    },
    types::{Grad, Hessian, Theta},
};
use finitediff::FiniteDiff;
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::str::FromStr;

/// Finite-difference scheme.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GradMethod {
    Forward,
    #[default]
    Central,
    Richardson,
}

impl GradMethod {
    /// Relative step used when the caller does not set `gr.step`.
    pub fn default_step(self) -> f64 {
        match self {
            GradMethod::Forward => 1e-7,
            GradMethod::Central => 1e-5,
            GradMethod::Richardson => 1e-3,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            GradMethod::Forward => "forward",
            GradMethod::Central => "central",
            GradMethod::Richardson => "richardson",
        }
    }
}

impl FromStr for GradMethod {
    type Err = CalibError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "forward" => Ok(GradMethod::Forward),
            "central" => Ok(GradMethod::Central),
            "richardson" => Ok(GradMethod::Richardson),
            other => Err(CalibError::InvalidControl {
                key: "gr.method".to_string(),
                reason: format!("unknown gradient method '{other}'"),
            }),
        }
    }
}

/// Finite-difference gradient estimator bound to one dispatch policy.
#[derive(Debug, Clone, Copy)]
pub struct GradientEstimator<'a> {
    method: GradMethod,
    step: f64,
    dispatch: Dispatch<'a>,
}

impl<'a> GradientEstimator<'a> {
    /// # Errors
    /// - [`CalibError::InvalidControl`] if `step` is given and is not a
    ///   positive finite number.
    pub fn new(method: GradMethod, step: Option<f64>, dispatch: Dispatch<'a>) -> CalibResult<Self> {
        let step = step.unwrap_or_else(|| method.default_step());
        if !(step.is_finite() && step > 0.0) {
            return Err(CalibError::InvalidControl {
                key: "gr.step".to_string(),
                reason: format!("step must be positive and finite, got {step}"),
            });
        }
        Ok(Self { method, step, dispatch })
    }

    pub fn method(&self) -> GradMethod {
        self.method
    }

    pub fn step(&self) -> f64 {
        self.step
    }

    /// Number of objective evaluations one gradient costs in dimension `dim`.
    pub fn evaluations(&self, dim: usize) -> usize {
        match self.method {
            GradMethod::Forward => dim + 1,
            GradMethod::Central => 2 * dim,
            GradMethod::Richardson => 4 * dim,
        }
    }

    /// Estimate ∇f at `x`.
    ///
    /// # Parameters
    /// - `f`: fallible objective over the same space as `x`. Callers that
    ///   need common random numbers bind one stream into `f`.
    /// - `x`: point of differentiation. Coordinate `i` is perturbed by
    ///   `h_i = step · max(|x_i|, 1)`.
    ///
    /// # Returns
    /// The gradient estimate, of length `x.len()`, with every perturbed
    /// point evaluated in evaluation order (in parallel when the dispatch allows).
    ///
    /// # Errors
    /// - [`CalibError::GradientEvaluation`] if any perturbation evaluation
    ///   fails or is non-finite. `index` is the perturbed coordinate, or
    ///   `x.len()` for the unperturbed forward-difference base point.
    /// - Validation errors from [`validate_grad`].
    pub fn gradient<F>(&self, f: F, x: &Theta) -> CalibResult<Grad>
    where
        F: Fn(&Theta) -> CalibResult<f64> + Sync + Send,
    {
        let dim = x.len();
        let steps: Vec<f64> = x.iter().map(|v| self.step * v.abs().max(1.0)).collect();
        let points = self.perturbed_points(x, &steps);
        let values = self.dispatch.map(&points, |(index, point)| match f(point) {
            Ok(v) if v.is_finite() => Ok(v),
            Ok(v) => Err(CalibError::GradientEvaluation {
                index: *index,
                reason: format!("non-finite objective value {v}"),
            }),
            Err(e) => Err(CalibError::GradientEvaluation { index: *index, reason: e.to_string() }),
        })?;

        let grad: Grad = match self.method {
            GradMethod::Forward => {
                let base = values[dim];
                (0..dim).map(|i| (values[i] - base) / steps[i]).collect()
            }
            GradMethod::Central => {
                (0..dim).map(|i| (values[2 * i] - values[2 * i + 1]) / (2.0 * steps[i])).collect()
            }
            GradMethod::Richardson => (0..dim)
                .map(|i| {
                    let v = &values[4 * i..4 * i + 4];
                    let coarse = (v[0] - v[1]) / (2.0 * steps[i]);
                    let fine = (v[2] - v[3]) / steps[i];
                    (4.0 * fine - coarse) / 3.0
                })
                .collect(),
        };
        validate_grad(&grad, dim)?;
        Ok(grad)
    }

    /// Perturbation points tagged with the coordinate they belong to.
    fn perturbed_points(&self, x: &Theta, steps: &[f64]) -> Vec<(usize, Theta)> {
        let shifted = |i: usize, delta: f64| {
            let mut p = x.clone();
            p[i] += delta;
            p
        };
        let dim = x.len();
        let mut points = Vec::with_capacity(self.evaluations(dim));
        match self.method {
            GradMethod::Forward => {
                points.extend((0..dim).map(|i| (i, shifted(i, steps[i]))));
                points.push((dim, x.clone()));
            }
            GradMethod::Central => {
                for (i, &h) in steps.iter().enumerate() {
                    points.push((i, shifted(i, h)));
                    points.push((i, shifted(i, -h)));
                }
            }
            GradMethod::Richardson => {
                for (i, &h) in steps.iter().enumerate() {
                    points.push((i, shifted(i, h)));
                    points.push((i, shifted(i, -h)));
                    points.push((i, shifted(i, 0.5 * h)));
                    points.push((i, shifted(i, -0.5 * h)));
                }
            }
        }
        points
    }
}

/// Finite-difference Hessian of a fallible gradient function.
///
/// The central-difference Hessian is tried first; if it fails validation the
/// forward-difference Hessian is computed instead. An error returned by
/// `grad` aborts the computation and is propagated unchanged.
///
/// # Errors
/// - The first error raised by `grad`.
/// - [`CalibError::HessianDimMismatch`] / [`CalibError::InvalidHessian`] if
///   the forward-difference fallback also fails validation.
pub fn compute_hessian<F>(grad: F, theta: &Theta) -> CalibResult<Hessian>
where
    F: Fn(&Theta) -> CalibResult<Grad>,
{
    let dim = theta.len();
    let closure_err: RefCell<Option<CalibError>> = RefCell::new(None);
    let g = |x: &Theta| -> Grad {
        if closure_err.borrow().is_some() {
            return Theta::from_elem(dim, f64::NAN);
        }
        match grad(x) {
            Ok(g) => g,
            Err(e) => {
                closure_err.replace(Some(e));
                Theta::from_elem(dim, f64::NAN)
            }
        }
    };

    let mut cent_hess = theta.central_hessian(&g);
    if let Some(err) = closure_err.take() {
        return Err(err);
    }
    match validate_hessian(&cent_hess, dim) {
        Ok(()) => {
            symmetrize_hess(&mut cent_hess);
            Ok(cent_hess)
        }
        Err(_) => {
            log::debug!("central-difference Hessian failed validation; retrying forward");
            let mut forward_hess = theta.forward_hessian(&g);
            if let Some(err) = closure_err.take() {
                return Err(err);
            }
            validate_hessian(&forward_hess, dim)?;
            symmetrize_hess(&mut forward_hess);
            Ok(forward_hess)
        }
    }
}

fn symmetrize_hess(hess: &mut Hessian) {
    for i in 0..hess.nrows() {
        for j in 0..i {
            let avg = 0.5 * (hess[[i, j]] + hess[[j, i]]);
            hess[[i, j]] = avg;
            hess[[j, i]] = avg;
        }
    }
}
