//! objective::validation — finiteness and shape checks on what the objective
//! and the difference schemes produce.
//!
//! Every number that reaches a solver passes through one of these checks:
//! objective means ([`validate_value`]), analytic or estimated gradients
//! ([`validate_grad`]) and difference Hessians ([`validate_hessian`]). A
//! non-finite entry is reported with its position and whether it was `NaN`
//! or infinite.
use crate::{
    errors::{CalibError, CalibResult},
    types::{Grad, Hessian},
};

/// Position and value of the first non-finite entry, in iteration order.
fn first_non_finite<'a, I, K>(entries: I) -> Option<(K, f64)>
where
    I: IntoIterator<Item = (K, &'a f64)>,
{
    entries.into_iter().find(|(_, v)| !v.is_finite()).map(|(k, &v)| (k, v))
}

fn non_finite_kind(value: f64) -> &'static str {
    if value.is_nan() { "entry is NaN" } else { "entry is infinite" }
}

/// Pass a finite objective value through.
///
/// # Errors
/// - [`CalibError::NonFiniteValue`] for `NaN` or `±∞`.
pub fn validate_value(value: f64) -> CalibResult<f64> {
    if value.is_finite() { Ok(value) } else { Err(CalibError::NonFiniteValue { value }) }
}

/// Check a gradient over `dim` parameters.
///
/// # Errors
/// - [`CalibError::GradientDimMismatch`] if `grad.len() != dim`.
/// - [`CalibError::InvalidGradient`] naming the first non-finite coordinate.
pub fn validate_grad(grad: &Grad, dim: usize) -> CalibResult<()> {
    if grad.len() != dim {
        return Err(CalibError::GradientDimMismatch { expected: dim, found: grad.len() });
    }
    match first_non_finite(grad.iter().enumerate()) {
        Some((index, value)) => {
            Err(CalibError::InvalidGradient { index, value, reason: non_finite_kind(value) })
        }
        None => Ok(()),
    }
}

/// Check a `dim × dim` Hessian.
///
/// # Errors
/// - [`CalibError::HessianDimMismatch`] unless the shape is `(dim, dim)`.
/// - [`CalibError::InvalidHessian`] naming the first non-finite cell in
///   row-major order.
pub fn validate_hessian(hessian: &Hessian, dim: usize) -> CalibResult<()> {
    if hessian.dim() != (dim, dim) {
        return Err(CalibError::HessianDimMismatch { expected: dim, found: hessian.dim() });
    }
    match first_non_finite(hessian.indexed_iter()) {
        Some(((row, col), value)) => Err(CalibError::InvalidHessian { row, col, value }),
        None => Ok(()),
    }
}
