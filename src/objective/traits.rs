//! Public objective contract.
//!
//! - [`Objective`]: trait users implement for their model misfit.
//! - [`Deterministic`], [`Stochastic`], [`WithGradient`]: closure adapters.
//!
//! Objectives are minimized. Both `value` and `gradient` receive the FULL
//! canonical parameter vector (length `n`); masking happens in the engine.
use crate::{
    errors::{CalibError, CalibResult},
    types::{Grad, Theta},
};
use rand::rngs::StdRng;

/// User-implemented objective.
///
/// Required:
/// - `value(&Theta, &mut StdRng) -> CalibResult<f64>`: evaluate the
///   objective once. Stochastic models draw from `rng`; deterministic models
///   ignore it. Every call receives an independently seeded generator.
///
/// Optional:
/// - `gradient(&Theta) -> CalibResult<Grad>`: analytic gradient over the
///   full vector. When not implemented, finite differences are used.
pub trait Objective: Sync {
    fn value(&self, theta: &Theta, rng: &mut StdRng) -> CalibResult<f64>;

    fn gradient(&self, _theta: &Theta) -> CalibResult<Grad> {
        Err(CalibError::GradientNotImplemented)
    }
}

impl<T: Objective + ?Sized> Objective for &T {
    fn value(&self, theta: &Theta, rng: &mut StdRng) -> CalibResult<f64> {
        (**self).value(theta, rng)
    }

    fn gradient(&self, theta: &Theta) -> CalibResult<Grad> {
        (**self).gradient(theta)
    }
}

/// Adapter for a plain `Fn(&Theta) -> f64`.
#[derive(Debug, Clone, Copy)]
pub struct Deterministic<F>(pub F);

impl<F> Objective for Deterministic<F>
where
    F: Fn(&Theta) -> f64 + Sync,
{
    fn value(&self, theta: &Theta, _rng: &mut StdRng) -> CalibResult<f64> {
        Ok((self.0)(theta))
    }
}

/// Adapter for a noisy `Fn(&Theta, &mut StdRng) -> f64`.
#[derive(Debug, Clone, Copy)]
pub struct Stochastic<F>(pub F);

impl<F> Objective for Stochastic<F>
where
    F: Fn(&Theta, &mut StdRng) -> f64 + Sync,
{
    fn value(&self, theta: &Theta, rng: &mut StdRng) -> CalibResult<f64> {
        Ok((self.0)(theta, rng))
    }
}

/// Deterministic value closure paired with an analytic gradient closure.
#[derive(Debug, Clone, Copy)]
pub struct WithGradient<F, G>(pub F, pub G);

impl<F, G> Objective for WithGradient<F, G>
where
    F: Fn(&Theta) -> f64 + Sync,
    G: Fn(&Theta) -> Grad + Sync,
{
    fn value(&self, theta: &Theta, _rng: &mut StdRng) -> CalibResult<f64> {
        Ok((self.0)(theta))
    }

    fn gradient(&self, theta: &Theta) -> CalibResult<Grad> {
        Ok((self.1)(theta))
    }
}
