//! params::bounds — per-parameter box constraints.
use crate::{
    errors::{CalibError, CalibResult},
    types::Theta,
};
use serde::{Deserialize, Serialize};

/// Box constraints `lower[i] ≤ x[i] ≤ upper[i]`; infinite entries mean
/// "unbounded on that side".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    lower: Theta,
    upper: Theta,
}

impl Bounds {
    /// Build validated bounds.
    ///
    /// # Errors
    /// - [`CalibError::Shape`] if `lower` and `upper` differ in length.
    /// - [`CalibError::Bounds`] if an entry is NaN or `lower[i] > upper[i]`.
    pub fn new(lower: Theta, upper: Theta) -> CalibResult<Self> {
        if lower.len() != upper.len() {
            return Err(CalibError::Shape {
                what: "upper bounds",
                expected: lower.len(),
                found: upper.len(),
            });
        }
        for (index, (&lo, &hi)) in lower.iter().zip(upper.iter()).enumerate() {
            if lo.is_nan() || hi.is_nan() {
                return Err(CalibError::Bounds {
                    index,
                    name: format!("x{index}"),
                    reason: "bounds must not be NaN",
                });
            }
            if lo > hi {
                return Err(CalibError::Bounds {
                    index,
                    name: format!("x{index}"),
                    reason: "lower bound exceeds upper bound",
                });
            }
        }
        Ok(Self { lower, upper })
    }

    /// `(-∞, +∞)` for every one of `n` parameters.
    pub fn unbounded(n: usize) -> Self {
        Self {
            lower: Theta::from_elem(n, f64::NEG_INFINITY),
            upper: Theta::from_elem(n, f64::INFINITY),
        }
    }

    pub fn len(&self) -> usize {
        self.lower.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lower.is_empty()
    }

    pub fn lower(&self) -> &Theta {
        &self.lower
    }

    pub fn upper(&self) -> &Theta {
        &self.upper
    }

    /// Number of parameters with at least one finite bound.
    pub fn n_bounded(&self) -> usize {
        self.lower.iter().zip(self.upper.iter()).filter(|(lo, hi)| lo.is_finite() || hi.is_finite()).count()
    }

    pub fn is_bounded(&self) -> bool {
        self.n_bounded() > 0
    }

    /// True when every parameter has a finite lower and upper bound.
    pub fn is_finite_box(&self) -> bool {
        self.lower.iter().chain(self.upper.iter()).all(|v| v.is_finite())
    }

    /// Midpoint of entry `i` when both of its bounds are finite.
    pub fn midpoint(&self, i: usize) -> Option<f64> {
        let (lo, hi) = (self.lower[i], self.upper[i]);
        (lo.is_finite() && hi.is_finite()).then(|| 0.5 * (lo + hi))
    }

    pub fn contains(&self, theta: &Theta) -> bool {
        theta.len() == self.len()
            && theta
                .iter()
                .zip(self.lower.iter().zip(self.upper.iter()))
                .all(|(&x, (&lo, &hi))| lo <= x && x <= hi)
    }

    /// Coordinate-wise projection onto the box.
    pub fn clip(&self, theta: &Theta) -> Theta {
        let mut out = theta.clone();
        for ((x, &lo), &hi) in out.iter_mut().zip(self.lower.iter()).zip(self.upper.iter()) {
            *x = x.max(lo).min(hi);
        }
        out
    }
}
