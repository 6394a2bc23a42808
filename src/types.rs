//! types — shared numeric aliases.
//!
//! Centralize the vector, matrix and counter types used across the crate so
//! the rest of the code stays agnostic to `ndarray` generics and argmin's
//! counter maps.
use ndarray::{Array1, Array2};
use std::collections::HashMap;

/// Parameter vector (full or reduced).
pub type Theta = Array1<f64>;

/// Gradient vector, same length as the `Theta` it was taken at.
pub type Grad = Array1<f64>;

/// Dense `n × n` Hessian.
pub type Hessian = Array2<f64>;

/// Scalar objective value.
pub type Cost = f64;

/// Function-evaluation counters as reported by a backend
/// (e.g. argmin's `"cost_count"`).
pub type FnEvalMap = HashMap<String, u64>;

/// Counter key used for objective evaluations.
pub const COST_COUNT: &str = "cost_count";
