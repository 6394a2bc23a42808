//! errors — unified error surface for the calibration engine.
//!
//! Purpose
//! -------
//! Collect every failure the engine can report into a single enum,
//! [`CalibError`], with a common result alias [`CalibResult<T>`]. Backend
//! (argmin) errors are converted at the solver boundary so callers never
//! handle raw `argmin::core::Error` values.
//!
//! Key behaviors
//! -------------
//! - Validation failures (`Shape`, `Bounds`, `UnknownMethod`,
//!   `UnsupportedConstraint`, `InvalidReplicates`, `InvalidControl`) are
//!   raised eagerly, before the objective is ever evaluated.
//! - Execution failures (`GradientEvaluation`, `SolverExecution`,
//!   `NonFiniteValue`, `ObjectiveFailed`) are caught per phase and recorded
//!   in the phase history instead of aborting the run (unless the failure
//!   policy says otherwise).
//! - `From<argmin::core::Error>` recovers a `CalibError` that travelled
//!   through argmin as an `anyhow` payload, so a gradient failure raised
//!   inside an argmin solver is still reported as `GradientEvaluation`.
//!
//! Conventions
//! -----------
//! - Variants carry small, cloneable context (`usize`, `f64`, `String`,
//!   `&'static str`) so errors can be stored inside results and compared in
//!   tests.
use argmin::core::{ArgminError, Error};
use thiserror::Error;

/// Crate-wide result alias.
pub type CalibResult<T> = Result<T, CalibError>;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum CalibError {
    // ---- Validation ----
    /// Length mismatch among parameters, bounds, phases or per-phase settings.
    #[error("Shape mismatch for {what}: expected {expected}, found {found}")]
    Shape { what: &'static str, expected: usize, found: usize },

    /// A structured parameter value does not follow the captured skeleton.
    #[error("Structure mismatch at '{path}': {reason}")]
    Structure { path: String, reason: &'static str },

    /// Inconsistent bounds or an initial value that cannot be resolved.
    #[error("Bounds error at index {index} ('{name}'): {reason}")]
    Bounds { index: usize, name: String, reason: &'static str },

    /// Solver name not present in the registry.
    #[error("Unknown method '{name}'")]
    UnknownMethod { name: String },

    /// Finite bounds routed to a backend that cannot honor them under `BoundsPolicy::Reject`.
    #[error("Method '{method}' does not support bounds (active parameters {active} have finite bounds)")]
    UnsupportedConstraint { method: String, active: usize },

    /// Replicate counts must be at least one.
    #[error("Invalid replicate count {value} for phase position {position}")]
    InvalidReplicates { position: usize, value: usize },

    /// Invalid control option value.
    #[error("Invalid control option '{key}': {reason}")]
    InvalidControl { key: String, reason: String },

    // ---- Objective ----
    /// The user objective reported a failure.
    #[error("Objective evaluation failed: {reason}")]
    ObjectiveFailed { reason: String },

    /// The objective returned NaN or an infinite value.
    #[error("Non-finite objective value: {value}")]
    NonFiniteValue { value: f64 },

    // ---- Gradient ----
    /// No analytic gradient is available; finite differences are used instead.
    #[error("Analytic gradient not implemented")]
    GradientNotImplemented,

    /// A perturbed evaluation failed while estimating a gradient.
    #[error("Gradient evaluation failed at component {index}: {reason}")]
    GradientEvaluation { index: usize, reason: String },

    /// Gradient dimensions do not match parameter dimensions.
    #[error("Gradient dimension mismatch: expected {expected}, found {found}")]
    GradientDimMismatch { expected: usize, found: usize },

    /// Gradient elements need to be finite.
    #[error("Invalid gradient at index {index}: {value}: {reason}")]
    InvalidGradient { index: usize, value: f64, reason: &'static str },

    // ---- Hessian ----
    #[error("Hessian dimension mismatch: expected ({expected}, {expected}), found {found:?}")]
    HessianDimMismatch { expected: usize, found: (usize, usize) },

    #[error("Invalid Hessian at ({row}, {col}): {value}, must be finite")]
    InvalidHessian { row: usize, col: usize, value: f64 },

    // ---- Solver ----
    /// A backend failed (returned an error or panicked) during its own search.
    #[error("Solver '{method}' failed: {reason}")]
    SolverExecution { method: String, reason: String },

    /// Any other argmin error that could not be mapped to a domain variant.
    #[error("Backend error: {text}")]
    Backend { text: String },
}

impl CalibError {
    /// True for errors that are raised during eager validation.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            CalibError::Shape { .. }
                | CalibError::Structure { .. }
                | CalibError::Bounds { .. }
                | CalibError::UnknownMethod { .. }
                | CalibError::UnsupportedConstraint { .. }
                | CalibError::InvalidReplicates { .. }
                | CalibError::InvalidControl { .. }
        )
    }
}

impl From<Error> for CalibError {
    fn from(original_err: Error) -> Self {
        let original_err = match original_err.downcast::<CalibError>() {
            Ok(calib_err) => return calib_err,
            Err(err) => err,
        };
        match original_err.downcast::<ArgminError>() {
            Ok(argmin_err) => CalibError::Backend { text: argmin_err.to_string() },
            Err(err) => CalibError::Backend { text: err.to_string() },
        }
    }
}
