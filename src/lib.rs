//! phased_calibration — phased, mask-aware calibration over pluggable solvers.
//!
//! Purpose
//! -------
//! Calibrate parametric (possibly stochastic) models by minimizing a user
//! objective over a parameter vector whose entries can be frozen, released
//! in ordered phases, and averaged over replicate trials. Minimization is
//! delegated to interchangeable backends that share one contract.
//!
//! Key behaviors
//! -------------
//! - [`params`]: the codec between flat and named parameter structures, the
//!   activity mask and box bounds.
//! - [`objective`]: the user objective contract, replicate averaging, finite
//!   differences and the caller-owned worker pool.
//! - [`solvers`]: the solver trait, registry, chain adapter and built-in
//!   backends (argmin L-BFGS, Nelder–Mead, particle swarm, and an evolution
//!   strategy).
//! - [`calibration`]: [`calibrate`](calibration::calibrate), its options, the
//!   phase scheduler and the final Hessian.
//!
//! Invariants & assumptions
//! ------------------------
//! - Objectives are minimized and always receive the FULL parameter vector.
//! - Validation errors are raised before the objective is first evaluated.
//! - Randomness flows only through explicitly seeded `StdRng` handles.
//! - The library never installs a logger; it logs through the `log` facade.
//!
//! Downstream usage
//! ----------------
//! ```ignore
//! use phased_calibration::prelude::*;
//!
//! let par = ParameterVector::flat_with_missing(vec![Some(1.0), None, Some(5.0)]);
//! let options = CalibrationOptions::default()
//!     .with_bounds(vec![-10.0; 3], vec![10.0; 3])
//!     .with_phases(&[1, 2, 1]);
//! let outcome = calibrate(&par, &Deterministic(|x: &Theta| x.dot(x)), &options, None)?;
//! ```
//!
//! Testing notes
//! -------------
//! - Unit tests live next to each module; end-to-end properties are in
//!   `tests/integration_phased_calibration.rs`.

pub mod calibration;
pub mod errors;
pub mod objective;
pub mod params;
pub mod solvers;
pub mod types;

// ---- Convenience prelude --------------------------------------------------
//
// Downstream crates can write
//
//     use phased_calibration::prelude::*;
//
// to import the main calibration surface in a single line.

pub mod prelude {
    pub use crate::calibration::{
        BoundsPolicy, CalibrationOptions, CalibrationOutcome, Control, ControlValue, FailurePolicy,
        OptimizationResult, PhaseRecord, PhaseSetting, calibrate, calibrate_with_registry,
        standard_errors,
    };
    pub use crate::errors::{CalibError, CalibResult};
    pub use crate::objective::{
        Deterministic, GradMethod, Objective, Stochastic, WithGradient, WorkerPool,
    };
    pub use crate::params::{ParameterNode, ParameterVector};
    pub use crate::solvers::{Capabilities, Convergence, Counts, Solver, SolverRegistry};
    pub use crate::types::{Grad, Hessian, Theta};
}
