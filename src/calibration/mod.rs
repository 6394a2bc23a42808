//! calibration — phased calibration over masked parameter subsets.
//!
//! Purpose
//! -------
//! Provide the [`calibrate`] entry point and everything it is configured
//! with or returns.
//!
//! Key behaviors
//! -------------
//! - [`control`] / [`options`]: validated run configuration with serde
//!   support.
//! - [`validation`]: eager checks and resolution of initial values.
//! - [`phases`]: the phase state machine.
//! - [`engine`]: `calibrate` itself.
//! - [`hessian`]: the optional Hessian at the solution and standard errors.
//! - [`types`]: [`OptimizationResult`], [`PhaseRecord`],
//!   [`CalibrationOutcome`].
//!
//! Conventions
//! -----------
//! - Phases run strictly in sequence; solver chains run strictly in sequence
//!   within a phase. The two loops are kept separate.

pub mod control;
pub mod engine;
pub mod hessian;
pub mod options;
pub mod phases;
pub mod types;
pub mod validation;

// ---- Re-exports (primary public surface) ----------------------------------

pub use self::control::{BoundsPolicy, Control, ControlValue, DEFAULT_SEED, FailurePolicy};
pub use self::engine::{calibrate, calibrate_with_registry};
pub use self::hessian::{EIGEN_EPS, final_hessian, standard_errors};
pub use self::options::{CalibrationOptions, PhaseSetting};
pub use self::phases::{PhaseScheduler, PhaseSpec, phase_order};
pub use self::types::{CalibrationOutcome, OptimizationResult, PhaseRecord};
