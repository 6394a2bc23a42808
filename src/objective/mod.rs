//! objective — user objectives, replicate averaging, and finite differences.
//!
//! Purpose
//! -------
//! Turn a user function over the full parameter vector into the reduced,
//! possibly averaged objective that a solver sees in one phase, and provide
//! numerical derivatives of it.
//!
//! Key behaviors
//! -------------
//! - [`traits::Objective`]: the user-facing contract (value plus optional
//!   analytic gradient) with closure adapters for deterministic and
//!   stochastic functions. Randomness always arrives through an explicit
//!   `StdRng` handle; nothing here touches a global RNG.
//! - [`replicate::ReplicatedObjective`]: expand reduced parameters through a
//!   mask, evaluate `r` trials and average them.
//! - [`finite_diff`]: forward/central/Richardson gradients with optional
//!   parallel evaluation and the central→forward Hessian helper.
//! - [`pool`]: the caller-owned worker pool and the sequential/parallel
//!   dispatch decision.
//!
//! Conventions
//! -----------
//! - Every evaluation path returns [`CalibResult`](crate::errors::CalibResult);
//!   a non-finite value is an error, never a silent NaN.
//! - Parallel results are gathered in input order, so assembled gradients
//!   and averaged sums do not depend on worker scheduling.

pub mod finite_diff;
pub mod pool;
pub mod replicate;
pub mod traits;
pub mod validation;

pub use self::finite_diff::{GradMethod, GradientEstimator, compute_hessian};
pub use self::pool::{Dispatch, WorkerPool};
pub use self::replicate::{ReplicatedObjective, stream_rng};
pub use self::traits::{Deterministic, Objective, Stochastic, WithGradient};
