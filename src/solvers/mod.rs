//! solvers — pluggable minimization backends behind one contract.
//!
//! Purpose
//! -------
//! Give every minimization algorithm the same canonical call and result, and
//! run ordered solver chains within a phase.
//!
//! Key behaviors
//! -------------
//! - [`traits`]: the [`Solver`] trait, capability descriptor and the
//!   normalization of native results into [`SolverOutcome`].
//! - [`registry`]: name → backend lookup, with the built-in backends
//!   registered by [`SolverRegistry::with_defaults`].
//! - [`adapter`]: eager chain validation, the bounds policy, and failure
//!   containment while a chain runs.
//! - [`problem`]: the reduced problem a backend minimizes and its argmin
//!   bridge.
//! - [`argmin_backends`], [`builders`], [`evolution`]: the built-in
//!   backends.
//!
//! Downstream usage
//! ----------------
//! - Adding a backend means implementing [`Solver`] (or writing a closure)
//!   and registering it under a new name; nothing else in the engine changes.

pub mod adapter;
pub mod argmin_backends;
pub mod builders;
pub mod evolution;
pub mod problem;
pub mod registry;
pub mod traits;

// ---- Re-exports (primary public surface) ----------------------------------

pub use self::adapter::{ChainOutcome, SolverAdapter};
pub use self::problem::{PhaseProblem, ReducedProblem};
pub use self::registry::{ES, LBFGS, LBFGS_HZ, NELDER_MEAD, PARTICLE_SWARM, SolverEntry, SolverRegistry};
pub use self::traits::{
    Capabilities, Convergence, Counts, NativeResult, NativeTermination, Solver, SolverOutcome,
    normalize_native,
};
