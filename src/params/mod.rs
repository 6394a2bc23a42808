//! params — canonical parameter representation, bounds, and activity masks.
//!
//! Purpose
//! -------
//! Give the engine one consistent algebra over partially-fixed parameter
//! sets. Users hand in either a flat sequence or a named hierarchical
//! structure; [`codec::ParameterCodec`] fixes a total index order once, and
//! every other length-`n` quantity (bounds, phases, masks) is aligned to that
//! order.
//!
//! Key behaviors
//! -------------
//! - [`codec`]: flatten a [`ParameterVector`] into a canonical vector and
//!   re-expand flat vectors into the caller's original structure using the
//!   skeleton captured from the initial value.
//! - [`bounds`]: per-parameter box constraints with validation, projection
//!   and midpoint helpers.
//! - [`mask`]: project full vectors into the active subspace and expand
//!   reduced vectors back, leaving fixed positions untouched.
//!
//! Invariants & assumptions
//! ------------------------
//! - A codec is immutable for the life of one calibration call.
//! - `mask.expand(&mask.project(full)?, full)? == full` for any `full`.
//! - Masks are value objects; each phase builds a new one.

pub mod bounds;
pub mod codec;
pub mod mask;

pub use self::bounds::Bounds;
pub use self::codec::{ParameterCodec, ParameterNode, ParameterVector};
pub use self::mask::ActiveMask;
