//! params::mask — projection between full and active-only parameter spaces.
//!
//! Purpose
//! -------
//! Represent which of the `n` canonical parameters are optimized in a given
//! phase and move vectors between the full space (length `n`) and the
//! reduced space (length `k = #active`).
//!
//! Invariants & assumptions
//! ------------------------
//! - `project` keeps active entries in ascending index order.
//! - `expand` writes only active positions of a copy of the template; fixed
//!   positions are never touched, which gives the round-trip law
//!   `expand(project(full), full) == full`.
//! - A mask is immutable once built; every phase constructs a new one.
use crate::{
    errors::{CalibError, CalibResult},
    params::bounds::Bounds,
    types::Theta,
};

/// ActiveMask — boolean activity flags plus the cached active indices.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveMask {
    flags: Vec<bool>,
    indices: Vec<usize>,
}

impl ActiveMask {
    pub fn new(flags: Vec<bool>) -> Self {
        let indices = flags.iter().enumerate().filter(|(_, a)| **a).map(|(i, _)| i).collect();
        Self { flags, indices }
    }

    pub fn all(n: usize) -> Self {
        Self::new(vec![true; n])
    }

    /// Mask for sequential phase `phase`: entry `i` is active iff
    /// `0 < phases[i] <= phase`.
    pub fn for_phase(phases: &[i64], phase: i64) -> Self {
        Self::new(phases.iter().map(|&p| p > 0 && p <= phase).collect())
    }

    /// Full length `n`.
    pub fn len(&self) -> usize {
        self.flags.len()
    }

    /// Number of active parameters `k`.
    pub fn n_active(&self) -> usize {
        self.indices.len()
    }

    /// True when no parameter is active.
    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    pub fn flags(&self) -> &[bool] {
        &self.flags
    }

    /// Active indices in ascending order.
    pub fn indices(&self) -> &[usize] {
        &self.indices
    }

    pub fn is_active(&self, i: usize) -> bool {
        self.flags.get(i).copied().unwrap_or(false)
    }

    /// Select the active entries of `full`.
    ///
    /// # Errors
    /// - [`CalibError::Shape`] if `full.len() != self.len()`.
    pub fn project(&self, full: &Theta) -> CalibResult<Theta> {
        self.check_full(full.len())?;
        Ok(self.indices.iter().map(|&i| full[i]).collect())
    }

    /// Overwrite the active positions of a copy of `template` with `reduced`.
    ///
    /// # Errors
    /// - [`CalibError::Shape`] if `template.len() != n` or
    ///   `reduced.len() != k`.
    pub fn expand(&self, reduced: &Theta, template: &Theta) -> CalibResult<Theta> {
        self.check_full(template.len())?;
        if reduced.len() != self.n_active() {
            return Err(CalibError::Shape {
                what: "reduced parameter vector",
                expected: self.n_active(),
                found: reduced.len(),
            });
        }
        let mut full = template.clone();
        for (&i, &v) in self.indices.iter().zip(reduced.iter()) {
            full[i] = v;
        }
        Ok(full)
    }

    /// Project bounds onto the active subspace.
    pub fn project_bounds(&self, bounds: &Bounds) -> CalibResult<Bounds> {
        Bounds::new(self.project(bounds.lower())?, self.project(bounds.upper())?)
    }

    fn check_full(&self, found: usize) -> CalibResult<()> {
        if found != self.len() {
            return Err(CalibError::Shape { what: "full parameter vector", expected: self.len(), found });
        }
        Ok(())
    }
}
