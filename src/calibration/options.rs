//! Calibration call options.
//!
//! - [`PhaseSetting`]: one value for every phase, or one value per phase.
//! - [`CalibrationOptions`]: everything `calibrate` accepts besides the
//!   initial parameters and the objective.
use crate::{
    calibration::control::Control,
    errors::{CalibError, CalibResult},
};
use serde::{Deserialize, Serialize};

/// A setting shared by all phases or aligned with the executed phases.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PhaseSetting<T> {
    PerPhase(Vec<T>),
    All(T),
}

impl<T> PhaseSetting<T> {
    /// Value for the phase at `position` (0-based, in execution order).
    pub fn at(&self, position: usize) -> Option<&T> {
        match self {
            PhaseSetting::All(v) => Some(v),
            PhaseSetting::PerPhase(vs) => vs.get(position),
        }
    }

    /// # Errors
    /// - [`CalibError::Shape`] if a per-phase list does not have one entry
    ///   per executed phase.
    pub fn check_len(&self, what: &'static str, n_phases: usize) -> CalibResult<()> {
        match self {
            PhaseSetting::PerPhase(vs) if vs.len() != n_phases => {
                Err(CalibError::Shape { what, expected: n_phases, found: vs.len() })
            }
            _ => Ok(()),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        let slice = match self {
            PhaseSetting::All(v) => std::slice::from_ref(v),
            PhaseSetting::PerPhase(vs) => vs.as_slice(),
        };
        slice.iter()
    }
}

impl<T: Default> Default for PhaseSetting<T> {
    fn default() -> Self {
        PhaseSetting::All(T::default())
    }
}

/// Options for [`calibrate`](crate::calibration::engine::calibrate).
///
/// - `method`: solver chain per phase. `None` selects `ES` when any phase
///   uses more than one replicate and `L-BFGS` otherwise.
/// - `lower` / `upper`: bounds over the flattened parameters; `None` means
///   unbounded on that side.
/// - `phases`: phase number per parameter. `None` entries default to 1;
///   non-positive numbers keep the parameter fixed throughout.
/// - `active`: `false` forces the parameter's phase to `-1`.
/// - `replicates`: trials averaged per evaluation, per phase.
/// - `hessian`: compute the finite-difference Hessian after the last phase.
/// - `parallel`: evaluate on the caller's worker pool when one is supplied.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CalibrationOptions {
    pub method: Option<PhaseSetting<Vec<String>>>,
    pub lower: Option<Vec<f64>>,
    pub upper: Option<Vec<f64>>,
    pub phases: Option<Vec<Option<i64>>>,
    pub active: Option<Vec<bool>>,
    pub control: Control,
    pub hessian: bool,
    pub replicates: PhaseSetting<usize>,
    pub parallel: bool,
}

impl Default for CalibrationOptions {
    fn default() -> Self {
        Self {
            method: None,
            lower: None,
            upper: None,
            phases: None,
            active: None,
            control: Control::default(),
            hessian: false,
            replicates: PhaseSetting::All(1),
            parallel: false,
        }
    }
}

impl CalibrationOptions {
    /// Same method (or solver chain) for every phase.
    pub fn with_method<S: AsRef<str>>(mut self, chain: &[S]) -> Self {
        let chain = chain.iter().map(|s| s.as_ref().to_string()).collect();
        self.method = Some(PhaseSetting::All(chain));
        self
    }

    pub fn with_bounds(mut self, lower: Vec<f64>, upper: Vec<f64>) -> Self {
        self.lower = Some(lower);
        self.upper = Some(upper);
        self
    }

    pub fn with_phases(mut self, phases: &[i64]) -> Self {
        self.phases = Some(phases.iter().copied().map(Some).collect());
        self
    }

    pub fn with_control(mut self, control: Control) -> Self {
        self.control = control;
        self
    }

    pub fn with_replicates(mut self, replicates: PhaseSetting<usize>) -> Self {
        self.replicates = replicates;
        self
    }

    /// True when any phase averages more than one trial.
    pub fn uses_replicates(&self) -> bool {
        self.replicates.iter().any(|&r| r > 1)
    }
}
