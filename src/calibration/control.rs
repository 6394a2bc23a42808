//! calibration::control — validated control options.
//!
//! Purpose
//! -------
//! Hold the recognized control keys of a calibration run together with the
//! pass-through keys forwarded verbatim to backends.
//!
//! Key behaviors
//! -------------
//! - [`Control`] derives serde with the external key names (`gr.method`,
//!   `gr.step`). Keys that are not recognized land in [`Control::extra`].
//! - [`Control::from_pairs`] builds the same structure from `(key, value)`
//!   pairs, e.g. when forwarding options from another front end.
//! - [`Control::validate`] checks the recognized numeric keys; typed
//!   accessors check pass-through keys when a backend reads them.
//!
//! Conventions
//! -----------
//! - Invalid values surface as [`CalibError::InvalidControl`] naming the key.
//! - `None` means "use the backend default".
use crate::{
    errors::{CalibError, CalibResult},
    objective::finite_diff::GradMethod,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::str::FromStr;

/// Seed used when the caller does not set `seed`.
pub const DEFAULT_SEED: u64 = 0x5EED_CA11_B0A7_0001;

/// Routing policy for finite bounds on a backend that cannot honor them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BoundsPolicy {
    /// Evaluate at the coordinate-wise projection onto the box.
    #[default]
    Clip,
    /// Fail validation with `UnsupportedConstraint`.
    Reject,
}

impl FromStr for BoundsPolicy {
    type Err = CalibError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "clip" => Ok(BoundsPolicy::Clip),
            "reject" => Ok(BoundsPolicy::Reject),
            other => Err(invalid("bounds_policy", format!("expected 'clip' or 'reject', got '{other}'"))),
        }
    }
}

/// What to do after a phase fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailurePolicy {
    /// Log a warning and seed the next phase from the last good result.
    #[default]
    Continue,
    /// Stop and return the outcome marked as aborted.
    Abort,
}

impl FromStr for FailurePolicy {
    type Err = CalibError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "continue" => Ok(FailurePolicy::Continue),
            "abort" => Ok(FailurePolicy::Abort),
            other => Err(invalid("on_failure", format!("expected 'continue' or 'abort', got '{other}'"))),
        }
    }
}

/// Pass-through control value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ControlValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    List(Vec<f64>),
}

impl ControlValue {
    pub fn as_f64(&self) -> Option<f64> {
        match *self {
            ControlValue::Int(i) => Some(i as f64),
            ControlValue::Float(f) => Some(f),
            _ => None,
        }
    }

    /// Non-negative integer, also accepting integral floats such as `50.0`.
    pub fn as_u64(&self) -> Option<u64> {
        match *self {
            ControlValue::Int(i) if i >= 0 => Some(i as u64),
            ControlValue::Float(f) if f >= 0.0 && f.fract() == 0.0 && f < u64::MAX as f64 => {
                Some(f as u64)
            }
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match *self {
            ControlValue::Bool(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            ControlValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[f64]> {
        match self {
            ControlValue::List(v) => Some(v),
            _ => None,
        }
    }
}

impl From<bool> for ControlValue {
    fn from(v: bool) -> Self {
        ControlValue::Bool(v)
    }
}

impl From<i64> for ControlValue {
    fn from(v: i64) -> Self {
        ControlValue::Int(v)
    }
}

impl From<i32> for ControlValue {
    fn from(v: i32) -> Self {
        ControlValue::Int(i64::from(v))
    }
}

impl From<f64> for ControlValue {
    fn from(v: f64) -> Self {
        ControlValue::Float(v)
    }
}

impl From<&str> for ControlValue {
    fn from(v: &str) -> Self {
        ControlValue::Text(v.to_string())
    }
}

impl From<String> for ControlValue {
    fn from(v: String) -> Self {
        ControlValue::Text(v)
    }
}

impl From<Vec<f64>> for ControlValue {
    fn from(v: Vec<f64>) -> Self {
        ControlValue::List(v)
    }
}

/// Control options of one calibration run.
///
/// Fields:
/// - `maxit`: iteration cap per backend run.
/// - `ncores`: cap on effective workers when running in parallel.
/// - `parallel`: request pooled evaluation (also settable on the options).
/// - `gr_method` / `gr_step`: finite-difference scheme and relative step.
/// - `seed`: root seed for every random stream of the run.
/// - `bounds_policy` / `on_failure`: see [`BoundsPolicy`], [`FailurePolicy`].
/// - `verbose`: attach backend observers where available.
/// - `extra`: pass-through keys such as `lbfgs.m` or `es.lambda`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Control {
    pub maxit: Option<u64>,
    pub ncores: Option<usize>,
    pub parallel: bool,
    #[serde(rename = "gr.method")]
    pub gr_method: GradMethod,
    #[serde(rename = "gr.step")]
    pub gr_step: Option<f64>,
    pub seed: u64,
    pub bounds_policy: BoundsPolicy,
    pub on_failure: FailurePolicy,
    pub verbose: bool,
    #[serde(flatten)]
    pub extra: BTreeMap<String, ControlValue>,
}

impl Default for Control {
    fn default() -> Self {
        Self {
            maxit: None,
            ncores: None,
            parallel: false,
            gr_method: GradMethod::default(),
            gr_step: None,
            seed: DEFAULT_SEED,
            bounds_policy: BoundsPolicy::default(),
            on_failure: FailurePolicy::default(),
            verbose: false,
            extra: BTreeMap::new(),
        }
    }
}

impl Control {
    /// Build a validated `Control` from `(key, value)` pairs.
    ///
    /// Recognized keys are parsed into their typed fields; every other key is
    /// stored in `extra` unchanged.
    ///
    /// # Errors
    /// - [`CalibError::InvalidControl`] for a recognized key with a value of
    ///   the wrong type or range.
    pub fn from_pairs<I, K, V>(pairs: I) -> CalibResult<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<ControlValue>,
    {
        let mut control = Control::default();
        for (key, value) in pairs {
            let key: String = key.into();
            let value: ControlValue = value.into();
            match key.as_str() {
                "maxit" => control.maxit = Some(expect_u64(&key, &value)?),
                "ncores" => control.ncores = Some(expect_u64(&key, &value)? as usize),
                "parallel" => control.parallel = expect_bool(&key, &value)?,
                "gr.method" => control.gr_method = expect_str(&key, &value)?.parse()?,
                "gr.step" => control.gr_step = Some(expect_f64(&key, &value)?),
                "seed" => control.seed = expect_u64(&key, &value)?,
                "bounds_policy" => control.bounds_policy = expect_str(&key, &value)?.parse()?,
                "on_failure" => control.on_failure = expect_str(&key, &value)?.parse()?,
                "verbose" => control.verbose = expect_bool(&key, &value)?,
                _ => {
                    control.extra.insert(key, value);
                }
            }
        }
        control.validate()?;
        Ok(control)
    }

    /// # Errors
    /// - [`CalibError::InvalidControl`] if `maxit == 0`, `ncores == 0`, or
    ///   `gr.step` is not a positive finite number.
    pub fn validate(&self) -> CalibResult<()> {
        if self.maxit == Some(0) {
            return Err(invalid("maxit", "must be at least one".to_string()));
        }
        if self.ncores == Some(0) {
            return Err(invalid("ncores", "must be at least one".to_string()));
        }
        if let Some(step) = self.gr_step {
            if !(step.is_finite() && step > 0.0) {
                return Err(invalid("gr.step", format!("must be positive and finite, got {step}")));
            }
        }
        Ok(())
    }

    pub fn maxit_or(&self, default: u64) -> u64 {
        self.maxit.unwrap_or(default)
    }

    /// Pass-through value by key.
    pub fn extra(&self, key: &str) -> Option<&ControlValue> {
        self.extra.get(key)
    }

    /// Numeric pass-through value.
    ///
    /// # Errors
    /// - [`CalibError::InvalidControl`] if the key is present but not numeric.
    pub fn extra_f64(&self, key: &str) -> CalibResult<Option<f64>> {
        self.extra.get(key).map(|v| expect_f64(key, v)).transpose()
    }

    /// Positive numeric pass-through value.
    ///
    /// # Errors
    /// - [`CalibError::InvalidControl`] if present and not a positive finite
    ///   number.
    pub fn extra_positive(&self, key: &str) -> CalibResult<Option<f64>> {
        match self.extra_f64(key)? {
            Some(v) if !(v.is_finite() && v > 0.0) => {
                Err(invalid(key, format!("must be positive and finite, got {v}")))
            }
            other => Ok(other),
        }
    }

    /// Count-like pass-through value (`>= 1`).
    ///
    /// # Errors
    /// - [`CalibError::InvalidControl`] if present and not a positive integer.
    pub fn extra_count(&self, key: &str) -> CalibResult<Option<usize>> {
        match self.extra.get(key) {
            None => Ok(None),
            Some(v) => match v.as_u64() {
                Some(n) if n >= 1 => Ok(Some(n as usize)),
                _ => Err(invalid(key, format!("expected a positive integer, got {v:?}"))),
            },
        }
    }
}

fn invalid(key: &str, reason: String) -> CalibError {
    CalibError::InvalidControl { key: key.to_string(), reason }
}

fn expect_u64(key: &str, value: &ControlValue) -> CalibResult<u64> {
    value.as_u64().ok_or_else(|| invalid(key, format!("expected a non-negative integer, got {value:?}")))
}

fn expect_f64(key: &str, value: &ControlValue) -> CalibResult<f64> {
    value.as_f64().ok_or_else(|| invalid(key, format!("expected a number, got {value:?}")))
}

fn expect_bool(key: &str, value: &ControlValue) -> CalibResult<bool> {
    value.as_bool().ok_or_else(|| invalid(key, format!("expected a boolean, got {value:?}")))
}

fn expect_str<'v>(key: &str, value: &'v ControlValue) -> CalibResult<&'v str> {
    value.as_str().ok_or_else(|| invalid(key, format!("expected a string, got {value:?}")))
}
