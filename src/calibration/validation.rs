//! calibration::validation — eager checks run before any evaluation.
//!
//! Purpose
//! -------
//! Turn the caller's parameters and options into the canonical inputs of a
//! run (codec, bounds, phase numbers, initial vector), failing fast on any
//! inconsistency so that no objective evaluation is wasted.
//!
//! Key behaviors
//! -------------
//! - `lower`, `upper`, `phases` and `active` must each have one entry per
//!   flattened parameter ([`CalibError::Shape`]).
//! - Unset phases default to 1; `active[i] == false` forces phase `-1`.
//! - A missing initial value is replaced by the midpoint of its bounds and
//!   requires both bounds to be finite ([`CalibError::Bounds`] otherwise).
//! - Present initial values must be finite and lie within their bounds.
//!
//! Conventions
//! -----------
//! - Bounds errors carry the canonical parameter name from the codec.
use crate::{
    calibration::options::CalibrationOptions,
    errors::{CalibError, CalibResult},
    params::{bounds::Bounds, codec::{ParameterCodec, ParameterVector}},
    types::Theta,
};

/// Canonical inputs of one calibration call.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedProblem {
    pub codec: ParameterCodec,
    pub theta0: Theta,
    pub bounds: Bounds,
    /// Phase number per canonical parameter; non-positive means fixed.
    pub phases: Vec<i64>,
}

/// Validate `par` against `options` and resolve the canonical inputs.
///
/// # Errors
/// - [`CalibError::Shape`] for misaligned bounds, phases or active flags.
/// - [`CalibError::Structure`] if `par` cannot be flattened.
/// - [`CalibError::Bounds`] for inconsistent bounds or unresolvable initial
///   values.
pub fn resolve(par: &ParameterVector, options: &CalibrationOptions) -> CalibResult<ResolvedProblem> {
    let codec = ParameterCodec::from_initial(par)?;
    let values = codec.flatten(par)?;
    let n = codec.len();

    let lower = side(options.lower.as_deref(), "lower bounds", n, f64::NEG_INFINITY)?;
    let upper = side(options.upper.as_deref(), "upper bounds", n, f64::INFINITY)?;
    let bounds = Bounds::new(lower, upper).map_err(|e| rename(e, &codec))?;
    let phases = resolve_phases(options, n)?;
    let theta0 = resolve_initial(&values, &bounds, &codec)?;

    Ok(ResolvedProblem { codec, theta0, bounds, phases })
}

/// Phase number per parameter after applying defaults and `active` flags.
///
/// # Errors
/// - [`CalibError::Shape`] if `phases` or `active` is misaligned.
pub fn resolve_phases(options: &CalibrationOptions, n: usize) -> CalibResult<Vec<i64>> {
    let mut phases = match &options.phases {
        None => vec![1; n],
        Some(p) if p.len() != n => {
            return Err(CalibError::Shape { what: "phases", expected: n, found: p.len() });
        }
        Some(p) => p.iter().map(|v| v.unwrap_or(1)).collect(),
    };
    if let Some(active) = &options.active {
        if active.len() != n {
            return Err(CalibError::Shape { what: "active", expected: n, found: active.len() });
        }
        for (phase, &on) in phases.iter_mut().zip(active) {
            if !on {
                *phase = -1;
            }
        }
    }
    Ok(phases)
}

fn side(values: Option<&[f64]>, what: &'static str, n: usize, default: f64) -> CalibResult<Theta> {
    match values {
        None => Ok(Theta::from_elem(n, default)),
        Some(v) if v.len() != n => Err(CalibError::Shape { what, expected: n, found: v.len() }),
        Some(v) => Ok(Theta::from_vec(v.to_vec())),
    }
}

fn resolve_initial(
    values: &[Option<f64>], bounds: &Bounds, codec: &ParameterCodec,
) -> CalibResult<Theta> {
    let mut theta0 = Theta::zeros(values.len());
    for (index, value) in values.iter().enumerate() {
        let name = || codec.names()[index].clone();
        theta0[index] = match *value {
            None => {
                let mid = bounds.midpoint(index).ok_or_else(|| CalibError::Bounds {
                    index,
                    name: name(),
                    reason: "missing initial value requires finite lower and upper bounds",
                })?;
                log::debug!("initial value of '{}' set to bound midpoint {mid}", name());
                mid
            }
            Some(v) if !v.is_finite() => {
                return Err(CalibError::Bounds { index, name: name(), reason: "initial value is not finite" });
            }
            Some(v) if v < bounds.lower()[index] || v > bounds.upper()[index] => {
                return Err(CalibError::Bounds {
                    index,
                    name: name(),
                    reason: "initial value lies outside its bounds",
                });
            }
            Some(v) => v,
        };
    }
    Ok(theta0)
}

fn rename(err: CalibError, codec: &ParameterCodec) -> CalibError {
    match err {
        CalibError::Bounds { index, reason, .. } => CalibError::Bounds {
            index,
            name: codec.names().get(index).cloned().unwrap_or_default(),
            reason,
        },
        other => other,
    }
}
