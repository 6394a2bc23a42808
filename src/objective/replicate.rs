//! objective::replicate — masked, replicate-averaged objective.
//!
//! Purpose
//! -------
//! Present the user objective to a solver as a function of the active
//! parameters only, averaging `r` independent trials per evaluation when the
//! objective is stochastic.
//!
//! Key behaviors
//! -------------
//! - `evaluate(reduced)` expands `reduced` into a copy of the phase
//!   template, runs `r` trials and returns their arithmetic mean.
//! - Each trial `j` of evaluation stream `s` gets its own generator
//!   [`stream_rng`]`(seed, s, j)`. `evaluate` draws a fresh stream per call;
//!   [`ReplicatedObjective::evaluate_stream`] lets the gradient estimator
//!   reuse one stream for every perturbation (common random numbers).
//! - With a parallel [`Dispatch`], the `r` trials of one evaluation run on
//!   the pool and are joined before averaging.
//!
//! Invariants & assumptions
//! ------------------------
//! - `replicates >= 1`; `r == 1` performs exactly one call with no
//!   averaging.
//! - The mean is summed in replicate-index order, so it is reproducible for
//!   a given seed independent of scheduling.
//! - No global RNG state is read or written.
use crate::{
    errors::{CalibError, CalibResult},
    objective::{pool::Dispatch, traits::Objective, validation::{validate_grad, validate_value}},
    params::mask::ActiveMask,
    types::{Grad, Theta},
};
use rand::SeedableRng;
use rand::rngs::StdRng;
use std::sync::atomic::{AtomicU64, Ordering};

/// Independent generator for trial `replicate` of evaluation `stream`.
pub fn stream_rng(seed: u64, stream: u64, replicate: u64) -> StdRng {
    StdRng::seed_from_u64(splitmix64(splitmix64(splitmix64(seed) ^ stream) ^ replicate))
}

/// SplitMix64 finalizer.
pub(crate) fn splitmix64(x: u64) -> u64 {
    let mut z = x.wrapping_add(0x9E37_79B9_7F4A_7C15);
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

pub struct ReplicatedObjective<'a> {
    objective: &'a dyn Objective,
    mask: &'a ActiveMask,
    template: &'a Theta,
    replicates: usize,
    seed: u64,
    dispatch: Dispatch<'a>,
    streams: AtomicU64,
    trials: AtomicU64,
    evaluations: AtomicU64,
}

impl<'a> ReplicatedObjective<'a> {
    /// Wrap `objective` for one phase.
    ///
    /// # Parameters
    /// - `objective`: the user objective over the full vector.
    /// - `mask`: active parameters of the phase; solvers see only these.
    /// - `template`: full vector supplying the values of inactive entries.
    /// - `replicates`: trials averaged per evaluation (`r >= 1`).
    /// - `seed`: phase seed from which every trial generator is derived.
    /// - `dispatch`: runs the `r` trials sequentially or on the pool.
    ///
    /// # Returns
    /// A replicated objective with all counters at zero.
    ///
    /// # Errors
    /// - [`CalibError::InvalidReplicates`] if `replicates == 0`.
    /// - [`CalibError::Shape`] if `template` does not match the mask length.
    pub fn new(
        objective: &'a dyn Objective, mask: &'a ActiveMask, template: &'a Theta, replicates: usize,
        seed: u64, dispatch: Dispatch<'a>,
    ) -> CalibResult<Self> {
        if replicates == 0 {
            return Err(CalibError::InvalidReplicates { position: 0, value: 0 });
        }
        if template.len() != mask.len() {
            return Err(CalibError::Shape {
                what: "phase template",
                expected: mask.len(),
                found: template.len(),
            });
        }
        Ok(Self {
            objective,
            mask,
            template,
            replicates,
            seed,
            dispatch,
            streams: AtomicU64::new(0),
            trials: AtomicU64::new(0),
            evaluations: AtomicU64::new(0),
        })
    }

    pub fn dim(&self) -> usize {
        self.mask.n_active()
    }

    pub fn replicates(&self) -> usize {
        self.replicates
    }

    pub fn mask(&self) -> &ActiveMask {
        self.mask
    }

    pub fn dispatch(&self) -> Dispatch<'a> {
        self.dispatch
    }

    /// Total number of user-function calls so far.
    pub fn trials(&self) -> u64 {
        self.trials.load(Ordering::Relaxed)
    }

    /// Number of averaged evaluations so far.
    pub fn evaluations(&self) -> u64 {
        self.evaluations.load(Ordering::Relaxed)
    }

    /// Claim a fresh evaluation stream.
    pub fn next_stream(&self) -> u64 {
        self.streams.fetch_add(1, Ordering::Relaxed)
    }

    /// Mean of `r` trials at `reduced`, on a fresh stream.
    pub fn evaluate(&self, reduced: &Theta) -> CalibResult<f64> {
        self.evaluate_stream(reduced, self.next_stream())
    }

    /// Mean of `r` trials at `reduced`, on the given stream.
    ///
    /// # Errors
    /// - [`CalibError::Shape`] if `reduced.len() != self.dim()`.
    /// - Any error raised by the objective, or
    ///   [`CalibError::NonFiniteValue`] if a trial is not finite.
    pub fn evaluate_stream(&self, reduced: &Theta, stream: u64) -> CalibResult<f64> {
        let full = self.mask.expand(reduced, self.template)?;
        self.evaluations.fetch_add(1, Ordering::Relaxed);
        self.trials.fetch_add(self.replicates as u64, Ordering::Relaxed);
        if self.replicates == 1 {
            let mut rng = stream_rng(self.seed, stream, 0);
            return validate_value(self.objective.value(&full, &mut rng)?);
        }
        let trial_ids: Vec<u64> = (0..self.replicates as u64).collect();
        let values = self.dispatch.map(&trial_ids, |&j| {
            let mut rng = stream_rng(self.seed, stream, j);
            validate_value(self.objective.value(&full, &mut rng)?)
        })?;
        let total: f64 = values.iter().sum();
        validate_value(total / self.replicates as f64)
    }

    /// Analytic gradient projected onto the active subspace, or `None` when
    /// the objective does not provide one.
    ///
    /// # Errors
    /// - Any error from the objective's `gradient` other than
    ///   [`CalibError::GradientNotImplemented`].
    /// - Validation errors for a full gradient of the wrong length or with
    ///   non-finite entries.
    pub fn analytic_gradient(&self, reduced: &Theta) -> CalibResult<Option<Grad>> {
        let full = self.mask.expand(reduced, self.template)?;
        match self.objective.gradient(&full) {
            Ok(g) => {
                validate_grad(&g, full.len())?;
                Ok(Some(self.mask.project(&g)?))
            }
            Err(CalibError::GradientNotImplemented) => Ok(None),
            Err(e) => Err(e),
        }
    }
}
