//! objective::pool — caller-owned worker pool and evaluation dispatch.
//!
//! Purpose
//! -------
//! Hold the single shared concurrency resource of a calibration run. The
//! caller builds the pool; the engine only borrows it and decides per call
//! whether to fan work out to it or to evaluate sequentially.
//!
//! Invariants & assumptions
//! ------------------------
//! - The engine never creates or tears down a pool; [`WorkerPool::new`] is
//!   a convenience for callers.
//! - Work items are borrowed read-only and results are returned by value
//!   in input order. A single failed item fails the whole batch, and the
//!   batch is joined before the caller regains control.
use crate::errors::{CalibError, CalibResult};
use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};

/// WorkerPool — wrapper around a caller-built `rayon::ThreadPool`.
#[derive(Debug)]
pub struct WorkerPool {
    pool: ThreadPool,
}

impl WorkerPool {
    /// Build a pool with `ncores` worker threads.
    ///
    /// # Errors
    /// - [`CalibError::InvalidControl`] if `ncores == 0` or the pool cannot be
    ///   created.
    pub fn new(ncores: usize) -> CalibResult<Self> {
        if ncores == 0 {
            return Err(CalibError::InvalidControl {
                key: "ncores".to_string(),
                reason: "worker count must be at least one".to_string(),
            });
        }
        let pool = ThreadPoolBuilder::new().num_threads(ncores).build().map_err(|e| {
            CalibError::InvalidControl { key: "ncores".to_string(), reason: e.to_string() }
        })?;
        Ok(Self { pool })
    }

    pub fn from_pool(pool: ThreadPool) -> Self {
        Self { pool }
    }

    pub fn threads(&self) -> usize {
        self.pool.current_num_threads()
    }
}

/// Sequential or pooled evaluation, decided once per calibration run.
#[derive(Debug, Clone, Copy)]
pub enum Dispatch<'a> {
    Sequential,
    Parallel { pool: &'a WorkerPool, workers: usize },
}

impl<'a> Dispatch<'a> {
    /// Parallel iff `parallel` is requested, a pool is supplied and the
    /// effective worker count `min(ncores, pool threads)` exceeds one.
    pub fn resolve(pool: Option<&'a WorkerPool>, parallel: bool, ncores: Option<usize>) -> Self {
        match (parallel, pool) {
            (true, Some(pool)) => {
                let workers = ncores.unwrap_or(usize::MAX).min(pool.threads());
                if workers > 1 {
                    log::debug!("parallel evaluation on {workers} workers");
                    Dispatch::Parallel { pool, workers }
                } else {
                    log::debug!("parallel requested but only one worker is available");
                    Dispatch::Sequential
                }
            }
            (true, None) => {
                log::warn!("parallel evaluation requested without a worker pool; running sequentially");
                Dispatch::Sequential
            }
            (false, _) => Dispatch::Sequential,
        }
    }

    pub fn is_parallel(&self) -> bool {
        matches!(self, Dispatch::Parallel { .. })
    }

    /// Evaluate `f` on every item, preserving input order.
    ///
    /// With a pool, items are split into at most `workers` chunks and the call
    /// blocks until every chunk completes or the first error is observed.
    pub fn map<T, R, F>(&self, items: &[T], f: F) -> CalibResult<Vec<R>>
    where
        T: Sync,
        R: Send,
        F: Fn(&T) -> CalibResult<R> + Sync + Send,
    {
        match self {
            Dispatch::Sequential => items.iter().map(f).collect(),
            Dispatch::Parallel { pool, workers } => {
                let min_len = items.len().div_ceil(*workers).max(1);
                pool.pool.install(|| items.par_iter().with_min_len(min_len).map(f).collect())
            }
        }
    }
}
