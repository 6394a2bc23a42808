//! Name → backend registry.
//!
//! [`SolverRegistry::with_defaults`] registers the built-in backends under
//! the names `L-BFGS`, `L-BFGS-HZ`, `Nelder-Mead`, `particle-swarm` and
//! `ES`. Further backends are added with [`SolverRegistry::register`] or,
//! for a plain closure, [`SolverRegistry::register_fn`]. Registering an
//! existing name replaces the earlier entry.
use crate::{
    calibration::control::Control,
    errors::{CalibError, CalibResult},
    params::bounds::Bounds,
    solvers::{
        argmin_backends::{LbfgsSolver, LineSearcher, NelderMeadSolver, ParticleSwarmSolver},
        evolution::EvolutionStrategy,
        problem::ReducedProblem,
        traits::{Capabilities, NativeResult, Solver},
    },
    types::Theta,
};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

pub const LBFGS: &str = "L-BFGS";
pub const LBFGS_HZ: &str = "L-BFGS-HZ";
pub const NELDER_MEAD: &str = "Nelder-Mead";
pub const PARTICLE_SWARM: &str = "particle-swarm";
pub const ES: &str = "ES";

/// One registered backend.
#[derive(Clone)]
pub struct SolverEntry {
    pub capabilities: Capabilities,
    pub solver: Arc<dyn Solver>,
}

impl fmt::Debug for SolverEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SolverEntry").field("capabilities", &self.capabilities).finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, Default)]
pub struct SolverRegistry {
    entries: BTreeMap<String, SolverEntry>,
}

impl SolverRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        let builtins: [(&str, Arc<dyn Solver>); 5] = [
            (LBFGS, Arc::new(LbfgsSolver { line_searcher: LineSearcher::MoreThuente })),
            (LBFGS_HZ, Arc::new(LbfgsSolver { line_searcher: LineSearcher::HagerZhang })),
            (NELDER_MEAD, Arc::new(NelderMeadSolver)),
            (PARTICLE_SWARM, Arc::new(ParticleSwarmSolver)),
            (ES, Arc::new(EvolutionStrategy)),
        ];
        for (name, solver) in builtins {
            let capabilities = solver.capabilities();
            registry.register(name, capabilities, solver);
        }
        registry
    }

    /// Register `solver` under `name` with the given capability descriptor.
    pub fn register(&mut self, name: &str, capabilities: Capabilities, solver: Arc<dyn Solver>) {
        if self.entries.insert(name.to_string(), SolverEntry { capabilities, solver }).is_some() {
            log::warn!("solver '{name}' was already registered; replacing it");
        }
    }

    /// Register a closure `invoke(problem, theta0, bounds, control)` as a
    /// backend; its result is translated with the default normalizer.
    pub fn register_fn<F>(&mut self, name: &str, capabilities: Capabilities, invoke: F)
    where
        F: Fn(&ReducedProblem<'_>, Theta, &Bounds, &Control) -> CalibResult<NativeResult>
            + Send
            + Sync
            + 'static,
    {
        self.register(name, capabilities, Arc::new(FnSolver { capabilities, invoke }));
    }

    pub fn get(&self, name: &str) -> Option<&SolverEntry> {
        self.entries.get(name)
    }

    /// # Errors
    /// - [`CalibError::UnknownMethod`] if `name` is not registered.
    pub fn lookup(&self, name: &str) -> CalibResult<&SolverEntry> {
        self.get(name).ok_or_else(|| CalibError::UnknownMethod { name: name.to_string() })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }
}

struct FnSolver<F> {
    capabilities: Capabilities,
    invoke: F,
}

impl<F> Solver for FnSolver<F>
where
    F: Fn(&ReducedProblem<'_>, Theta, &Bounds, &Control) -> CalibResult<NativeResult>
        + Send
        + Sync,
{
    fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    fn invoke(
        &self, problem: &ReducedProblem<'_>, theta0: Theta, bounds: &Bounds, control: &Control,
    ) -> CalibResult<NativeResult> {
        (self.invoke)(problem, theta0, bounds, control)
    }
}
