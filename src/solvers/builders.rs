//! solvers::builders — construct configured argmin solvers from [`Control`].
//!
//! Purpose
//! -------
//! Centralize how argmin solvers are configured from the generic control
//! options so that backends only wire solvers into the executor.
//!
//! Key behaviors
//! -------------
//! - L-BFGS with More–Thuente or Hager–Zhang line search; memory from
//!   `lbfgs.m` (default [`DEFAULT_LBFGS_MEM`]), tolerances from `tol.grad`
//!   (default [`DEFAULT_TOL_GRAD`]) and `tol.cost`.
//! - Nelder–Mead with an axis-aligned initial simplex of relative size
//!   `nm.step` and standard-deviation tolerance `nm.sd_tol`.
//! - Particle swarm over the finite reduced box with `pso.particles`
//!   particles and a generator seeded from the problem seed.
//!
//! Conventions
//! -----------
//! - Invalid tolerances are reported by argmin and converted into
//!   `CalibError` through `From<argmin::core::Error>`.
use crate::{
    calibration::control::Control,
    errors::{CalibError, CalibResult},
    params::bounds::Bounds,
    types::{Cost, Grad, Theta},
};
use argmin::solver::{
    linesearch::{HagerZhangLineSearch, MoreThuenteLineSearch},
    neldermead::NelderMead,
    particleswarm::ParticleSwarm,
    quasinewton::LBFGS,
};
use rand::SeedableRng;
use rand::rngs::StdRng;

pub const DEFAULT_LBFGS_MEM: usize = 7;
pub const DEFAULT_TOL_GRAD: f64 = 1e-6;
pub const DEFAULT_NM_STEP: f64 = 0.1;
pub const DEFAULT_NM_SD_TOL: f64 = 1e-10;
pub const DEFAULT_PSO_PARTICLES: usize = 40;

pub type HagerZhangLS = HagerZhangLineSearch<Theta, Grad, Cost>;
pub type MoreThuenteLS = MoreThuenteLineSearch<Theta, Grad, Cost>;
pub type LbfgsHagerZhang = LBFGS<HagerZhangLS, Theta, Grad, Cost>;
pub type LbfgsMoreThuente = LBFGS<MoreThuenteLS, Theta, Grad, Cost>;
pub type Simplex = NelderMead<Theta, Cost>;
pub type Swarm = ParticleSwarm<Theta, Cost, StdRng>;

pub fn build_lbfgs_hager_zhang(control: &Control) -> CalibResult<LbfgsHagerZhang> {
    let mem = control.extra_count("lbfgs.m")?.unwrap_or(DEFAULT_LBFGS_MEM);
    configure_lbfgs(LBFGS::new(HagerZhangLS::new(), mem), control)
}

pub fn build_lbfgs_more_thuente(control: &Control) -> CalibResult<LbfgsMoreThuente> {
    let mem = control.extra_count("lbfgs.m")?.unwrap_or(DEFAULT_LBFGS_MEM);
    configure_lbfgs(LBFGS::new(MoreThuenteLS::new(), mem), control)
}

/// Apply `tol.grad` and `tol.cost` to an L-BFGS solver.
pub fn configure_lbfgs<L>(
    mut solver: LBFGS<L, Theta, Grad, Cost>, control: &Control,
) -> CalibResult<LBFGS<L, Theta, Grad, Cost>> {
    let tol_grad = control.extra_positive("tol.grad")?.unwrap_or(DEFAULT_TOL_GRAD);
    solver = solver.with_tolerance_grad(tol_grad)?;
    if let Some(c) = control.extra_positive("tol.cost")? {
        solver = solver.with_tolerance_cost(c)?;
    }
    Ok(solver)
}

/// Nelder–Mead over the simplex `{θ₀} ∪ {θ₀ + sᵢeᵢ}` with
/// `sᵢ = nm.step · max(|θ₀ᵢ|, 1)`.
pub fn build_nelder_mead(theta0: &Theta, control: &Control) -> CalibResult<Simplex> {
    let step = control.extra_positive("nm.step")?.unwrap_or(DEFAULT_NM_STEP);
    let sd_tol = control.extra_positive("nm.sd_tol")?.unwrap_or(DEFAULT_NM_SD_TOL);
    let mut simplex = Vec::with_capacity(theta0.len() + 1);
    simplex.push(theta0.clone());
    for i in 0..theta0.len() {
        let mut vertex = theta0.clone();
        vertex[i] += step * theta0[i].abs().max(1.0);
        simplex.push(vertex);
    }
    Ok(NelderMead::new(simplex).with_sd_tolerance(sd_tol)?)
}

/// Particle swarm over a finite box.
///
/// # Errors
/// - [`CalibError::Bounds`] if any bound is infinite.
pub fn build_particle_swarm(bounds: &Bounds, control: &Control, seed: u64) -> CalibResult<Swarm> {
    if let Some(index) = (0..bounds.len())
        .find(|&i| !(bounds.lower()[i].is_finite() && bounds.upper()[i].is_finite()))
    {
        return Err(CalibError::Bounds {
            index,
            name: format!("x{index}"),
            reason: "particle swarm requires finite bounds",
        });
    }
    let particles = control.extra_count("pso.particles")?.unwrap_or(DEFAULT_PSO_PARTICLES);
    Ok(ParticleSwarm::new((bounds.lower().clone(), bounds.upper().clone()), particles)
        .with_rng_generator(StdRng::seed_from_u64(seed)))
}
