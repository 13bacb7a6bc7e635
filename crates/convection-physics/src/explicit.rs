// ─────────────────────────────────────────────────────────────────────
// SCPN Fusion Core — Drift-Wave Convection: Explicit Part
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! Nonlinear right-hand side of the Hasegawa–Wakatani / interchange model.
//!
//! Every evaluation inverts the polarization equation `−∇²φ_raw = ω`
//! (the solver returns the negative potential), derives the E×B velocity
//! `v = (−∂_y φ, ∂_x φ)` and assembles
//!
//! ```text
//! ṅ = −v·∇n + α(φ̃ − ñ)·[HW] + g·v_x
//! ω̇ = −v·∇ω + α(φ̃ − ñ)·[HW] − κ ∂_y n
//! ```
//!
//! where `f̃ = f − ⟨f⟩_y` in the modified model and `f̃ = f` otherwise.
//! Mass, entropy, kinetic and potential energy plus their diffusive decay
//! are recomputed on every successful evaluation.

use std::sync::Arc;

use convection_math::extrapolation::Extrapolation;
use convection_math::karniadakis::ExplicitRhs;
use convection_math::multigrid::{EllipticSolve, MultigridCg};
use convection_math::operators::{dx, dy, negative_laplacian, upwind, variation, zonal_average};
use convection_math::topology::Topology;
use convection_types::config::{ConvectionParams, Model};
use convection_types::error::{ConvectionError, ConvectionResult};
use convection_types::state::{Fields, Grid2D, DENSITY, VORTICITY};
use ndarray::{Array2, Zip};

/// Integral quantities tracked for monitoring.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Invariants {
    /// `∫ n dV`
    pub mass: f64,
    /// `½ ∫ n² dV`
    pub entropy: f64,
    /// `½ ∫ |∇φ|² dV`
    pub kinetic: f64,
    /// `−κ ∫ x n dV`
    pub potential: f64,
}

impl Invariants {
    /// `[mass, entropy, kinetic, potential]`
    pub fn to_array(self) -> [f64; 4] {
        [self.mass, self.entropy, self.kinetic, self.potential]
    }
}

/// Explicit right-hand side with its polarization solver and diagnostics.
pub struct ExplicitPart {
    model: Model,
    modified: bool,
    eps_pol: f64,
    eps_ladder: Vec<f64>,
    kappa: f64,
    alpha: f64,
    nu: [f64; 2],
    g: f64,
    grid: Grid2D,
    x: Array2<f64>,
    vol: Array2<f64>,

    guess: Array2<f64>,
    phi: Array2<f64>,
    phi_raw: Array2<f64>,
    temp: Array2<f64>,
    phi_perturbation: Array2<f64>,
    n_perturbation: Array2<f64>,
    vx: Array2<f64>,
    vy: Array2<f64>,
    lapy: Fields,

    solver: Box<dyn EllipticSolve>,
    old_phi: Extrapolation,
    topology: Arc<dyn Topology>,

    invariant: Invariants,
    invariant_diss: Invariants,
    last_iterations: Vec<usize>,
}

impl std::fmt::Debug for ExplicitPart {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExplicitPart")
            .field("model", &self.model)
            .field("modified", &self.modified)
            .field("eps_pol", &self.eps_pol)
            .field("grid", &(self.grid.nx, self.grid.ny))
            .field("invariants", &self.invariant)
            .finish_non_exhaustive()
    }
}

impl ExplicitPart {
    /// Build with the multigrid CG polarization solver.
    pub fn new(
        grid: &Grid2D,
        params: &ConvectionParams,
        topology: Arc<dyn Topology>,
    ) -> ConvectionResult<Self> {
        let mut multigrid = MultigridCg::new(grid, params.stages, Arc::clone(&topology))?;
        if let Some(max_iter) = params.max_iter {
            multigrid = multigrid.with_max_iter(max_iter);
        }
        Self::with_solver(grid, params, topology, Box::new(multigrid))
    }

    /// Build around any elliptic solver.
    pub fn with_solver(
        grid: &Grid2D,
        params: &ConvectionParams,
        topology: Arc<dyn Topology>,
        solver: Box<dyn EllipticSolve>,
    ) -> ConvectionResult<Self> {
        if params.n * params.nx != grid.nx || params.n * params.ny != grid.ny {
            return Err(ConvectionError::GridMismatch(format!(
                "parameters describe {}x{} points, grid has {}x{}",
                params.n * params.nx,
                params.n * params.ny,
                grid.nx,
                grid.ny
            )));
        }
        let zeros = grid.zeros();
        Ok(ExplicitPart {
            model: params.model,
            modified: params.modified,
            eps_pol: params.eps_pol,
            eps_ladder: params.eps_ladder(),
            kappa: params.kappa,
            alpha: params.alpha,
            nu: params.nu(),
            g: params.effective_g(),
            grid: grid.clone(),
            x: grid.xx.clone(),
            vol: grid.volume(),
            guess: zeros.clone(),
            phi: zeros.clone(),
            phi_raw: zeros.clone(),
            temp: zeros.clone(),
            phi_perturbation: zeros.clone(),
            n_perturbation: zeros.clone(),
            vx: zeros.clone(),
            vy: zeros.clone(),
            lapy: [zeros.clone(), zeros],
            solver,
            old_phi: Extrapolation::new(),
            topology,
            invariant: Invariants::default(),
            invariant_diss: Invariants::default(),
            last_iterations: Vec::new(),
        })
    }

    /// Electric potential of the last accepted evaluation.
    pub fn potential(&self) -> &Array2<f64> {
        &self.phi
    }

    /// Raw (negative) polarization solution of the last accepted evaluation.
    pub fn raw_potential(&self) -> &Array2<f64> {
        &self.phi_raw
    }

    /// `v_x = −∂_y φ`
    pub fn radial_velocity(&self) -> &Array2<f64> {
        &self.vx
    }

    /// `v_y = ∂_x φ`
    pub fn poloidal_velocity(&self) -> &Array2<f64> {
        &self.vy
    }

    pub fn invariants(&self) -> Invariants {
        self.invariant
    }

    pub fn invariants_diffusion(&self) -> Invariants {
        self.invariant_diss
    }

    pub fn mass(&self) -> f64 {
        self.invariant.mass
    }

    /// Per-stage iteration counts of the last polarization solve, finest first.
    pub fn last_iterations(&self) -> &[usize] {
        &self.last_iterations
    }

    /// History seeding the next polarization solve.
    pub fn extrapolation(&self) -> &Extrapolation {
        &self.old_phi
    }

    pub fn grid(&self) -> &Grid2D {
        &self.grid
    }

    /// Solve for the raw potential; no state besides the guess buffer
    /// changes unless the finest stage converged.
    fn invert_polarization(&mut self, t: f64, omega: &Array2<f64>) -> ConvectionResult<()> {
        self.old_phi.extrapolate(t, &mut self.guess);
        let number = self.solver.solve(&mut self.guess, omega, &self.eps_ladder);
        tracing::trace!(t, iterations = ?number, "polarization solved");
        let saturated = number
            .first()
            .is_some_and(|&finest| finest >= self.solver.max_iter());
        self.last_iterations = number;
        if saturated {
            return Err(ConvectionError::ConvergenceFailure {
                tolerance: self.eps_pol,
            });
        }

        self.old_phi.update(t, &self.guess);
        self.phi_raw.assign(&self.guess);
        Zip::from(&mut self.phi)
            .and(&self.guess)
            .for_each(|p, &raw| *p = -raw);
        Ok(())
    }

    fn update_invariants(&mut self, y: &Fields) {
        let topo = self.topology.as_ref();
        let nu_n = self.nu[DENSITY];
        for (field, lap) in y.iter().zip(self.lapy.iter_mut()) {
            negative_laplacian(field, &self.grid, lap);
            lap.mapv_inplace(|v| -v);
        }
        let n = &y[DENSITY];
        let lap_n = &self.lapy[DENSITY];
        let lap_w = &self.lapy[VORTICITY];

        variation(&self.phi, &self.grid, &mut self.temp);

        // Only ν_n enters the decay rates, including the vorticity term.
        self.invariant = Invariants {
            mass: topo.dot(&self.vol, n),
            entropy: 0.5 * topo.weighted_dot(n, &self.vol, n),
            kinetic: 0.5 * topo.dot(&self.vol, &self.temp),
            potential: -self.kappa * topo.weighted_dot(&self.x, &self.vol, n),
        };
        self.invariant_diss = Invariants {
            mass: nu_n * topo.dot(&self.vol, lap_n),
            entropy: nu_n * topo.weighted_dot(n, &self.vol, lap_n),
            kinetic: -nu_n * topo.weighted_dot(&self.phi, &self.vol, lap_w),
            potential: -nu_n * topo.weighted_dot(&self.x, &self.vol, lap_n),
        };
    }

    fn update_perturbations(&mut self, n: &Array2<f64>) {
        if self.modified {
            zonal_average(&self.phi, &mut self.phi_perturbation);
            zonal_average(n, &mut self.n_perturbation);
            Zip::from(&mut self.phi_perturbation)
                .and(&self.phi)
                .for_each(|p, &f| *p = f - *p);
            Zip::from(&mut self.n_perturbation)
                .and(n)
                .for_each(|p, &f| *p = f - *p);
        } else {
            self.phi_perturbation.assign(&self.phi);
            self.n_perturbation.assign(n);
        }
    }
}

impl ExplicitRhs for ExplicitPart {
    fn evaluate(&mut self, t: f64, y: &Fields, yp: &mut Fields) -> ConvectionResult<()> {
        self.grid.check_shape(&y[DENSITY], "density")?;
        self.grid.check_shape(&y[VORTICITY], "vorticity")?;
        self.grid.check_shape(&yp[DENSITY], "density rate")?;
        self.grid.check_shape(&yp[VORTICITY], "vorticity rate")?;

        self.invert_polarization(t, &y[VORTICITY])?;

        // v_x = −∂_y φ, v_y = ∂_x φ
        dy(&self.phi, &self.grid, &mut self.vx);
        self.vx.mapv_inplace(|v| -v);
        dx(&self.phi, &self.grid, &mut self.vy);

        self.update_invariants(y);

        for (field, rate) in y.iter().zip(yp.iter_mut()) {
            upwind(-1.0, &self.vx, &self.vy, field, 0.0, &self.grid, rate);
        }
        if self.model.is_coupled() {
            self.update_perturbations(&y[DENSITY]);
            let alpha = self.alpha;
            for rate in yp.iter_mut() {
                Zip::from(rate)
                    .and(&self.phi_perturbation)
                    .and(&self.n_perturbation)
                    .for_each(|r, &p, &n| *r += alpha * (p - n));
            }
        }

        // Background gradient drive
        yp[DENSITY].scaled_add(self.g, &self.vx);
        dy(&y[DENSITY], &self.grid, &mut self.temp);
        yp[VORTICITY].scaled_add(-self.kappa, &self.temp);
        Ok(())
    }
}
