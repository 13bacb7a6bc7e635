// ─────────────────────────────────────────────────────────────────────
// SCPN Fusion Core — Semi-Implicit Multistep Integrator
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! Third-order Karniadakis semi-implicit multistep integrator.
//!
//! For `du/dt = E(t, u) + L u` with nonlinear explicit part `E` and stiff
//! linear implicit part `L`, one step reads
//!
//! ```text
//! (I − γ₀·Δt·L) u⁽ⁿ⁺¹⁾ = Σ aₖ u⁽ⁿ⁻ᵏ⁾ + Δt Σ bₖ E(u⁽ⁿ⁻ᵏ⁾)
//! ```
//!
//! with `a = (18, −9, 2)/11`, `b = (18, −18, 6)/11`, `γ₀ = 6/11`. The
//! implicit system is solved component by component with CG.
//!
//! Startup: two backward explicit Euler steps fill the history at
//! `t₀ − Δt` and `t₀ − 2Δt`.

use std::sync::Arc;

use convection_types::error::{ConvectionError, ConvectionResult};
use convection_types::state::{zero_fields, Fields, Grid2D};
use ndarray::{Array2, Zip};

use crate::cg::{conjugate_gradient, LinearOperator};
use crate::topology::Topology;

const A: [f64; 3] = [18.0 / 11.0, -9.0 / 11.0, 2.0 / 11.0];
const B: [f64; 3] = [18.0 / 11.0, -18.0 / 11.0, 6.0 / 11.0];
const GAMMA0: f64 = 6.0 / 11.0;

/// Nonlinear right-hand side, evaluated explicitly.
pub trait ExplicitRhs {
    /// Write `E(t, y)` into `yp`. A failed evaluation must leave the
    /// evaluator's internal history untouched.
    fn evaluate(&mut self, t: f64, y: &Fields, yp: &mut Fields) -> ConvectionResult<()>;
}

/// Linear right-hand side, treated implicitly.
pub trait ImplicitRhs {
    /// Write `L y` into `yp` for both components.
    fn evaluate(&mut self, t: f64, y: &Fields, yp: &mut Fields);

    /// Apply the linear operator of a single component: `y = L_c x`.
    fn apply_component(&mut self, component: usize, x: &Array2<f64>, y: &mut Array2<f64>);

    /// Quadrature weights of the inner product in which `L` is symmetric.
    fn weights(&self) -> &Array2<f64>;
}

/// Multistep time integrator driven by an explicit and an implicit part.
pub trait MultistepIntegrator {
    /// Fill the startup history from the initial state `y0` at `t0`.
    fn init<E, I>(
        &mut self,
        explicit: &mut E,
        implicit: &mut I,
        t0: f64,
        y0: &Fields,
        dt: f64,
    ) -> ConvectionResult<()>
    where
        E: ExplicitRhs + ?Sized,
        I: ImplicitRhs + ?Sized;

    /// Advance `(t, y)` by one step. On error neither `t`, `y` nor the
    /// integrator history change.
    fn step<E, I>(
        &mut self,
        explicit: &mut E,
        implicit: &mut I,
        t: &mut f64,
        y: &mut Fields,
    ) -> ConvectionResult<()>
    where
        E: ExplicitRhs + ?Sized,
        I: ImplicitRhs + ?Sized;
}

/// `x ↦ x − shift·L_c x` for one component of the implicit part.
struct ShiftedImplicit<'a, I: ImplicitRhs + ?Sized> {
    implicit: &'a mut I,
    component: usize,
    shift: f64,
}

impl<I: ImplicitRhs + ?Sized> LinearOperator for ShiftedImplicit<'_, I> {
    fn apply(&mut self, x: &Array2<f64>, y: &mut Array2<f64>) {
        self.implicit.apply_component(self.component, x, y);
        let shift = self.shift;
        Zip::from(y).and(x).for_each(|yv, &xv| *yv = xv - shift * *yv);
    }
}

/// Third-order Karniadakis integrator over a [`Fields`] pair.
#[derive(Debug)]
pub struct Karniadakis {
    /// `u⁽ⁿ⁾, u⁽ⁿ⁻¹⁾, u⁽ⁿ⁻²⁾`
    u: [Fields; 3],
    /// Explicit parts matching `u`.
    f: [Fields; 3],
    next_u: Fields,
    next_f: Fields,
    rhs: Fields,
    weights: Array2<f64>,
    topology: Arc<dyn Topology>,
    t: f64,
    dt: f64,
    eps: f64,
    max_iter: usize,
    initialized: bool,
}

impl Karniadakis {
    /// Allocate history buffers for fields on `grid`. `eps` is the CG
    /// tolerance of the implicit solve.
    pub fn new(grid: &Grid2D, topology: Arc<dyn Topology>, eps: f64) -> Self {
        let zeros = zero_fields(grid);
        Karniadakis {
            u: [zeros.clone(), zeros.clone(), zeros.clone()],
            f: [zeros.clone(), zeros.clone(), zeros.clone()],
            next_u: zeros.clone(),
            next_f: zeros.clone(),
            rhs: zeros,
            weights: grid.volume(),
            topology,
            t: 0.0,
            dt: 0.0,
            eps,
            max_iter: grid.size(),
            initialized: false,
        }
    }

    pub fn time(&self) -> f64 {
        self.t
    }

    pub fn dt(&self) -> f64 {
        self.dt
    }

    /// Most recent accepted state.
    pub fn last(&self) -> &Fields {
        &self.u[0]
    }
}

impl MultistepIntegrator for Karniadakis {
    fn init<E, I>(
        &mut self,
        explicit: &mut E,
        implicit: &mut I,
        t0: f64,
        y0: &Fields,
        dt: f64,
    ) -> ConvectionResult<()>
    where
        E: ExplicitRhs + ?Sized,
        I: ImplicitRhs + ?Sized,
    {
        if !(dt.is_finite() && dt > 0.0) {
            return Err(ConvectionError::ConfigError(format!(
                "time step must be finite and > 0, got {dt}"
            )));
        }
        self.t = t0;
        self.dt = dt;
        self.weights.assign(implicit.weights());

        self.u[0].clone_from(y0);
        explicit.evaluate(t0, &self.u[0], &mut self.f[0])?;

        for k in 1..3 {
            let t_prev = t0 - (k - 1) as f64 * dt;
            implicit.evaluate(t_prev, &self.u[k - 1], &mut self.rhs);
            let (newer, older) = self.u.split_at_mut(k);
            for c in 0..2 {
                Zip::from(&mut older[0][c])
                    .and(&newer[k - 1][c])
                    .and(&self.f[k - 1][c])
                    .and(&self.rhs[c])
                    .for_each(|u, &u_prev, &e, &l| *u = u_prev - dt * (e + l));
            }
            let (_, f_older) = self.f.split_at_mut(k);
            explicit.evaluate(t0 - k as f64 * dt, &self.u[k], &mut f_older[0])?;
        }

        // Leave the explicit part describing the initial state.
        explicit.evaluate(t0, &self.u[0], &mut self.f[0])?;
        self.initialized = true;
        tracing::debug!(t0, dt, "Karniadakis history primed");
        Ok(())
    }

    fn step<E, I>(
        &mut self,
        explicit: &mut E,
        implicit: &mut I,
        t: &mut f64,
        y: &mut Fields,
    ) -> ConvectionResult<()>
    where
        E: ExplicitRhs + ?Sized,
        I: ImplicitRhs + ?Sized,
    {
        if !self.initialized {
            return Err(ConvectionError::ConfigError(
                "Karniadakis::step called before init".to_string(),
            ));
        }
        let dt = self.dt;

        for c in 0..2 {
            Zip::from(&mut self.rhs[c])
                .and(&self.u[0][c])
                .and(&self.u[1][c])
                .and(&self.u[2][c])
                .for_each(|r, &u0, &u1, &u2| *r = A[0] * u0 + A[1] * u1 + A[2] * u2);
            Zip::from(&mut self.rhs[c])
                .and(&self.f[0][c])
                .and(&self.f[1][c])
                .and(&self.f[2][c])
                .for_each(|r, &f0, &f1, &f2| *r += dt * (B[0] * f0 + B[1] * f1 + B[2] * f2));
        }

        for c in 0..2 {
            // Initial guess: linear extrapolation of the last two states
            Zip::from(&mut self.next_u[c])
                .and(&self.u[0][c])
                .and(&self.u[1][c])
                .for_each(|x, &u0, &u1| *x = 2.0 * u0 - u1);
            let mut op = ShiftedImplicit {
                implicit: &mut *implicit,
                component: c,
                shift: GAMMA0 * dt,
            };
            let result = conjugate_gradient(
                &mut op,
                &mut self.next_u[c],
                &self.rhs[c],
                &self.weights,
                self.topology.as_ref(),
                self.eps,
                self.max_iter,
            );
            if !result.converged {
                tracing::warn!(
                    component = c,
                    residual = result.residual,
                    eps = self.eps,
                    "implicit solve did not converge"
                );
            }
        }

        let t_new = self.t + dt;
        explicit.evaluate(t_new, &self.next_u, &mut self.next_f)?;

        self.u.rotate_right(1);
        self.f.rotate_right(1);
        std::mem::swap(&mut self.u[0], &mut self.next_u);
        std::mem::swap(&mut self.f[0], &mut self.next_f);
        self.t = t_new;

        for c in 0..2 {
            y[c].assign(&self.u[0][c]);
        }
        *t = t_new;
        Ok(())
    }
}
