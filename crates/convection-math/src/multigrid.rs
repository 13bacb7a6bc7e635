// ─────────────────────────────────────────────────────────────────────
// SCPN Fusion Core — Multigrid CG Solver
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! Nested-iteration multigrid conjugate gradient for the polarization
//! equation `−∇²x = b`.
//!
//! The right-hand side and the initial guess are restricted down a
//! hierarchy of grids, each halving the resolution. The coarsest stage is
//! solved first; its solution is prolongated as the initial guess for the
//! next finer stage, down to the finest grid.
//!
//! - **Restriction**: 2×2 cell average (cell-centred full weighting)
//! - **Prolongation**: bilinear, 9/16–3/16–3/16–1/16 weights, with the same
//!   boundary ghosts as the operators
//! - **Stage solver**: CG from [`crate::cg`]
//!
//! # Grid Size Requirements
//!
//! Both point counts must be divisible by `2^(stages−1)` and stay at least
//! 2 on the coarsest stage.

use std::sync::Arc;

use convection_types::error::{ConvectionError, ConvectionResult};
use convection_types::state::Grid2D;
use ndarray::Array2;

use crate::cg::conjugate_gradient;
use crate::operators::{ghost_value, Elliptic};
use crate::topology::Topology;

/// Elliptic solve capability used by the explicit right-hand side.
pub trait EllipticSolve: Send {
    /// Solve `−∇²x = b`, with `x` holding the initial guess on entry.
    ///
    /// `eps` is the tolerance ladder, finest stage first; missing entries
    /// repeat the last one. Returns the iteration count of every stage,
    /// finest first.
    fn solve(&mut self, x: &mut Array2<f64>, b: &Array2<f64>, eps: &[f64]) -> Vec<usize>;

    /// Iteration cap of a single stage.
    fn max_iter(&self) -> usize;
}

/// Full-weighting restriction: fine (2N × 2M) → coarse (N × M).
fn restrict(fine: &Array2<f64>, coarse: &mut Array2<f64>) {
    let (cny, cnx) = coarse.dim();
    for iy in 0..cny {
        for ix in 0..cnx {
            let (fy, fx) = (2 * iy, 2 * ix);
            coarse[[iy, ix]] = 0.25
                * (fine[[fy, fx]] + fine[[fy + 1, fx]] + fine[[fy, fx + 1]] + fine[[fy + 1, fx + 1]]);
        }
    }
}

/// Bilinear prolongation: coarse (N × M) → fine (2N × 2M), overwriting `fine`.
fn prolongate(coarse: &Array2<f64>, coarse_grid: &Grid2D, fine: &mut Array2<f64>) {
    let (cny, cnx) = coarse.dim();
    for iy in 0..cny {
        for ix in 0..cnx {
            let centre = coarse[[iy, ix]];
            for (sub_y, step_y) in [(0usize, -1isize), (1, 1)] {
                for (sub_x, step_x) in [(0usize, -1isize), (1, 1)] {
                    let (y, x) = (iy as isize, ix as isize);
                    let along_y = ghost_value(coarse, coarse_grid, y + step_y, x);
                    let along_x = ghost_value(coarse, coarse_grid, y, x + step_x);
                    let diagonal = ghost_value(coarse, coarse_grid, y + step_y, x + step_x);
                    fine[[2 * iy + sub_y, 2 * ix + sub_x]] =
                        (9.0 * centre + 3.0 * along_y + 3.0 * along_x + diagonal) / 16.0;
                }
            }
        }
    }
}

/// Multigrid-accelerated CG over `stages` nested grids.
#[derive(Debug)]
pub struct MultigridCg {
    /// Stage operators, finest first.
    operators: Vec<Elliptic>,
    /// Volume weights per stage.
    weights: Vec<Array2<f64>>,
    topology: Arc<dyn Topology>,
    max_iter: usize,
}

impl MultigridCg {
    /// Build the grid hierarchy. The iteration cap defaults to the number
    /// of points on the finest grid.
    pub fn new(grid: &Grid2D, stages: usize, topology: Arc<dyn Topology>) -> ConvectionResult<Self> {
        if stages == 0 {
            return Err(ConvectionError::ConfigError(
                "multigrid needs at least one stage".to_string(),
            ));
        }
        let mut grids = vec![grid.clone()];
        for stage in 1..stages {
            let coarse = grids[stage - 1].coarsen().ok_or_else(|| {
                ConvectionError::GridMismatch(format!(
                    "grid {}x{} cannot be coarsened to stage {stage}",
                    grid.nx, grid.ny
                ))
            })?;
            grids.push(coarse);
        }

        Ok(MultigridCg {
            operators: grids.iter().map(Elliptic::new).collect(),
            weights: grids.iter().map(Grid2D::volume).collect(),
            topology,
            max_iter: grid.size(),
        })
    }

    /// Override the per-stage iteration cap.
    pub fn with_max_iter(mut self, max_iter: usize) -> Self {
        self.max_iter = max_iter.max(1);
        self
    }

    pub fn stages(&self) -> usize {
        self.operators.len()
    }

    /// Grid of stage `stage` (0 = finest).
    pub fn grid(&self, stage: usize) -> &Grid2D {
        self.operators[stage].grid()
    }
}

impl EllipticSolve for MultigridCg {
    fn solve(&mut self, x: &mut Array2<f64>, b: &Array2<f64>, eps: &[f64]) -> Vec<usize> {
        let n_stages = self.operators.len();

        let mut rhs = Vec::with_capacity(n_stages);
        let mut sol = Vec::with_capacity(n_stages);
        rhs.push(b.clone());
        sol.push(x.clone());
        for stage in 1..n_stages {
            let shape = self.operators[stage].grid().shape();
            let mut coarse_b = Array2::zeros(shape);
            let mut coarse_x = Array2::zeros(shape);
            restrict(&rhs[stage - 1], &mut coarse_b);
            restrict(&sol[stage - 1], &mut coarse_x);
            rhs.push(coarse_b);
            sol.push(coarse_x);
        }

        let last_eps = eps.last().copied().unwrap_or(1e-6);
        let mut counts = vec![0usize; n_stages];
        for stage in (0..n_stages).rev() {
            let tolerance = eps.get(stage).copied().unwrap_or(last_eps);
            let result = conjugate_gradient(
                &mut self.operators[stage],
                &mut sol[stage],
                &rhs[stage],
                &self.weights[stage],
                self.topology.as_ref(),
                tolerance,
                self.max_iter,
            );
            counts[stage] = result.iterations;
            tracing::trace!(
                stage,
                iterations = result.iterations,
                residual = result.residual,
                "multigrid stage solved"
            );

            if stage > 0 {
                let (coarse, fine) = sol.split_at_mut(stage);
                prolongate(&fine[0], self.operators[stage].grid(), &mut coarse[stage - 1]);
            }
        }

        x.assign(&sol[0]);
        counts
    }

    fn max_iter(&self) -> usize {
        self.max_iter
    }
}
