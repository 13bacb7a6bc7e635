// ─────────────────────────────────────────────────────────────────────
// SCPN Fusion Core — Discrete Operators
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! Finite-difference operators on a cell-centred [`Grid2D`].
//!
//! Boundaries are handled with one ghost cell per side:
//! - periodic: wrap-around
//! - Dirichlet: ghost = −mirror (field vanishes on the wall)
//! - Neumann: ghost = +mirror (zero normal derivative)
//!
//! With these ghosts the 5-point negative Laplacian is symmetric and
//! positive (semi-)definite, which the CG solver relies on.

use convection_types::state::{BoundaryKind, Grid2D};
use ndarray::Array2;

use crate::cg::LinearOperator;

/// Map a possibly out-of-range index to a stored index plus ghost sign.
#[inline]
fn resolve(i: isize, n: usize, bc: BoundaryKind) -> (usize, f64) {
    let n_i = n as isize;
    if (0..n_i).contains(&i) {
        return (i as usize, 1.0);
    }
    let mirror = if i < 0 { -1 - i } else { 2 * n_i - 1 - i };
    match bc {
        BoundaryKind::Periodic => (i.rem_euclid(n_i) as usize, 1.0),
        BoundaryKind::Dirichlet => (mirror.clamp(0, n_i - 1) as usize, -1.0),
        BoundaryKind::Neumann => (mirror.clamp(0, n_i - 1) as usize, 1.0),
    }
}

/// Value of `f` at `(iy, ix)`, ghost cells included.
#[inline]
pub fn ghost_value(f: &Array2<f64>, grid: &Grid2D, iy: isize, ix: isize) -> f64 {
    let (jy, sy) = resolve(iy, grid.ny, grid.bc_y);
    let (jx, sx) = resolve(ix, grid.nx, grid.bc_x);
    sy * sx * f[[jy, jx]]
}

/// Centred first derivative along x.
pub fn dx(f: &Array2<f64>, grid: &Grid2D, out: &mut Array2<f64>) {
    let inv = 1.0 / (2.0 * grid.dx);
    for iy in 0..grid.ny {
        for ix in 0..grid.nx {
            let (y, x) = (iy as isize, ix as isize);
            out[[iy, ix]] = (ghost_value(f, grid, y, x + 1) - ghost_value(f, grid, y, x - 1)) * inv;
        }
    }
}

/// Centred first derivative along y.
pub fn dy(f: &Array2<f64>, grid: &Grid2D, out: &mut Array2<f64>) {
    let inv = 1.0 / (2.0 * grid.dy);
    for iy in 0..grid.ny {
        for ix in 0..grid.nx {
            let (y, x) = (iy as isize, ix as isize);
            out[[iy, ix]] = (ghost_value(f, grid, y + 1, x) - ghost_value(f, grid, y - 1, x)) * inv;
        }
    }
}

/// Normed negative Laplacian: `out = −∇²f`.
pub fn negative_laplacian(f: &Array2<f64>, grid: &Grid2D, out: &mut Array2<f64>) {
    let cx = 1.0 / (grid.dx * grid.dx);
    let cy = 1.0 / (grid.dy * grid.dy);
    for iy in 0..grid.ny {
        for ix in 0..grid.nx {
            let (y, x) = (iy as isize, ix as isize);
            let centre = f[[iy, ix]];
            let d2x = ghost_value(f, grid, y, x + 1) - 2.0 * centre + ghost_value(f, grid, y, x - 1);
            let d2y = ghost_value(f, grid, y + 1, x) - 2.0 * centre + ghost_value(f, grid, y - 1, x);
            out[[iy, ix]] = -(cx * d2x + cy * d2y);
        }
    }
}

/// Squared gradient `out = |∇f|²` from centred differences.
pub fn variation(f: &Array2<f64>, grid: &Grid2D, out: &mut Array2<f64>) {
    let inv_x = 1.0 / (2.0 * grid.dx);
    let inv_y = 1.0 / (2.0 * grid.dy);
    for iy in 0..grid.ny {
        for ix in 0..grid.nx {
            let (y, x) = (iy as isize, ix as isize);
            let gx = (ghost_value(f, grid, y, x + 1) - ghost_value(f, grid, y, x - 1)) * inv_x;
            let gy = (ghost_value(f, grid, y + 1, x) - ghost_value(f, grid, y - 1, x)) * inv_y;
            out[[iy, ix]] = gx * gx + gy * gy;
        }
    }
}

/// Upwind advection: `out = alpha·(v_x ∂_x f + v_y ∂_y f) + beta·out`.
///
/// One-sided differences are taken against the local velocity: backward
/// where the velocity is positive, forward otherwise.
pub fn upwind(
    alpha: f64,
    vx: &Array2<f64>,
    vy: &Array2<f64>,
    f: &Array2<f64>,
    beta: f64,
    grid: &Grid2D,
    out: &mut Array2<f64>,
) {
    let inv_x = 1.0 / grid.dx;
    let inv_y = 1.0 / grid.dy;
    for iy in 0..grid.ny {
        for ix in 0..grid.nx {
            let (y, x) = (iy as isize, ix as isize);
            let centre = f[[iy, ix]];
            let u = vx[[iy, ix]];
            let v = vy[[iy, ix]];

            let dfx = if u > 0.0 {
                (centre - ghost_value(f, grid, y, x - 1)) * inv_x
            } else {
                (ghost_value(f, grid, y, x + 1) - centre) * inv_x
            };
            let dfy = if v > 0.0 {
                (centre - ghost_value(f, grid, y - 1, x)) * inv_y
            } else {
                (ghost_value(f, grid, y + 1, x) - centre) * inv_y
            };

            let transport = alpha * (u * dfx + v * dfy);
            out[[iy, ix]] = if beta == 0.0 {
                transport
            } else {
                transport + beta * out[[iy, ix]]
            };
        }
    }
}

/// Zonal average: mean along y, broadcast back over every row.
pub fn zonal_average(f: &Array2<f64>, out: &mut Array2<f64>) {
    let (ny, nx) = f.dim();
    for ix in 0..nx {
        let mean = f.column(ix).sum() / ny as f64;
        out.column_mut(ix).fill(mean);
    }
}

/// Negative Laplacian as a [`LinearOperator`] on one grid.
#[derive(Debug, Clone)]
pub struct Elliptic {
    grid: Grid2D,
}

impl Elliptic {
    pub fn new(grid: &Grid2D) -> Self {
        Elliptic { grid: grid.clone() }
    }

    pub fn grid(&self) -> &Grid2D {
        &self.grid
    }
}

impl LinearOperator for Elliptic {
    fn apply(&mut self, x: &Array2<f64>, y: &mut Array2<f64>) {
        negative_laplacian(x, &self.grid, y);
    }
}
