// ─────────────────────────────────────────────────────────────────────
// SCPN Fusion Core — State
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};

use crate::error::{ConvectionError, ConvectionResult};

/// Boundary condition kind along one axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BoundaryKind {
    /// Periodic wrap-around.
    #[serde(rename = "PER")]
    Periodic,
    /// Homogeneous Dirichlet: the field vanishes on the wall.
    #[serde(rename = "DIR")]
    Dirichlet,
    /// Homogeneous Neumann: zero normal derivative on the wall.
    #[serde(rename = "NEU")]
    Neumann,
}

/// Field pair advanced in time: `[density, vorticity]`.
pub type Fields = [Array2<f64>; 2];

/// Index of the density field inside [`Fields`].
pub const DENSITY: usize = 0;
/// Index of the vorticity field inside [`Fields`].
pub const VORTICITY: usize = 1;

/// Cell-centred 2D grid on `[0, lx] × [0, ly]`.
///
/// Arrays are laid out `[ny, nx]`: rows run along y, columns along x,
/// so `xx[[iy, ix]] == x[ix]` and `yy[[iy, ix]] == y[iy]`.
#[derive(Debug, Clone, PartialEq)]
pub struct Grid2D {
    pub nx: usize,
    pub ny: usize,
    pub lx: f64,
    pub ly: f64,
    pub bc_x: BoundaryKind,
    pub bc_y: BoundaryKind,
    pub x: Array1<f64>,  // cell centres along x [nx]
    pub y: Array1<f64>,  // cell centres along y [ny]
    pub dx: f64,
    pub dy: f64,
    pub xx: Array2<f64>, // meshgrid x [ny, nx]
    pub yy: Array2<f64>, // meshgrid y [ny, nx]
}

impl Grid2D {
    pub fn new(
        nx: usize,
        ny: usize,
        lx: f64,
        ly: f64,
        bc_x: BoundaryKind,
        bc_y: BoundaryKind,
    ) -> Self {
        let dx = lx / nx as f64;
        let dy = ly / ny as f64;
        let x = Array1::from_shape_fn(nx, |i| (i as f64 + 0.5) * dx);
        let y = Array1::from_shape_fn(ny, |j| (j as f64 + 0.5) * dy);

        let xx = Array2::from_shape_fn((ny, nx), |(_, ix)| x[ix]);
        let yy = Array2::from_shape_fn((ny, nx), |(iy, _)| y[iy]);

        Grid2D {
            nx,
            ny,
            lx,
            ly,
            bc_x,
            bc_y,
            x,
            y,
            dx,
            dy,
            xx,
            yy,
        }
    }

    /// Total number of grid points.
    pub fn size(&self) -> usize {
        self.nx * self.ny
    }

    /// Array shape `(ny, nx)`.
    pub fn shape(&self) -> (usize, usize) {
        (self.ny, self.nx)
    }

    pub fn area(&self) -> f64 {
        self.lx * self.ly
    }

    /// Volume (quadrature) weights: every cell carries `dx·dy`.
    pub fn volume(&self) -> Array2<f64> {
        Array2::from_elem(self.shape(), self.dx * self.dy)
    }

    pub fn zeros(&self) -> Array2<f64> {
        Array2::zeros(self.shape())
    }

    /// Sample a function of `(x, y)` at every cell centre.
    pub fn evaluate<F: Fn(f64, f64) -> f64>(&self, f: F) -> Array2<f64> {
        Array2::from_shape_fn(self.shape(), |(iy, ix)| f(self.x[ix], self.y[iy]))
    }

    /// Grid with half the points per axis on the same domain.
    ///
    /// Returns `None` when either point count is odd or too small to halve.
    pub fn coarsen(&self) -> Option<Grid2D> {
        if self.nx % 2 != 0 || self.ny % 2 != 0 || self.nx < 4 || self.ny < 4 {
            return None;
        }
        Some(Grid2D::new(
            self.nx / 2,
            self.ny / 2,
            self.lx,
            self.ly,
            self.bc_x,
            self.bc_y,
        ))
    }

    /// Verify that `field` has this grid's shape.
    pub fn check_shape(&self, field: &Array2<f64>, name: &str) -> ConvectionResult<()> {
        if field.dim() != self.shape() {
            return Err(ConvectionError::GridMismatch(format!(
                "{name}: expected shape {:?}, got {:?}",
                self.shape(),
                field.dim()
            )));
        }
        Ok(())
    }
}

/// Zero-initialised field pair on `grid`.
pub fn zero_fields(grid: &Grid2D) -> Fields {
    [grid.zeros(), grid.zeros()]
}
