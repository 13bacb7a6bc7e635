//! Bilinear interpolation between cell-centred grids.
//!
//! Used to sample compute-grid fields onto the (possibly coarser) output
//! grid. Points near a wall read the boundary ghosts of the source grid.

use convection_types::error::{ConvectionError, ConvectionResult};
use convection_types::state::Grid2D;
use ndarray::Array2;

use crate::operators::ghost_value;

/// Bilinear interpolation of `field` at the physical point `(x, y)`.
pub fn interp2d(field: &Array2<f64>, grid: &Grid2D, x: f64, y: f64) -> f64 {
    // Fractional index relative to the first cell centre
    let fx = x / grid.dx - 0.5;
    let fy = y / grid.dy - 0.5;

    let ix0 = fx.floor();
    let iy0 = fy.floor();
    let tx = fx - ix0;
    let ty = fy - iy0;
    let (ix0, iy0) = (ix0 as isize, iy0 as isize);

    let v00 = ghost_value(field, grid, iy0, ix0);
    let v01 = ghost_value(field, grid, iy0, ix0 + 1);
    let v10 = ghost_value(field, grid, iy0 + 1, ix0);
    let v11 = ghost_value(field, grid, iy0 + 1, ix0 + 1);

    (1.0 - ty) * ((1.0 - tx) * v00 + tx * v01) + ty * ((1.0 - tx) * v10 + tx * v11)
}

/// Precomputed interpolation from one grid onto another over the same domain.
#[derive(Debug, Clone)]
pub struct Interpolation {
    source: Grid2D,
    target: Grid2D,
}

impl Interpolation {
    pub fn new(target: &Grid2D, source: &Grid2D) -> ConvectionResult<Self> {
        let same_domain = (target.lx - source.lx).abs() <= 1e-12 * source.lx.abs().max(1.0)
            && (target.ly - source.ly).abs() <= 1e-12 * source.ly.abs().max(1.0);
        if !same_domain {
            return Err(ConvectionError::GridMismatch(format!(
                "interpolation domains differ: [{}, {}] vs [{}, {}]",
                target.lx, target.ly, source.lx, source.ly
            )));
        }
        Ok(Interpolation {
            source: source.clone(),
            target: target.clone(),
        })
    }

    pub fn target(&self) -> &Grid2D {
        &self.target
    }

    /// Sample `field` (source shape) at every target cell centre.
    pub fn apply(&self, field: &Array2<f64>, out: &mut Array2<f64>) -> ConvectionResult<()> {
        self.source.check_shape(field, "interpolation input")?;
        self.target.check_shape(out, "interpolation output")?;
        for iy in 0..self.target.ny {
            let y = self.target.y[iy];
            for ix in 0..self.target.nx {
                out[[iy, ix]] = interp2d(field, &self.source, self.target.x[ix], y);
            }
        }
        Ok(())
    }

    /// Allocating variant of [`Interpolation::apply`].
    pub fn interpolate(&self, field: &Array2<f64>) -> ConvectionResult<Array2<f64>> {
        let mut out = self.target.zeros();
        self.apply(field, &mut out)?;
        Ok(out)
    }
}
