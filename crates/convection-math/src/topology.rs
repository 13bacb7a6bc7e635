// ─────────────────────────────────────────────────────────────────────
// SCPN Fusion Core — Process Topology
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! Process topology: tile decomposition and global reductions.
//!
//! Fields are stored as one virtual global array. A [`Topology`] decides
//! how reductions over that array are split into per-rank partial sums
//! and combined. [`SerialTopology`] is a single rank; [`CartesianTopology`]
//! splits the `(ny × nx)` grid into a `(py × px)` process grid, evaluates
//! the partial sums on the Rayon pool and combines them in rank order, so
//! every rank sees the same scalar and repeated reductions are bit-identical.

use std::fmt::Debug;
use std::ops::Range;

use convection_types::error::{ConvectionError, ConvectionResult};
use ndarray::{s, Array2, Zip};
use rayon::prelude::*;

/// Partial reduction over one owned block `(rows, cols)`.
pub type BlockReduction<'a> = dyn Fn(Range<usize>, Range<usize>) -> f64 + Sync + 'a;

/// Reduction capability shared by operators, solvers and invariants.
pub trait Topology: Debug + Send + Sync {
    /// Number of ranks taking part in every reduction.
    fn nranks(&self) -> usize;

    /// Whether this process performs file I/O.
    fn is_root(&self) -> bool {
        true
    }

    /// Sum `partial` over the owned blocks of an array of shape `(ny, nx)`.
    fn allreduce(&self, shape: (usize, usize), partial: &BlockReduction<'_>) -> f64;

    /// Global sum of all entries.
    fn sum(&self, a: &Array2<f64>) -> f64 {
        self.allreduce(a.dim(), &|rows, cols| a.slice(s![rows, cols]).sum())
    }

    /// Global dot product `Σ a·b`.
    fn dot(&self, a: &Array2<f64>, b: &Array2<f64>) -> f64 {
        self.allreduce(a.dim(), &|rows, cols| {
            Zip::from(a.slice(s![rows.clone(), cols.clone()]))
                .and(b.slice(s![rows, cols]))
                .fold(0.0, |acc, &x, &y| acc + x * y)
        })
    }

    /// Global weighted dot product `Σ a·w·b`.
    fn weighted_dot(&self, a: &Array2<f64>, w: &Array2<f64>, b: &Array2<f64>) -> f64 {
        self.allreduce(a.dim(), &|rows, cols| {
            Zip::from(a.slice(s![rows.clone(), cols.clone()]))
                .and(w.slice(s![rows.clone(), cols.clone()]))
                .and(b.slice(s![rows, cols]))
                .fold(0.0, |acc, &x, &wv, &y| acc + x * wv * y)
        })
    }
}

/// Single rank owning the whole grid.
#[derive(Debug, Clone, Copy, Default)]
pub struct SerialTopology;

impl Topology for SerialTopology {
    fn nranks(&self) -> usize {
        1
    }

    fn allreduce(&self, shape: (usize, usize), partial: &BlockReduction<'_>) -> f64 {
        partial(0..shape.0, 0..shape.1)
    }
}

/// 2D Cartesian tile descriptor, one per rank in a (py × px) topology.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CartesianTile {
    /// Linear rank index (0 .. py*px - 1).
    pub rank: usize,
    /// Process grid index along y (row).
    pub py_idx: usize,
    /// Process grid index along x (column).
    pub px_idx: usize,
    pub py: usize,
    pub px: usize,
    pub global_ny: usize,
    pub global_nx: usize,
    /// Owned y range [y_start, y_end) in global indexing.
    pub y_start: usize,
    pub y_end: usize,
    /// Owned x range [x_start, x_end) in global indexing.
    pub x_start: usize,
    pub x_end: usize,
}

impl CartesianTile {
    pub fn local_ny(&self) -> usize {
        self.y_end - self.y_start
    }
    pub fn local_nx(&self) -> usize {
        self.x_end - self.x_start
    }
    pub fn rows(&self) -> Range<usize> {
        self.y_start..self.y_end
    }
    pub fn cols(&self) -> Range<usize> {
        self.x_start..self.x_end
    }
}

/// Decompose a (global_ny × global_nx) grid into a (py × px) process grid.
///
/// Returns tiles in row-major order: tile[iy * px + ix].
pub fn decompose_2d(
    global_ny: usize,
    global_nx: usize,
    py: usize,
    px: usize,
) -> ConvectionResult<Vec<CartesianTile>> {
    if py == 0 || px == 0 {
        return Err(ConvectionError::GridMismatch(
            "Process grid dimensions py, px must be >= 1".to_string(),
        ));
    }
    if py > global_ny || px > global_nx {
        return Err(ConvectionError::GridMismatch(format!(
            "Cannot split ({global_ny}×{global_nx}) across ({py}×{px}) processes"
        )));
    }

    let y_splits = balanced_split(global_ny, py);
    let x_splits = balanced_split(global_nx, px);

    let mut tiles = Vec::with_capacity(py * px);
    let mut y_cursor = 0usize;
    for (iy, &ny_local) in y_splits.iter().enumerate() {
        let y_start = y_cursor;
        let y_end = y_start + ny_local;
        y_cursor = y_end;

        let mut x_cursor = 0usize;
        for (ix, &nx_local) in x_splits.iter().enumerate() {
            let x_start = x_cursor;
            let x_end = x_start + nx_local;
            x_cursor = x_end;

            tiles.push(CartesianTile {
                rank: iy * px + ix,
                py_idx: iy,
                px_idx: ix,
                py,
                px,
                global_ny,
                global_nx,
                y_start,
                y_end,
                x_start,
                x_end,
            });
        }
    }
    Ok(tiles)
}

/// Helper: split `n` items across `k` buckets as evenly as possible.
fn balanced_split(n: usize, k: usize) -> Vec<usize> {
    let base = n / k;
    let rem = n % k;
    (0..k).map(|i| base + usize::from(i < rem)).collect()
}

/// Block ranges for a `(ny, nx)` array split over at most `(py, px)` blocks.
fn block_ranges(shape: (usize, usize), py: usize, px: usize) -> Vec<(Range<usize>, Range<usize>)> {
    let (ny, nx) = shape;
    let rows = balanced_split(ny, py.clamp(1, ny.max(1)));
    let cols = balanced_split(nx, px.clamp(1, nx.max(1)));
    let mut out = Vec::with_capacity(rows.len() * cols.len());
    let mut y0 = 0usize;
    for ly in rows {
        let mut x0 = 0usize;
        for &lx in &cols {
            out.push((y0..y0 + ly, x0..x0 + lx));
            x0 += lx;
        }
        y0 += ly;
    }
    out
}

/// (py × px) Cartesian process grid over the compute grid.
///
/// Coarser arrays (multigrid stages, output grids) are split with the same
/// process-grid factors, clamped to the array size.
#[derive(Debug, Clone)]
pub struct CartesianTopology {
    py: usize,
    px: usize,
    tiles: Vec<CartesianTile>,
}

impl CartesianTopology {
    pub fn new(global_ny: usize, global_nx: usize, py: usize, px: usize) -> ConvectionResult<Self> {
        let tiles = decompose_2d(global_ny, global_nx, py, px)?;
        Ok(Self { py, px, tiles })
    }

    /// Tiles of the compute grid, in rank order.
    pub fn tiles(&self) -> &[CartesianTile] {
        &self.tiles
    }

    pub fn process_grid(&self) -> (usize, usize) {
        (self.py, self.px)
    }
}

impl Topology for CartesianTopology {
    fn nranks(&self) -> usize {
        self.py * self.px
    }

    fn allreduce(&self, shape: (usize, usize), partial: &BlockReduction<'_>) -> f64 {
        let partials: Vec<f64> = match self.tiles.first() {
            Some(t) if (t.global_ny, t.global_nx) == shape => self
                .tiles
                .par_iter()
                .map(|tile| partial(tile.rows(), tile.cols()))
                .collect(),
            _ => block_ranges(shape, self.py, self.px)
                .into_par_iter()
                .map(|(rows, cols)| partial(rows, cols))
                .collect(),
        };
        // Combine in rank order for a decomposition-stable result.
        partials.iter().sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_field(ny: usize, nx: usize) -> Array2<f64> {
        Array2::from_shape_fn((ny, nx), |(i, j)| ((i * 7 + j * 3) as f64 * 0.1).sin() + 1.5)
    }

    #[test]
    fn test_decompose_2d_covers_full_domain() {
        let tiles = decompose_2d(33, 17, 3, 2).unwrap();
        assert_eq!(tiles.len(), 6);
        let covered: usize = tiles.iter().map(|t| t.local_ny() * t.local_nx()).sum();
        assert_eq!(covered, 33 * 17);
        assert_eq!(tiles[0].y_start, 0);
        assert_eq!(tiles[5].y_end, 33);
        assert_eq!(tiles[5].x_end, 17);
        assert_eq!(tiles[3].rank, 3);
        assert_eq!((tiles[3].py_idx, tiles[3].px_idx), (1, 1));
    }

    #[test]
    fn test_decompose_2d_rejects_invalid_inputs() {
        assert!(decompose_2d(8, 8, 0, 1).is_err());
        assert!(decompose_2d(8, 8, 9, 1).is_err());
        assert!(decompose_2d(8, 4, 1, 5).is_err());
    }

    #[test]
    fn test_serial_and_cartesian_sums_agree() {
        let a = sample_field(32, 24);
        let w = Array2::from_elem((32, 24), 0.25);
        let serial = SerialTopology;
        let tiled = CartesianTopology::new(32, 24, 2, 3).unwrap();
        assert_eq!(tiled.nranks(), 6);
        let s1 = serial.weighted_dot(&a, &w, &a);
        let s2 = tiled.weighted_dot(&a, &w, &a);
        assert!((s1 - s2).abs() < 1e-12 * s1.abs(), "{s1} vs {s2}");
        assert!((serial.sum(&a) - tiled.sum(&a)).abs() < 1e-12 * serial.sum(&a).abs());
    }

    #[test]
    fn test_cartesian_reduction_is_reproducible() {
        let a = sample_field(64, 64);
        let tiled = CartesianTopology::new(64, 64, 4, 2).unwrap();
        let first = tiled.dot(&a, &a);
        for _ in 0..10 {
            assert_eq!(tiled.dot(&a, &a).to_bits(), first.to_bits());
        }
    }

    #[test]
    fn test_cartesian_handles_coarser_arrays() {
        let tiled = CartesianTopology::new(64, 64, 4, 4).unwrap();
        let coarse = sample_field(2, 8);
        let expected: f64 = coarse.sum();
        assert!((tiled.sum(&coarse) - expected).abs() < 1e-12);
    }

    #[test]
    fn test_block_ranges_cover_shape() {
        let blocks = block_ranges((5, 7), 3, 2);
        assert_eq!(blocks.len(), 6);
        let covered: usize = blocks.iter().map(|(r, c)| r.len() * c.len()).sum();
        assert_eq!(covered, 35);
    }
}
