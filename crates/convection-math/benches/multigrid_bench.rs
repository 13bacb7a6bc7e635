use std::f64::consts::PI;
use std::hint::black_box;
use std::sync::Arc;

use convection_math::multigrid::{EllipticSolve, MultigridCg};
use convection_math::operators::negative_laplacian;
use convection_math::topology::{CartesianTopology, SerialTopology};
use convection_types::state::{BoundaryKind, Grid2D};
use criterion::{criterion_group, criterion_main, Criterion};
use ndarray::Array2;

fn source(grid: &Grid2D) -> Array2<f64> {
    let phi = grid.evaluate(|x, y| (PI * x / grid.lx).sin() * (2.0 * PI * y / grid.ly).cos());
    let mut b = grid.zeros();
    negative_laplacian(&phi, grid, &mut b);
    b
}

fn bench_polarization_64(c: &mut Criterion) {
    let grid = Grid2D::new(64, 64, 64.0, 64.0, BoundaryKind::Dirichlet, BoundaryKind::Periodic);
    let b = source(&grid);
    let mut solver = MultigridCg::new(&grid, 3, Arc::new(SerialTopology)).unwrap();

    c.bench_function("multigrid_cg_64x64", |bench| {
        bench.iter(|| {
            let mut x = grid.zeros();
            let counts = solver.solve(&mut x, &b, &[1e-6, 1e-5, 1e-5]);
            black_box(counts[0]);
        })
    });
}

fn bench_polarization_128(c: &mut Criterion) {
    let grid = Grid2D::new(128, 128, 64.0, 64.0, BoundaryKind::Dirichlet, BoundaryKind::Periodic);
    let b = source(&grid);

    let mut group = c.benchmark_group("multigrid_cg_128x128");
    group.sample_size(10);

    let mut serial = MultigridCg::new(&grid, 3, Arc::new(SerialTopology)).unwrap();
    group.bench_function("serial", |bench| {
        bench.iter(|| {
            let mut x = grid.zeros();
            black_box(serial.solve(&mut x, &b, &[1e-6, 1e-5, 1e-5]));
        })
    });

    let tiles = Arc::new(CartesianTopology::new(128, 128, 2, 2).unwrap());
    let mut tiled = MultigridCg::new(&grid, 3, tiles).unwrap();
    group.bench_function("tiled_2x2", |bench| {
        bench.iter(|| {
            let mut x = grid.zeros();
            black_box(tiled.solve(&mut x, &b, &[1e-6, 1e-5, 1e-5]));
        })
    });

    group.finish();
}

criterion_group!(benches, bench_polarization_64, bench_polarization_128);
criterion_main!(benches);
