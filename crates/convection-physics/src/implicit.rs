//! Implicit part: linear hyperdiffusion `∂ₜf = −ν ∇⁴f` on both fields.

use convection_math::karniadakis::ImplicitRhs;
use convection_math::operators::negative_laplacian;
use convection_types::state::{Fields, Grid2D};
use ndarray::Array2;

/// Hyperdiffusion with one coefficient per field `[ν_n, ν_ω]`.
#[derive(Debug, Clone)]
pub struct ImplicitPart {
    nu: [f64; 2],
    grid: Grid2D,
    weights: Array2<f64>,
    temp: Array2<f64>,
}

impl ImplicitPart {
    pub fn new(grid: &Grid2D, nu: [f64; 2]) -> Self {
        ImplicitPart {
            nu,
            grid: grid.clone(),
            weights: grid.volume(),
            temp: grid.zeros(),
        }
    }

    pub fn nu(&self) -> [f64; 2] {
        self.nu
    }
}

impl ImplicitRhs for ImplicitPart {
    fn evaluate(&mut self, _t: f64, y: &Fields, yp: &mut Fields) {
        for (i, (field, out)) in y.iter().zip(yp.iter_mut()).enumerate() {
            negative_laplacian(field, &self.grid, &mut self.temp);
            negative_laplacian(&self.temp, &self.grid, out);
            out.mapv_inplace(|v| -self.nu[i] * v);
        }
    }

    fn apply_component(&mut self, component: usize, x: &Array2<f64>, y: &mut Array2<f64>) {
        let nu = self.nu[component];
        negative_laplacian(x, &self.grid, &mut self.temp);
        negative_laplacian(&self.temp, &self.grid, y);
        y.mapv_inplace(|v| -nu * v);
    }

    fn weights(&self) -> &Array2<f64> {
        &self.weights
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use convection_types::state::{zero_fields, BoundaryKind};
    use std::f64::consts::PI;

    #[test]
    fn test_hyperdiffusion_of_fourier_mode() {
        let grid = Grid2D::new(32, 32, 1.0, 1.0, BoundaryKind::Periodic, BoundaryKind::Periodic);
        let k = 2.0 * PI;
        let mode = grid.evaluate(|x, _| (k * x).cos());
        let y = [mode.clone(), mode.clone()];
        let mut yp = zero_fields(&grid);
        let mut imp = ImplicitPart::new(&grid, [0.1, 0.3]);
        imp.evaluate(0.0, &y, &mut yp);

        let lambda = (2.0 - 2.0 * (k * grid.dx).cos()) / (grid.dx * grid.dx);
        for (i, nu) in [0.1, 0.3].into_iter().enumerate() {
            let expected = &mode * (-nu * lambda * lambda);
            let err = (&yp[i] - &expected).iter().fold(0.0_f64, |m, v| m.max(v.abs()));
            assert!(err < 1e-8 * lambda * lambda, "component {i}: {err}");
        }
    }

    #[test]
    fn test_zero_viscosity_gives_zero() {
        let grid = Grid2D::new(8, 8, 1.0, 1.0, BoundaryKind::Dirichlet, BoundaryKind::Periodic);
        let y = [grid.evaluate(|x, y| x * y), grid.evaluate(|x, _| x)];
        let mut yp = [Array2::from_elem(grid.shape(), 1.0), Array2::from_elem(grid.shape(), 1.0)];
        ImplicitPart::new(&grid, [0.0, 0.0]).evaluate(0.0, &y, &mut yp);
        assert!(yp.iter().all(|f| f.iter().all(|&v| v == 0.0)));
    }

    #[test]
    fn test_component_application_matches_evaluate() {
        let grid = Grid2D::new(16, 8, 2.0, 1.0, BoundaryKind::Dirichlet, BoundaryKind::Periodic);
        let y = [
            grid.evaluate(|x, y| (x * 1.3).sin() * (2.0 * PI * y).cos()),
            grid.evaluate(|x, _| x * (2.0 - x)),
        ];
        let mut imp = ImplicitPart::new(&grid, [0.02, 0.05]);
        let mut yp = zero_fields(&grid);
        imp.evaluate(0.0, &y, &mut yp);
        for c in 0..2 {
            let mut single = grid.zeros();
            imp.apply_component(c, &y[c], &mut single);
            assert_eq!(single, yp[c]);
        }
    }

    #[test]
    fn test_operator_is_dissipative() {
        let grid = Grid2D::new(16, 16, 1.0, 1.0, BoundaryKind::Dirichlet, BoundaryKind::Periodic);
        let f = grid.evaluate(|x, y| x * (1.0 - x) + 0.1 * (2.0 * PI * y).sin());
        let mut imp = ImplicitPart::new(&grid, [0.5, 0.5]);
        let mut lf = grid.zeros();
        imp.apply_component(0, &f, &mut lf);
        let energy_rate: f64 = (&f * &lf).sum();
        assert!(energy_rate < 0.0);
    }
}
