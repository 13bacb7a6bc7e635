//! Conjugate gradient for symmetric positive (semi-)definite operators.
//!
//! Inner products are weighted with the grid volume and reduced through a
//! [`Topology`], so every rank takes the same stopping decision.
//!
//! Stopping criterion: `‖r‖_W < eps · (‖b‖_W + 1)`.

use ndarray::Array2;

use crate::topology::Topology;

/// Matrix-free linear operator `y = A x` on grid fields.
pub trait LinearOperator {
    fn apply(&mut self, x: &Array2<f64>, y: &mut Array2<f64>);
}

/// Result of a CG solve.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CgResult {
    /// Iterations performed; equals the cap when the solve saturated.
    pub iterations: usize,
    /// Final weighted residual norm.
    pub residual: f64,
    pub converged: bool,
}

/// Solve `A x = b` in place, starting from the current `x`.
#[allow(clippy::too_many_arguments)]
pub fn conjugate_gradient<A: LinearOperator + ?Sized>(
    op: &mut A,
    x: &mut Array2<f64>,
    b: &Array2<f64>,
    weights: &Array2<f64>,
    topology: &dyn Topology,
    eps: f64,
    max_iter: usize,
) -> CgResult {
    let nrm_b = topology.weighted_dot(b, weights, b).sqrt();
    let threshold = eps * (nrm_b + 1.0);

    let mut ap = Array2::zeros(x.dim());
    op.apply(x, &mut ap);
    let mut r = b - &ap;
    let mut nrm2_r = topology.weighted_dot(&r, weights, &r);
    if nrm2_r.sqrt() < threshold {
        return CgResult {
            iterations: 0,
            residual: nrm2_r.sqrt(),
            converged: true,
        };
    }

    let mut p = r.clone();
    for iteration in 1..=max_iter {
        op.apply(&p, &mut ap);
        let p_ap = topology.weighted_dot(&p, weights, &ap);
        if !(p_ap.is_finite() && p_ap > 0.0) {
            // Breakdown: operator not positive on the search direction.
            break;
        }
        let alpha = nrm2_r / p_ap;
        x.scaled_add(alpha, &p);
        r.scaled_add(-alpha, &ap);

        let nrm2_new = topology.weighted_dot(&r, weights, &r);
        if nrm2_new.sqrt() < threshold {
            return CgResult {
                iterations: iteration,
                residual: nrm2_new.sqrt(),
                converged: true,
            };
        }
        let beta = nrm2_new / nrm2_r;
        p.zip_mut_with(&r, |pv, &rv| *pv = rv + beta * *pv);
        nrm2_r = nrm2_new;
    }

    CgResult {
        iterations: max_iter,
        residual: nrm2_r.sqrt(),
        converged: false,
    }
}
