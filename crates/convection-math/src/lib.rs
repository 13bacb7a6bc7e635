//! Numerical building blocks for the drift-wave convection solver.

pub mod cg;
pub mod extrapolation;
pub mod interp;
pub mod karniadakis;
pub mod multigrid;
pub mod operators;
pub mod topology;
