//! Right-hand sides of the drift-wave convection model.
//!
//! [`explicit::ExplicitPart`] carries the nonlinear physics, the
//! polarization solve and the invariants; [`implicit::ImplicitPart`] the
//! hyperdiffusion treated implicitly by the time integrator.

pub mod explicit;
pub mod implicit;
