// ─────────────────────────────────────────────────────────────────────
// SCPN Fusion Core — Drift-Wave Convection Driver
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! Time-stepping driver.
//!
//! Builds the grids, both right-hand sides and the Karniadakis integrator,
//! then runs `maxout` cycles of `itstp` steps, writing a snapshot after
//! each cycle. A polarization convergence failure ends the loop early;
//! every record written until then stays in the archive.

use std::sync::Arc;
use std::time::{Duration, Instant};

use convection_math::interp::Interpolation;
use convection_math::karniadakis::{Karniadakis, MultistepIntegrator};
use convection_math::topology::{CartesianTopology, SerialTopology, Topology};
use convection_physics::explicit::{ExplicitPart, Invariants};
use convection_physics::implicit::ImplicitPart;
use convection_types::config::ConvectionParams;
use convection_types::error::{ConvectionError, ConvectionResult};
use convection_types::state::{Fields, Grid2D, DENSITY, VORTICITY};
use ndarray::Array2;

use crate::output::SnapshotWriter;

/// Gaussian blob on a uniform background density, zero vorticity.
pub fn initial_condition(params: &ConvectionParams, grid: &Grid2D) -> Fields {
    let (x0, y0) = (params.pos_x * params.lx, params.pos_y * params.ly);
    let two_sigma2 = 2.0 * params.sigma * params.sigma;
    let density = grid.evaluate(|x, y| {
        let r2 = (x - x0).powi(2) + (y - y0).powi(2);
        params.amp * (-r2 / two_sigma2).exp() + params.nb
    });
    [density, grid.zeros()]
}

/// Usage check of an optional `(np0, np1)` process grid against the
/// process count. Needs no configuration, so it runs before any setup.
pub fn check_process_grid(process_grid: Option<(usize, usize)>, nprocs: usize) -> ConvectionResult<()> {
    match process_grid {
        Some((np0, np1)) if np0.checked_mul(np1) != Some(nprocs) => Err(ConvectionError::Usage(
            format!("process grid {np0} x {np1} does not match {nprocs} processes"),
        )),
        _ => Ok(()),
    }
}

/// Topology for an optional `(np0, np1)` process grid.
///
/// `np0` splits the x axis and `np1` the y axis; their product must equal
/// `nprocs`.
pub fn build_topology(
    process_grid: Option<(usize, usize)>,
    grid: &Grid2D,
    nprocs: usize,
) -> ConvectionResult<Arc<dyn Topology>> {
    check_process_grid(process_grid, nprocs)?;
    match process_grid {
        None => Ok(Arc::new(SerialTopology)),
        Some((np0, np1)) => {
            tracing::info!("Computing with {np0} x {np1} = {nprocs}");
            let topology = CartesianTopology::new(grid.ny, grid.nx, np1, np0)
                .map_err(|e| ConvectionError::Usage(e.to_string()))?;
            Ok(Arc::new(topology))
        }
    }
}

/// Outcome of a completed or aborted run.
#[derive(Debug, Clone, PartialEq)]
pub struct RunSummary {
    /// Steps completed after initialisation.
    pub steps: usize,
    pub time: f64,
    /// Snapshot records in the archive.
    pub records: usize,
    /// Last `(mass − mass₀)/(mass₀ − area)`.
    pub mass_ratio: f64,
    pub elapsed: Duration,
    /// Violated polarization tolerance when the run aborted.
    pub failure: Option<f64>,
}

impl RunSummary {
    pub fn failed(&self) -> bool {
        self.failure.is_some()
    }

    /// Wall-clock time per step, averaged over the planned `itstp·maxout`.
    pub fn seconds_per_step(&self, planned_steps: usize) -> f64 {
        self.elapsed.as_secs_f64() / planned_steps.max(1) as f64
    }
}

/// Format seconds as `h:mm:ss.ss`.
pub fn format_hms(seconds: f64) -> String {
    let hours = (seconds / 3600.0).floor();
    let minutes = ((seconds - hours * 3600.0) / 60.0).floor();
    let rest = seconds - hours * 3600.0 - minutes * 60.0;
    format!("{}:{:02}:{:05.2}", hours as u64, minutes as u64, rest)
}

/// Full simulation state owned by the driver.
#[derive(Debug)]
pub struct Simulation {
    params: ConvectionParams,
    grid: Grid2D,
    explicit: ExplicitPart,
    implicit: ImplicitPart,
    integrator: Karniadakis,
    interpolate: Interpolation,
    state: Fields,
    time: f64,
    steps: usize,
    initialized: bool,
    mass0: f64,
    mass_blob0: f64,
}

impl Simulation {
    pub fn new(params: ConvectionParams, topology: Arc<dyn Topology>) -> ConvectionResult<Self> {
        params.validate()?;
        let grid = params.create_grid();
        let grid_out = params.create_output_grid();

        let explicit = ExplicitPart::new(&grid, &params, Arc::clone(&topology))?;
        let implicit = ImplicitPart::new(&grid, params.nu());
        let integrator = Karniadakis::new(&grid, topology, params.eps_time);
        let interpolate = Interpolation::new(&grid_out, &grid)?;
        let state = initial_condition(&params, &grid);

        Ok(Simulation {
            params,
            grid,
            explicit,
            implicit,
            integrator,
            interpolate,
            state,
            time: 0.0,
            steps: 0,
            initialized: false,
            mass0: 0.0,
            mass_blob0: 0.0,
        })
    }

    pub fn params(&self) -> &ConvectionParams {
        &self.params
    }

    pub fn grid(&self) -> &Grid2D {
        &self.grid
    }

    pub fn state(&self) -> &Fields {
        &self.state
    }

    pub fn time(&self) -> f64 {
        self.time
    }

    pub fn steps(&self) -> usize {
        self.steps
    }

    pub fn explicit(&self) -> &ExplicitPart {
        &self.explicit
    }

    pub fn invariants(&self) -> Invariants {
        self.explicit.invariants()
    }

    /// Prime the integrator history and record the reference mass.
    pub fn initialize(&mut self) -> ConvectionResult<()> {
        self.integrator.init(
            &mut self.explicit,
            &mut self.implicit,
            self.time,
            &self.state,
            self.params.dt,
        )?;
        self.mass0 = self.explicit.mass();
        self.mass_blob0 = self.mass0 - self.grid.area();
        self.initialized = true;
        Ok(())
    }

    /// `(mass − mass₀)/(mass₀ − area)`, normalised by the area instead when
    /// the initial perturbation carries no mass.
    pub fn mass_ratio(&self) -> f64 {
        let area = self.grid.area();
        let denominator = if self.mass_blob0.abs() > 1e-12 * area {
            self.mass_blob0
        } else {
            area
        };
        (self.explicit.mass() - self.mass0) / denominator
    }

    /// Advance one integrator step.
    pub fn step(&mut self) -> ConvectionResult<()> {
        if !self.initialized {
            self.initialize()?;
        }
        self.integrator.step(
            &mut self.explicit,
            &mut self.implicit,
            &mut self.time,
            &mut self.state,
        )?;
        self.steps += 1;
        tracing::debug!(step = self.steps, time = self.time, "(m_tot-m_0)/m_0: {:e}", self.mass_ratio());
        Ok(())
    }

    /// Density, ions, potential and vorticity on the output grid.
    pub fn output_fields(&self) -> ConvectionResult<[Array2<f64>; 4]> {
        let density = self.interpolate.interpolate(&self.state[DENSITY])?;
        Ok([
            density.clone(),
            density,
            self.interpolate.interpolate(self.explicit.potential())?,
            self.interpolate.interpolate(&self.state[VORTICITY])?,
        ])
    }

    /// Append the current state to `writer`.
    pub fn snapshot(&self, writer: &mut SnapshotWriter) -> ConvectionResult<()> {
        let [electrons, ions, potential, vorticity] = self.output_fields()?;
        writer.append(self.time, [&electrons, &ions, &potential, &vorticity])
    }

    fn run_cycles(&mut self, writer: &mut SnapshotWriter) -> ConvectionResult<()> {
        if !self.initialized {
            self.initialize()?;
        }
        self.snapshot(writer)?;
        tracing::info!("Exiting the fields");

        let total = self.params.itstp * self.params.maxout;
        for _cycle in 1..=self.params.maxout {
            let cycle_start = Instant::now();
            for _ in 0..self.params.itstp {
                self.step()?;
            }
            self.snapshot(writer)?;
            let cycle_time = cycle_start.elapsed().as_secs_f64();
            tracing::info!(
                "Step {} of {} at time {:.6}, average time for one step: {:.3e}s",
                self.steps,
                total,
                self.time,
                cycle_time / self.params.itstp.max(1) as f64
            );
            tracing::info!("(m_tot-m_0)/m_0: {:e}", self.mass_ratio());
        }
        Ok(())
    }

    /// Run every cycle, writing snapshots to `writer`.
    ///
    /// A convergence failure is reported and ends the run with
    /// [`RunSummary::failure`] set; any other error propagates.
    pub fn run(&mut self, writer: &mut SnapshotWriter) -> ConvectionResult<RunSummary> {
        let start = Instant::now();
        let failure = match self.run_cycles(writer) {
            Ok(()) => None,
            Err(e) => match e.violated_tolerance() {
                Some(tolerance) => {
                    tracing::error!("CG failed to converge to {tolerance:e}");
                    tracing::error!("Does Simulation respect CFL condition?");
                    Some(tolerance)
                }
                None => return Err(e),
            },
        };
        let elapsed = start.elapsed();
        let planned = self.params.itstp * self.params.maxout;
        let summary = RunSummary {
            steps: self.steps,
            time: self.time,
            records: writer.len(),
            mass_ratio: if self.initialized { self.mass_ratio() } else { 0.0 },
            elapsed,
            failure,
        };
        tracing::info!("Computation Time \t{}", format_hms(elapsed.as_secs_f64()));
        tracing::info!("which is         \t{:.2e}s/step", summary.seconds_per_step(planned));
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(amplitude: f64) -> ConvectionParams {
        let json = format!(
            r#"{{
                "n": 1, "Nx": 16, "Ny": 16, "Nx_out": 8, "Ny_out": 8,
                "lx": 1.0, "ly": 1.0, "model": "IC",
                "nu_perp": 0.0, "adiabatic": 0.0, "curvature": 0.0,
                "eps_pol": 1e-8, "stages": 2, "dt": 0.001, "itstp": 2, "maxout": 2,
                "amplitude": {amplitude}, "sigma": 0.1, "posX": 0.4, "posY": 0.5, "nb": 1.0
            }}"#
        );
        ConvectionParams::from_json_str(&json).unwrap()
    }

    #[test]
    fn test_initial_condition_peak() {
        let p = params(0.2);
        let grid = p.create_grid();
        let [n, w] = initial_condition(&p, &grid);
        let peak = n.iter().cloned().fold(f64::MIN, f64::max);
        assert!(peak > 1.0 && peak <= 1.2 + 1e-12);
        assert!(w.iter().all(|&v| v == 0.0));
        // Far corner sits on the background
        assert!((n[[0, grid.nx - 1]] - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_build_topology_checks_process_count() {
        let grid = params(0.2).create_grid();
        assert_eq!(build_topology(None, &grid, 8).unwrap().nranks(), 1);
        assert_eq!(build_topology(Some((2, 2)), &grid, 4).unwrap().nranks(), 4);
        let err = build_topology(Some((2, 3)), &grid, 4).unwrap_err();
        assert!(matches!(err, ConvectionError::Usage(_)));
        assert!(build_topology(Some((32, 1)), &grid, 32).is_err());
    }

    #[test]
    fn test_check_process_grid() {
        assert!(check_process_grid(None, 3).is_ok());
        assert!(check_process_grid(Some((2, 2)), 4).is_ok());
        let err = check_process_grid(Some((2, 3)), 4).unwrap_err();
        assert!(matches!(err, ConvectionError::Usage(_)));
        assert!(check_process_grid(Some((usize::MAX, 2)), 4).is_err());
    }

    #[test]
    fn test_format_hms() {
        assert_eq!(format_hms(3725.5), "1:02:05.50");
        assert_eq!(format_hms(0.25), "0:00:00.25");
    }

    #[test]
    fn test_mass_ratio_starts_at_zero() {
        let mut sim = Simulation::new(params(0.2), Arc::new(SerialTopology)).unwrap();
        sim.initialize().unwrap();
        assert_eq!(sim.mass_ratio(), 0.0);
        sim.step().unwrap();
        assert_eq!(sim.steps(), 1);
        assert!((sim.time() - 0.001).abs() < 1e-15);
    }

    #[test]
    fn test_mass_ratio_guard_without_blob() {
        let mut sim = Simulation::new(params(0.0), Arc::new(SerialTopology)).unwrap();
        sim.initialize().unwrap();
        sim.step().unwrap();
        assert!(sim.mass_ratio().abs() < 1e-12);
    }

    #[test]
    fn test_output_fields_shape() {
        let mut sim = Simulation::new(params(0.2), Arc::new(SerialTopology)).unwrap();
        sim.initialize().unwrap();
        let fields = sim.output_fields().unwrap();
        for f in &fields {
            assert_eq!(f.dim(), (8, 8));
        }
        assert_eq!(fields[0], fields[1]);
    }
}
