// ─────────────────────────────────────────────────────────────────────
// SCPN Fusion Core — Config
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
use std::fmt;
use std::path::Path;

use serde::{Deserialize, Deserializer, Serialize};

use crate::error::{ConvectionError, ConvectionResult};
use crate::state::{BoundaryKind, Grid2D};

/// Convection model selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Model {
    /// Hasegawa-Wakatani: density and vorticity coupled through `α(φ̃ − ñ)`.
    #[serde(rename = "HW")]
    HasegawaWakatani,
    /// Interchange: pure advection plus background drive, no coupling.
    #[serde(rename = "IC")]
    Interchange,
}

impl Model {
    pub fn is_coupled(self) -> bool {
        matches!(self, Model::HasegawaWakatani)
    }
}

impl fmt::Display for Model {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Model::HasegawaWakatani => write!(f, "HW"),
            Model::Interchange => write!(f, "IC"),
        }
    }
}

/// Run parameters, loaded once from a JSON input file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConvectionParams {
    /// Points per cell along each axis.
    pub n: usize,
    #[serde(rename = "Nx")]
    pub nx: usize,
    #[serde(rename = "Ny")]
    pub ny: usize,
    #[serde(default = "default_one")]
    pub n_out: usize,
    #[serde(rename = "Nx_out")]
    pub nx_out: usize,
    #[serde(rename = "Ny_out")]
    pub ny_out: usize,
    pub lx: f64,
    pub ly: f64,
    #[serde(default = "default_bc_x")]
    pub bc_x: BoundaryKind,
    #[serde(default = "default_bc_y")]
    pub bc_y: BoundaryKind,

    pub model: Model,
    /// Zonal averaging of the coupling terms. Accepts `true/false` or `0/1`.
    #[serde(default, deserialize_with = "deserialize_flag")]
    pub modified: bool,

    /// Hyperdiffusion coefficient, applied to both fields unless overridden.
    pub nu_perp: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nu_vorticity: Option<f64>,
    #[serde(rename = "adiabatic", alias = "alpha")]
    pub alpha: f64,
    #[serde(rename = "curvature", alias = "kappa")]
    pub kappa: f64,
    /// Drive coefficient before the `−κ` adjustment.
    #[serde(default)]
    pub g: f64,

    pub eps_pol: f64,
    #[serde(default = "default_stages")]
    pub stages: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_iter: Option<usize>,
    #[serde(default = "default_eps_time")]
    pub eps_time: f64,

    pub dt: f64,
    /// Sub-steps between snapshots.
    pub itstp: usize,
    /// Number of snapshot cycles.
    pub maxout: usize,

    #[serde(rename = "amplitude", alias = "amp")]
    pub amp: f64,
    pub sigma: f64,
    #[serde(rename = "posX")]
    pub pos_x: f64,
    #[serde(rename = "posY")]
    pub pos_y: f64,
    /// Uniform background density.
    #[serde(default)]
    pub nb: f64,
}

fn default_one() -> usize {
    1
}
fn default_bc_x() -> BoundaryKind {
    BoundaryKind::Dirichlet
}
fn default_bc_y() -> BoundaryKind {
    BoundaryKind::Periodic
}
fn default_stages() -> usize {
    3
}
fn default_eps_time() -> f64 {
    1e-10
}

fn deserialize_flag<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Flag {
        Bool(bool),
        Int(i64),
    }
    Ok(match Flag::deserialize(deserializer)? {
        Flag::Bool(b) => b,
        Flag::Int(i) => i != 0,
    })
}

impl ConvectionParams {
    /// Load and validate from a JSON file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> ConvectionResult<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_json_str(&contents)
    }

    /// Parse and validate a JSON document.
    pub fn from_json_str(contents: &str) -> ConvectionResult<Self> {
        let params: Self = serde_json::from_str(contents)?;
        params.validate()?;
        Ok(params)
    }

    pub fn validate(&self) -> ConvectionResult<()> {
        let positive_counts = [
            ("n", self.n),
            ("Nx", self.nx),
            ("Ny", self.ny),
            ("n_out", self.n_out),
            ("Nx_out", self.nx_out),
            ("Ny_out", self.ny_out),
            ("stages", self.stages),
        ];
        for (name, value) in positive_counts {
            if value == 0 {
                return Err(ConvectionError::ConfigError(format!("{name} must be >= 1")));
            }
        }
        let positive_reals = [
            ("lx", self.lx),
            ("ly", self.ly),
            ("dt", self.dt),
            ("eps_pol", self.eps_pol),
            ("eps_time", self.eps_time),
            ("sigma", self.sigma),
        ];
        for (name, value) in positive_reals {
            if !(value.is_finite() && value > 0.0) {
                return Err(ConvectionError::ConfigError(format!(
                    "{name} must be finite and > 0, got {value}"
                )));
            }
        }
        let [nu_n, nu_w] = self.nu();
        if !(nu_n >= 0.0 && nu_w >= 0.0) {
            return Err(ConvectionError::ConfigError(format!(
                "diffusion coefficients must be >= 0, got ({nu_n}, {nu_w})"
            )));
        }
        if self.max_iter == Some(0) {
            return Err(ConvectionError::ConfigError(
                "max_iter must be >= 1".to_string(),
            ));
        }

        let factor = u32::try_from(self.stages - 1)
            .ok()
            .and_then(|shift| 1usize.checked_shl(shift))
            .ok_or_else(|| {
                ConvectionError::ConfigError(format!(
                    "stages = {} exceeds the coarsening depth of any grid",
                    self.stages
                ))
            })?;
        let (px, py) = (self.n * self.nx, self.n * self.ny);
        if px % factor != 0 || py % factor != 0 || px / factor < 2 || py / factor < 2 {
            return Err(ConvectionError::ConfigError(format!(
                "grid {px}x{py} cannot be coarsened over {} multigrid stages",
                self.stages
            )));
        }
        Ok(())
    }

    /// Diffusion coefficients `[ν_n, ν_ω]`.
    pub fn nu(&self) -> [f64; 2] {
        [self.nu_perp, self.nu_vorticity.unwrap_or(self.nu_perp)]
    }

    /// Drive coefficient after the `−κ` adjustment.
    pub fn effective_g(&self) -> f64 {
        self.g - self.kappa
    }

    /// Polarization tolerance ladder, finest stage first.
    pub fn eps_ladder(&self) -> Vec<f64> {
        (0..self.stages)
            .map(|stage| if stage == 0 { self.eps_pol } else { 10.0 * self.eps_pol })
            .collect()
    }

    /// Compute grid.
    pub fn create_grid(&self) -> Grid2D {
        Grid2D::new(
            self.n * self.nx,
            self.n * self.ny,
            self.lx,
            self.ly,
            self.bc_x,
            self.bc_y,
        )
    }

    /// Output grid (same domain, possibly coarser).
    pub fn create_output_grid(&self) -> Grid2D {
        Grid2D::new(
            self.n_out * self.nx_out,
            self.n_out * self.ny_out,
            self.lx,
            self.ly,
            self.bc_x,
            self.bc_y,
        )
    }
}

impl fmt::Display for ConvectionParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [nu_n, nu_w] = self.nu();
        writeln!(f, "Model:        {} (modified: {})", self.model, self.modified)?;
        writeln!(f, "Couplings:    alpha = {}, kappa = {}, g = {}", self.alpha, self.kappa, self.effective_g())?;
        writeln!(f, "Diffusion:    nu_n = {nu_n}, nu_omega = {nu_w}")?;
        writeln!(
            f,
            "Grid:         {} x {} points on [0, {}] x [0, {}], bc = ({:?}, {:?})",
            self.n * self.nx,
            self.n * self.ny,
            self.lx,
            self.ly,
            self.bc_x,
            self.bc_y
        )?;
        writeln!(f, "Output grid:  {} x {}", self.n_out * self.nx_out, self.n_out * self.ny_out)?;
        writeln!(f, "Polarization: eps = {}, stages = {}", self.eps_pol, self.stages)?;
        writeln!(f, "Stepping:     dt = {}, itstp = {}, maxout = {}", self.dt, self.itstp, self.maxout)?;
        write!(
            f,
            "Blob:         amp = {}, sigma = {}, pos = ({}, {}), nb = {}",
            self.amp, self.sigma, self.pos_x, self.pos_y, self.nb
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    /// `CARGO_MANIFEST_DIR` is crates/convection-types/; inputs live two
    /// levels up at the workspace root.
    fn input_path(name: &str) -> PathBuf {
        PathBuf::from(env!("CARGO_MANIFEST_DIR"))
            .join("..")
            .join("..")
            .join("inputs")
            .join(name)
    }

    fn minimal_json() -> String {
        r#"{
            "n": 1, "Nx": 32, "Ny": 32, "Nx_out": 16, "Ny_out": 16,
            "lx": 1.0, "ly": 1.0,
            "model": "HW", "modified": 1,
            "nu_perp": 1e-3, "adiabatic": 0.05, "curvature": 0.015,
            "eps_pol": 1e-6, "dt": 0.01, "itstp": 5, "maxout": 2,
            "amplitude": 0.1, "sigma": 0.05, "posX": 0.5, "posY": 0.5, "nb": 1.0
        }"#
        .to_string()
    }

    #[test]
    fn test_minimal_config_defaults() {
        let p = ConvectionParams::from_json_str(&minimal_json()).unwrap();
        assert_eq!(p.model, Model::HasegawaWakatani);
        assert!(p.modified);
        assert_eq!(p.stages, 3);
        assert_eq!(p.n_out, 1);
        assert_eq!(p.bc_x, BoundaryKind::Dirichlet);
        assert_eq!(p.bc_y, BoundaryKind::Periodic);
        assert_eq!(p.nu(), [1e-3, 1e-3]);
        assert!((p.effective_g() + 0.015).abs() < 1e-15);
        assert!(p.max_iter.is_none());
    }

    #[test]
    fn test_modified_flag_accepts_bool_and_int() {
        let as_bool = minimal_json().replace(r#""modified": 1"#, r#""modified": false"#);
        let p = ConvectionParams::from_json_str(&as_bool).unwrap();
        assert!(!p.modified);
        let as_zero = minimal_json().replace(r#""modified": 1"#, r#""modified": 0"#);
        assert!(!ConvectionParams::from_json_str(&as_zero).unwrap().modified);
    }

    #[test]
    fn test_eps_ladder_finest_strictest() {
        let p = ConvectionParams::from_json_str(&minimal_json()).unwrap();
        assert_eq!(p.eps_ladder(), vec![1e-6, 1e-5, 1e-5]);
    }

    #[test]
    fn test_rejects_uncoarsenable_grid() {
        let json = minimal_json().replace(r#""Nx": 32"#, r#""Nx": 30"#);
        let err = ConvectionParams::from_json_str(&json).unwrap_err();
        assert!(matches!(err, ConvectionError::ConfigError(_)), "{err}");
    }

    #[test]
    fn test_rejects_non_positive_dt() {
        let json = minimal_json().replace(r#""dt": 0.01"#, r#""dt": 0.0"#);
        assert!(matches!(
            ConvectionParams::from_json_str(&json),
            Err(ConvectionError::ConfigError(_))
        ));
    }

    #[test]
    fn test_malformed_document_is_json_error() {
        let err = ConvectionParams::from_json_str("{ \"n\": 1, ").unwrap_err();
        assert!(matches!(err, ConvectionError::Json(_)));
    }

    #[test]
    fn test_unknown_model_rejected() {
        let json = minimal_json().replace(r#""model": "HW""#, r#""model": "MHD""#);
        assert!(ConvectionParams::from_json_str(&json).is_err());
    }

    #[test]
    fn test_load_shipped_inputs() {
        for name in ["input_hw_modified.json", "input_hw_ordinary.json", "input_ic.json"] {
            let path = input_path(name);
            let result = ConvectionParams::from_file(&path);
            assert!(result.is_ok(), "Failed to load {}: {:?}", path.display(), result.err());
        }
    }

    #[test]
    fn test_excessive_stage_count_rejected() {
        for stages in [65, 70, 4096] {
            let json = minimal_json().replace("\"eps_pol\"", &format!("\"stages\": {stages}, \"eps_pol\""));
            let err = ConvectionParams::from_json_str(&json).unwrap_err();
            assert!(matches!(err, ConvectionError::ConfigError(_)), "stages = {stages}");
        }
    }

    #[test]
    fn test_grids_from_params() {
        let p = ConvectionParams::from_json_str(&minimal_json()).unwrap();
        assert_eq!(p.create_grid().shape(), (32, 32));
        assert_eq!(p.create_output_grid().shape(), (16, 16));
    }

    #[test]
    fn test_roundtrip_serialization() {
        let p = ConvectionParams::from_json_str(&minimal_json()).unwrap();
        let json = serde_json::to_string_pretty(&p).unwrap();
        let p2 = ConvectionParams::from_json_str(&json).unwrap();
        assert_eq!(p2.nx, p.nx);
        assert_eq!(p2.model, p.model);
        assert_eq!(p2.modified, p.modified);
        assert_eq!(p2.alpha, p.alpha);
    }
}
