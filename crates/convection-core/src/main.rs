// ─────────────────────────────────────────────────────────────────────
// SCPN Fusion Core — Drift-Wave Convection CLI
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! `convection <input.json> <output.npz> [np0 np1]`

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use convection_core::driver::{build_topology, check_process_grid, RunSummary, Simulation};
use convection_core::exit_status;
use convection_core::output::SnapshotWriter;
use convection_types::config::ConvectionParams;
use convection_types::error::ConvectionResult;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

/// Hasegawa–Wakatani / interchange drift-wave convection solver
#[derive(Parser, Debug)]
#[command(name = "convection")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "2D drift-wave convection solver", long_about = None)]
struct Cli {
    /// JSON parameter file
    input: PathBuf,

    /// Snapshot archive (.npz), overwritten
    output: PathBuf,

    /// Process-grid factor along x
    #[arg(requires = "np1")]
    np0: Option<usize>,

    /// Process-grid factor along y
    np1: Option<usize>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,
}

fn init_tracing(level: &str) {
    let level = match level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .finish();
    if tracing::subscriber::set_global_default(subscriber).is_err() {
        eprintln!("tracing subscriber already installed");
    }
}

fn run(cli: &Cli) -> ConvectionResult<RunSummary> {
    let process_grid = cli.np0.zip(cli.np1);
    let nprocs = rayon::current_num_threads();
    check_process_grid(process_grid, nprocs)?;

    let input = std::fs::read_to_string(&cli.input)?;
    let params = ConvectionParams::from_json_str(&input)?;
    tracing::info!("{input}");
    tracing::info!("\n{params}");

    let topology = build_topology(process_grid, &params.create_grid(), nprocs)?;

    let grid_out = params.create_output_grid();
    let mut writer = SnapshotWriter::create(&cli.output, &input, &grid_out, topology.is_root())?;
    let mut simulation = Simulation::new(params, topology)?;
    simulation.run(&mut writer)
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(&cli.log_level);

    match run(&cli) {
        Ok(summary) if summary.failed() => ExitCode::from(3),
        Ok(_) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{e}");
            ExitCode::from(exit_status(&e))
        }
    }
}
