//! `recency`: cohort simulation and assay estimation from a config file.
//!
//! JSON results go to stdout, logs to stderr. The process exits with an
//! [`ExitCode`] so scripts can tell configuration problems from numerical
//! failures.

use std::path::{Path, PathBuf};

use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use tracing::{error, info};

use ra_config::{resolve_config, AssaySettings, ConfigKind, SimulationSettings};
use ra_core::logging::{init_logging, LogConfig, LogFormat, LogLevel};
use ra_core::{
    write_json, AssayConfig, AssayEstimator, ExitCode, SimulationConfig, Simulator, SubjectRecord, SummaryRow,
};

/// Recency assay simulation and estimation
#[derive(Parser)]
#[command(name = "recency")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[command(flatten)]
    global: GlobalOpts,
}

#[derive(Args, Debug)]
struct GlobalOpts {
    /// Increase verbosity (-v, -vv)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Only log errors
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Log format on stderr (human or jsonl)
    #[arg(long, global = true, env = "RA_LOG_FORMAT")]
    log_format: Option<LogFormat>,
}

#[derive(Subcommand)]
enum Commands {
    /// Simulate cohorts and print summaries or unit records
    Simulate(SimulateArgs),

    /// Estimate μ, Ω and β across replicates
    Estimate(EstimateArgs),
}

#[derive(Args, Debug)]
struct SimulateArgs {
    /// Simulation config (TOML or JSON)
    #[arg(long, short = 'c')]
    config: Option<PathBuf>,

    /// Print one row per subject instead of summaries
    #[arg(long)]
    unit_records: bool,

    /// Override the config seed
    #[arg(long)]
    seed: Option<u64>,

    /// Override the number of replicates
    #[arg(long)]
    n_sims: Option<usize>,
}

#[derive(Args, Debug)]
struct EstimateArgs {
    /// Estimation config (TOML or JSON)
    #[arg(long, short = 'c')]
    config: Option<PathBuf>,

    /// Override the config seed
    #[arg(long)]
    seed: Option<u64>,

    /// Override the number of replicates
    #[arg(long)]
    replicates: Option<usize>,
}

#[derive(Serialize)]
struct SummaryOutput {
    enrollment_times: Vec<f64>,
    n_replicates: usize,
    rows: Vec<SummaryRow>,
}

#[derive(Serialize)]
struct UnitRecordOutput {
    n_replicates: usize,
    records: Vec<SubjectRecord>,
}

fn main() {
    let cli = Cli::parse();

    let level = if cli.global.quiet {
        Some(LogLevel::Error)
    } else {
        match cli.global.verbose {
            0 => None,
            1 => Some(LogLevel::Debug),
            _ => Some(LogLevel::Trace),
        }
    };
    let log_config = LogConfig::from_env(level, cli.global.log_format);
    init_logging(&log_config);

    let exit_code = match cli.command {
        Commands::Simulate(args) => run_simulate(&args),
        Commands::Estimate(args) => run_estimate(&args),
    };
    std::process::exit(exit_code.as_i32());
}

/// Config path from the CLI, environment or XDG directory.
///
/// An explicit `--config` is used as given; a missing file is a read error.
fn locate(kind: ConfigKind, cli_path: Option<&Path>) -> Result<PathBuf, ExitCode> {
    if let Some(path) = cli_path {
        return Ok(path.to_path_buf());
    }
    let resolved = resolve_config(kind, None);
    match resolved.path {
        Some(path) => {
            info!(path = %path.display(), source = %resolved.source, "Using config");
            Ok(path)
        }
        None => {
            eprintln!(
                "recency: no config found; pass --config or set {}",
                kind.env_var()
            );
            Err(ExitCode::ArgsError)
        }
    }
}

fn fail(err: ra_core::Error) -> ExitCode {
    error!(code = err.code(), "{}", err);
    eprintln!("recency: {}", err);
    err.exit_code()
}

fn print_json<T: Serialize>(value: &T) -> ExitCode {
    match write_json(&mut std::io::stdout().lock(), value) {
        Ok(()) => ExitCode::Clean,
        Err(e) => fail(e),
    }
}

fn run_simulate(args: &SimulateArgs) -> ExitCode {
    let path = match locate(ConfigKind::Simulation, args.config.as_deref()) {
        Ok(path) => path,
        Err(code) => return code,
    };

    let result = SimulationSettings::from_file(&path)
        .map_err(ra_core::Error::from)
        .and_then(|mut settings| {
            if let Some(seed) = args.seed {
                settings.seed = seed;
            }
            if let Some(n_sims) = args.n_sims {
                settings.n_sims = n_sims;
            }
            let unit = args.unit_records || !settings.summarize;
            Ok((SimulationConfig::from_settings(&settings)?, unit))
        })
        .and_then(|(config, unit)| Ok((Simulator::new(config)?, unit)));

    let (simulator, unit) = match result {
        Ok(ok) => ok,
        Err(e) => return fail(e),
    };

    if unit {
        match simulator.unit_records() {
            Ok(records) => print_json(&UnitRecordOutput {
                n_replicates: simulator.config().n_sims,
                records,
            }),
            Err(e) => fail(e),
        }
    } else {
        match simulator.summarize() {
            Ok(matrix) => print_json(&SummaryOutput {
                enrollment_times: matrix.enrollment_times().to_vec(),
                n_replicates: matrix.n_replicates(),
                rows: matrix.rows(),
            }),
            Err(e) => fail(e),
        }
    }
}

fn run_estimate(args: &EstimateArgs) -> ExitCode {
    let path = match locate(ConfigKind::Assay, args.config.as_deref()) {
        Ok(path) => path,
        Err(code) => return code,
    };

    let result = AssaySettings::from_file(&path)
        .map_err(ra_core::Error::from)
        .and_then(|mut settings| {
            if let Some(seed) = args.seed {
                settings.seed = seed;
            }
            if let Some(replicates) = args.replicates {
                settings.n_replicates = replicates;
            }
            AssayEstimator::new(AssayConfig::from_settings(&settings)?)
        })
        .and_then(|estimator| estimator.estimate());

    match result {
        Ok(summary) => print_json(&summary),
        Err(e) => fail(e),
    }
}
