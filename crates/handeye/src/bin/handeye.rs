//! handeye CLI: run a hand-eye data-collection session against the simulated rig.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use clap::{Args, Parser, Subcommand};
use handeye::io::{RunConfig, RunReport};
use handeye::sim::simulate;
use log::{error, info, warn};

#[cfg(feature = "tracing")]
use tracing_log::LogTracer;

type CliError = Box<dyn std::error::Error>;
type CliResult<T> = Result<T, CliError>;

#[derive(Parser)]
#[command(name = "handeye")]
#[command(about = "Collect robot/pattern pose pairs for hand-eye calibration and hand them to a solver")]
#[command(version)]
struct Cli {
    /// More log output (-v debug, -vv trace).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Emit structured JSON logs (requires the `tracing` feature).
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a collection session and write a JSON report.
    Run(RunArgs),

    /// Write a config file filled with defaults.
    InitConfig {
        /// Destination path.
        path: PathBuf,
    },
}

#[derive(Debug, Clone, Args)]
struct RunArgs {
    /// JSON run config; defaults are used when omitted.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Override the number of pose pairs to collect.
    #[arg(long)]
    samples: Option<usize>,

    /// Override the simulation seed.
    #[arg(long)]
    seed: Option<u64>,

    /// Where to write the report (overrides `report_path` from the config).
    #[arg(long)]
    report: Option<PathBuf>,

    /// Store the collected pose pairs in the report.
    #[arg(long)]
    include_samples: bool,

    /// Skip the settle and pre-solve pauses.
    #[arg(long)]
    no_delay: bool,
}

fn main() -> CliResult<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.json_logs)?;

    match cli.command {
        Commands::Run(args) => run_collect(&args),
        Commands::InitConfig { path } => run_init_config(&path),
    }
}

fn init_logging(verbose: u8, json: bool) -> CliResult<()> {
    #[cfg(feature = "tracing")]
    {
        let _ = verbose;
        let _ = LogTracer::init();
        handeye::core::init_tracing(json);
    }
    #[cfg(not(feature = "tracing"))]
    {
        if json {
            eprintln!("--json-logs needs the `tracing` feature; using plain logs");
        }
        handeye::core::init_with_level(handeye::core::level_from_verbosity(verbose))?;
    }
    Ok(())
}

// ── init-config ────────────────────────────────────────────────────────

fn run_init_config(path: &Path) -> CliResult<()> {
    RunConfig::default().write_json(path)?;
    println!("wrote default config to {}", path.display());
    Ok(())
}

// ── run ────────────────────────────────────────────────────────────────

fn load_config(args: &RunArgs) -> CliResult<RunConfig> {
    let mut cfg = match &args.config {
        Some(path) => RunConfig::load_json(path).map_err(|e| -> CliError {
            format!("failed to load config {}: {e}", path.display()).into()
        })?,
        None => RunConfig::default(),
    };
    if let Some(samples) = args.samples {
        cfg.calibration.target_sample_count = samples;
    }
    if let Some(seed) = args.seed {
        cfg.sim.seed = Some(seed);
    }
    if let Some(report) = &args.report {
        cfg.report_path = Some(report.to_string_lossy().into_owned());
    }
    if args.include_samples {
        cfg.include_samples = true;
    }
    if args.no_delay {
        cfg.calibration = cfg.calibration.without_delays();
    }
    Ok(cfg)
}

fn run_collect(args: &RunArgs) -> CliResult<()> {
    let cfg = load_config(args)?;

    let cancel = Arc::new(AtomicBool::new(false));
    ctrlc::set_handler({
        let cancel = cancel.clone();
        move || {
            warn!("interrupt received, stopping after the current pose");
            cancel.store(true, Ordering::SeqCst);
        }
    })?;

    info!(
        "device {}: collecting {} pose pairs",
        cfg.device_id, cfg.calibration.target_sample_count
    );
    let report = simulate(&cfg, args.config.as_deref(), Some(cancel))?;

    let report_path = cfg.report_path();
    report.write_json(&report_path)?;
    info!("wrote report to {}", report_path.display());

    summarize(&report)
}

fn summarize(report: &RunReport) -> CliResult<()> {
    let stats = &report.stats;
    println!(
        "collected {} of {} pose pairs ({} iterations, {} discarded)",
        stats.samples_collected,
        report.target_sample_count,
        stats.iterations,
        stats.discarded_iterations
    );

    let Some(transform) = report.result.as_ref().and_then(|r| r.transform()) else {
        let reason = report.error.as_deref().unwrap_or("unknown error");
        error!("calibration failed: {reason}");
        return Err(format!("calibration failed: {reason}").into());
    };

    println!("hand-eye transform: {transform}");
    if let Some(truth) = &report.ground_truth {
        println!(
            "error vs ground truth: {:.3e} m, {:.3e} deg",
            transform.translation_distance(truth),
            transform.rotation_angle_to(truth).to_degrees()
        );
    }
    Ok(())
}
