#![warn(missing_docs)]
//! Speedtest CLI Library
//!
//! Command line front end for benchmark binaries. Call `speedtest::run()`
//! (or `speedtest_cli::run()`) from `main` to discover `speed*.rs` units
//! below the given paths, time every registered entry and print one status
//! line per variant.
//!
//! # Example
//!
//! ```ignore
//! #[speedtest::mark]
//! fn sort_small() {
//!     let mut v = vec![3, 1, 2];
//!     v.sort();
//! }
//!
//! fn main() -> anyhow::Result<()> {
//!     speedtest_cli::run()
//! }
//! ```

mod config;

pub use config::*;

use anyhow::Context;
use clap::Parser;
use speedtest_core::{RunConfig, Session, SessionOutcome, TimeUnit};
use speedtest_report::{write_csv, write_txt};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Speedtest CLI arguments
#[derive(Parser, Debug, Default)]
#[command(name = "speedtest")]
#[command(
    author,
    version,
    about = "Time speed_* functions with calibrated loop counts and cached results"
)]
pub struct Cli {
    /// Files or directories containing `speed*.rs` units (default: ".")
    #[arg(value_name = "FILE_OR_DIR")]
    pub file_or_dir: Vec<PathBuf>,

    /// Force every duration into one unit: s, ms, us, ns or auto
    #[arg(long, env = "SPEEDTEST_UNIT")]
    pub unit: Option<TimeUnit>,

    /// Process units on a worker pool
    #[arg(long, env = "SPEEDTEST_PARALLEL")]
    pub parallel: bool,

    /// Worker count for --parallel (default: CPUs - 1)
    #[arg(long, env = "SPEEDTEST_JOBS")]
    pub jobs: Option<usize>,

    /// Measurement repetitions per variant (default: 3)
    #[arg(long, env = "SPEEDTEST_NREPS")]
    pub nreps: Option<usize>,

    /// Write the results to run.csv
    #[arg(long, env = "SPEEDTEST_TOCSV")]
    pub tocsv: bool,

    /// Write the results to run.txt
    #[arg(long, env = "SPEEDTEST_TOTXT")]
    pub totxt: bool,

    /// Neither read nor write .speedtest_cache
    #[arg(long, env = "SPEEDTEST_NO_CACHE")]
    pub no_cache: bool,

    /// Recalibrate every variant, still writing the cache
    #[arg(long, env = "SPEEDTEST_IGNORE_CACHE")]
    pub ignore_cache: bool,

    /// Pad width of status lines (default: 100)
    #[arg(long, env = "SPEEDTEST_PRINT_PAD_WIDTH")]
    pub print_pad_width: Option<usize>,

    /// Configuration file (default: nearest speedtest.toml)
    #[arg(long, env = "SPEEDTEST_CONFIG")]
    pub config: Option<PathBuf>,

    /// Suppress status lines
    #[arg(short, long, env = "SPEEDTEST_QUIET")]
    pub quiet: bool,

    /// Verbose output: failure messages and debug logs
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Internal: Absorb cargo bench's --bench flag
    #[arg(long, hide = true)]
    pub bench: bool,
}

/// Run the speedtest CLI with the process arguments.
/// This is the main entry point for benchmark binaries.
///
/// # Returns
/// Returns `Ok(())` on success, or an error if the configuration is invalid
/// or the cache or an export could not be written.
pub fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();
    run_with_cli(cli)
}

/// Run the speedtest CLI with pre-parsed arguments.
pub fn run_with_cli(cli: Cli) -> anyhow::Result<()> {
    init_logging(cli.verbose);

    let working_dir = std::env::current_dir().context("failed to resolve working directory")?;
    let file = match &cli.config {
        Some(path) => SpeedConfig::load(path)?,
        None => SpeedConfig::discover(&working_dir)?.unwrap_or_default(),
    };
    let config = build_run_config(&cli, &file, working_dir)?;

    let quiet = config.quiet;
    let sink = move |line: &str| {
        if !quiet {
            println!("{}", line);
        }
    };

    run_session(config, &sink).map(|_| ())
}

fn init_logging(verbose: u8) {
    let default = if verbose > 0 {
        "speedtest=debug"
    } else {
        "speedtest=info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    // A second call, e.g. from tests, keeps the first subscriber
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

/// Build a RunConfig by layering: defaults → speedtest.toml → flags and
/// environment.
pub fn build_run_config(cli: &Cli, file: &SpeedConfig, working_dir: PathBuf) -> anyhow::Result<RunConfig> {
    let defaults = RunConfig::default();
    let run = &file.run;

    let sources = if !cli.file_or_dir.is_empty() {
        cli.file_or_dir.clone()
    } else {
        run.file_or_dir.clone().unwrap_or(defaults.sources)
    };

    let unit = match cli.unit {
        Some(unit) => unit,
        None => file.unit()?.unwrap_or(defaults.unit),
    };

    let config = RunConfig {
        sources,
        working_dir,
        unit,
        parallel: cli.parallel || run.parallel.unwrap_or(defaults.parallel),
        jobs: cli.jobs.or(run.jobs),
        nreps: cli.nreps.or(run.nreps).unwrap_or(defaults.nreps),
        no_cache: cli.no_cache || run.no_cache.unwrap_or(defaults.no_cache),
        ignore_cache: cli.ignore_cache || run.ignore_cache.unwrap_or(defaults.ignore_cache),
        print_pad_width: cli
            .print_pad_width
            .or(run.print_pad_width)
            .unwrap_or(defaults.print_pad_width),
        quiet: cli.quiet,
        verbose: cli.verbose,
        cache_dir: run.cache_dir.clone().unwrap_or(defaults.cache_dir),
        calibration: file.calibration()?,
        tocsv: cli.tocsv || run.tocsv.unwrap_or(defaults.tocsv),
        totxt: cli.totxt || run.totxt.unwrap_or(defaults.totxt),
    };
    config.validate()?;
    Ok(config)
}

/// Print the banner, run a session and write the requested exports.
///
/// Exports cover the records produced by this run only and are written to
/// the working directory.
pub fn run_session(config: RunConfig, sink: &(dyn Fn(&str) + Sync)) -> anyhow::Result<SessionOutcome> {
    sink(&format!(
        "Platform {} -- speedtest {}",
        std::env::consts::OS,
        env!("CARGO_PKG_VERSION")
    ));

    let session = Session::new(config);
    let outcome = session.run(&sink).context("benchmark session failed")?;

    let config = session.config();
    if config.tocsv {
        let name = write_csv(&outcome.writable, &config.working_dir)?;
        sink(&format!("Success! Saved CSV output to '{}'", name));
    }
    if config.totxt {
        let name = write_txt(&outcome.writable, &config.working_dir)?;
        sink(&format!("Success! Saved TXT output to '{}'", name));
    }

    tracing::debug!(
        units = outcome.units,
        failed = outcome.failed,
        skipped = outcome.skipped,
        "session finished"
    );
    Ok(outcome)
}
