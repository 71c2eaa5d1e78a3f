//! Run Configuration
//!
//! `RunConfig` is assembled once by the front end (CLI flags, environment,
//! `speedtest.toml`) and then shared read-only by every task of a session.

use crate::error::ConfigError;
use crate::format::TimeUnit;
use std::path::PathBuf;
use std::time::Duration;

/// Loop-count calibration knobs
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CalibrationConfig {
    /// A trial at least this long ends calibration
    pub threshold: Duration,
    /// Upper bound on calibration trials
    pub max_steps: usize,
    /// Loop count used when calibration fails
    pub fallback_loops: u64,
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self {
            threshold: Duration::from_millis(200),
            max_steps: 30,
            fallback_loops: 5,
        }
    }
}

/// Immutable configuration of one session.
#[derive(Debug, Clone, PartialEq)]
pub struct RunConfig {
    /// Files or directories to search for benchmark units
    pub sources: Vec<PathBuf>,
    /// Base for relative sources and printed paths
    pub working_dir: PathBuf,
    pub unit: TimeUnit,
    pub parallel: bool,
    /// Worker count override for parallel mode
    pub jobs: Option<usize>,
    /// Measurement repetitions; the best one is kept
    pub nreps: usize,
    /// Neither read nor write the cache
    pub no_cache: bool,
    /// Recalibrate everything, still writing results
    pub ignore_cache: bool,
    /// Width the left-hand side of status lines is padded to
    pub print_pad_width: usize,
    pub quiet: bool,
    pub verbose: u8,
    /// Cache directory, relative to `working_dir` unless absolute
    pub cache_dir: PathBuf,
    pub calibration: CalibrationConfig,
    /// Export the run's records as CSV
    pub tocsv: bool,
    /// Export the run's records as a text log
    pub totxt: bool,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            sources: vec![PathBuf::from(".")],
            working_dir: PathBuf::from("."),
            unit: TimeUnit::Auto,
            parallel: false,
            jobs: None,
            nreps: 3,
            no_cache: false,
            ignore_cache: false,
            print_pad_width: 100,
            quiet: false,
            verbose: 0,
            cache_dir: PathBuf::from(".speedtest_cache"),
            calibration: CalibrationConfig::default(),
            tocsv: false,
            totxt: false,
        }
    }
}

impl RunConfig {
    /// Whether prior records may seed loop counts
    pub fn reads_cache(&self) -> bool {
        !self.no_cache && !self.ignore_cache
    }

    /// Whether results are persisted at the end of the run
    pub fn writes_cache(&self) -> bool {
        !self.no_cache
    }

    /// Absolute cache directory
    pub fn cache_path(&self) -> PathBuf {
        self.working_dir.join(&self.cache_dir)
    }

    /// Worker count for `units` source units.
    pub fn pool_size(&self, units: usize) -> usize {
        if let Some(jobs) = self.jobs {
            return jobs.clamp(1, units.max(1));
        }
        let cpus = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        units.min(cpus.saturating_sub(1)).max(1)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.nreps == 0 {
            return Err(ConfigError::InvalidNreps);
        }
        Ok(())
    }
}
