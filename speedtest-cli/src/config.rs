//! Configuration loading from speedtest.toml
//!
//! Speedtest settings can live in a `speedtest.toml` file in the project root.
//! The file is discovered by walking up from the working directory; command
//! line flags and `SPEEDTEST_*` environment variables take precedence over it.

use anyhow::Context;
use serde::{Deserialize, Serialize};
use speedtest_core::{CalibrationConfig, TimeUnit};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Name of the discovered configuration file
pub const CONFIG_FILE: &str = "speedtest.toml";

/// Speedtest configuration file
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct SpeedConfig {
    /// Session settings
    #[serde(default)]
    pub run: RunSection,
    /// Loop-count calibration settings
    #[serde(default)]
    pub calibration: CalibrationSection,
}

/// `[run]` table. Every key is optional so unset keys fall through to the
/// built-in defaults.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct RunSection {
    /// Files or directories to search when none are given on the command line
    pub file_or_dir: Option<Vec<PathBuf>>,
    /// Time unit: "auto", "s", "ms", "us" or "ns"
    pub unit: Option<String>,
    /// Process units on a worker pool
    pub parallel: Option<bool>,
    /// Worker count for parallel mode
    pub jobs: Option<usize>,
    /// Measurement repetitions per variant
    pub nreps: Option<usize>,
    /// Write a CSV export after the run
    pub tocsv: Option<bool>,
    /// Write a text export after the run
    pub totxt: Option<bool>,
    /// Neither read nor write the cache
    pub no_cache: Option<bool>,
    /// Recalibrate every variant
    pub ignore_cache: Option<bool>,
    /// Width of the left-hand side of status lines
    pub print_pad_width: Option<usize>,
    /// Cache directory, relative to the working directory
    pub cache_dir: Option<PathBuf>,
}

/// `[calibration]` table
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct CalibrationSection {
    /// Trial duration that ends calibration (e.g. "200ms", "1s")
    pub threshold: Option<String>,
    /// Maximum number of calibration trials
    pub max_steps: Option<usize>,
    /// Loop count used when calibration fails
    pub fallback_loops: Option<u64>,
}

impl SpeedConfig {
    /// Load configuration from a TOML file
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let config: Self =
            toml::from_str(&content).with_context(|| format!("invalid {}", path.display()))?;
        Ok(config)
    }

    /// Walk up from `start` and load the first `speedtest.toml` found.
    ///
    /// A file that exists but does not parse is an error rather than being
    /// skipped.
    pub fn discover(start: &Path) -> anyhow::Result<Option<Self>> {
        let mut dir = start.to_path_buf();
        loop {
            let config_path = dir.join(CONFIG_FILE);
            if config_path.is_file() {
                tracing::debug!(path = %config_path.display(), "loading configuration");
                return Self::load(&config_path).map(Some);
            }
            if !dir.pop() {
                break;
            }
        }
        Ok(None)
    }

    /// Resolved time unit, if the file sets one
    pub fn unit(&self) -> anyhow::Result<Option<TimeUnit>> {
        self.run
            .unit
            .as_deref()
            .map(|u| u.parse::<TimeUnit>().map_err(anyhow::Error::from))
            .transpose()
    }

    /// Calibration knobs with file values applied over the defaults
    pub fn calibration(&self) -> anyhow::Result<CalibrationConfig> {
        let mut calibration = CalibrationConfig::default();
        if let Some(threshold) = &self.calibration.threshold {
            calibration.threshold = parse_threshold(threshold)?;
        }
        if let Some(max_steps) = self.calibration.max_steps {
            calibration.max_steps = max_steps;
        }
        if let Some(fallback) = self.calibration.fallback_loops {
            calibration.fallback_loops = fallback;
        }
        Ok(calibration)
    }

    /// Generate a default configuration as TOML string
    pub fn default_toml() -> String {
        r#"# Speedtest Configuration

[run]
# Files or directories searched when none are given
file_or_dir = ["."]
# Time unit: auto, s, ms, us, ns
unit = "auto"
# Process benchmark units on a worker pool
parallel = false
# Worker count for parallel mode (uncomment to enable)
# jobs = 4
# Measurement repetitions; the best one is reported
nreps = 3
# Exports written after the run
tocsv = false
totxt = false
# Cache behaviour
no_cache = false
ignore_cache = false
cache_dir = ".speedtest_cache"
# Width of the dash-padded left-hand side of status lines
print_pad_width = 100

[calibration]
# A trial at least this long ends calibration
threshold = "200ms"
# Maximum calibration trials
max_steps = 30
# Loop count used when calibration fails
fallback_loops = 5
"#
        .to_string()
    }
}

/// Threshold suffixes and their length in nanoseconds. `s` comes last so
/// that `ms`, `us` and `ns` are tried first.
const THRESHOLD_SUFFIXES: &[(&str, u64)] = &[
    ("ns", 1),
    ("us", 1_000),
    ("µs", 1_000),
    ("ms", 1_000_000),
    ("s", 1_000_000_000),
];

/// Read a calibration threshold such as `"200ms"` or `"0.5s"`. A bare number
/// is taken as seconds.
pub fn parse_threshold(text: &str) -> anyhow::Result<Duration> {
    let text = text.trim();
    let (number, nanos_per_unit) = THRESHOLD_SUFFIXES
        .iter()
        .find_map(|&(suffix, nanos)| text.strip_suffix(suffix).map(|number| (number, nanos)))
        .unwrap_or((text, 1_000_000_000));

    let value: f64 = number
        .trim()
        .parse()
        .with_context(|| format!("invalid calibration threshold `{}`", text))?;
    let nanos = (value * nanos_per_unit as f64).round();
    if !nanos.is_finite() || nanos < 0.0 || nanos > u64::MAX as f64 {
        anyhow::bail!("calibration threshold `{}` is out of range", text);
    }
    Ok(Duration::from_nanos(nanos as u64))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = SpeedConfig::default();
        assert_eq!(config.run.nreps, None);
        assert_eq!(config.unit().unwrap(), None);
        assert_eq!(config.calibration().unwrap(), CalibrationConfig::default());
    }

    #[test]
    fn test_parse_threshold() {
        let cases = [
            ("200ms", Duration::from_millis(200)),
            (" 50ms ", Duration::from_millis(50)),
            ("0.5s", Duration::from_millis(500)),
            ("1.5 s", Duration::from_millis(1500)),
            ("2", Duration::from_secs(2)),
            ("100us", Duration::from_micros(100)),
            ("100µs", Duration::from_micros(100)),
            ("750ns", Duration::from_nanos(750)),
        ];
        for (text, expected) in cases {
            assert_eq!(parse_threshold(text).unwrap(), expected, "{text}");
        }

        for bad in ["", "ms", "-1s", "nan", "2m", "5 fortnights"] {
            assert!(parse_threshold(bad).is_err(), "{bad:?} accepted");
        }
    }

    #[test]
    fn test_parse_toml() {
        let toml_str = r#"
            [run]
            nreps = 5
            unit = "ms"
            file_or_dir = ["benches"]

            [calibration]
            threshold = "50ms"
        "#;

        let config: SpeedConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.run.nreps, Some(5));
        assert_eq!(config.unit().unwrap(), Some(TimeUnit::Ms));
        assert_eq!(config.run.file_or_dir, Some(vec![PathBuf::from("benches")]));

        let calibration = config.calibration().unwrap();
        assert_eq!(calibration.threshold, Duration::from_millis(50));
        // Unset keys keep their defaults
        assert_eq!(calibration.max_steps, 30);
    }

    #[test]
    fn test_unknown_keys_rejected() {
        let result: Result<SpeedConfig, _> = toml::from_str("[run]\nnrep = 5\n");
        assert!(result.is_err());
    }

    #[test]
    fn test_default_toml_parses() {
        let config: SpeedConfig = toml::from_str(&SpeedConfig::default_toml()).unwrap();
        assert_eq!(config.run.nreps, Some(3));
        assert_eq!(config.calibration().unwrap(), CalibrationConfig::default());
    }

    #[test]
    fn test_discover_walks_up() {
        let root = tempfile::tempdir().unwrap();
        let nested = root.path().join("a").join("b");
        std::fs::create_dir_all(&nested).unwrap();
        assert_eq!(SpeedConfig::discover(&nested).unwrap(), None);

        std::fs::write(root.path().join(CONFIG_FILE), "[run]\nparallel = true\n").unwrap();
        let found = SpeedConfig::discover(&nested).unwrap().unwrap();
        assert_eq!(found.run.parallel, Some(true));

        std::fs::write(root.path().join(CONFIG_FILE), "[run\n").unwrap();
        assert!(SpeedConfig::discover(&nested).is_err());
    }
}
