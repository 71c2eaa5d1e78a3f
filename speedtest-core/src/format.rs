//! Formatting utilities for durations and status lines

use crate::cache::Cache;
use crate::error::ConfigError;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

/// Unit used to print per-call durations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TimeUnit {
    /// Pick by magnitude
    #[default]
    Auto,
    S,
    Ms,
    Us,
    Ns,
}

impl FromStr for TimeUnit {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "auto" => Ok(TimeUnit::Auto),
            "s" => Ok(TimeUnit::S),
            "ms" => Ok(TimeUnit::Ms),
            "us" => Ok(TimeUnit::Us),
            "ns" => Ok(TimeUnit::Ns),
            _ => Err(ConfigError::UnknownUnit(s.to_string())),
        }
    }
}

impl fmt::Display for TimeUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TimeUnit::Auto => "auto",
            TimeUnit::S => "s",
            TimeUnit::Ms => "ms",
            TimeUnit::Us => "us",
            TimeUnit::Ns => "ns",
        })
    }
}

/// Format seconds with an auto-selected unit: `1.5 sec`, `12.0 msec`,
/// `3.2 μsec`, `87.0 nsec`.
pub fn format_duration(secs: f64) -> String {
    if secs > 1.0 {
        format_duration_in(secs, TimeUnit::S)
    } else if secs > 1e-3 {
        format_duration_in(secs, TimeUnit::Ms)
    } else if secs > 1e-6 {
        format_duration_in(secs, TimeUnit::Us)
    } else {
        format_duration_in(secs, TimeUnit::Ns)
    }
}

/// Format seconds in a fixed unit.
pub fn format_duration_in(secs: f64, unit: TimeUnit) -> String {
    match unit {
        TimeUnit::Auto => format_duration(secs),
        TimeUnit::S => format!("{:.1} sec", secs),
        TimeUnit::Ms => format!("{:.1} msec", secs * 1e3),
        TimeUnit::Us => format!("{:.1} μsec", secs * 1e6),
        TimeUnit::Ns => format!("{:.1} nsec", secs * 1e9),
    }
}

/// Default width of the loop-count column
pub const DEFAULT_LOOPS_PAD: usize = 10;

/// `1 loop`, `20 loops`
pub fn loops_label(loops: u64) -> String {
    format!("{} loop{}", loops, if loops == 1 { "" } else { "s" })
}

/// Width of the loop-count column: six more than the widest cached loop
/// count, or [`DEFAULT_LOOPS_PAD`] for an empty cache.
pub fn loops_pad_width(cache: &Cache) -> usize {
    cache
        .loop_counts()
        .map(|n| n.to_string().len() + 6)
        .max()
        .unwrap_or(DEFAULT_LOOPS_PAD)
}

/// Right-hand side of a successful status line
pub fn success_status(loops: u64, score: f64, unit: TimeUnit, pad: usize) -> String {
    format!(
        "{:<pad$}, {} per loop",
        loops_label(loops),
        format_duration_in(score, unit),
        pad = pad
    )
}

/// Right-hand side of a failed status line
pub fn failure_status(category: &str, message: &str, verbose: u8) -> String {
    if verbose == 0 {
        format!("FAILED ({})", category)
    } else {
        format!("FAILED ({}): {}", category, message)
    }
}

/// `"{rel}:{signature} "` dash-padded to `width`, then the status.
pub fn status_line(rel_path: &str, signature: &str, width: usize, status: &str) -> String {
    let lhs = format!("{}:{} ", rel_path, signature);
    format!("{:-<width$} {}", lhs, status, width = width)
}

/// `path` relative to `base` when it lies beneath it, otherwise unchanged.
pub fn relative_display(path: &Path, base: &Path) -> String {
    path.strip_prefix(base)
        .unwrap_or(path)
        .display()
        .to_string()
}
