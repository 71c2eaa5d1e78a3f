#![warn(missing_docs)]
//! Speedtest Report - Exports of a finished run
//!
//! Writes the records produced by a session as:
//! - CSV (`run.csv`, one row per variant)
//! - TXT (`run.txt`, one status line per variant)
//!
//! Existing exports are never overwritten: the next free name of the form
//! `run1.csv`, `run2.csv`, ... is used instead.

mod csv;
mod txt;

pub use csv::{generate_csv_report, write_csv};
pub use txt::{generate_txt_report, write_txt};

use std::path::{Path, PathBuf};
use thiserror::Error;

/// Export failures
#[derive(Debug, Error)]
pub enum ReportError {
    /// Output file could not be written
    #[error("failed to write {path}: {source}")]
    Io {
        /// Target file
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },
}

/// Export format selection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// Comma-separated table
    Csv,
    /// Plain status lines
    Txt,
}

impl OutputFormat {
    /// File extension, without the dot
    pub fn extension(self) -> &'static str {
        match self {
            OutputFormat::Csv => "csv",
            OutputFormat::Txt => "txt",
        }
    }
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "csv" => Ok(OutputFormat::Csv),
            "txt" | "text" => Ok(OutputFormat::Txt),
            other => Err(format!("Unknown output format: {}", other)),
        }
    }
}

/// First of `{prefix}.{ext}`, `{prefix}1.{ext}`, `{prefix}2.{ext}`, ... that
/// does not exist in `dir`.
pub fn next_available_name(dir: &Path, prefix: &str, format: OutputFormat) -> String {
    let ext = format.extension();
    let mut name = format!("{prefix}.{ext}");
    let mut n = 1u32;
    while dir.join(&name).exists() {
        name = format!("{prefix}{n}.{ext}");
        n += 1;
    }
    name
}

/// Write `contents` under the next free `run.*` name and return that name.
pub(crate) fn write_export(dir: &Path, format: OutputFormat, contents: &str) -> Result<String, ReportError> {
    let name = next_available_name(dir, "run", format);
    let path = dir.join(&name);
    std::fs::write(&path, contents).map_err(|source| ReportError::Io {
        path: path.clone(),
        source,
    })?;
    tracing::debug!(path = %path.display(), "wrote export");
    Ok(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_next_available_name_increments() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(next_available_name(dir.path(), "run", OutputFormat::Csv), "run.csv");

        std::fs::write(dir.path().join("run.csv"), "").unwrap();
        assert_eq!(next_available_name(dir.path(), "run", OutputFormat::Csv), "run1.csv");

        std::fs::write(dir.path().join("run1.csv"), "").unwrap();
        assert_eq!(next_available_name(dir.path(), "run", OutputFormat::Csv), "run2.csv");

        // Formats do not collide
        assert_eq!(next_available_name(dir.path(), "run", OutputFormat::Txt), "run.txt");
    }

    #[test]
    fn test_output_format_parse() {
        assert_eq!("CSV".parse::<OutputFormat>().unwrap(), OutputFormat::Csv);
        assert_eq!("text".parse::<OutputFormat>().unwrap(), OutputFormat::Txt);
        assert!("html".parse::<OutputFormat>().is_err());
    }
}
