//! Speedtest Core - Discovery, Calibration and Caching
//!
//! This crate provides the engine behind `speedtest`:
//! - Source scanning of benchmark units (`speed*.rs`) with `syn`
//! - A link-time registry of benchmark and fixture callables
//! - Parametrization and fixture binding
//! - Loop-count calibration and best-of-N timing
//! - A persistent cache of loop counts and scores
//! - Sequential and worker-pool orchestration of whole units

mod cache;
mod config;
mod error;
mod fixtures;
mod format;
mod measure;
mod orchestrator;
mod params;
mod scanner;
mod symbols;
mod timing;
mod unit;

pub use cache::{Cache, CacheStore, TimingRecord, CACHE_FILE, PARAM_PREFIX};
pub use config::{CalibrationConfig, RunConfig};
pub use error::{
    CacheError, CallError, ConfigError, ExpandError, FixtureError, LoadError, ScanError,
    SessionError,
};
pub use fixtures::resolve_fixtures;
pub use format::{
    failure_status, format_duration, format_duration_in, loops_label, loops_pad_width,
    relative_display, status_line, success_status, TimeUnit,
};
pub use measure::{Clock, ManualClock, SystemClock, Timer};
pub use orchestrator::{discover_sources, is_benchmark_file, LineSink, Session, SessionOutcome};
pub use params::{ArgSet, Args, BoundVariant, Parametrization, Variants};
pub use scanner::{scan_source, BenchmarkEntry, ScanRules};
pub use symbols::{
    per_call_runner, BenchRunner, FixtureRunner, PreparedCall, RegistryLoader, Symbol, SymbolTable,
    UnitLoader,
};
pub use timing::{loop_counts, Calibration, Measurement, TimingEngine};
pub use unit::{process_unit, UnitContext, UnitReport};

use serde_json::Value;

/// Symbol registered via `#[speedtest::mark]`, `#[speedtest::fixture]` and
/// friends
#[derive(Debug, Clone, Copy)]
pub struct SymbolDef {
    /// `file!()` of the defining unit
    pub file: &'static str,
    /// Module path
    pub module_path: &'static str,
    /// Function name
    pub name: &'static str,
    pub kind: SymbolKind,
}

/// What a registered symbol is
#[derive(Debug, Clone, Copy)]
pub enum SymbolKind {
    /// Benchmark wrapper, with its parametrize declaration if any. The
    /// wrapper decodes its arguments and returns the call to time.
    Benchmark {
        runner: fn(&Args) -> Result<PreparedCall, CallError>,
        params: Option<fn() -> Result<Parametrization, ExpandError>>,
    },
    /// Zero-argument fixture wrapper
    Fixture {
        runner: fn() -> Result<Value, CallError>,
    },
}

// Collect all registered symbols
inventory::collect!(SymbolDef);

/// Anchor to prevent LTO from stripping inventory entries
#[used]
#[doc(hidden)]
pub static REGISTRY_ANCHOR: fn() = || for _ in inventory::iter::<SymbolDef> {};
