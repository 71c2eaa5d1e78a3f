#![warn(missing_docs)]
//! # Speedtest
//!
//! Convention-driven micro-benchmarking for Rust with loop-count calibration and
//! result caching.
//!
//! Speedtest discovers benchmark units (`speed*.rs` files), finds their
//! entries and times every variant:
//! - **Discovery**: functions named `speed_*` or annotated `#[speedtest::mark]`
//!   are found by parsing the unit's source
//! - **Fixtures**: a parameter named after a `#[speedtest::fixture]` receives
//!   its value, computed once per entry
//! - **Parametrization**: `#[speedtest::parametrize]` expands an entry into one
//!   variant per argument set
//! - **Calibration**: loop counts climb the 1-2-5 sequence until one trial
//!   takes at least 0.2 s; the best of `--nreps` trials is reported
//! - **Caching**: loop counts persist in `.speedtest_cache/cache.json` so
//!   later runs skip calibration
//!
//! ## Quick Start
//!
//! ```ignore
//! // benches/speed_sorting.rs
//! use speedtest::{export, fixture, mark, parametrize};
//!
//! #[fixture]
//! fn data() -> Vec<u64> {
//!     (0..1000).rev().collect()
//! }
//!
//! #[export]
//! fn speed_sort(data: &[u64]) {
//!     let mut v = data.to_vec();
//!     v.sort();
//! }
//!
//! #[parametrize("n", [10, 100, 1000])]
//! #[mark]
//! fn reverse(n: usize) -> Vec<usize> {
//!     (0..n).rev().collect()
//! }
//!
//! fn main() {
//!     speedtest::run().unwrap();
//! }
//! ```

// Re-export core types
pub use speedtest_core::{
    per_call_runner, ArgSet, Args, BenchRunner, BoundVariant, Cache, CacheStore,
    CalibrationConfig, CallError, Clock, ExpandError, LineSink, ManualClock, Parametrization,
    PreparedCall, RegistryLoader, RunConfig, Session, SessionError, SessionOutcome, Symbol,
    SymbolDef, SymbolKind, SymbolTable, SystemClock, TimeUnit, TimingEngine, TimingRecord,
    UnitLoader,
};

// Re-export macros
pub use speedtest_macros::{export, fixture, mark, parametrize};

/// Internal re-exports for macro use
#[doc(hidden)]
pub mod internal {
    pub use inventory;
    pub use serde_json::{to_value, Value};
}

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::{export, fixture, mark, parametrize, Args, CallError, RunConfig, Session};
}

/// Run the speedtest CLI harness.
///
/// Call this from your benchmark binary's `main()`:
/// ```ignore
/// fn main() {
///     speedtest::run().unwrap();
/// }
/// ```
pub use speedtest_cli::run;
