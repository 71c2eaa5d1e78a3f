//! Source Unit Processing
//!
//! One task of a session: scan a unit, load its symbols, resolve fixtures
//! and time every variant of every entry. Problems with the unit as a whole
//! skip it; problems with one entry or variant fail only that line.

use crate::cache::{Cache, TimingRecord};
use crate::config::RunConfig;
use crate::fixtures::resolve_fixtures;
use crate::format::{failure_status, relative_display, status_line, success_status};
use crate::measure::Clock;
use crate::orchestrator::LineSink;
use crate::params::{Args, BoundVariant};
use crate::scanner::{scan_source, BenchmarkEntry, ScanRules};
use crate::symbols::{per_call_runner, Symbol, SymbolTable, UnitLoader};
use crate::timing::TimingEngine;
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Everything a unit task reads; shared by all tasks of a session.
pub struct UnitContext<'a, C: Clock> {
    pub config: &'a RunConfig,
    /// Frozen cache loaded at session start
    pub snapshot: &'a Cache,
    pub loader: &'a dyn UnitLoader,
    pub engine: &'a TimingEngine<C>,
    pub rules: &'a ScanRules,
    /// Width of the loop-count column
    pub loops_pad: usize,
    /// Show a spinner while timing
    pub progress: bool,
}

/// Result of processing one unit
#[derive(Debug, Clone, Default)]
pub struct UnitReport {
    pub source: PathBuf,
    /// Successful records keyed by signature
    pub records: BTreeMap<String, TimingRecord>,
    /// Status lines in discovery order
    pub lines: Vec<String>,
    /// Number of failed variants or entries
    pub failures: usize,
    /// Category of the problem that skipped the whole unit
    pub skipped: Option<String>,
}

impl UnitReport {
    /// Cache key of this unit
    pub fn key(&self) -> String {
        self.source.to_string_lossy().into_owned()
    }
}

struct LineWriter<'a> {
    lines: Vec<String>,
    live: Option<&'a dyn LineSink>,
    spinner: Option<ProgressBar>,
}

impl LineWriter<'_> {
    fn push(&mut self, line: String) {
        if let Some(sink) = self.live {
            match &self.spinner {
                Some(pb) => pb.suspend(|| sink.emit(&line)),
                None => sink.emit(&line),
            }
        }
        self.lines.push(line);
    }

    fn set_message(&self, msg: String) {
        if let Some(pb) = &self.spinner {
            pb.set_message(msg);
        }
    }

    fn finish(self) -> Vec<String> {
        if let Some(pb) = &self.spinner {
            pb.finish_and_clear();
        }
        self.lines
    }
}

fn spinner() -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}

/// Process one unit.
///
/// With `live` set, each status line is emitted as soon as it is produced;
/// the lines are always returned in the report as well.
pub fn process_unit<C: Clock>(
    ctx: &UnitContext<'_, C>,
    source: &Path,
    live: Option<&dyn LineSink>,
) -> UnitReport {
    let rel = relative_display(source, &ctx.config.working_dir);
    let mut report = UnitReport {
        source: source.to_path_buf(),
        ..UnitReport::default()
    };

    let loaded = std::fs::read_to_string(source)
        .map_err(|e| ("ReadError", e.to_string()))
        .and_then(|text| {
            scan_source(&text, ctx.rules).map_err(|e| (e.category(), e.to_string()))
        })
        .and_then(|entries| {
            ctx.loader
                .load(source)
                .map(|table| (entries, table))
                .map_err(|e| (e.category(), e.to_string()))
        });

    let (entries, table) = match loaded {
        Ok(loaded) => loaded,
        Err((category, message)) => {
            tracing::warn!(source = %rel, %category, %message, "skipping unit");
            let mut line = format!("{}: SKIPPED ({})", rel, category);
            if ctx.config.verbose > 0 {
                line.push_str(": ");
                line.push_str(&message);
            }
            let mut out = LineWriter {
                lines: Vec::new(),
                live,
                spinner: None,
            };
            out.push(line);
            report.lines = out.finish();
            report.skipped = Some(category.to_string());
            return report;
        }
    };

    tracing::debug!(source = %rel, entries = entries.len(), "processing unit");

    let mut out = LineWriter {
        lines: Vec::new(),
        live,
        spinner: (ctx.progress && live.is_some()).then(spinner),
    };
    let file_name = source
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| rel.clone());

    for (i, entry) in entries.iter().enumerate() {
        out.set_message(format!(
            "Processing '{}' ({}/{})...",
            file_name,
            i + 1,
            entries.len()
        ));
        process_entry(ctx, &table, entry, &rel, &mut report, &mut out);
    }

    report.lines = out.finish();
    report
}

fn process_entry<C: Clock>(
    ctx: &UnitContext<'_, C>,
    table: &SymbolTable,
    entry: &BenchmarkEntry,
    rel: &str,
    report: &mut UnitReport,
    out: &mut LineWriter<'_>,
) {
    let verbose = ctx.config.verbose;
    let width = ctx.config.print_pad_width;

    let entry_failed = |category: &str, message: &str| {
        status_line(
            rel,
            &entry.name,
            width,
            &failure_status(category, message, verbose),
        )
    };

    let variants: Vec<BoundVariant> = match table.get(&entry.name) {
        Some(Symbol::Benchmark(runner)) => vec![BoundVariant::new(runner.clone(), Args::new())],
        Some(Symbol::Parametrized {
            runner,
            params: Ok(params),
        }) => params.variants(runner).collect(),
        Some(Symbol::Parametrized {
            params: Err(err), ..
        }) => {
            report.failures += 1;
            out.push(entry_failed("Parametrize", &err.to_string()));
            return;
        }
        // A prefix-named fixture is timed like a plain benchmark
        Some(Symbol::Fixture(fixture)) => {
            let fixture = fixture.clone();
            let runner = per_call_runner(move |_: &Args| fixture());
            vec![BoundVariant::new(runner, Args::new())]
        }
        None => {
            report.failures += 1;
            let message = format!("`{}` is not registered", entry.name);
            out.push(entry_failed("MissingSymbol", &message));
            return;
        }
    };

    let fixtures = match resolve_fixtures(entry, table) {
        Ok(fixtures) => fixtures,
        Err(err) => {
            for variant in &variants {
                report.failures += 1;
                out.push(status_line(
                    rel,
                    &variant.signature(&entry.name),
                    width,
                    &failure_status(err.category(), &err.to_string(), verbose),
                ));
            }
            return;
        }
    };

    let key = report.key();
    for variant in variants {
        let variant = variant.with_fixtures(&fixtures);
        let signature = variant.signature(&entry.name);
        let prior = if ctx.config.reads_cache() {
            ctx.snapshot.get(&key, &signature)
        } else {
            None
        };

        let status = match ctx.engine.time_variant(&variant, prior) {
            Ok(record) => {
                let status = success_status(
                    record.loop_count,
                    record.score,
                    ctx.config.unit,
                    ctx.loops_pad,
                );
                report.records.insert(signature.clone(), record);
                status
            }
            Err(err) => {
                tracing::debug!(%signature, error = %err, "measurement failed");
                report.failures += 1;
                failure_status(err.category(), &err.to_string(), verbose)
            }
        };
        out.push(status_line(rel, &signature, width, &status));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CalibrationConfig;
    use crate::error::{CallError, LoadError};
    use crate::measure::ManualClock;
    use crate::params::{ArgSet, Parametrization};
    use serde_json::{json, Value};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use tempfile::TempDir;

    const UNIT: &str = r#"
        use speedtest::fixture;

        #[fixture]
        fn n() -> u32 { 42 }

        fn speed_plain() {}

        fn speed_with_fixture(n: u32) {}

        #[speedtest::parametrize("a, b", [(1, 2), (2, 3)])]
        fn speed_add(a: i64, b: i64) -> i64 { a + b }
    "#;

    struct Harness {
        dir: TempDir,
        config: RunConfig,
        clock: ManualClock,
        engine: TimingEngine<ManualClock>,
    }

    impl Harness {
        fn new() -> Self {
            let dir = TempDir::new().unwrap();
            let config = RunConfig {
                working_dir: dir.path().to_path_buf(),
                print_pad_width: 40,
                ..RunConfig::default()
            };
            let clock = ManualClock::new();
            let calibration = CalibrationConfig {
                threshold: Duration::from_millis(10),
                ..CalibrationConfig::default()
            };
            let engine = TimingEngine::with_clock(clock.clone(), calibration, 3);
            Self {
                dir,
                config,
                clock,
                engine,
            }
        }

        fn write(&self, name: &str, text: &str) -> PathBuf {
            let path = self.dir.path().join(name);
            std::fs::write(&path, text).unwrap();
            path
        }

        fn run(&self, source: &Path, loader: &dyn UnitLoader, snapshot: &Cache) -> UnitReport {
            let rules = ScanRules::default();
            let ctx = UnitContext {
                config: &self.config,
                snapshot,
                loader,
                engine: &self.engine,
                rules: &rules,
                loops_pad: 10,
                progress: false,
            };
            process_unit(&ctx, source, None)
        }
    }

    fn ticking(clock: &ManualClock, micros: u64) -> impl Fn(&Args) -> Result<Value, CallError> {
        let clock = clock.clone();
        move |_: &Args| -> Result<Value, CallError> {
            clock.advance(Duration::from_micros(micros));
            Ok(Value::Null)
        }
    }

    #[test]
    fn test_full_unit() {
        let h = Harness::new();
        let source = h.write("speed_unit.rs", UNIT);

        let fixture_calls = Arc::new(AtomicUsize::new(0));
        let seen_n = Arc::new(Mutex::new(None));
        let (clock, calls, seen) = (h.clock.clone(), fixture_calls.clone(), seen_n.clone());

        let loader = move |_: &Path| -> Result<SymbolTable, LoadError> {
            let mut table = SymbolTable::new();
            let calls = calls.clone();
            let seen = seen.clone();
            let tick = clock.clone();
            table
                .insert_fixture("n", move || {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(json!(42))
                })
                .insert_benchmark("speed_plain", ticking(&clock, 100))
                .insert_benchmark("speed_with_fixture", move |args: &Args| {
                    *seen.lock().unwrap() = Some(args.get::<u32>("n")?);
                    tick.advance(Duration::from_micros(100));
                    Ok(Value::Null)
                })
                .insert_parametrized(
                    "speed_add",
                    Parametrization::new(
                        "a, b",
                        vec![
                            ArgSet::Tuple(vec![json!(1), json!(2)]),
                            ArgSet::Tuple(vec![json!(2), json!(3)]),
                        ],
                    ),
                    ticking(&clock, 1000),
                );
            Ok(table)
        };

        let report = h.run(&source, &loader, &Cache::new());

        assert_eq!(report.skipped, None);
        assert_eq!(report.failures, 0);
        assert_eq!(*seen_n.lock().unwrap(), Some(42));
        assert_eq!(fixture_calls.load(Ordering::SeqCst), 1);

        let signatures: Vec<&str> = report.records.keys().map(String::as_str).collect();
        assert_eq!(
            signatures,
            vec![
                "speed_add{'a'=1,'b'=2}",
                "speed_add{'a'=2,'b'=3}",
                "speed_plain",
                "speed_with_fixture"
            ]
        );
        // 100us per call crosses 10ms at 100 loops
        assert_eq!(report.records["speed_plain"].loop_count, 100);
        assert_eq!(report.records["speed_add{'a'=1,'b'=2}"].loop_count, 10);
        assert_eq!(report.records["speed_add{'a'=2,'b'=3}"].params["param__b"], json!(3));

        assert_eq!(report.lines.len(), 4);
        assert_eq!(
            report.lines[0],
            format!(
                "speed_unit.rs:speed_plain {} 100 loops , 100.0 μsec per loop",
                "-".repeat(14)
            )
        );
        assert!(report.lines[2].starts_with("speed_unit.rs:speed_add{'a'=1,'b'=2} "));
    }

    #[test]
    fn test_prior_loop_count_reused() {
        let h = Harness::new();
        let source = h.write("speed_one.rs", "fn speed_plain() {}");
        let clock = h.clock.clone();
        let loader = move |_: &Path| -> Result<SymbolTable, LoadError> {
            let mut table = SymbolTable::new();
            table.insert_benchmark("speed_plain", ticking(&clock, 100));
            Ok(table)
        };

        let mut snapshot = Cache::new();
        snapshot.insert(
            source.to_string_lossy(),
            "speed_plain",
            TimingRecord::new(7, 9.0, &Args::new()),
        );
        let report = h.run(&source, &loader, &snapshot);
        let record = &report.records["speed_plain"];
        assert_eq!(record.loop_count, 7);
        assert!((record.score - 100e-6).abs() < 1e-12);
    }

    #[test]
    fn test_failures_are_not_recorded() {
        let mut h = Harness::new();
        h.config.verbose = 1;
        let source = h.write(
            "speed_bad.rs",
            "fn speed_err() {} fn speed_missing() {} fn speed_needs(data: u8) {} #[speedtest::fixture] fn data() {}",
        );
        let loader = |_: &Path| -> Result<SymbolTable, LoadError> {
            let mut table = SymbolTable::new();
            table
                .insert_benchmark("speed_err", |_| Err(CallError::failed("bad input")))
                .insert_benchmark("speed_needs", |_| Ok(Value::Null))
                .insert_fixture("data", || panic!("no data"));
            Ok(table)
        };

        let report = h.run(&source, &loader, &Cache::new());
        assert!(report.records.is_empty());
        assert_eq!(report.failures, 3);
        assert!(report.lines[0].ends_with(" FAILED (Error): bad input"));
        assert!(report.lines[1].ends_with(" FAILED (MissingSymbol): `speed_missing` is not registered"));
        assert!(report.lines[2].contains(" FAILED (FixtureError): fixture `data` failed"));
    }

    #[test]
    fn test_unit_skipped_on_syntax_or_load_error() {
        let h = Harness::new();
        let broken = h.write("speed_broken.rs", "fn speed_a( {");
        let fine = h.write("speed_fine.rs", "fn speed_a() {}");
        let loader = |p: &Path| -> Result<SymbolTable, LoadError> {
            Err(LoadError::NotRegistered(p.to_path_buf()))
        };

        let report = h.run(&broken, &loader, &Cache::new());
        assert_eq!(report.skipped.as_deref(), Some("SyntaxError"));
        assert_eq!(report.lines, vec!["speed_broken.rs: SKIPPED (SyntaxError)"]);

        let report = h.run(&fine, &loader, &Cache::new());
        assert_eq!(report.lines, vec!["speed_fine.rs: SKIPPED (NotRegistered)"]);
    }

    #[test]
    fn test_live_lines_match_report() {
        let h = Harness::new();
        let source = h.write("speed_live.rs", "fn speed_a() {} fn speed_b() {}");
        let clock = h.clock.clone();
        let loader = move |_: &Path| -> Result<SymbolTable, LoadError> {
            let mut table = SymbolTable::new();
            table
                .insert_benchmark("speed_a", ticking(&clock, 1000))
                .insert_benchmark("speed_b", ticking(&clock, 1000));
            Ok(table)
        };

        let emitted = Mutex::new(Vec::new());
        let sink = |line: &str| emitted.lock().unwrap().push(line.to_string());
        let rules = ScanRules::default();
        let snapshot = Cache::new();
        let ctx = UnitContext {
            config: &h.config,
            snapshot: &snapshot,
            loader: &loader,
            engine: &h.engine,
            rules: &rules,
            loops_pad: 10,
            progress: false,
        };
        let report = process_unit(&ctx, &source, Some(&sink));
        assert_eq!(*emitted.lock().unwrap(), report.lines);
    }
}
