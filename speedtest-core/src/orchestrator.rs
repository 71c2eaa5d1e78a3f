//! Execution Orchestrator
//!
//! A [`Session`] discovers benchmark units, runs one task per unit either
//! sequentially or on a worker pool, and folds the per-unit results into the
//! run's writable cache before persisting it.
//!
//! In sequential mode every status line reaches the sink as soon as it is
//! produced. In parallel mode a unit's lines are replayed only once that
//! unit has finished, in the order units finish; lines of one unit are never
//! interleaved with another's.

use crate::cache::{Cache, CacheStore};
use crate::config::RunConfig;
use crate::error::SessionError;
use crate::format::loops_pad_width;
use crate::measure::{Clock, SystemClock};
use crate::scanner::ScanRules;
use crate::symbols::{RegistryLoader, UnitLoader};
use crate::timing::TimingEngine;
use crate::unit::{process_unit, UnitContext, UnitReport};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Receives finished status lines.
pub trait LineSink: Sync {
    fn emit(&self, line: &str);
}

impl<F> LineSink for F
where
    F: Fn(&str) + Sync,
{
    fn emit(&self, line: &str) {
        self(line)
    }
}

// ─── Discovery ───────────────────────────────────────────────────────────────

/// Whether `path` names a benchmark unit: `speed*.rs`, case-insensitive.
pub fn is_benchmark_file(path: &Path) -> bool {
    let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
        return false;
    };
    let name = name.to_ascii_lowercase();
    name.starts_with("speed") && name.ends_with(".rs")
}

fn expand_home(path: &Path) -> PathBuf {
    if let Ok(rest) = path.strip_prefix("~") {
        if let Some(home) = std::env::var_os("HOME") {
            return PathBuf::from(home).join(rest);
        }
    }
    path.to_path_buf()
}

fn is_ignored_dir(entry: &walkdir::DirEntry) -> bool {
    entry.depth() > 0
        && entry.file_type().is_dir()
        && entry
            .file_name()
            .to_str()
            .map(|n| n == "target" || n.starts_with('.'))
            .unwrap_or(false)
}

/// Resolve configured sources into a sorted, duplicate-free list of units.
///
/// Relative sources are taken from `working_dir`. Missing paths are skipped.
/// Directories are searched recursively, ignoring `target` and hidden
/// directories.
pub fn discover_sources(sources: &[PathBuf], working_dir: &Path) -> Vec<PathBuf> {
    let mut found = BTreeSet::new();
    let mut add = |path: &Path| {
        let path = std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf());
        found.insert(path);
    };

    for source in sources {
        let path = working_dir.join(expand_home(source));
        if path.is_file() {
            if is_benchmark_file(&path) {
                add(&path);
            }
        } else if path.is_dir() {
            for entry in WalkDir::new(&path)
                .follow_links(true)
                .into_iter()
                .filter_entry(|e| !is_ignored_dir(e))
                .filter_map(Result::ok)
            {
                if entry.file_type().is_file() && is_benchmark_file(entry.path()) {
                    add(entry.path());
                }
            }
        } else {
            tracing::debug!(path = %path.display(), "source does not exist, skipping");
        }
    }

    found.into_iter().collect()
}

// ─── Session ─────────────────────────────────────────────────────────────────

/// Summary of a finished session
#[derive(Debug, Clone, Default)]
pub struct SessionOutcome {
    /// Records produced by this run
    pub writable: Cache,
    /// Units discovered
    pub units: usize,
    /// Failed variants or entries
    pub failed: usize,
    /// Units skipped as a whole
    pub skipped: usize,
    /// Cache file written, if any
    pub cache_file: Option<PathBuf>,
}

/// One benchmark run over a set of sources.
pub struct Session<C: Clock = SystemClock> {
    config: RunConfig,
    loader: Box<dyn UnitLoader>,
    engine: TimingEngine<C>,
    rules: ScanRules,
}

impl Session<SystemClock> {
    /// Session resolving symbols from the link-time registry
    pub fn new(config: RunConfig) -> Self {
        let engine = TimingEngine::new(config.calibration, config.nreps);
        Self {
            config,
            loader: Box::new(RegistryLoader),
            engine,
            rules: ScanRules::default(),
        }
    }
}

impl<C: Clock> Session<C> {
    pub fn with_loader(mut self, loader: impl UnitLoader + 'static) -> Self {
        self.loader = Box::new(loader);
        self
    }

    pub fn with_clock<D: Clock>(self, clock: D) -> Session<D> {
        Session {
            engine: TimingEngine::with_clock(clock, self.config.calibration, self.config.nreps),
            config: self.config,
            loader: self.loader,
            rules: self.rules,
        }
    }

    pub fn with_rules(mut self, rules: ScanRules) -> Self {
        self.rules = rules;
        self
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    /// Discover, time and persist.
    pub fn run(&self, sink: &dyn LineSink) -> Result<SessionOutcome, SessionError> {
        self.config.validate()?;

        let mut config = self.config.clone();
        if let Ok(dir) = std::fs::canonicalize(&config.working_dir) {
            config.working_dir = dir;
        }

        let sources = discover_sources(&config.sources, &config.working_dir);
        sink.emit(&format!(
            "collected {} file{}, best of {}:",
            sources.len(),
            if sources.len() == 1 { "" } else { "s" },
            config.nreps
        ));

        let store = CacheStore::load(config.cache_path(), config.writes_cache())?;
        let ctx = UnitContext {
            config: &config,
            snapshot: store.snapshot(),
            loader: self.loader.as_ref(),
            engine: &self.engine,
            rules: &self.rules,
            loops_pad: loops_pad_width(store.snapshot()),
            progress: !config.quiet,
        };

        let reports = if !config.parallel || sources.len() <= 1 {
            run_sequential(&ctx, &sources, sink)
        } else {
            run_parallel(&ctx, &sources, config.pool_size(sources.len()), sink)?
        };

        let mut outcome = SessionOutcome {
            units: sources.len(),
            ..SessionOutcome::default()
        };
        for report in reports {
            outcome.failed += report.failures;
            if report.skipped.is_some() {
                outcome.skipped += 1;
            }
            let key = report.key();
            outcome.writable.accumulate(key, report.records);
        }

        outcome.cache_file = store.persist(&outcome.writable)?;
        tracing::info!(
            units = outcome.units,
            records = outcome.writable.len(),
            failed = outcome.failed,
            skipped = outcome.skipped,
            "session complete"
        );
        Ok(outcome)
    }
}

fn run_sequential<C: Clock>(
    ctx: &UnitContext<'_, C>,
    sources: &[PathBuf],
    sink: &dyn LineSink,
) -> Vec<UnitReport> {
    sources
        .iter()
        .map(|source| process_unit(ctx, source, Some(sink)))
        .collect()
}

fn run_parallel<C: Clock>(
    ctx: &UnitContext<'_, C>,
    sources: &[PathBuf],
    workers: usize,
    sink: &dyn LineSink,
) -> Result<Vec<UnitReport>, SessionError> {
    tracing::debug!(workers, units = sources.len(), "starting worker pool");
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(workers)
        .thread_name(|i| format!("speedtest-worker-{}", i))
        .build()
        .map_err(|e| SessionError::Pool(e.to_string()))?;

    let (tx, rx) = crossbeam_channel::unbounded::<UnitReport>();
    let mut reports = Vec::with_capacity(sources.len());

    std::thread::scope(|scope| {
        let pool = &pool;
        scope.spawn(move || {
            pool.scope(|s| {
                for source in sources {
                    let tx = tx.clone();
                    s.spawn(move |_| {
                        let report = process_unit(ctx, source, None);
                        let _ = tx.send(report);
                    });
                }
            });
            // The last sender drops here and ends the receive loop
        });

        for report in rx.iter() {
            for line in &report.lines {
                sink.emit(line);
            }
            reports.push(report);
        }
    });

    Ok(reports)
}
