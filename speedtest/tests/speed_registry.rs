//! Integration tests for speedtest
//!
//! This file is itself a benchmark unit: the attribute macros register its
//! functions and the session below scans and times it end to end.

use speedtest::{
    export, fixture, mark, parametrize, Args, BoundVariant, CalibrationConfig, CallError,
    RegistryLoader, RunConfig, Session, Symbol, TimingEngine, UnitLoader,
};
use serde::{Deserialize, Deserializer, Serialize};
use std::cell::Cell;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

static BASE_CALLS: AtomicUsize = AtomicUsize::new(0);

thread_local! {
    static PAYLOAD_DECODES: Cell<usize> = const { Cell::new(0) };
}

/// Large fixture value that counts its decodes on the current thread
#[derive(Serialize)]
struct Payload(Vec<u64>);

impl<'de> Deserialize<'de> for Payload {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        PAYLOAD_DECODES.with(|n| n.set(n.get() + 1));
        Vec::deserialize(deserializer).map(Payload)
    }
}

#[fixture]
fn n() -> i64 {
    42
}

#[fixture]
fn base() -> i64 {
    BASE_CALLS.fetch_add(1, Ordering::SeqCst);
    10
}

#[export]
fn speed_plain() -> u64 {
    (0..100u64).sum()
}

#[export]
fn speed_with_fixture(n: i64) -> i64 {
    n * 2
}

#[parametrize("a, b", [(1, 2), (2, 3)])]
#[mark]
fn add_pair(a: i64, b: i64) -> i64 {
    a + b
}

#[parametrize("a", [1, 2, 3])]
#[export]
fn speed_offset(a: i64, base: i64) -> i64 {
    a + base
}

#[fixture]
fn payload() -> Payload {
    Payload((0..100_000).collect())
}

#[export]
fn speed_payload_head(payload: &Payload) -> u64 {
    payload.0[0]
}

#[export]
fn speed_label(label: &str) -> usize {
    label.len()
}

fn unit_path() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("speed_registry.rs")
}

fn fast_config(working_dir: &Path) -> RunConfig {
    RunConfig {
        sources: vec![unit_path()],
        working_dir: working_dir.to_path_buf(),
        nreps: 1,
        quiet: true,
        calibration: CalibrationConfig {
            threshold: Duration::from_millis(1),
            ..CalibrationConfig::default()
        },
        ..RunConfig::default()
    }
}

#[test]
fn test_registry_loads_unit_symbols() {
    let table = RegistryLoader.load(&unit_path()).unwrap();

    assert!(matches!(table.get("speed_plain"), Some(Symbol::Benchmark(_))));
    assert!(matches!(table.get("n"), Some(Symbol::Fixture(_))));
    assert!(matches!(table.get("base"), Some(Symbol::Fixture(_))));
    match table.get("add_pair") {
        Some(Symbol::Parametrized { params: Ok(params), .. }) => {
            assert_eq!(params.names(), ["a", "b"]);
            assert_eq!(params.len(), 2);
        }
        other => panic!("expected parametrized symbol, got {:?}", other),
    }
    // Helpers without an attribute are not registered
    assert!(table.get("unit_path").is_none());
}

#[test]
fn test_unregistered_unit_rejected() {
    let err = RegistryLoader
        .load(Path::new("/nowhere/speed_missing.rs"))
        .unwrap_err();
    assert_eq!(err.category(), "NotRegistered");
}

#[test]
fn test_wrapper_decodes_arguments() {
    let table = RegistryLoader.load(&unit_path()).unwrap();
    let Some(Symbol::Benchmark(runner)) = table.get("speed_with_fixture") else {
        panic!("speed_with_fixture not registered");
    };

    let mut call = runner(&Args::new().with("n", 21)).unwrap();
    assert!(call().is_ok());
    assert!(matches!(runner(&Args::new()), Err(CallError::MissingArgument(_))));
    let err = runner(&Args::new().with("n", "twenty")).err().unwrap();
    assert_eq!(err.category(), "ArgumentType");

    // Borrowed `&str` parameters decode into an owned String
    let Some(Symbol::Benchmark(label)) = table.get("speed_label") else {
        panic!("speed_label not registered");
    };
    let mut call = label(&Args::new().with("label", "abc")).unwrap();
    assert!(call().is_ok());
}

#[test]
fn test_wrapper_decodes_fixture_once_per_variant() {
    let table = RegistryLoader.load(&unit_path()).unwrap();
    let Some(Symbol::Benchmark(runner)) = table.get("speed_payload_head") else {
        panic!("speed_payload_head not registered");
    };
    let data: Vec<u64> = (0..100_000).collect();
    let args = Args::new().with("payload", data);

    let before = PAYLOAD_DECODES.with(Cell::get);
    let mut call = runner(&args).unwrap();
    for _ in 0..100 {
        assert!(call().is_ok());
    }
    assert_eq!(PAYLOAD_DECODES.with(Cell::get) - before, 1);

    // Timing a bound variant prepares it once for calibration and all trials
    let variant = BoundVariant::new(runner.clone(), Args::new()).with_fixtures(&args);
    let engine = TimingEngine::new(
        CalibrationConfig {
            threshold: Duration::from_millis(1),
            ..CalibrationConfig::default()
        },
        3,
    );
    let before = PAYLOAD_DECODES.with(Cell::get);
    let record = engine.time_variant(&variant, None).unwrap();
    assert!(record.loop_count > 1);
    assert_eq!(PAYLOAD_DECODES.with(Cell::get) - before, 1);
}

#[test]
fn test_session_times_this_unit() {
    let dir = tempfile::tempdir().unwrap();
    let lines = Mutex::new(Vec::new());
    let sink = |line: &str| lines.lock().unwrap().push(line.to_string());

    let first = Session::new(fast_config(dir.path())).run(&sink).unwrap();
    assert_eq!(first.units, 1);
    assert_eq!(first.skipped, 0);
    // `speed_label` has no fixture or parameter named `label`
    assert_eq!(first.failed, 1);
    // The fixture runs once for all three variants
    assert_eq!(BASE_CALLS.load(Ordering::SeqCst), 1);

    let (_, records) = first.writable.iter().next().unwrap();
    let signatures: Vec<&str> = records.keys().map(String::as_str).collect();
    assert_eq!(
        signatures,
        [
            "add_pair{'a'=1,'b'=2}",
            "add_pair{'a'=2,'b'=3}",
            "speed_offset{'a'=1}",
            "speed_offset{'a'=2}",
            "speed_offset{'a'=3}",
            "speed_payload_head",
            "speed_plain",
            "speed_with_fixture",
        ]
    );
    assert!(records.values().all(|r| r.loop_count >= 1 && r.score >= 0.0));
    assert!(first.cache_file.as_deref().is_some_and(Path::is_file));

    let printed = lines.lock().unwrap().clone();
    assert_eq!(printed[0], "collected 1 file, best of 1:");
    assert!(printed
        .iter()
        .any(|l| l.contains("speed_label") && l.ends_with("FAILED (MissingArgument)")));
    assert!(printed
        .iter()
        .any(|l| l.contains("add_pair{'a'=2,'b'=3} ") && l.ends_with(" per loop")));

    // A second run reuses every calibrated loop count
    let second = Session::new(fast_config(dir.path())).run(&sink).unwrap();
    assert_eq!(BASE_CALLS.load(Ordering::SeqCst), 2);
    let (_, again) = second.writable.iter().next().unwrap();
    for (signature, record) in records {
        assert_eq!(again[signature].loop_count, record.loop_count, "{}", signature);
    }
}
