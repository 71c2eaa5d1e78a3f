//! Fixture Resolver

use crate::error::FixtureError;
use crate::params::Args;
use crate::scanner::BenchmarkEntry;
use crate::symbols::{catch_call, Symbol, SymbolTable};

/// Compute every fixture the entry asks for, once.
///
/// The returned arguments are shared by all variants of the entry.
pub fn resolve_fixtures(entry: &BenchmarkEntry, table: &SymbolTable) -> Result<Args, FixtureError> {
    let mut args = Args::new();
    for name in &entry.fixtures {
        let runner = match table.get(name) {
            Some(Symbol::Fixture(runner)) => runner,
            _ => return Err(FixtureError::Missing(name.clone())),
        };
        let value = catch_call(|| runner()).map_err(|source| FixtureError::Failed {
            name: name.clone(),
            source,
        })?;
        tracing::debug!(entry = %entry.name, fixture = %name, "resolved fixture");
        args.insert(name.clone(), value);
    }
    Ok(args)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CallError;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn entry(fixtures: &[&str]) -> BenchmarkEntry {
        BenchmarkEntry {
            name: "speed_x".to_string(),
            fixtures: fixtures.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn test_each_fixture_called_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let mut table = SymbolTable::new();
        table.insert_fixture("n", move || {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(json!(42))
        });

        let args = resolve_fixtures(&entry(&["n"]), &table).unwrap();
        assert_eq!(args.get::<u32>("n").unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_missing_fixture() {
        let err = resolve_fixtures(&entry(&["gone"]), &SymbolTable::new()).unwrap_err();
        assert_eq!(err, FixtureError::Missing("gone".to_string()));
        assert_eq!(err.category(), "MissingFixture");
    }

    #[test]
    fn test_failing_and_panicking_fixtures() {
        let mut table = SymbolTable::new();
        table
            .insert_fixture("bad", || Err(CallError::failed("no data")))
            .insert_fixture("boom", || panic!("fixture exploded"));

        let err = resolve_fixtures(&entry(&["bad"]), &table).unwrap_err();
        assert_eq!(err.category(), "FixtureError");

        match resolve_fixtures(&entry(&["boom"]), &table).unwrap_err() {
            FixtureError::Failed { name, source } => {
                assert_eq!(name, "boom");
                assert_eq!(source, CallError::Panic("fixture exploded".to_string()));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
