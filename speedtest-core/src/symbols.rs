//! Symbol Tables
//!
//! Benchmark units register their functions through `inventory` at link time.
//! A [`UnitLoader`] turns one source path into a fresh [`SymbolTable`] holding
//! only that unit's callables, so two units defining identically named
//! functions never see each other.

use crate::error::{CallError, ExpandError, LoadError};
use crate::params::{Args, Parametrization};
use crate::{SymbolDef, SymbolKind};
use serde_json::Value;
use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Benchmark call with its arguments already decoded. Timing loops invoke
/// it repeatedly; the decoded values live as long as the closure.
pub type PreparedCall = Box<dyn FnMut() -> Result<Value, CallError>>;

/// Benchmark callable: decodes its bound keyword arguments once and returns
/// the call to time.
pub type BenchRunner = Arc<dyn Fn(&Args) -> Result<PreparedCall, CallError> + Send + Sync>;

/// Adapt a callable that reads its arguments on every call.
///
/// The arguments are cloned once when the call is prepared.
pub fn per_call_runner<F>(f: F) -> BenchRunner
where
    F: Fn(&Args) -> Result<Value, CallError> + Send + Sync + 'static,
{
    let f = Arc::new(f);
    Arc::new(move |args: &Args| -> Result<PreparedCall, CallError> {
        let f = Arc::clone(&f);
        let args = args.clone();
        Ok(Box::new(move || f(&args)))
    })
}

/// Zero-argument fixture callable.
pub type FixtureRunner = Arc<dyn Fn() -> Result<Value, CallError> + Send + Sync>;

/// A named value in a unit's symbol table.
#[derive(Clone)]
pub enum Symbol {
    /// Plain benchmark callable
    Benchmark(BenchRunner),
    /// Benchmark callable with a parametrize declaration. A malformed
    /// declaration is kept so the entry can be reported as failed.
    Parametrized {
        runner: BenchRunner,
        params: Result<Parametrization, ExpandError>,
    },
    /// Fixture callable
    Fixture(FixtureRunner),
}

impl std::fmt::Debug for Symbol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Symbol::Benchmark(_) => f.write_str("Benchmark"),
            Symbol::Parametrized { params, .. } => {
                f.debug_struct("Parametrized").field("params", params).finish()
            }
            Symbol::Fixture(_) => f.write_str("Fixture"),
        }
    }
}

/// Name → symbol map for one source unit.
#[derive(Debug, Clone, Default)]
pub struct SymbolTable {
    symbols: HashMap<String, Symbol>,
}

impl SymbolTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a symbol.
    pub fn insert(&mut self, name: impl Into<String>, symbol: Symbol) -> &mut Self {
        self.symbols.insert(name.into(), symbol);
        self
    }

    pub fn insert_benchmark<F>(&mut self, name: impl Into<String>, f: F) -> &mut Self
    where
        F: Fn(&Args) -> Result<Value, CallError> + Send + Sync + 'static,
    {
        self.insert(name, Symbol::Benchmark(per_call_runner(f)))
    }

    pub fn insert_parametrized<F>(
        &mut self,
        name: impl Into<String>,
        params: Result<Parametrization, ExpandError>,
        f: F,
    ) -> &mut Self
    where
        F: Fn(&Args) -> Result<Value, CallError> + Send + Sync + 'static,
    {
        self.insert(
            name,
            Symbol::Parametrized {
                runner: per_call_runner(f),
                params,
            },
        )
    }

    pub fn insert_fixture<F>(&mut self, name: impl Into<String>, f: F) -> &mut Self
    where
        F: Fn() -> Result<Value, CallError> + Send + Sync + 'static,
    {
        self.symbols.insert(name.into(), Symbol::Fixture(Arc::new(f)));
        self
    }

    pub fn get(&self, name: &str) -> Option<&Symbol> {
        self.symbols.get(name)
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }
}

/// Produces the symbol table for one source unit.
pub trait UnitLoader: Send + Sync {
    fn load(&self, source: &Path) -> Result<SymbolTable, LoadError>;
}

impl<F> UnitLoader for F
where
    F: Fn(&Path) -> Result<SymbolTable, LoadError> + Send + Sync,
{
    fn load(&self, source: &Path) -> Result<SymbolTable, LoadError> {
        self(source)
    }
}

/// Loads symbols registered with the `speedtest` attribute macros.
///
/// A registration belongs to `source` when its `file!()` path is a
/// component-wise suffix of it. When several registered paths match, only
/// the longest one is the unit.
#[derive(Debug, Clone, Copy, Default)]
pub struct RegistryLoader;

impl UnitLoader for RegistryLoader {
    fn load(&self, source: &Path) -> Result<SymbolTable, LoadError> {
        let defs = matching_defs(source, inventory::iter::<SymbolDef>);
        if defs.is_empty() {
            return Err(LoadError::NotRegistered(PathBuf::from(source)));
        }

        let mut table = SymbolTable::new();
        for def in defs {
            if table.get(def.name).is_some() {
                tracing::warn!(
                    file = def.file,
                    name = def.name,
                    "symbol registered twice for one unit, keeping the first"
                );
                continue;
            }
            tracing::debug!(file = def.file, name = def.name, "registered symbol");
            table.insert(def.name, symbol_for(def));
        }
        Ok(table)
    }
}

/// Registrations whose file is the longest suffix of `source`.
fn matching_defs<'a, I>(source: &Path, defs: I) -> Vec<&'a SymbolDef>
where
    I: IntoIterator<Item = &'a SymbolDef>,
{
    let depth = |def: &SymbolDef| Path::new(def.file).components().count();
    let matched: Vec<&SymbolDef> = defs
        .into_iter()
        .filter(|def| source.ends_with(Path::new(def.file)))
        .collect();

    let Some(longest) = matched.iter().map(|def| depth(*def)).max() else {
        return matched;
    };
    let (kept, shadowed): (Vec<&SymbolDef>, Vec<&SymbolDef>) =
        matched.into_iter().partition(|def| depth(*def) == longest);
    for def in shadowed {
        tracing::debug!(
            file = def.file,
            name = def.name,
            "ignoring registration from a shorter matching path"
        );
    }
    kept
}

fn symbol_for(def: &SymbolDef) -> Symbol {
    match def.kind {
        SymbolKind::Benchmark { runner, params: None } => Symbol::Benchmark(Arc::new(runner)),
        SymbolKind::Benchmark {
            runner,
            params: Some(params),
        } => {
            let params = catch_unwind(params).unwrap_or_else(|payload| {
                Err(ExpandError::Value(
                    CallError::from_panic(payload).to_string(),
                ))
            });
            Symbol::Parametrized {
                runner: Arc::new(runner),
                params,
            }
        }
        SymbolKind::Fixture { runner } => Symbol::Fixture(Arc::new(runner)),
    }
}

/// Invoke a callable, converting a panic into [`CallError::Panic`].
#[inline]
pub(crate) fn catch_call<T, F>(f: F) -> Result<T, CallError>
where
    F: FnOnce() -> Result<T, CallError>,
{
    catch_unwind(AssertUnwindSafe(f)).unwrap_or_else(|payload| Err(CallError::from_panic(payload)))
}
