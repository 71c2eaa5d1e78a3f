//! Cache Store
//!
//! The cache maps each source unit's absolute path to the timing records of
//! its variants, keyed by signature. On disk it is a single pretty-printed
//! JSON document at `<cache_dir>/cache.json`:
//!
//! ```json
//! {
//!     "/abs/path/speed_sort.rs": {
//!         "speed_sort{'n'=100}": {
//!             "nloops": 2000,
//!             "score": 0.000104,
//!             "param__n": 100
//!         }
//!     }
//! }
//! ```
//!
//! A session loads the file once into a frozen snapshot that every task
//! reads. Results of the run go into a separate writable [`Cache`] which is
//! merged over the snapshot and written back once, after all tasks finish.

use crate::error::CacheError;
use crate::params::Args;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

/// File name of the persisted cache inside the cache directory
pub const CACHE_FILE: &str = "cache.json";

/// Key prefix of parameter values stored in a record
pub const PARAM_PREFIX: &str = "param__";

/// Loop count and best per-call time of one variant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimingRecord {
    #[serde(rename = "nloops", alias = "loop_count")]
    pub loop_count: u64,
    /// Seconds per call
    pub score: f64,
    /// Bound parameters, keyed `param__<name>`
    #[serde(flatten)]
    pub params: BTreeMap<String, Value>,
}

impl TimingRecord {
    pub fn new(loop_count: u64, score: f64, params: &Args) -> Self {
        Self {
            loop_count,
            score,
            params: params
                .iter()
                .map(|(name, value)| (format!("{PARAM_PREFIX}{name}"), value.clone()))
                .collect(),
        }
    }
}

/// `source path → signature → record`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Cache {
    units: BTreeMap<String, BTreeMap<String, TimingRecord>>,
}

impl Cache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, source: &str, signature: &str) -> Option<&TimingRecord> {
        self.units.get(source)?.get(signature)
    }

    pub fn insert(&mut self, source: impl Into<String>, signature: impl Into<String>, record: TimingRecord) {
        self.units
            .entry(source.into())
            .or_default()
            .insert(signature.into(), record);
    }

    /// Fold one unit's records into this cache.
    pub fn accumulate(&mut self, source: impl Into<String>, records: BTreeMap<String, TimingRecord>) {
        if records.is_empty() {
            return;
        }
        self.units.entry(source.into()).or_default().extend(records);
    }

    /// `self` overlaid with `newer`; records of `newer` win per key.
    pub fn merged(&self, newer: &Cache) -> Cache {
        let mut out = self.clone();
        for (source, records) in &newer.units {
            out.units
                .entry(source.clone())
                .or_default()
                .extend(records.iter().map(|(k, v)| (k.clone(), v.clone())));
        }
        out
    }

    /// Records of one unit
    pub fn unit(&self, source: &str) -> Option<&BTreeMap<String, TimingRecord>> {
        self.units.get(source)
    }

    /// Iterate units in path order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &BTreeMap<String, TimingRecord>)> {
        self.units.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// All loop counts, used to size the status-line column
    pub fn loop_counts(&self) -> impl Iterator<Item = u64> + '_ {
        self.units
            .values()
            .flat_map(|records| records.values().map(|r| r.loop_count))
    }

    /// Number of records across all units
    pub fn len(&self) -> usize {
        self.units.values().map(BTreeMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Frozen view of the cache file plus the location it is persisted to.
#[derive(Debug, Clone)]
pub struct CacheStore {
    dir: PathBuf,
    enabled: bool,
    snapshot: Cache,
}

impl CacheStore {
    /// Read `<dir>/cache.json` once.
    ///
    /// A missing or corrupt file, or a disabled store, gives an empty
    /// snapshot. Any other read failure is returned.
    pub fn load(dir: impl Into<PathBuf>, enabled: bool) -> Result<Self, CacheError> {
        let dir = dir.into();
        let snapshot = if enabled {
            Self::read(&dir.join(CACHE_FILE))?
        } else {
            Cache::new()
        };
        Ok(Self {
            dir,
            enabled,
            snapshot,
        })
    }

    fn read(path: &Path) -> Result<Cache, CacheError> {
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "no cache file");
                return Ok(Cache::new());
            }
            Err(source) => {
                return Err(CacheError::Io {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };

        match serde_json::from_str(&text) {
            Ok(cache) => Ok(cache),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "ignoring corrupt cache file");
                Ok(Cache::new())
            }
        }
    }

    pub fn snapshot(&self) -> &Cache {
        &self.snapshot
    }

    pub fn path(&self) -> PathBuf {
        self.dir.join(CACHE_FILE)
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Write the snapshot merged with `writable`.
    ///
    /// Returns the written path, or `None` when nothing was written.
    pub fn persist(&self, writable: &Cache) -> Result<Option<PathBuf>, CacheError> {
        if !self.enabled || writable.is_empty() {
            return Ok(None);
        }

        let merged = self.snapshot.merged(writable);
        let mut buf = Vec::new();
        let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
        let mut ser = serde_json::Serializer::with_formatter(&mut buf, formatter);
        merged.serialize(&mut ser)?;

        std::fs::create_dir_all(&self.dir).map_err(io_error(&self.dir))?;
        let target = self.path();
        let tmp = self.dir.join(format!("{CACHE_FILE}.tmp"));
        std::fs::write(&tmp, &buf).map_err(io_error(&tmp))?;
        std::fs::rename(&tmp, &target).map_err(io_error(&target))?;

        tracing::debug!(path = %target.display(), records = merged.len(), "cache persisted");
        Ok(Some(target))
    }
}

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> CacheError {
    let path = path.to_path_buf();
    move |source| CacheError::Io { path, source }
}
