//! Error Taxonomy
//!
//! Every failure is caught at the narrowest scope that can report it: a
//! `CallError` fails one variant, a `FixtureError` fails one entry, a
//! `ScanError`/`LoadError` skips one source unit. Only `CacheError` and
//! `ConfigError` reach the caller of a session.

use std::path::PathBuf;
use thiserror::Error;

/// Failure raised while invoking a benchmark or fixture callable.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CallError {
    /// The callable returned an error value
    #[error("{0}")]
    Failed(String),

    /// The callable panicked
    #[error("{0}")]
    Panic(String),

    /// A parameter had no bound value
    #[error("missing argument `{0}`")]
    MissingArgument(String),

    /// A bound value could not be decoded into the parameter type
    #[error("argument `{name}` could not be decoded: {message}")]
    ArgumentType { name: String, message: String },
}

impl CallError {
    /// Wrap any displayable error returned by user code.
    pub fn failed(err: impl std::fmt::Display) -> Self {
        CallError::Failed(err.to_string())
    }

    /// Short category name shown in `FAILED (...)` status lines.
    pub fn category(&self) -> &'static str {
        match self {
            CallError::Failed(_) => "Error",
            CallError::Panic(_) => "Panic",
            CallError::MissingArgument(_) => "MissingArgument",
            CallError::ArgumentType { .. } => "ArgumentType",
        }
    }

    /// Convert a `catch_unwind` payload into a `Panic` error.
    pub(crate) fn from_panic(payload: Box<dyn std::any::Any + Send>) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&str>() {
            s.to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "Unknown panic".to_string()
        };
        CallError::Panic(message)
    }
}

/// A source unit could not be parsed.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ScanError {
    #[error("syntax error at {line}:{column}: {message}")]
    Syntax {
        line: usize,
        column: usize,
        message: String,
    },
}

impl ScanError {
    pub fn category(&self) -> &'static str {
        "SyntaxError"
    }
}

/// A source unit's symbol table could not be produced.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LoadError {
    #[error("no symbols registered for {0}")]
    NotRegistered(PathBuf),

    #[error("failed to load {path}: {message}")]
    Failed { path: PathBuf, message: String },
}

impl LoadError {
    pub fn category(&self) -> &'static str {
        match self {
            LoadError::NotRegistered(_) => "NotRegistered",
            LoadError::Failed { .. } => "LoadError",
        }
    }
}

/// A parametrize declaration is malformed.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ExpandError {
    #[error("parametrize requires at least one argument name")]
    NoNames,

    #[error("argument set {index} has {got} values but {expected} names were declared")]
    Arity {
        index: usize,
        expected: usize,
        got: usize,
    },

    #[error("argument value could not be converted: {0}")]
    Value(String),
}

impl From<serde_json::Error> for ExpandError {
    fn from(e: serde_json::Error) -> Self {
        ExpandError::Value(e.to_string())
    }
}

/// A fixture needed by an entry could not be computed.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FixtureError {
    #[error("fixture `{0}` is not registered")]
    Missing(String),

    #[error("fixture `{name}` failed: {source}")]
    Failed { name: String, source: CallError },
}

impl FixtureError {
    /// Category shown in `FAILED (...)` status lines.
    pub fn category(&self) -> &'static str {
        match self {
            FixtureError::Missing(_) => "MissingFixture",
            FixtureError::Failed { .. } => "FixtureError",
        }
    }
}

/// Cache read/write failure.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cache serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Invalid run configuration.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("nreps must be at least 1")]
    InvalidNreps,

    #[error("unit `{0}` unrecognised")]
    UnknownUnit(String),
}

/// Errors that halt a whole session.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error("failed to start worker pool: {0}")]
    Pool(String),
}
