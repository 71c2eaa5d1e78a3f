//! Parametrization Expander
//!
//! A parametrize declaration pairs a comma-separated list of argument names
//! with an ordered list of argument sets. Expanding it against a benchmark
//! callable yields one [`BoundVariant`] per set, in input order.
//!
//! A [`Parametrization`] can be expanded any number of times; every call to
//! [`Parametrization::variants`] starts a fresh sequence. A single
//! [`Variants`] iterator is single-pass: once exhausted it keeps returning
//! `None`.

use crate::error::{CallError, ExpandError};
use crate::symbols::{BenchRunner, PreparedCall};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use std::iter::FusedIterator;

/// Ordered keyword arguments bound to a callable.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Args {
    entries: Vec<(String, Value)>,
}

impl Args {
    /// Empty argument list
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(name, value);
        self
    }

    /// Bind `name`, replacing any previous value while keeping its position.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        let name = name.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(n, _)| *n == name) {
            Some(slot) => slot.1 = value,
            None => self.entries.push((name, value)),
        }
    }

    /// Raw bound value
    pub fn value(&self, name: &str) -> Option<&Value> {
        self.entries
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v)
    }

    /// Decode the value bound to `name` into `T`.
    pub fn get<T: DeserializeOwned>(&self, name: &str) -> Result<T, CallError> {
        let value = self
            .value(name)
            .ok_or_else(|| CallError::MissingArgument(name.to_string()))?;
        T::deserialize(value).map_err(|e| CallError::ArgumentType {
            name: name.to_string(),
            message: e.to_string(),
        })
    }

    /// Iterate over `(name, value)` pairs in binding order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries.iter().map(|(n, v)| (n.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// `self` followed by the bindings of `other` that `self` does not have.
    pub fn merged(&self, other: &Args) -> Args {
        let mut out = self.clone();
        for (name, value) in &other.entries {
            if out.value(name).is_none() {
                out.entries.push((name.clone(), value.clone()));
            }
        }
        out
    }

    /// Canonical text used in cache signatures: `{'a'=1,'b'="x"}`, or the
    /// empty string when nothing is bound.
    pub fn canonical(&self) -> String {
        if self.entries.is_empty() {
            return String::new();
        }
        let parts: Vec<String> = self
            .entries
            .iter()
            .map(|(n, v)| format!("'{}'={}", n, v))
            .collect();
        format!("{{{}}}", parts.join(","))
    }
}

/// One argument set of a parametrize declaration.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum ArgSet {
    /// Positional values zipped with the declared names
    Tuple(Vec<Value>),
    /// A single value bound to the first declared name
    Scalar(Value),
}

/// A validated parametrize declaration.
#[derive(Debug, Clone, PartialEq)]
pub struct Parametrization {
    names: Vec<String>,
    sets: Vec<ArgSet>,
}

impl Parametrization {
    /// Parse `argnames` (e.g. `"a, b"`) and validate every set against it.
    pub fn new(argnames: &str, sets: Vec<ArgSet>) -> Result<Self, ExpandError> {
        let names: Vec<String> = argnames
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
        if names.is_empty() {
            return Err(ExpandError::NoNames);
        }

        for (index, set) in sets.iter().enumerate() {
            if let ArgSet::Tuple(values) = set {
                if values.len() != names.len() {
                    return Err(ExpandError::Arity {
                        index,
                        expected: names.len(),
                        got: values.len(),
                    });
                }
            }
        }

        Ok(Self { names, sets })
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Number of variants this declaration expands into
    pub fn len(&self) -> usize {
        self.sets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sets.is_empty()
    }

    /// Start a fresh expansion against `runner`.
    pub fn variants(&self, runner: &BenchRunner) -> Variants<'_> {
        Variants {
            runner: runner.clone(),
            names: &self.names,
            sets: self.sets.iter(),
        }
    }
}

fn bind(names: &[String], set: &ArgSet) -> Args {
    let mut args = Args::new();
    match set {
        ArgSet::Tuple(values) => {
            for (name, value) in names.iter().zip(values) {
                args.insert(name.clone(), value.clone());
            }
        }
        ArgSet::Scalar(value) => {
            if let Some(first) = names.first() {
                args.insert(first.clone(), value.clone());
            }
        }
    }
    args
}

/// Single-pass sequence of bound variants.
pub struct Variants<'a> {
    runner: BenchRunner,
    names: &'a [String],
    sets: std::slice::Iter<'a, ArgSet>,
}

impl Iterator for Variants<'_> {
    type Item = BoundVariant;

    fn next(&mut self) -> Option<Self::Item> {
        let set = self.sets.next()?;
        Some(BoundVariant::new(
            self.runner.clone(),
            bind(self.names, set),
        ))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.sets.size_hint()
    }
}

impl ExactSizeIterator for Variants<'_> {}
impl FusedIterator for Variants<'_> {}

/// A benchmark callable with its parametrize values (and, once resolved,
/// fixture values) pre-bound.
#[derive(Clone)]
pub struct BoundVariant {
    runner: BenchRunner,
    params: Args,
    call_args: Args,
}

impl BoundVariant {
    pub fn new(runner: BenchRunner, params: Args) -> Self {
        Self {
            runner,
            call_args: params.clone(),
            params,
        }
    }

    /// Bind fixture values on top of the parametrize values.
    pub fn with_fixtures(mut self, fixtures: &Args) -> Self {
        self.call_args = self.params.merged(fixtures);
        self
    }

    /// Parametrize values only; these form the cache signature.
    pub fn params(&self) -> &Args {
        &self.params
    }

    /// Cache signature for this variant of entry `name`.
    pub fn signature(&self, name: &str) -> String {
        format!("{}{}", name, self.params.canonical())
    }

    /// Decode the bound arguments and return the call to time.
    pub fn prepare(&self) -> Result<PreparedCall, CallError> {
        (self.runner)(&self.call_args)
    }

    /// Prepare and invoke the callable once.
    pub fn call(&self) -> Result<Value, CallError> {
        let mut call = self.prepare()?;
        call()
    }
}

impl std::fmt::Debug for BoundVariant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoundVariant")
            .field("params", &self.params)
            .field("call_args", &self.call_args)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use crate::symbols::per_call_runner;

    fn adder() -> BenchRunner {
        per_call_runner(|args: &Args| {
            let a: i64 = args.get("a")?;
            let b: i64 = args.get("b")?;
            Ok(json!(a + b))
        })
    }

    #[test]
    fn test_two_sets_yield_two_callables_in_order() {
        let p = Parametrization::new(
            "a,b",
            vec![
                ArgSet::Tuple(vec![json!(1), json!(2)]),
                ArgSet::Tuple(vec![json!(2), json!(3)]),
            ],
        )
        .unwrap();

        let results: Vec<Value> = p
            .variants(&adder())
            .map(|v| v.call().unwrap())
            .collect();
        assert_eq!(results, vec![json!(3), json!(5)]);
    }

    #[test]
    fn test_names_are_trimmed() {
        let p = Parametrization::new(" a , b ", vec![]).unwrap();
        assert_eq!(p.names(), &["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn test_scalar_binds_first_name() {
        let p = Parametrization::new("a", vec![ArgSet::Scalar(json!(1)), ArgSet::Scalar(json!(2))])
            .unwrap();
        let square = per_call_runner(|args: &Args| {
            let a: i64 = args.get("a")?;
            Ok(json!(a * a))
        });
        let out: Vec<Value> = p.variants(&square).map(|v| v.call().unwrap()).collect();
        assert_eq!(out, vec![json!(1), json!(4)]);
    }

    #[test]
    fn test_arity_mismatch_rejected() {
        let err = Parametrization::new("a,b", vec![ArgSet::Tuple(vec![json!(1)])]).unwrap_err();
        assert_eq!(
            err,
            ExpandError::Arity {
                index: 0,
                expected: 2,
                got: 1
            }
        );
        assert_eq!(Parametrization::new(" , ", vec![]), Err(ExpandError::NoNames));
    }

    #[test]
    fn test_iterator_is_single_pass() {
        let p = Parametrization::new("a,b", vec![ArgSet::Tuple(vec![json!(1), json!(2)])]).unwrap();
        let mut variants = p.variants(&adder());
        assert_eq!(variants.len(), 1);
        assert_eq!(variants.by_ref().count(), 1);
        assert!(variants.next().is_none());

        // The declaration itself restarts
        assert_eq!(p.variants(&adder()).count(), 1);
    }

    #[test]
    fn test_signature_uses_params_only() {
        let p = Parametrization::new("a,b", vec![ArgSet::Tuple(vec![json!(1), json!("x")])]).unwrap();
        let variant = p
            .variants(&adder())
            .next()
            .unwrap()
            .with_fixtures(&Args::new().with("n", 42));

        assert_eq!(variant.signature("speed_add"), r#"speed_add{'a'=1,'b'="x"}"#);
        assert_eq!(
            BoundVariant::new(adder(), Args::new()).signature("speed_plain"),
            "speed_plain"
        );
    }

    #[test]
    fn test_fixtures_do_not_override_params() {
        let merged = Args::new().with("a", 1).merged(&Args::new().with("a", 9).with("n", 42));
        assert_eq!(merged.value("a"), Some(&json!(1)));
        assert_eq!(merged.get::<i64>("n").unwrap(), 42);
    }

    #[test]
    fn test_get_reports_missing_and_mistyped() {
        let args = Args::new().with("a", "text");
        assert_eq!(
            args.get::<i64>("b"),
            Err(CallError::MissingArgument("b".to_string()))
        );
        assert_eq!(args.get::<i64>("a").unwrap_err().category(), "ArgumentType");
    }

    #[test]
    fn test_argset_deserializes_untagged() {
        let sets: Vec<ArgSet> = serde_json::from_str("[[1, 2], 3]").unwrap();
        assert_eq!(
            sets,
            vec![ArgSet::Tuple(vec![json!(1), json!(2)]), ArgSet::Scalar(json!(3))]
        );
    }
}
