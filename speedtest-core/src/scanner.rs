//! Source Scanner
//!
//! Reads the text of a benchmark unit and reports which top-level functions
//! are benchmark entries and which fixtures each of them takes. The unit is
//! parsed with `syn`; nothing is compiled or executed.
//!
//! A function is an entry when its name carries the benchmark prefix or when
//! it is annotated with `mark`. A non-prefixed function annotated with
//! `fixture` is a fixture. Both attributes are recognised either fully
//! qualified (`#[speedtest::mark]`) or through an import from the speedtest
//! module (`use speedtest::mark;`, `use speedtest::mark as m;`,
//! `use speedtest::*;`). The module's `prelude` counts as the module itself
//! (`use speedtest::prelude::*;`, `#[speedtest::prelude::mark]`).

use crate::error::ScanError;
use std::collections::{HashMap, HashSet};
use syn::{FnArg, Item, ItemFn, Pat, UseTree};

/// Designated names used to classify functions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanRules {
    /// Function name prefix marking a benchmark
    pub prefix: String,
    /// Module exporting the `mark` and `fixture` attributes
    pub module: String,
}

impl Default for ScanRules {
    fn default() -> Self {
        Self {
            prefix: "speed_".to_string(),
            module: "speedtest".to_string(),
        }
    }
}

/// A benchmark function discovered in a unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BenchmarkEntry {
    /// Function name, unique within the unit
    pub name: String,
    /// Parameters naming known fixtures, in declaration order
    pub fixtures: Vec<String>,
}

const MARK: &str = "mark";
const FIXTURE: &str = "fixture";
const PRELUDE: &str = "prelude";

/// What the unit imported from the designated module.
#[derive(Debug, Default)]
struct Imports {
    /// local name → attribute name
    names: HashMap<String, String>,
    /// local names the module itself is bound to
    modules: HashSet<String>,
    /// local names the module's prelude is bound to
    preludes: HashSet<String>,
    glob: bool,
}

impl Imports {
    fn collect(items: &[Item], module: &str) -> Self {
        let mut imports = Imports::default();
        imports.modules.insert(module.to_string());
        for item in items {
            if let Item::Use(item_use) = item {
                imports.visit(&item_use.tree, &mut Vec::new(), module);
            }
        }
        imports
    }

    fn visit(&mut self, tree: &UseTree, prefix: &mut Vec<String>, module: &str) {
        let at_module = prefix.len() == 1 && prefix[0] == module;
        let at_prelude = prefix.len() == 2 && prefix[0] == module && prefix[1] == PRELUDE;
        let under_module = at_module || at_prelude;
        match tree {
            UseTree::Path(path) => {
                prefix.push(path.ident.to_string());
                self.visit(&path.tree, prefix, module);
                prefix.pop();
            }
            UseTree::Name(name) if at_module && name.ident == PRELUDE => {
                self.preludes.insert(PRELUDE.to_string());
            }
            UseTree::Rename(rename) if at_module && rename.ident == PRELUDE => {
                self.preludes.insert(rename.rename.to_string());
            }
            UseTree::Name(name) if under_module => {
                let ident = name.ident.to_string();
                self.names.insert(ident.clone(), ident);
            }
            UseTree::Rename(rename) if under_module => {
                self.names
                    .insert(rename.rename.to_string(), rename.ident.to_string());
            }
            UseTree::Rename(rename) if prefix.is_empty() && rename.ident == module => {
                self.modules.insert(rename.rename.to_string());
            }
            UseTree::Glob(_) if under_module => {
                self.glob = true;
                if at_module {
                    self.preludes.insert(PRELUDE.to_string());
                }
            }
            UseTree::Group(group) => {
                for item in &group.items {
                    self.visit(item, prefix, module);
                }
            }
            _ => {}
        }
    }

    /// Resolve an attribute path to the designated attribute it names, if any.
    fn resolve(&self, path: &syn::Path) -> Option<String> {
        let segments: Vec<String> = path
            .segments
            .iter()
            .map(|s| s.ident.to_string())
            .collect();

        match segments.as_slice() {
            [module, target] if self.modules.contains(module) => Some(target.clone()),
            [prelude, target] if self.preludes.contains(prelude) => Some(target.clone()),
            [module, prelude, target] if self.modules.contains(module) && prelude == PRELUDE => {
                Some(target.clone())
            }
            [alias] if path.leading_colon.is_none() => match self.names.get(alias) {
                Some(target) => Some(target.clone()),
                None if self.glob => Some(alias.clone()),
                None => None,
            },
            _ => None,
        }
    }

    fn has_attr(&self, func: &ItemFn, target: &str) -> bool {
        func.attrs
            .iter()
            .any(|attr| self.resolve(attr.path()).as_deref() == Some(target))
    }
}

/// Scan a unit's text into its ordered benchmark entries.
pub fn scan_source(text: &str, rules: &ScanRules) -> Result<Vec<BenchmarkEntry>, ScanError> {
    let file = syn::parse_file(text).map_err(|e| {
        let start = e.span().start();
        ScanError::Syntax {
            line: start.line,
            column: start.column + 1,
            message: e.to_string(),
        }
    })?;

    let imports = Imports::collect(&file.items, &rules.module);

    let functions: Vec<&ItemFn> = file
        .items
        .iter()
        .filter_map(|item| match item {
            Item::Fn(func) => Some(func),
            _ => None,
        })
        .collect();

    let mut entry_names: Vec<String> = Vec::new();
    let mut fixture_names: HashSet<String> = HashSet::new();

    for func in &functions {
        let name = func.sig.ident.to_string();
        if name.starts_with(&rules.prefix) || imports.has_attr(func, MARK) {
            if !entry_names.contains(&name) {
                entry_names.push(name);
            }
        } else if imports.has_attr(func, FIXTURE) {
            fixture_names.insert(name);
        }
    }

    let mut entries = Vec::with_capacity(entry_names.len());
    for name in entry_names {
        let Some(func) = functions.iter().find(|f| f.sig.ident == name) else {
            continue;
        };
        let fixtures = func
            .sig
            .inputs
            .iter()
            .filter_map(|arg| match arg {
                FnArg::Typed(typed) => match typed.pat.as_ref() {
                    Pat::Ident(ident) => Some(ident.ident.to_string()),
                    _ => None,
                },
                FnArg::Receiver(_) => None,
            })
            .filter(|param| fixture_names.contains(param))
            .collect();
        entries.push(BenchmarkEntry { name, fixtures });
    }

    tracing::debug!(
        entries = entries.len(),
        fixtures = fixture_names.len(),
        "scanned unit"
    );
    Ok(entries)
}
