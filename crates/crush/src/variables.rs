//! Variable extraction and substitution.
//!
//! Variables are declared in `@variables` (or `@define`) blocks:
//!
//! ```css
//! @variables {
//!     brand: #c00;
//!     gutter: 10px;
//! }
//!
//! a { color: var(brand); margin: $gutter; }
//! ```
//!
//! ## Layers
//!
//! Three layers are merged, later ones winning:
//!
//! 1. global: set on the [`Compiler`](crate::Compiler), lives across compiles
//! 2. file: collected from the stylesheet on every compile
//! 3. runtime: passed in [`Options::vars`](crate::Options)
//!
//! ## Reference forms
//!
//! `var(name)`, `$(name)`, `${name}` and `$name`. An undefined reference
//! resolves to the empty string. `var(--name)` is a native custom property
//! and is never touched.

use std::collections::BTreeMap;

use once_cell::sync::Lazy;
use regex::{Captures, Regex};

use crate::balanced::split_top_level;
use crate::tokens::{TokenKind, take_labels};

static BLOCK_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"@(?:variables|define)\s*\{([^{}]*)\}").expect("valid variable block pattern")
});

static REFERENCE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"var\(\s*([A-Za-z_][\w-]*)\s*\)|\$\(\s*([A-Za-z_][\w-]*)\s*\)|\$\{\s*([A-Za-z_][\w-]*)\s*\}|\$([A-Za-z_][\w-]*)",
    )
    .expect("valid variable reference pattern")
});

/// Passes used to resolve variables whose values reference other variables.
const MAX_RESOLVE_PASSES: usize = 8;

/// One layer of variable definitions.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Variables {
    variables: BTreeMap<String, String>,
}

impl Variables {
    /// Creates an empty layer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Defines a variable with the given name and value.
    pub fn define(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.variables.insert(name.into(), value.into());
    }

    /// Resolves a variable name to its value, if defined.
    pub fn resolve(&self, name: &str) -> Option<&str> {
        self.variables.get(name).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.variables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.variables.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &String)> {
        self.variables.iter()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Variables {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut vars = Variables::new();
        for (name, value) in iter {
            vars.define(name, value);
        }
        vars
    }
}

/// The merged view of the global, file and runtime layers.
#[derive(Debug, Clone, Default)]
pub struct VariableTable {
    merged: Variables,
}

impl VariableTable {
    /// Merges the layers in override order and resolves references between
    /// values.
    pub fn merge(global: &Variables, file: &Variables, runtime: &Variables) -> Self {
        let mut merged = Variables::new();
        for layer in [global, file, runtime] {
            for (name, value) in layer.iter() {
                merged.define(name.clone(), value.clone());
            }
        }

        let mut table = Self { merged };
        for _ in 0..MAX_RESOLVE_PASSES {
            if !table.merged.iter().any(|(_, v)| REFERENCE_RE.is_match(v)) {
                break;
            }
            let resolved: Variables = table
                .merged
                .iter()
                .map(|(name, value)| (name.clone(), place_variables(value, &table)))
                .collect();
            table.merged = resolved;
        }
        table
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.merged.resolve(name)
    }
}

/// Removes every variable block from `text` and returns the file layer.
///
/// Entries are split on top-level `;`, then on the first `:`. Comment labels
/// left in front of a name are dropped.
pub fn extract_variables(text: &str) -> (String, Variables) {
    let mut vars = Variables::new();

    let stripped = BLOCK_RE.replace_all(text, |caps: &Captures| {
        for entry in split_top_level(&caps[1], ';') {
            let Some((name, value)) = entry.split_once(':') else {
                continue;
            };
            let (name, _) = take_labels(name, TokenKind::Comment);
            let value = value.trim();
            if name.is_empty() || value.is_empty() {
                continue;
            }
            log::trace!("variable {} = {}", name, value);
            vars.define(name, value);
        }
        String::new()
    });

    (stripped.into_owned(), vars)
}

/// Replaces every variable reference in `text`. Undefined names resolve to
/// the empty string.
pub fn place_variables(text: &str, table: &VariableTable) -> String {
    REFERENCE_RE
        .replace_all(text, |caps: &Captures| {
            table.get(reference_name(caps)).unwrap_or_default().to_string()
        })
        .into_owned()
}

/// Like [`place_variables`] but leaves undefined references untouched. Used
/// for string literals, where a stray `$` is more likely prose than a typo.
pub fn place_defined_variables(text: &str, table: &VariableTable) -> String {
    REFERENCE_RE
        .replace_all(text, |caps: &Captures| {
            table
                .get(reference_name(caps))
                .map_or_else(|| caps[0].to_string(), str::to_string)
        })
        .into_owned()
}

fn reference_name<'a>(caps: &'a Captures) -> &'a str {
    (1..=4)
        .find_map(|i| caps.get(i))
        .map_or("", |m| m.as_str())
}
