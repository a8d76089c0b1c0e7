//! Vendor alias expansion.
//!
//! Alias tables map standard names to their vendor-prefixed equivalents.
//! Expansion clones a declaration (or a whole at-rule block) once per alias
//! and keeps the standard form last, so engines that understand both end up
//! applying the standard one.
//!
//! ```
//! use crush::alias::{AliasTables, expand_rule};
//! use crush::options::VendorTarget;
//! use crush::{Declaration, Rule};
//! use crush::rule::Selector;
//!
//! let tables = AliasTables::from_json(r#"{"properties": {"box-sizing": ["-moz-box-sizing"]}}"#).unwrap();
//! let mut rule = Rule::new(
//!     vec![Selector::new("div")],
//!     vec![Declaration::new("box-sizing", "border-box")],
//! );
//! expand_rule(&mut rule, &tables, &VendorTarget::All);
//!
//! let properties: Vec<_> = rule.declarations.iter().map(|d| d.property.as_str()).collect();
//! assert_eq!(properties, ["-moz-box-sizing", "box-sizing"]);
//! ```

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fs;
use std::path::Path;

use regex::Captures;
use serde::{Deserialize, Serialize};

use crate::balanced::match_balanced;
use crate::error::{CrushError, Diagnostics};
use crate::options::VendorTarget;
use crate::rule::{Declaration, Rule, RuleSet, vendor_of};
use crate::tokens::{LABEL_RE, LiteralStore, TokenKind};

/// Read-only alias configuration shared by every compile.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AliasTables {
    /// `property -> [aliased properties]`
    pub properties: HashMap<String, Vec<String>>,
    /// `function -> [aliased functions]`
    pub functions: HashMap<String, Vec<String>>,
    /// `property -> value -> [aliased values]`
    pub values: HashMap<String, HashMap<String, Vec<String>>>,
    /// `at-rule name -> [aliased names]`
    #[serde(rename = "at-rules", alias = "at_rules")]
    pub at_rules: BTreeMap<String, Vec<String>>,
}

impl AliasTables {
    pub fn from_json(source: &str) -> Result<Self, CrushError> {
        Ok(serde_json::from_str(source)?)
    }

    /// Reads alias tables from a JSON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, CrushError> {
        let path = path.as_ref();
        let source = fs::read_to_string(path).map_err(|source| CrushError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&source)
    }

    pub fn is_empty(&self) -> bool {
        self.properties.is_empty()
            && self.functions.is_empty()
            && self.values.is_empty()
            && self.at_rules.is_empty()
    }
}

/// Whether a clone carrying `alias_vendor` may be produced for a rule in
/// `context`. Inside a vendor context only that vendor's aliases (and
/// unprefixed ones) are kept.
fn wanted(alias_vendor: Option<&str>, context: Option<&str>, target: &VendorTarget) -> bool {
    if let (Some(context), Some(vendor)) = (context, alias_vendor) {
        if context != vendor {
            return false;
        }
    }
    target.allows(alias_vendor)
}

/// Runs property, function and value aliasing over one rule.
pub fn expand_rule(rule: &mut Rule, tables: &AliasTables, target: &VendorTarget) {
    filter_vendor_context(rule);
    if target.is_disabled() {
        return;
    }
    alias_properties(rule, tables, target);
    alias_functions(rule, tables, target);
    alias_values(rule, tables, target);
}

/// Drops declarations prefixed for a vendor other than the rule's context.
fn filter_vendor_context(rule: &mut Rule) {
    let Some(context) = rule.vendor_context.clone() else {
        return;
    };
    let before = rule.declarations.len();
    rule.declarations
        .retain(|d| d.vendor.as_deref().is_none_or(|v| v == context));
    if rule.declarations.len() != before {
        rule.index_properties();
    }
}

/// Clones declarations under each aliased property name the author has not
/// already written. Clones come before the original.
pub fn alias_properties(rule: &mut Rule, tables: &AliasTables, target: &VendorTarget) {
    if !rule.has_any_property(&tables.properties) {
        return;
    }
    let context = rule.vendor_context.clone();
    let declarations = std::mem::take(&mut rule.declarations);
    let mut out = Vec::with_capacity(declarations.len());

    for decl in declarations {
        if let Some(aliases) = tables.properties.get(&decl.property) {
            for alias in aliases {
                if rule.property_count(alias) > 0 {
                    continue;
                }
                if !wanted(vendor_of(alias), context.as_deref(), target) {
                    continue;
                }
                out.push(decl.with_property(alias));
            }
        }
        out.push(decl);
    }

    rule.declarations = out;
    rule.index_properties();
}

/// Rewrites aliased function calls.
///
/// A prefixed declaration switches to its own vendor's version of the
/// function in place. An unprefixed declaration is cloned once per vendor,
/// each clone calling that vendor's functions.
pub fn alias_functions(rule: &mut Rule, tables: &AliasTables, target: &VendorTarget) {
    let touches = rule
        .declarations
        .iter()
        .any(|d| d.functions.iter().any(|f| tables.functions.contains_key(f)));
    if !touches {
        return;
    }
    let context = rule.vendor_context.clone();
    let declarations = std::mem::take(&mut rule.declarations);
    let mut out = Vec::with_capacity(declarations.len());

    for mut decl in declarations {
        let aliased: Vec<String> = decl
            .functions
            .iter()
            .filter(|f| tables.functions.contains_key(*f))
            .cloned()
            .collect();
        if aliased.is_empty() {
            out.push(decl);
            continue;
        }

        if let Some(vendor) = decl.vendor.clone() {
            let value = rewrite_for_vendor(&decl.value, &aliased, tables, Some(&vendor));
            decl.set_value(value);
            out.push(decl);
            continue;
        }

        let mut produced: HashSet<(String, String)> = HashSet::new();
        for function in &aliased {
            for alias in &tables.functions[function] {
                let alias_vendor = vendor_of(alias);
                if !wanted(alias_vendor, context.as_deref(), target) {
                    continue;
                }
                let key = (decl.family.clone(), alias_vendor.unwrap_or(alias).to_string());
                if !produced.insert(key) {
                    continue;
                }
                let value = rewrite_for_vendor(&decl.value, &aliased, tables, alias_vendor);
                if value != decl.value {
                    out.push(decl.with_value(&value));
                }
            }
        }
        out.push(decl);
    }

    rule.declarations = out;
    rule.index_properties();
}

fn rewrite_for_vendor(
    value: &str,
    functions: &[String],
    tables: &AliasTables,
    vendor: Option<&str>,
) -> String {
    let mut value = value.to_string();
    for function in functions {
        let replacement = tables.functions[function]
            .iter()
            .find(|alias| vendor_of(alias) == vendor);
        if let Some(replacement) = replacement {
            value = replace_function_name(&value, function, replacement);
        }
    }
    value
}

/// Renames every call of `from` in `value` to `to`.
fn replace_function_name(value: &str, from: &str, to: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut offset = 0;
    for (at, _) in value.match_indices(from) {
        if at < offset {
            continue;
        }
        let end = at + from.len();
        let is_call = value[end..].starts_with('(');
        let starts_name = value[..at]
            .chars()
            .next_back()
            .is_none_or(|c| !(c.is_ascii_alphanumeric() || c == '-' || c == '_'));
        if is_call && starts_name {
            out.push_str(&value[offset..at]);
            out.push_str(to);
            offset = end;
        }
    }
    out.push_str(&value[offset..]);
    out
}

/// Clones declarations whose whole value has configured replacements.
pub fn alias_values(rule: &mut Rule, tables: &AliasTables, target: &VendorTarget) {
    if !rule.has_any_property(&tables.values) {
        return;
    }
    let context = rule.vendor_context.clone();
    let declarations = std::mem::take(&mut rule.declarations);
    let mut out: Vec<Declaration> = Vec::with_capacity(declarations.len());

    for decl in declarations {
        let aliases = tables
            .values
            .get(&decl.property)
            .and_then(|by_value| by_value.get(&decl.value));
        if let Some(aliases) = aliases {
            for alias in aliases {
                if wanted(vendor_of(alias), context.as_deref(), target) {
                    out.push(decl.with_value(alias));
                }
            }
        }
        out.push(decl);
    }

    rule.declarations = out;
    rule.index_properties();
}

/// Clones aliased at-rule blocks (`@keyframes` into `@-webkit-keyframes`
/// and so on) ahead of the original.
///
/// Rules inside each clone are copied into `rules` under fresh labels with
/// their vendor context set, so later expansion keeps only what fits that
/// vendor.
pub fn alias_at_rules(
    text: &str,
    tables: &AliasTables,
    target: &VendorTarget,
    rules: &mut RuleSet,
    store: &mut LiteralStore,
    diagnostics: &mut Diagnostics,
) -> String {
    if target.is_disabled() {
        return text.to_string();
    }
    let mut text = text.to_string();

    for (name, aliases) in &tables.at_rules {
        let needle = format!("@{}", name);
        let mut out = String::with_capacity(text.len());
        let mut offset = 0;

        while let Some(rel) = text[offset..].find(&needle) {
            let at = offset + rel;
            let after = at + needle.len();
            let is_keyword = text[after..]
                .chars()
                .next()
                .is_some_and(|c| c.is_whitespace() || c == '{');
            if !is_keyword {
                out.push_str(&text[offset..after]);
                offset = after;
                continue;
            }

            let span = match match_balanced(&text, '{', '}', after) {
                Ok(span) => span,
                Err(e) => {
                    diagnostics.warn(format!("Could not alias @{} block: {}", name, e));
                    break;
                }
            };
            let prelude = &text[after..span.start];
            let block = span.slice(&text);

            out.push_str(&text[offset..at]);
            for alias in aliases {
                let vendor = vendor_of(alias);
                if !target.allows(vendor) {
                    continue;
                }
                let cloned = clone_block_rules(block, vendor, rules, store);
                out.push('@');
                out.push_str(alias);
                out.push_str(prelude);
                out.push_str(&cloned);
                out.push('\n');
            }
            out.push_str(&text[at..span.end]);
            offset = span.end;
        }

        out.push_str(&text[offset..]);
        text = out;
    }

    text
}

fn clone_block_rules(
    block: &str,
    vendor: Option<&str>,
    rules: &mut RuleSet,
    store: &mut LiteralStore,
) -> String {
    LABEL_RE
        .replace_all(block, |caps: &Captures| {
            if TokenKind::from_tag(&caps[1]) == Some(TokenKind::Rule) {
                if let Some(rule) = rules.get(&caps[0]) {
                    let mut clone = rule.clone();
                    clone.vendor_context = vendor.map(str::to_string);
                    let label = store.mint(TokenKind::Rule);
                    rules.insert(label.clone(), clone);
                    return label;
                }
            }
            caps[0].to_string()
        })
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rule::Selector;

    fn rule(declarations: &[(&str, &str)]) -> Rule {
        Rule::new(
            vec![Selector::new("p")],
            declarations
                .iter()
                .map(|(p, v)| Declaration::new(p, v))
                .collect(),
        )
    }

    fn rendered(rule: &Rule) -> Vec<String> {
        rule.declarations.iter().map(|d| d.to_string()).collect()
    }

    fn tables() -> AliasTables {
        AliasTables::from_json(
            r#"{
                "properties": {
                    "transition": ["-webkit-transition", "-moz-transition"],
                    "display": ["*display"]
                },
                "functions": {
                    "linear-gradient": ["-webkit-linear-gradient", "-moz-linear-gradient"],
                    "radial-gradient": ["-webkit-radial-gradient"]
                },
                "values": {
                    "display": {"box": ["-webkit-box", "-moz-box"]}
                },
                "at-rules": {
                    "keyframes": ["-webkit-keyframes"]
                }
            }"#,
        )
        .unwrap()
    }

    #[test]
    fn test_property_aliases_come_first() {
        let mut r = rule(&[("transition", "all 1s"), ("color", "red")]);
        expand_rule(&mut r, &tables(), &VendorTarget::All);
        assert_eq!(
            rendered(&r),
            [
                "-webkit-transition: all 1s",
                "-moz-transition: all 1s",
                "transition: all 1s",
                "color: red"
            ]
        );
    }

    #[test]
    fn test_manual_alias_is_not_duplicated() {
        let mut r = rule(&[("-moz-transition", "none"), ("transition", "all 1s")]);
        expand_rule(&mut r, &tables(), &VendorTarget::All);
        assert_eq!(r.property_count("-moz-transition"), 1);
        assert_eq!(r.property_count("-webkit-transition"), 1);
    }

    #[test]
    fn test_vendor_target_filters_clones() {
        let mut r = rule(&[("transition", "all 1s")]);
        let target = VendorTarget::Only(vec!["moz".into()]);
        expand_rule(&mut r, &tables(), &target);
        assert_eq!(rendered(&r), ["-moz-transition: all 1s", "transition: all 1s"]);

        let mut r = rule(&[("transition", "all 1s")]);
        expand_rule(&mut r, &tables(), &VendorTarget::None);
        assert_eq!(rendered(&r), ["transition: all 1s"]);
    }

    #[test]
    fn test_function_clones_per_vendor() {
        let mut r = rule(&[(
            "background",
            "linear-gradient(red, blue), radial-gradient(red, blue)",
        )]);
        expand_rule(&mut r, &tables(), &VendorTarget::All);
        assert_eq!(
            rendered(&r),
            [
                "background: -webkit-linear-gradient(red, blue), -webkit-radial-gradient(red, blue)",
                "background: -moz-linear-gradient(red, blue), radial-gradient(red, blue)",
                "background: linear-gradient(red, blue), radial-gradient(red, blue)",
            ]
        );
    }

    #[test]
    fn test_prefixed_declaration_uses_own_function() {
        let mut r = rule(&[("-webkit-mask", "linear-gradient(red, blue)")]);
        expand_rule(&mut r, &tables(), &VendorTarget::All);
        assert_eq!(rendered(&r), ["-webkit-mask: -webkit-linear-gradient(red, blue)"]);
    }

    #[test]
    fn test_value_aliases() {
        let mut r = rule(&[("display", "box")]);
        let mut t = tables();
        t.properties.clear();
        expand_rule(&mut r, &t, &VendorTarget::All);
        assert_eq!(
            rendered(&r),
            ["display: -webkit-box", "display: -moz-box", "display: box"]
        );
    }

    #[test]
    fn test_replace_function_name_respects_boundaries() {
        assert_eq!(
            replace_function_name("repeating-linear-gradient(a) linear-gradient(b)", "linear-gradient", "-o-linear-gradient"),
            "repeating-linear-gradient(a) -o-linear-gradient(b)"
        );
    }

    #[test]
    fn test_at_rule_blocks_are_cloned_first() {
        let mut store = LiteralStore::new(false);
        let mut diagnostics = Diagnostics::new();
        let mut rules = RuleSet::new();
        let label = store.mint(TokenKind::Rule);
        rules.insert(
            label.clone(),
            rule(&[("-moz-transform", "none"), ("transform", "none")]),
        );

        let text = format!("@keyframes spin {{ {} }}", label);
        let out = alias_at_rules(&text, &tables(), &VendorTarget::All, &mut rules, &mut store, &mut diagnostics);

        assert!(out.starts_with("@-webkit-keyframes spin {"));
        assert!(out.trim_end().ends_with(&text));
        assert_eq!(rules.len(), 2);

        let mut contexts = Vec::new();
        rules.for_each_mut(|r| {
            expand_rule(r, &AliasTables::default(), &VendorTarget::All);
            contexts.push((r.vendor_context.clone(), r.declarations.len()));
        });
        assert_eq!(contexts, [(None, 2), (Some("webkit".to_string()), 1)]);
    }

    #[test]
    fn test_at_rule_name_must_be_whole() {
        let mut store = LiteralStore::new(false);
        let mut diagnostics = Diagnostics::new();
        let mut rules = RuleSet::new();
        let text = "@keyframes-like x { }";
        let out = alias_at_rules(text, &tables(), &VendorTarget::All, &mut rules, &mut store, &mut diagnostics);
        assert_eq!(out, text);
    }
}
