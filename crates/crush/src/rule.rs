//! Rules, selectors and declarations.
//!
//! A [`Rule`] is built from one `selector { declarations }` span by
//! [`parse_rule`]. It is then rewritten in place by alias expansion and the
//! registered macros before being rendered.

use std::collections::{BTreeSet, HashMap};
use std::fmt;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::balanced::split_top_level;
use crate::error::Diagnostics;
use crate::selectors;
use crate::tokens::{LiteralStore, TokenKind, take_labels};

static VENDOR_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^-([a-z]+)-").expect("valid vendor pattern"));

static IMPORTANT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\s*!\s*important\s*$").expect("valid important pattern"));

static PROPERTY_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(?:--[\w-]+|[*_]?-?[A-Za-z][\w-]*)$").expect("valid property pattern"));

/// Extracts the vendor name from a `-vendor-` prefixed identifier.
///
/// ```
/// use crush::rule::vendor_of;
///
/// assert_eq!(vendor_of("-webkit-transition"), Some("webkit"));
/// assert_eq!(vendor_of("transition"), None);
/// ```
pub fn vendor_of(name: &str) -> Option<&str> {
    VENDOR_RE
        .captures(name)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
}

/// Names of every function called in `value`, in no particular order.
pub fn function_names(value: &str) -> BTreeSet<String> {
    let mut names = BTreeSet::new();
    for (open, _) in value.match_indices('(') {
        let start = value[..open]
            .char_indices()
            .rev()
            .find(|(_, c)| !(c.is_ascii_alphanumeric() || *c == '-' || *c == '_'))
            .map_or(0, |(i, c)| i + c.len_utf8());
        if start < open {
            names.insert(value[start..open].to_string());
        }
    }
    names
}

/// A single `property: value` pair.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Declaration {
    pub property: String,
    /// Property with any vendor prefix removed.
    pub canonical_property: String,
    pub vendor: Option<String>,
    pub family: String,
    pub value: String,
    pub important: bool,
    /// Functions called in `value`.
    pub functions: BTreeSet<String>,
    /// Invalid declarations are skipped by the renderer. Macros clear this
    /// flag to remove a declaration without reshuffling the list.
    pub valid: bool,
}

impl Declaration {
    /// Builds a declaration, splitting off a trailing `!important`.
    ///
    /// ```
    /// use crush::Declaration;
    ///
    /// let decl = Declaration::new("-moz-box-sizing", "border-box !important");
    /// assert_eq!(decl.vendor.as_deref(), Some("moz"));
    /// assert_eq!(decl.canonical_property, "box-sizing");
    /// assert_eq!(decl.value, "border-box");
    /// assert!(decl.important);
    /// ```
    pub fn new(property: &str, value: &str) -> Self {
        let property = property.trim().to_string();
        let value = value.trim();
        let important = IMPORTANT_RE.is_match(value);
        let value = IMPORTANT_RE.replace(value, "").trim().to_string();

        let vendor = vendor_of(&property).map(str::to_string);
        let canonical_property = match &vendor {
            Some(v) => property[v.len() + 2..].to_string(),
            None => property.clone(),
        };

        Self {
            valid: PROPERTY_RE.is_match(&property) && !value.is_empty(),
            family: canonical_property.clone(),
            functions: function_names(&value),
            canonical_property,
            vendor,
            property,
            value,
            important,
        }
    }

    /// A copy of this declaration under another property name.
    pub fn with_property(&self, property: &str) -> Self {
        let mut clone = Declaration::new(property, &self.value);
        clone.important = self.important;
        clone
    }

    /// A copy of this declaration with another value.
    pub fn with_value(&self, value: &str) -> Self {
        let mut clone = Declaration::new(&self.property, value);
        clone.important = self.important || clone.important;
        clone
    }

    /// Replaces the value and refreshes the function index.
    pub fn set_value(&mut self, value: impl Into<String>) {
        self.value = value.into();
        self.functions = function_names(&self.value);
    }
}

impl fmt::Display for Declaration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.property, self.value)?;
        if self.important {
            write!(f, " !important")?;
        }
        Ok(())
    }
}

/// One selector of a rule's selector list.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Selector(String);

impl Selector {
    pub fn new(text: &str) -> Self {
        Self(text.trim().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Expands `:any(...)` groups into every concrete combination.
    pub fn expand_any(&self) -> Vec<Selector> {
        selectors::expand_any(&self.0)
            .into_iter()
            .map(|s| Selector::new(&s))
            .collect()
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Rule {
    pub selectors: Vec<Selector>,
    pub declarations: Vec<Declaration>,
    /// Comment labels attached to this rule, rendered before it.
    pub comments: Vec<String>,
    /// Set on rules cloned into a vendor-prefixed at-rule block.
    pub vendor_context: Option<String>,
    property_counts: HashMap<String, usize>,
}

impl Rule {
    pub fn new(selectors: Vec<Selector>, declarations: Vec<Declaration>) -> Self {
        let mut rule = Self {
            selectors,
            declarations,
            ..Self::default()
        };
        rule.index_properties();
        rule
    }

    /// Rebuilds the property occurrence counts. Call after rewriting
    /// `declarations` directly.
    pub fn index_properties(&mut self) {
        self.property_counts.clear();
        for decl in &self.declarations {
            *self.property_counts.entry(decl.property.clone()).or_default() += 1;
        }
    }

    /// How many times `property` was written in this rule.
    pub fn property_count(&self, property: &str) -> usize {
        self.property_counts.get(property).copied().unwrap_or(0)
    }

    /// Whether any written property is a key of `table`.
    pub fn has_any_property<V>(&self, table: &HashMap<String, V>) -> bool {
        self.property_counts.keys().any(|p| table.contains_key(p))
    }

    pub fn has_property(&self, property: &str) -> bool {
        self.property_count(property) > 0
    }

    /// Expands `:any(...)` in every selector, keeping order.
    pub fn expand_selectors(&mut self) {
        self.selectors = self
            .selectors
            .iter()
            .flat_map(Selector::expand_any)
            .collect();
    }

    /// Whether there is anything left to render.
    pub fn is_empty(&self) -> bool {
        !self.declarations.iter().any(|d| d.valid)
    }
}

/// Rules of one compile, keyed by their rule label, kept in creation order.
#[derive(Debug, Default)]
pub struct RuleSet {
    order: Vec<String>,
    rules: HashMap<String, Rule>,
}

impl RuleSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, label: String, rule: Rule) {
        if self.rules.insert(label.clone(), rule).is_none() {
            self.order.push(label);
        }
    }

    pub fn get(&self, label: &str) -> Option<&Rule> {
        self.rules.get(label)
    }

    pub fn get_mut(&mut self, label: &str) -> Option<&mut Rule> {
        self.rules.get_mut(label)
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Visits every rule in creation order.
    pub fn for_each_mut<F>(&mut self, mut f: F)
    where
        F: FnMut(&mut Rule),
    {
        for label in &self.order {
            if let Some(rule) = self.rules.get_mut(label) {
                f(rule);
            }
        }
    }
}

/// Parses one `selector { body }` span.
///
/// Returns `None` when no declaration survives. Leading comment labels are
/// moved into [`Rule::comments`]; comments inside the body join them.
///
/// ```
/// use crush::error::Diagnostics;
/// use crush::rule::parse_rule;
/// use crush::tokens::LiteralStore;
///
/// let mut store = LiteralStore::new(true);
/// let mut diagnostics = Diagnostics::new();
/// let rule = parse_rule("a:hocus, p::after", "color: red; bogus; margin:", &mut store, &mut diagnostics).unwrap();
/// assert_eq!(rule.selectors[0].as_str(), "a:any(:hover,:focus)");
/// assert_eq!(rule.selectors[1].as_str(), "p:after");
/// assert_eq!(rule.declarations.len(), 1);
/// ```
pub fn parse_rule(
    selector_text: &str,
    body: &str,
    store: &mut LiteralStore,
    diagnostics: &mut Diagnostics,
) -> Option<Rule> {
    let (selector_text, mut comments) = take_labels(selector_text, TokenKind::Comment);
    let selector_text = selectors::rewrite_shorthands(&selector_text);
    let selectors: Vec<Selector> = split_top_level(&selector_text, ',')
        .into_iter()
        .map(Selector::new)
        .filter(|s| !s.as_str().is_empty())
        .collect();

    let (body, body_comments) = take_labels(body, TokenKind::Comment);
    comments.extend(body_comments);

    let body = store.capture_parens(&body, diagnostics);
    let mut declarations = Vec::new();
    for entry in body.split(';') {
        let Some((property, value)) = entry.split_once(':') else {
            if !entry.trim().is_empty() {
                log::debug!("Dropping malformed declaration '{}'", entry.trim());
            }
            continue;
        };
        let value = store.restore(value, TokenKind::Paren);
        let decl = Declaration::new(property, &value);
        if decl.valid {
            declarations.push(decl);
        }
    }

    if declarations.is_empty() || selectors.is_empty() {
        return None;
    }

    let mut rule = Rule::new(selectors, declarations);
    rule.comments = comments;
    Some(rule)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(selector: &str, body: &str) -> Option<Rule> {
        let mut store = LiteralStore::new(true);
        let mut diagnostics = Diagnostics::new();
        parse_rule(selector, body, &mut store, &mut diagnostics)
    }

    #[test]
    fn test_parse_declarations() {
        let rule = parse(
            ".a, .b",
            "background: url(data:image/png;base64,AA==); -webkit-transition: all 1s ; color: red !important",
        )
        .unwrap();

        assert_eq!(rule.selectors, vec![Selector::new(".a"), Selector::new(".b")]);
        assert_eq!(rule.declarations.len(), 3);
        assert_eq!(rule.declarations[0].value, "url(data:image/png;base64,AA==)");
        assert!(rule.declarations[0].functions.contains("url"));
        assert_eq!(rule.declarations[1].vendor.as_deref(), Some("webkit"));
        assert_eq!(rule.declarations[1].family, "transition");
        assert!(rule.declarations[2].important);
        assert_eq!(rule.property_count("color"), 1);
    }

    #[test]
    fn test_rule_without_declarations_is_dropped() {
        assert!(parse("p", "color").is_none());
        assert!(parse("p", "color: ;").is_none());
        assert!(parse("p", "").is_none());
    }

    #[test]
    fn test_comments_move_to_rule() {
        let rule = parse("?c1? p", "?c2? color: red").unwrap();
        assert_eq!(rule.comments, vec!["?c1?", "?c2?"]);
        assert_eq!(rule.selectors[0].as_str(), "p");
        assert_eq!(rule.declarations[0].property, "color");
    }

    #[test]
    fn test_hack_properties_are_valid() {
        let rule = parse("p", "*display: inline; _zoom: 1; 9bad: x; --gap: 4px").unwrap();
        assert_eq!(rule.declarations.len(), 3);
        assert_eq!(rule.declarations[2].vendor, None);
        assert_eq!(rule.property_count("*display"), 1);
    }

    #[test]
    fn test_function_names() {
        let names = function_names("-webkit-gradient(linear, rgba(0,0,0,1)), url(x)");
        let names: Vec<_> = names.into_iter().collect();
        assert_eq!(names, vec!["-webkit-gradient", "rgba", "url"]);
    }
}
