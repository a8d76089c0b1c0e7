//! Selector macros.
//!
//! - `:hocus` is `:any(:hover,:focus)`
//! - `:pocus` is `:any(:hover,:focus,:active)`
//! - legacy pseudo-elements (`::before`, `::after`, `::first-line`,
//!   `::first-letter`) drop to a single colon
//! - `:any(a,b)` expands into one selector per argument
//!
//! A selector holding several `:any()` groups expands to their product,
//! leftmost group varying slowest:
//!
//! ```css
//! .nav :any(ul, ol) > :any(.a, .b) { ... }
//! ```
//!
//! becomes
//!
//! ```css
//! .nav ul > .a, .nav ul > .b, .nav ol > .a, .nav ol > .b { ... }
//! ```

use once_cell::sync::Lazy;
use regex::Regex;

use crate::balanced::{match_balanced, split_top_level};

static HOCUS_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r":hocus\b").expect("valid hocus pattern"));

static POCUS_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r":pocus\b").expect("valid pocus pattern"));

static LEGACY_PSEUDO_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"::(before|after|first-line|first-letter)\b").expect("valid pseudo-element pattern")
});

const ANY: &str = ":any(";

/// Applies the shorthand rewrites to a full selector list.
pub fn rewrite_shorthands(selector: &str) -> String {
    let out = HOCUS_RE.replace_all(selector, ":any(:hover,:focus)");
    let out = POCUS_RE.replace_all(&out, ":any(:hover,:focus,:active)");
    LEGACY_PSEUDO_RE.replace_all(&out, ":$1").into_owned()
}

/// Expands every `:any(...)` group of a single selector.
///
/// ```
/// use crush::selectors::expand_any;
///
/// assert_eq!(
///     expand_any(".x:any(:hover,:focus)>span"),
///     vec![".x:hover>span", ".x:focus>span"]
/// );
/// ```
pub fn expand_any(selector: &str) -> Vec<String> {
    let Some(start) = selector.find(ANY) else {
        return vec![selector.to_string()];
    };
    let open = start + ANY.len() - 1;
    let Ok(span) = match_balanced(selector, '(', ')', open) else {
        log::debug!("Unbalanced :any() in '{}', left as is", selector);
        return vec![selector.to_string()];
    };

    let prefix = &selector[..start];
    let suffixes = expand_any(&selector[span.end..]);

    let mut expanded = Vec::new();
    for arg in split_top_level(span.inner(selector), ',') {
        let arg = arg.trim();
        if arg.is_empty() {
            continue;
        }
        for option in expand_any(arg) {
            for suffix in &suffixes {
                expanded.push(format!("{}{}{}", prefix, option, suffix));
            }
        }
    }

    // An empty group contributes nothing; the rest still expands.
    if expanded.is_empty() {
        return suffixes
            .iter()
            .map(|suffix| format!("{}{}", prefix, suffix))
            .collect();
    }
    expanded
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shorthands() {
        assert_eq!(rewrite_shorthands("a:hocus"), "a:any(:hover,:focus)");
        assert_eq!(rewrite_shorthands("a:pocus span"), "a:any(:hover,:focus,:active) span");
        assert_eq!(rewrite_shorthands("p::first-line, p::selection"), "p:first-line, p::selection");
    }

    #[test]
    fn test_multiple_groups() {
        assert_eq!(
            expand_any(".nav :any(ul, ol) > :any(.a, .b)"),
            vec![".nav ul > .a", ".nav ul > .b", ".nav ol > .a", ".nav ol > .b"]
        );
    }

    #[test]
    fn test_plain_and_nested() {
        assert_eq!(expand_any("p:not(.x)"), vec!["p:not(.x)"]);
        assert_eq!(
            expand_any(":any(a, :any(b, c)) i"),
            vec!["a i", "b i", "c i"]
        );
    }

    #[test]
    fn test_empty_group_keeps_later_groups() {
        assert_eq!(expand_any("a:any() :any(b,c)"), vec!["a b", "a c"]);
        assert_eq!(expand_any("a:any()"), vec!["a"]);
    }
}
