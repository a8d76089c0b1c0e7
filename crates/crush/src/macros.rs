//! Rule macros.
//!
//! A macro gets mutable access to a whole [`Rule`] after alias expansion and
//! may rewrite its declarations freely. Macros run in registration order and
//! each sees the output of the previous one.

use crate::rule::{Declaration, Rule};

pub trait RuleMacro: Send + Sync {
    /// Name used by [`Options::plugins`](crate::Options) to enable the macro.
    fn name(&self) -> &str;

    fn apply(&self, rule: &mut Rule);
}

/// Wraps a closure as a named macro.
///
/// ```
/// use crush::macros::{RuleMacro, macro_fn};
/// use crush::{Declaration, Rule};
///
/// let upper = macro_fn("upper", |rule: &mut Rule| {
///     for decl in &mut rule.declarations {
///         decl.property = decl.property.to_uppercase();
///     }
/// });
/// let mut rule = Rule::new(vec![], vec![Declaration::new("color", "red")]);
/// upper.apply(&mut rule);
/// assert_eq!(rule.declarations[0].property, "COLOR");
/// ```
pub fn macro_fn<F>(name: &str, f: F) -> FnMacro<F>
where
    F: Fn(&mut Rule) + Send + Sync,
{
    FnMacro {
        name: name.to_string(),
        f,
    }
}

pub struct FnMacro<F> {
    name: String,
    f: F,
}

impl<F> RuleMacro for FnMacro<F>
where
    F: Fn(&mut Rule) + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn apply(&self, rule: &mut Rule) {
        (self.f)(rule);
    }
}

/// Runs every macro enabled by `enabled` over `rule`. `None` enables all.
pub fn run_macros(rule: &mut Rule, macros: &[Box<dyn RuleMacro>], enabled: Option<&[String]>) {
    for m in macros {
        if let Some(enabled) = enabled {
            if !enabled.iter().any(|name| name == m.name()) {
                continue;
            }
        }
        log::trace!("running macro {}", m.name());
        m.apply(rule);
        rule.index_properties();
    }
}

/// Legacy IE fallback for `display: inline-block`.
#[derive(Debug, Default)]
pub struct InlineBlockMacro;

impl RuleMacro for InlineBlockMacro {
    fn name(&self) -> &str {
        "ie-inline-block"
    }

    fn apply(&self, rule: &mut Rule) {
        if rule.has_property("*display") || !rule.has_property("display") {
            return;
        }
        let add_zoom = !rule.has_property("*zoom") && !rule.has_property("zoom");
        let mut out = Vec::with_capacity(rule.declarations.len() + 2);
        let mut done = false;

        for decl in std::mem::take(&mut rule.declarations) {
            let matched = !done && decl.property == "display" && decl.value == "inline-block";
            out.push(decl);
            if matched {
                out.push(Declaration::new("*display", "inline"));
                if add_zoom {
                    out.push(Declaration::new("*zoom", "1"));
                }
                done = true;
            }
        }
        rule.declarations = out;
    }
}

/// Legacy IE fallback for `opacity`.
#[derive(Debug, Default)]
pub struct OpacityMacro;

impl RuleMacro for OpacityMacro {
    fn name(&self) -> &str {
        "ie-opacity"
    }

    fn apply(&self, rule: &mut Rule) {
        if rule.has_property("filter") || !rule.has_property("opacity") {
            return;
        }
        let mut out = Vec::with_capacity(rule.declarations.len() + 1);
        let mut done = false;

        for decl in std::mem::take(&mut rule.declarations) {
            let fallback = match decl.value.parse::<f64>() {
                Ok(opacity) if !done && decl.property == "opacity" => {
                    let mut filter = Declaration::new(
                        "filter",
                        &format!("alpha(opacity={})", (opacity * 100.0).round()),
                    );
                    filter.important = decl.important;
                    Some(filter)
                }
                _ => None,
            };
            out.push(decl);
            if let Some(filter) = fallback {
                out.push(filter);
                done = true;
            }
        }
        rule.declarations = out;
    }
}

/// Macros registered on a fresh [`Compiler`](crate::Compiler).
pub fn stock_macros() -> Vec<Box<dyn RuleMacro>> {
    vec![Box::new(InlineBlockMacro), Box::new(OpacityMacro)]
}
