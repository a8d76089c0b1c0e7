//! The compile pipeline.
//!
//! A [`Compiler`] holds what lives across compiles: alias tables, registered
//! macros and the global variable layer. Every call to
//! [`Compiler::compile`] builds a fresh [`Process`] that owns the literal
//! store, the rules and the diagnostics of that one compile.

use std::fs;
use std::path::{Path, PathBuf};

use once_cell::sync::Lazy;
use regex::{Captures, Regex};

use crate::alias::{AliasTables, alias_at_rules, expand_rule};
use crate::error::{CrushError, Diagnostics};
use crate::fingerprint::Fingerprint;
use crate::functions::{FunctionContext, evaluate_value};
use crate::import::{CompileContext, ImportRecord, modified_secs, resolve_imports};
use crate::macros::{RuleMacro, run_macros, stock_macros};
use crate::options::Options;
use crate::render::render;
use crate::rule::{RuleSet, parse_rule};
use crate::tokens::{LABEL_RE, LiteralStore, TokenKind};
use crate::variables::{
    VariableTable, Variables, extract_variables, place_defined_variables, place_variables,
};

/// Innermost `selector { declarations }` spans.
static RULE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"([^{};]*)\{([^{}]*)\}").expect("valid rule pattern"));

/// Result of one compile.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompileOutput {
    /// Empty when the compile failed.
    pub css: String,
    pub imports: Vec<ImportRecord>,
    pub warnings: Vec<String>,
    pub errors: Vec<String>,
    pub fingerprint: Fingerprint,
}

impl CompileOutput {
    fn failed(error: CrushError, mut diagnostics: Diagnostics) -> Self {
        diagnostics.error(error.to_string());
        Self {
            warnings: diagnostics.warnings,
            errors: diagnostics.errors,
            ..Self::default()
        }
    }

    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }
}

pub struct Compiler {
    aliases: AliasTables,
    macros: Vec<Box<dyn RuleMacro>>,
    globals: Variables,
}

impl Default for Compiler {
    fn default() -> Self {
        Self::new(AliasTables::default())
    }
}

impl Compiler {
    /// A compiler with the given alias tables and the stock macros.
    pub fn new(aliases: AliasTables) -> Self {
        Self {
            aliases,
            macros: stock_macros(),
            globals: Variables::new(),
        }
    }

    pub fn aliases(&self) -> &AliasTables {
        &self.aliases
    }

    /// Appends a macro. Macros run in registration order.
    pub fn register_macro(&mut self, m: impl RuleMacro + 'static) {
        self.macros.push(Box::new(m));
    }

    /// Removes every registered macro, the stock ones included.
    pub fn clear_macros(&mut self) {
        self.macros.clear();
    }

    pub fn macro_names(&self) -> Vec<&str> {
        self.macros.iter().map(|m| m.name()).collect()
    }

    /// Defines a variable visible to every later compile.
    pub fn set_global_variable(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.globals.define(name, value);
    }

    /// Compiles `source` within `context`.
    ///
    /// ```
    /// use crush::{CompileContext, Compiler, Options};
    ///
    /// let compiler = Compiler::default();
    /// let output = compiler.compile(
    ///     "@variables{c: red;} p{color:var(c);}",
    ///     &CompileContext::default(),
    ///     &Options::default(),
    /// );
    /// assert_eq!(output.css, "p{color:red}");
    /// ```
    pub fn compile(&self, source: &str, context: &CompileContext, options: &Options) -> CompileOutput {
        let mut context = context.clone();
        if context.host_path.is_none() {
            if let Some(dir) = &options.context {
                context.doc_root = dir.clone();
                context.base_dir = dir.clone();
            }
        }

        let mut process = Process::new(self, &context, options);
        match process.run(source) {
            Ok((css, imports)) => {
                let host_modified = context.host_path.as_deref().and_then(modified_secs);
                // Cached imports are checked against the host's own directory.
                let anchor = context
                    .host_path
                    .as_deref()
                    .and_then(Path::parent)
                    .unwrap_or(context.base_dir.as_path());
                let fingerprint = Fingerprint::new(&imports, host_modified, options, anchor);
                CompileOutput {
                    css,
                    imports,
                    warnings: process.diagnostics.warnings,
                    errors: process.diagnostics.errors,
                    fingerprint,
                }
            }
            Err(e) => CompileOutput::failed(e, process.diagnostics),
        }
    }

    /// Reads and compiles a stylesheet from disk. Relative imports resolve
    /// against the file's directory unless [`Options::context`] is set.
    pub fn compile_file(&self, path: impl AsRef<Path>, options: &Options) -> CompileOutput {
        let path = path.as_ref();
        let source = match fs::read_to_string(path) {
            Ok(source) => source,
            Err(source) => {
                let error = CrushError::Io {
                    path: path.to_path_buf(),
                    source,
                };
                return CompileOutput::failed(error, Diagnostics::new());
            }
        };

        let base_dir = options
            .context
            .clone()
            .or_else(|| path.parent().map(Path::to_path_buf))
            .unwrap_or_else(|| PathBuf::from("."));
        let context = CompileContext::new(base_dir).with_host(path);
        log::debug!("Compiling {}", path.display());
        self.compile(&source, &context, options)
    }
}

/// State of a single compile.
pub struct Process<'a> {
    compiler: &'a Compiler,
    context: &'a CompileContext,
    options: &'a Options,
    store: LiteralStore,
    rules: RuleSet,
    diagnostics: Diagnostics,
}

impl<'a> Process<'a> {
    pub fn new(compiler: &'a Compiler, context: &'a CompileContext, options: &'a Options) -> Self {
        Self {
            compiler,
            context,
            options,
            store: LiteralStore::new(!options.minify.is_minified()),
            rules: RuleSet::new(),
            diagnostics: Diagnostics::new(),
        }
    }

    pub fn diagnostics(&self) -> &Diagnostics {
        &self.diagnostics
    }

    /// Runs every stage and returns the final css with the import records.
    pub fn run(&mut self, source: &str) -> Result<(String, Vec<ImportRecord>), CrushError> {
        let (text, imports) = resolve_imports(source, self.context, &mut self.diagnostics);
        let text = self
            .store
            .capture_comments_and_strings(&text, &mut self.diagnostics);

        let text = self.place_variables(&text);
        let text = self.extract_rules(&text);
        self.evaluate_functions();

        let text = alias_at_rules(
            &text,
            &self.compiler.aliases,
            &self.options.vendor_target,
            &mut self.rules,
            &mut self.store,
            &mut self.diagnostics,
        );
        self.expand_rules();

        let css = render(&text, &mut self.rules, &self.store, self.options);
        self.check_labels(&css)?;

        let css = self.finish(css);
        log::debug!(
            "Compiled {} rules with {} warnings",
            self.rules.len(),
            self.diagnostics.warnings.len()
        );
        Ok((css, imports))
    }

    fn place_variables(&mut self, text: &str) -> String {
        let (text, file_vars) = extract_variables(text);
        let runtime: Variables = self.options.vars.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
        let table = VariableTable::merge(&self.compiler.globals, &file_vars, &runtime);

        self.store
            .map_kind(TokenKind::String, |s| place_defined_variables(s, &table));
        place_variables(&text, &table)
    }

    fn extract_rules(&mut self, text: &str) -> String {
        let Self {
            store,
            rules,
            diagnostics,
            ..
        } = self;

        RULE_RE
            .replace_all(text, |caps: &Captures| {
                match parse_rule(&caps[1], &caps[2], store, diagnostics) {
                    Some(rule) => {
                        let label = store.mint(TokenKind::Rule);
                        rules.insert(label.clone(), rule);
                        format!("\n{}\n", label)
                    }
                    None => {
                        log::debug!("Dropping empty rule '{}'", caps[1].trim());
                        String::new()
                    }
                }
            })
            .into_owned()
    }

    fn evaluate_functions(&mut self) {
        let mut ctx = FunctionContext {
            base_dir: &self.context.base_dir,
            doc_root: &self.context.doc_root,
            store: &mut self.store,
            diagnostics: &mut self.diagnostics,
        };
        self.rules.for_each_mut(|rule| {
            for decl in &mut rule.declarations {
                if decl.value.contains('(') {
                    let value = evaluate_value(&decl.value, &mut ctx);
                    decl.set_value(value);
                }
            }
        });
    }

    fn expand_rules(&mut self) {
        let aliases = &self.compiler.aliases;
        let macros = &self.compiler.macros;
        let target = &self.options.vendor_target;
        let enabled = self.options.plugins.as_deref();

        self.rules.for_each_mut(|rule| {
            expand_rule(rule, aliases, target);
            run_macros(rule, macros, enabled);
            rule.expand_selectors();
        });
    }

    /// Rule labels surviving the render mean a rule was never placed.
    fn check_labels(&self, css: &str) -> Result<(), CrushError> {
        match LABEL_RE.find_iter(css).find(|m| self.rules.get(m.as_str()).is_some()) {
            Some(m) => Err(CrushError::Internal(format!("rule {} left unrendered", m.as_str()))),
            None => Ok(()),
        }
    }

    fn finish(&self, css: String) -> String {
        let mut css = match &self.options.boilerplate {
            Some(text) => format!("{}\n{}", boilerplate_comment(text), css),
            None => css,
        };
        let newline = self.options.newline();
        if newline != "\n" {
            css = css.replace('\n', newline);
        }
        css
    }
}

/// Wraps `text` in a preserved block comment.
fn boilerplate_comment(text: &str) -> String {
    let mut out = String::from("/*!\n");
    for line in text.trim().lines().map(str::trim_end) {
        if line.is_empty() {
            out.push_str(" *\n");
        } else {
            out.push_str(" * ");
            out.push_str(line);
            out.push('\n');
        }
    }
    out.push_str(" */");
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_boilerplate_comment() {
        assert_eq!(
            boilerplate_comment("Site styles\n\nv1.0"),
            "/*!\n * Site styles\n *\n * v1.0\n */"
        );
    }

    #[test]
    fn test_state_is_fresh_per_compile() {
        let compiler = Compiler::default();
        let options = Options::default();
        let context = CompileContext::default();
        let first = compiler.compile("@variables{x:1px} p{margin:$x}", &context, &options);
        let second = compiler.compile("p{margin:$x}", &context, &options);
        assert_eq!(first.css, "p{margin:1px}");
        assert_eq!(second.css, "");
    }

    #[test]
    fn test_options_context_sets_base_dir() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.css"), "a{color:blue}").unwrap();
        let options = Options {
            context: Some(dir.path().to_path_buf()),
            ..Options::default()
        };
        let output = Compiler::default().compile("@import 'a.css';", &CompileContext::default(), &options);
        assert_eq!(output.css, "a{color:blue}");
        assert_eq!(output.imports.len(), 1);
    }
}
