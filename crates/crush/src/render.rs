//! Output rendering.
//!
//! After rule extraction the working text is a skeleton of at-rule preludes,
//! braces, plain statements and rule labels. The renderer walks that
//! skeleton, formats each rule with the active [`Formatter`], drops blocks
//! left empty, and finally restores every captured literal.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::options::{FormatterKind, MinifyPasses, Options};
use crate::rule::{Declaration, Rule, RuleSet};
use crate::tokens::{LABEL_RE, LiteralStore, TokenKind};

static WHITESPACE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("valid whitespace pattern"));

static COMMA_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s*,\s*").expect("valid comma pattern"));

static COMBINATOR_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\s*([>+~])\s*").expect("valid combinator pattern"));

static MEDIA_FEATURE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\(\s*([\w-]+)\s*:\s*").expect("valid media feature pattern"));

static BLANK_LINES_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n{3,}").expect("valid blank line pattern"));

static ZERO_UNIT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(^|[\s,(/])0(?:\.0+)?(?:px|em|ex|rem|pt|pc|in|cm|mm|vw|vh|vmin|vmax|ch)\b")
        .expect("valid zero unit pattern")
});

static LEADING_ZERO_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(^|[\s,(/:])0\.(\d)").expect("valid leading zero pattern"));

static ZERO_LIST_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^0(?:\s+0){1,3}$").expect("valid zero list pattern"));

static TRANSPARENT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)rgba\(\s*\d+\s*,\s*\d+\s*,\s*\d+\s*,\s*0(?:\.0+)?\s*\)").expect("valid transparent pattern")
});

/// A `url(...)` argument is a path, never a value to shorten.
static URL_SPAN_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?i)\burl\(\s*(?:"[^"]*"|'[^']*'|[^)]*)\s*\)"#).expect("valid url span pattern"));

const ZERO_LIST_PROPERTIES: &[&str] = &["margin", "padding", "border-width", "border-radius", "border-spacing"];

/// Column the declaration block starts at in the padded layout.
const PAD_WIDTH: usize = 40;

const INDENT: &str = "    ";

/// Lays out one rule. Only valid declarations are passed along.
pub trait Formatter {
    fn format_rule(&self, rule: &Rule, indent: &str) -> String;
}

/// `a,b{color:red;margin:0}`
#[derive(Debug, Default)]
pub struct MinifiedFormatter;

/// One selector per line, one declaration per line.
#[derive(Debug, Default)]
pub struct BlockFormatter;

/// The whole rule on one line.
#[derive(Debug, Default)]
pub struct SingleLineFormatter;

/// Selectors padded to a fixed column, declarations aligned after it.
#[derive(Debug, Default)]
pub struct PaddedFormatter;

fn pretty_declarations(rule: &Rule) -> Vec<String> {
    rule.declarations
        .iter()
        .filter(|d| d.valid)
        .map(|d| format!("{};", d))
        .collect()
}

fn pretty_selectors(rule: &Rule) -> Vec<String> {
    rule.selectors.iter().map(|s| s.to_string()).collect()
}

impl Formatter for MinifiedFormatter {
    fn format_rule(&self, rule: &Rule, _indent: &str) -> String {
        let selectors: Vec<String> = rule
            .selectors
            .iter()
            .map(|s| minify_selector(s.as_str()))
            .collect();
        let declarations: Vec<String> = rule
            .declarations
            .iter()
            .filter(|d| d.valid)
            .map(|d| {
                let important = if d.important { "!important" } else { "" };
                format!("{}:{}{}", d.property, d.value, important)
            })
            .collect();
        format!("{}{{{}}}", selectors.join(","), declarations.join(";"))
    }
}

impl Formatter for BlockFormatter {
    fn format_rule(&self, rule: &Rule, indent: &str) -> String {
        let mut out = String::new();
        let separator = format!(",\n{}", indent);
        out.push_str(indent);
        out.push_str(&pretty_selectors(rule).join(&separator));
        out.push_str(" {\n");
        for decl in pretty_declarations(rule) {
            out.push_str(indent);
            out.push_str(INDENT);
            out.push_str(&decl);
            out.push('\n');
        }
        out.push_str(indent);
        out.push('}');
        out
    }
}

impl Formatter for SingleLineFormatter {
    fn format_rule(&self, rule: &Rule, indent: &str) -> String {
        format!(
            "{}{} {{ {} }}",
            indent,
            pretty_selectors(rule).join(", "),
            pretty_declarations(rule).join(" ")
        )
    }
}

impl Formatter for PaddedFormatter {
    fn format_rule(&self, rule: &Rule, indent: &str) -> String {
        let head = format!("{}{}", indent, pretty_selectors(rule).join(", "));
        let mut out = format!("{:<width$}", head, width = PAD_WIDTH);
        if head.chars().count() >= PAD_WIDTH {
            out.push(' ');
        }
        let column = out.chars().count() + 2;

        out.push_str("{ ");
        for (i, decl) in pretty_declarations(rule).iter().enumerate() {
            if i > 0 {
                out.push('\n');
                out.push_str(&" ".repeat(column));
            }
            out.push_str(decl);
        }
        out.push_str(" }");
        out
    }
}

/// The formatter selected by `options`.
pub fn formatter_for(options: &Options) -> Box<dyn Formatter> {
    if options.minify.is_minified() {
        return Box::new(MinifiedFormatter);
    }
    match options.formatter {
        FormatterKind::Block => Box::new(BlockFormatter),
        FormatterKind::SingleLine => Box::new(SingleLineFormatter),
        FormatterKind::Padded => Box::new(PaddedFormatter),
    }
}

fn minify_selector(selector: &str) -> String {
    let selector = WHITESPACE_RE.replace_all(selector.trim(), " ");
    COMBINATOR_RE.replace_all(&selector, "$1").into_owned()
}

fn minify_prelude(prelude: &str) -> String {
    let prelude = WHITESPACE_RE.replace_all(prelude.trim(), " ");
    let prelude = COMMA_RE.replace_all(&prelude, ",");
    let prelude = MEDIA_FEATURE_RE.replace_all(&prelude, "($1:");
    prelude.replace(" ;", ";")
}

/// Runs the enabled value passes over one declaration. With `compact` set
/// the value's whitespace is squeezed as well.
pub fn minify_declaration(decl: &mut Declaration, passes: MinifyPasses, compact: bool) {
    let mut value = decl.value.clone();
    let zeros_apply = decl.canonical_property != "flex" && !value.contains("calc(");

    if compact {
        value = WHITESPACE_RE.replace_all(&value, " ").into_owned();
        value = COMMA_RE.replace_all(&value, ",").into_owned();
    }
    value = outside_urls(&value, |chunk| {
        let mut chunk = chunk.to_string();
        if passes.contains(MinifyPasses::TRANSPARENT) {
            chunk = TRANSPARENT_RE.replace_all(&chunk, "transparent").into_owned();
        }
        if passes.contains(MinifyPasses::COLORS) {
            chunk = collapse_hex_colors(&chunk);
        }
        if passes.contains(MinifyPasses::ZEROS) && zeros_apply {
            chunk = ZERO_UNIT_RE.replace_all(&chunk, "${1}0").into_owned();
            chunk = LEADING_ZERO_RE.replace_all(&chunk, "${1}.${2}").into_owned();
        }
        chunk
    });
    if passes.contains(MinifyPasses::ZERO_LISTS)
        && ZERO_LIST_PROPERTIES.contains(&decl.canonical_property.as_str())
        && ZERO_LIST_RE.is_match(&value)
    {
        value = "0".to_string();
    }

    if value != decl.value {
        decl.set_value(value);
    }
}

/// Applies `f` to every stretch of `value` outside `url(...)` arguments.
fn outside_urls(value: &str, f: impl Fn(&str) -> String) -> String {
    let mut out = String::with_capacity(value.len());
    let mut last = 0;
    for m in URL_SPAN_RE.find_iter(value) {
        out.push_str(&f(&value[last..m.start()]));
        out.push_str(m.as_str());
        last = m.end();
    }
    out.push_str(&f(&value[last..]));
    out
}

/// `#aabbcc` to `#abc`, leaving any other hex run alone.
fn collapse_hex_colors(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut last = 0;
    let mut cursor = 0;

    while let Some(rel) = value[cursor..].find('#') {
        let at = cursor + rel;
        let digits = &value[at + 1..];
        let run = digits.bytes().take_while(u8::is_ascii_hexdigit).count();
        let bounded = digits[run..]
            .chars()
            .next()
            .is_none_or(|c| !(c.is_alphanumeric() || c == '-' || c == '_'));
        let d = digits.as_bytes();
        if run == 6
            && bounded
            && d[0].eq_ignore_ascii_case(&d[1])
            && d[2].eq_ignore_ascii_case(&d[3])
            && d[4].eq_ignore_ascii_case(&d[5])
        {
            out.push_str(&value[last..=at]);
            for i in [0, 2, 4] {
                out.push(d[i] as char);
            }
            last = at + 7;
        }
        cursor = at + 1;
    }

    out.push_str(&value[last..]);
    out
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Open(String),
    Close,
    Statement(String),
    Rule(String),
    Comment(String),
}

fn label_kind(label: &str) -> Option<TokenKind> {
    LABEL_RE
        .captures(label)
        .and_then(|caps| TokenKind::from_tag(&caps[1]))
}

/// Splits the skeleton text into segments.
fn parse_segments(text: &str) -> Vec<Segment> {
    let mut segments = Vec::new();
    let mut rest = text;

    loop {
        rest = rest.trim_start();
        if rest.is_empty() {
            break;
        }

        if let Some(m) = LABEL_RE.find(rest).filter(|m| m.start() == 0) {
            match label_kind(m.as_str()) {
                Some(TokenKind::Rule) => {
                    segments.push(Segment::Rule(m.as_str().to_string()));
                    rest = &rest[m.end()..];
                    continue;
                }
                Some(TokenKind::Comment) => {
                    segments.push(Segment::Comment(m.as_str().to_string()));
                    rest = &rest[m.end()..];
                    continue;
                }
                _ => {}
            }
        }

        let delimiter = rest.find(['{', '}', ';']);
        let next_rule = LABEL_RE
            .find_iter(rest)
            .find(|m| label_kind(m.as_str()) == Some(TokenKind::Rule))
            .map(|m| m.start());

        // A delimiter only counts when it comes before the next rule label.
        let delimiter = delimiter.filter(|&d| next_rule.is_none_or(|r| d < r));

        if let Some(d) = delimiter {
            let head = rest[..d].trim();
            match rest.as_bytes()[d] {
                b'{' => segments.push(Segment::Open(head.to_string())),
                b'}' => {
                    if !head.is_empty() {
                        segments.push(Segment::Statement(head.to_string()));
                    }
                    segments.push(Segment::Close);
                }
                _ => {
                    if !head.is_empty() {
                        segments.push(Segment::Statement(format!("{};", head)));
                    }
                }
            }
            rest = &rest[d + 1..];
        } else if let Some(r) = next_rule {
            segments.push(Segment::Statement(rest[..r].trim().to_string()));
            rest = &rest[r..];
        } else {
            segments.push(Segment::Statement(rest.trim().to_string()));
            break;
        }
    }

    segments
}

/// Drops unknown or empty rules, then any block left with nothing inside.
fn prune(segments: Vec<Segment>, rules: &RuleSet) -> Vec<Segment> {
    let mut out: Vec<Segment> = Vec::with_capacity(segments.len());
    for segment in segments {
        match segment {
            Segment::Rule(label) if rules.get(&label).is_none_or(Rule::is_empty) => {
                log::trace!("pruning empty rule {}", label);
            }
            Segment::Close if matches!(out.last(), Some(Segment::Open(_))) => {
                out.pop();
            }
            other => out.push(other),
        }
    }
    out
}

/// Renders the skeleton `text` with the rules in `rules`, then restores
/// every literal from `store`.
pub fn render(text: &str, rules: &mut RuleSet, store: &LiteralStore, options: &Options) -> String {
    let minified = options.minify.is_minified();
    let passes = options.minify.passes();
    rules.for_each_mut(|rule| {
        for decl in &mut rule.declarations {
            minify_declaration(decl, passes, minified);
        }
    });

    let formatter = formatter_for(options);
    let segments = prune(parse_segments(text), rules);
    let out = if minified {
        layout_minified(&segments, rules, formatter.as_ref())
    } else {
        layout_pretty(&segments, rules, formatter.as_ref())
    };

    let out = store.restore_all(&out);
    if minified {
        out.trim().to_string()
    } else {
        format!("{}\n", out.trim())
    }
}

fn layout_minified(segments: &[Segment], rules: &RuleSet, formatter: &dyn Formatter) -> String {
    let mut out = String::new();
    for segment in segments {
        match segment {
            Segment::Open(prelude) => {
                out.push_str(&minify_prelude(prelude));
                out.push('{');
            }
            Segment::Close => out.push('}'),
            Segment::Statement(statement) => out.push_str(&minify_prelude(statement)),
            Segment::Comment(label) => {
                out.push_str(label);
                out.push('\n');
            }
            Segment::Rule(label) => {
                if let Some(rule) = rules.get(label) {
                    for comment in &rule.comments {
                        out.push_str(comment);
                        out.push('\n');
                    }
                    out.push_str(&formatter.format_rule(rule, ""));
                }
            }
        }
    }
    out
}

fn layout_pretty(segments: &[Segment], rules: &RuleSet, formatter: &dyn Formatter) -> String {
    let mut out = String::new();
    let mut depth = 0usize;

    for segment in segments {
        let indent = INDENT.repeat(depth);
        match segment {
            Segment::Open(prelude) => {
                out.push_str(&format!("{}{} {{\n", indent, prelude));
                depth += 1;
            }
            Segment::Close => {
                depth = depth.saturating_sub(1);
                let trimmed = out.trim_end_matches('\n').len();
                out.truncate(trimmed);
                out.push_str(&format!("\n{}}}\n\n", INDENT.repeat(depth)));
            }
            Segment::Statement(statement) => {
                out.push_str(&format!("{}{}\n", indent, statement));
            }
            Segment::Comment(label) => {
                out.push_str(&format!("{}{}\n", indent, label));
            }
            Segment::Rule(label) => {
                if let Some(rule) = rules.get(label) {
                    for comment in &rule.comments {
                        out.push_str(&format!("{}{}\n", indent, comment));
                    }
                    out.push_str(&formatter.format_rule(rule, &indent));
                    out.push_str("\n\n");
                }
            }
        }
    }

    BLANK_LINES_RE.replace_all(&out, "\n\n").into_owned()
}
