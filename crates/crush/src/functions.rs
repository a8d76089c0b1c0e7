//! Custom functions evaluated inside declaration values.
//!
//! | name            | result                                         |
//! |-----------------|------------------------------------------------|
//! | `math` or bare  | arithmetic over `+ - * / ( )`                  |
//! | `percent`, `pc` | `a / b * 100` with optional precision, plus `%` |
//! | `floor`         | `math`, rounded down                           |
//! | `ceil`          | `math`, rounded up                             |
//! | `round`         | `math`, rounded to nearest                     |
//! | `data-uri`      | base64 `url()` for a whitelisted local file    |
//!
//! Calls are resolved innermost first. Bare parentheses count as `math` only
//! at the top of a value or inside another custom function, so groups in
//! `calc()` and friends are left alone.

use std::fs;
use std::path::{Path, PathBuf};

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use nom::{
    IResult,
    branch::alt,
    character::complete::{char, multispace0, one_of},
    combinator::{all_consuming, map},
    multi::fold_many0,
    number::complete::double,
    sequence::{delimited, pair, preceded},
};
use phf::phf_map;

use crate::balanced::{match_balanced, split_top_level};
use crate::error::Diagnostics;
use crate::tokens::{LABEL_RE, LiteralStore, TokenKind};

/// Decimal places kept by `math`.
const MATH_PRECISION: f64 = 1e10;

/// Default precision of `percent`.
const DEFAULT_PERCENT_PRECISION: u32 = 7;

/// Files `data-uri` is willing to inline.
static MIME_TYPES: phf::Map<&'static str, &'static str> = phf_map! {
    "woff" => "font/woff",
    "ttf" => "font/truetype",
    "gif" => "image/gif",
    "jpeg" => "image/jpeg",
    "jpg" => "image/jpeg",
    "png" => "image/png",
};

/// The closed set of functions the evaluator understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CssFunction {
    Math,
    Percent,
    Floor,
    Ceil,
    Round,
    DataUri,
}

impl CssFunction {
    /// Looks up a function by the name written before its parenthesis. The
    /// empty name is `math`.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "" | "math" => Some(CssFunction::Math),
            "percent" | "pc" => Some(CssFunction::Percent),
            "floor" => Some(CssFunction::Floor),
            "ceil" => Some(CssFunction::Ceil),
            "round" => Some(CssFunction::Round),
            "data-uri" => Some(CssFunction::DataUri),
            _ => None,
        }
    }

    pub fn is_custom(name: &str) -> bool {
        !name.is_empty() && Self::from_name(name).is_some()
    }
}

/// What the evaluator needs from the running compile.
pub struct FunctionContext<'a> {
    /// Directory relative `data-uri` paths resolve against.
    pub base_dir: &'a Path,
    /// Directory absolute `data-uri` paths resolve against.
    pub doc_root: &'a Path,
    pub store: &'a mut LiteralStore,
    pub diagnostics: &'a mut Diagnostics,
}

/// Evaluates every custom function call in `value`.
pub fn evaluate_value(value: &str, ctx: &mut FunctionContext) -> String {
    evaluate_in(value, ctx, false)
}

fn evaluate_in(value: &str, ctx: &mut FunctionContext, inside_native: bool) -> String {
    let mut out = String::with_capacity(value.len());
    let mut offset = 0;

    while let Some(rel) = value[offset..].find('(') {
        let open = offset + rel;
        let name_start = value[..open]
            .char_indices()
            .rev()
            .find(|(_, c)| !(c.is_ascii_alphanumeric() || *c == '-' || *c == '_'))
            .map_or(0, |(i, c)| i + c.len_utf8());
        let name = &value[name_start..open];

        let span = match match_balanced(value, '(', ')', open) {
            Ok(span) => span,
            Err(e) => {
                ctx.diagnostics
                    .warn(format!("Skipping functions in '{}': {}", value, e));
                break;
            }
        };
        let inner = span.inner(value);

        match CssFunction::from_name(name) {
            Some(function) if !(name.is_empty() && inside_native) => {
                out.push_str(&value[offset..name_start]);
                let args = evaluate_in(inner, ctx, false);
                out.push_str(&evaluate(function, &args, ctx));
            }
            _ if name == "url" => {
                out.push_str(&value[offset..span.end]);
            }
            _ => {
                out.push_str(&value[offset..open]);
                out.push('(');
                let nested = evaluate_in(inner, ctx, inside_native || !name.is_empty());
                out.push_str(&nested);
                out.push(')');
            }
        }
        offset = span.end;
    }

    out.push_str(&value[offset..]);
    out
}

/// Evaluates a single function over already-evaluated arguments.
pub fn evaluate(function: CssFunction, args: &str, ctx: &mut FunctionContext) -> String {
    match function {
        CssFunction::Math => math(args, ctx.diagnostics),
        CssFunction::Percent => percent(args, ctx.diagnostics),
        CssFunction::Floor => rounded(args, f64::floor, ctx.diagnostics),
        CssFunction::Ceil => rounded(args, f64::ceil, ctx.diagnostics),
        CssFunction::Round => rounded(args, f64::round, ctx.diagnostics),
        CssFunction::DataUri => data_uri(args, ctx),
    }
}

/// `math(expr)` or `math(expr, unit)`.
///
/// Everything but digits, `.`, operators, parentheses and spaces is stripped
/// before parsing, so no other input can reach the evaluator.
pub fn math(args: &str, diagnostics: &mut Diagnostics) -> String {
    let parts = split_top_level(args, ',');
    let unit = parts.get(1).map_or("", |u| u.trim());
    let expression: String = parts[0]
        .chars()
        .filter(|c| c.is_ascii_digit() || " .+-*/()".contains(*c))
        .collect();

    match all_consuming(delimited(multispace0, parse_expr, multispace0))(expression.as_str()) {
        Ok((_, result)) if result.is_finite() => {
            format!("{}{}", format_number((result * MATH_PRECISION).round() / MATH_PRECISION), unit)
        }
        _ => {
            diagnostics.warn(format!("Could not evaluate math expression '{}'", args.trim()));
            format!("0{}", unit)
        }
    }
}

fn parse_expr(input: &str) -> IResult<&str, f64> {
    let (input, first) = parse_term(input)?;
    fold_many0(
        pair(delimited(multispace0, one_of("+-"), multispace0), parse_term),
        move || first,
        |acc, (op, value)| if op == '+' { acc + value } else { acc - value },
    )(input)
}

fn parse_term(input: &str) -> IResult<&str, f64> {
    let (input, first) = parse_factor(input)?;
    fold_many0(
        pair(delimited(multispace0, one_of("*/"), multispace0), parse_factor),
        move || first,
        |acc, (op, value)| if op == '*' { acc * value } else { acc / value },
    )(input)
}

fn parse_factor(input: &str) -> IResult<&str, f64> {
    alt((
        delimited(
            char('('),
            delimited(multispace0, parse_expr, multispace0),
            char(')'),
        ),
        map(preceded(char('-'), parse_factor), |v| -v),
        preceded(char('+'), parse_factor),
        double,
    ))(input)
}

/// Formats a number without exponent or trailing zeros.
pub fn format_number(value: f64) -> String {
    if value == 0.0 {
        return "0".to_string();
    }
    if value.fract() == 0.0 && value.abs() < 1e15 {
        return format!("{}", value as i64);
    }
    let formatted = format!("{:.10}", value);
    formatted.trim_end_matches('0').trim_end_matches('.').to_string()
}

fn rounded(args: &str, op: fn(f64) -> f64, diagnostics: &mut Diagnostics) -> String {
    let parts = split_top_level(args, ',');
    let unit = parts.get(1).map_or("", |u| u.trim());
    let value = math(parts[0], diagnostics);
    let number: f64 = value.parse().unwrap_or(0.0);
    format!("{}{}", format_number(op(number)), unit)
}

/// `percent(numerator, denominator[, precision])`.
pub fn percent(args: &str, diagnostics: &mut Diagnostics) -> String {
    let parts = split_top_level(args, ',');
    if !(2..=3).contains(&parts.len()) {
        diagnostics.warn(format!("percent() takes 2 or 3 arguments, got '{}'", args.trim()));
        return "0%".to_string();
    }

    let numerator = math(parts[0], diagnostics);
    let denominator = math(parts[1], diagnostics);
    let precision = parts
        .get(2)
        .and_then(|p| p.trim().parse::<u32>().ok())
        .unwrap_or(DEFAULT_PERCENT_PRECISION)
        .min(18);

    match decimal_percent(&numerator, &denominator, precision) {
        Some(result) => format!("{}%", result),
        None => {
            diagnostics.warn(format!("percent() cannot divide by '{}'", denominator));
            "0%".to_string()
        }
    }
}

/// Exact decimal `a / b * 100`, truncated to `precision` places.
fn decimal_percent(numerator: &str, denominator: &str, precision: u32) -> Option<String> {
    let (n_mantissa, n_scale) = parse_decimal(numerator)?;
    let (d_mantissa, d_scale) = parse_decimal(denominator)?;
    if d_mantissa == 0 {
        return None;
    }

    let scaled = 10i128
        .checked_pow(d_scale + 2 + precision)
        .and_then(|f| n_mantissa.checked_mul(f));
    let divisor = 10i128
        .checked_pow(n_scale)
        .and_then(|f| d_mantissa.checked_mul(f));

    let quotient = match (scaled, divisor) {
        (Some(scaled), Some(divisor)) => scaled / divisor,
        _ => {
            let n: f64 = numerator.parse().ok()?;
            let d: f64 = denominator.parse().ok()?;
            return Some(format_number(n / d * 100.0));
        }
    };

    let negative = quotient < 0;
    let digits = format!("{:0>width$}", quotient.unsigned_abs(), width = precision as usize + 1);
    let (whole, fraction) = digits.split_at(digits.len() - precision as usize);
    let fraction = fraction.trim_end_matches('0');

    let mut out = String::new();
    if negative {
        out.push('-');
    }
    out.push_str(whole);
    if !fraction.is_empty() {
        out.push('.');
        out.push_str(fraction);
    }
    Some(out)
}

fn parse_decimal(text: &str) -> Option<(i128, u32)> {
    let text = text.trim();
    let (whole, fraction) = text.split_once('.').unwrap_or((text, ""));
    let scale = u32::try_from(fraction.len()).ok()?;
    let digits = format!("{}{}", whole, fraction);
    let mantissa = if digits == "-" || digits.is_empty() {
        0
    } else {
        digits.parse::<i128>().ok()?
    };
    Some((mantissa, scale))
}

/// `data-uri(path)`: inlines a local file as base64, or falls back to
/// a plain `url()`.
fn data_uri(args: &str, ctx: &mut FunctionContext) -> String {
    let raw = args.trim();
    let literal = if LABEL_RE.is_match(raw) {
        ctx.store.get(raw).unwrap_or(raw)
    } else {
        raw
    };
    let path = literal
        .trim_matches(|c: char| c == '"' || c == '\'')
        .to_string();

    let fallback = |store: &mut LiteralStore| store.add(TokenKind::Url, format!("url({})", path));

    if path.starts_with("http://") || path.starts_with("https://") || path.starts_with("//") {
        return fallback(ctx.store);
    }

    let file = resolve_asset(&path, ctx.base_dir, ctx.doc_root);
    let extension = file
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();
    let Some(mime) = MIME_TYPES.get(extension.as_str()) else {
        log::debug!("data-uri: '{}' is not an inlinable type", path);
        return fallback(ctx.store);
    };

    match fs::read(&file) {
        Ok(bytes) => {
            let encoded = STANDARD.encode(bytes);
            ctx.store
                .add(TokenKind::Url, format!("url(data:{};base64,{})", mime, encoded))
        }
        Err(e) => {
            ctx.diagnostics
                .warn(format!("data-uri: could not read {}: {}", file.display(), e));
            fallback(ctx.store)
        }
    }
}

fn resolve_asset(path: &str, base_dir: &Path, doc_root: &Path) -> PathBuf {
    match path.strip_prefix('/') {
        Some(absolute) => doc_root.join(absolute),
        None => base_dir.join(path),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn eval(value: &str) -> (String, Diagnostics) {
        let mut store = LiteralStore::new(true);
        let mut diagnostics = Diagnostics::new();
        let dir = Path::new(".");
        let out = {
            let mut ctx = FunctionContext {
                base_dir: dir,
                doc_root: dir,
                store: &mut store,
                diagnostics: &mut diagnostics,
            };
            evaluate_value(value, &mut ctx)
        };
        (store.restore_all(&out), diagnostics)
    }

    #[test]
    fn test_bare_parens_are_math() {
        assert_eq!(eval("(10 + 10)px").0, "20px");
        assert_eq!(eval("math(2 * (3 + 4), em)").0, "14em");
        assert_eq!(eval("math(1/3)").0, "0.3333333333");
    }

    #[test]
    fn test_native_functions_untouched() {
        assert_eq!(eval("calc((1px + 2px) * 3)").0, "calc((1px + 2px) * 3)");
        assert_eq!(eval("rgba(0, 0, 0, math(1/2))").0, "rgba(0, 0, 0, 0.5)");
        assert_eq!(eval("url(a(b).png)").0, "url(a(b).png)");
    }

    #[test]
    fn test_math_strips_foreign_characters() {
        assert_eq!(eval("math(10px * 2; drop table)").0, "20");
    }

    #[test]
    fn test_math_failure_is_zero_with_warning() {
        let (out, diagnostics) = eval("math(1/0)");
        assert_eq!(out, "0");
        assert_eq!(diagnostics.warnings.len(), 1);
    }

    #[test]
    fn test_percent() {
        assert_eq!(eval("percent(1, 3)").0, "33.3333333%");
        assert_eq!(eval("pc(1, 2)").0, "50%");
        assert_eq!(eval("percent(2, 3, 2)").0, "66.66%");
        assert_eq!(eval("percent(1, 0)").0, "0%");
    }

    #[test]
    fn test_rounding() {
        assert_eq!(eval("floor(7 / 2)").0, "3");
        assert_eq!(eval("ceil(7 / 2)").0, "4");
        assert_eq!(eval("round(2.5 * 3)px").0, "8px");
        assert_eq!(eval("floor(-1.5)").0, "-2");
    }

    #[test]
    fn test_data_uri_falls_back() {
        let (out, diagnostics) = eval("data-uri(missing.png)");
        assert_eq!(out, "url(missing.png)");
        assert_eq!(diagnostics.warnings.len(), 1);

        let (out, diagnostics) = eval("data-uri(http://example.com/a.png)");
        assert_eq!(out, "url(http://example.com/a.png)");
        assert!(diagnostics.is_clean());

        let (out, _) = eval("data-uri(font.svg)");
        assert_eq!(out, "url(font.svg)");
    }

    #[test]
    fn test_format_number() {
        assert_eq!(format_number(20.0), "20");
        assert_eq!(format_number(-0.0), "0");
        assert_eq!(format_number(0.125), "0.125");
    }
}
