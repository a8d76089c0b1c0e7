//! The literal store.
//!
//! Strings, comments, parenthesised groups, rules and generated urls are
//! lifted out of the working text and replaced by short labels such as
//! `?s12?`. A `?` followed by a kind letter and a counter cannot come out of
//! a legitimate CSS token once strings are extracted, so later regex passes
//! can treat the text as pure structure. Labels are restored outer to inner
//! at render time.

use std::collections::HashMap;

use once_cell::sync::Lazy;
use regex::{Captures, Regex};

use crate::balanced::match_all_balanced;
use crate::error::Diagnostics;

/// Matches any label of any kind.
pub static LABEL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\?([cspru])(\d+)\?").expect("valid label pattern"));

/// Upper bound on nested restore passes for one kind.
const MAX_RESTORE_PASSES: usize = 16;

/// The kind of text a label stands for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenKind {
    Comment,
    String,
    Paren,
    Rule,
    Url,
}

impl TokenKind {
    /// Restore order: outermost first.
    pub const RESTORE_ORDER: [TokenKind; 4] = [
        TokenKind::Comment,
        TokenKind::String,
        TokenKind::Url,
        TokenKind::Paren,
    ];

    pub fn tag(self) -> char {
        match self {
            TokenKind::Comment => 'c',
            TokenKind::String => 's',
            TokenKind::Paren => 'p',
            TokenKind::Rule => 'r',
            TokenKind::Url => 'u',
        }
    }

    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "c" => Some(TokenKind::Comment),
            "s" => Some(TokenKind::String),
            "p" => Some(TokenKind::Paren),
            "r" => Some(TokenKind::Rule),
            "u" => Some(TokenKind::Url),
            _ => None,
        }
    }
}

/// Side table of extracted literals, owned by a single compile.
#[derive(Debug, Default)]
pub struct LiteralStore {
    counter: usize,
    keep_comments: bool,
    tokens: HashMap<TokenKind, HashMap<String, String>>,
}

impl LiteralStore {
    /// Creates an empty store. When `keep_comments` is false only comments
    /// opening with `/*!` survive capture.
    pub fn new(keep_comments: bool) -> Self {
        Self {
            keep_comments,
            ..Self::default()
        }
    }

    /// Mints a fresh label of `kind` without storing any text for it.
    pub fn mint(&mut self, kind: TokenKind) -> String {
        let label = format!("?{}{}?", kind.tag(), self.counter);
        self.counter += 1;
        label
    }

    /// Stores `text` under a fresh label and returns the label.
    pub fn add(&mut self, kind: TokenKind, text: impl Into<String>) -> String {
        let label = self.mint(kind);
        let previous = self
            .tokens
            .entry(kind)
            .or_default()
            .insert(label.clone(), text.into());
        debug_assert!(previous.is_none(), "label {label} minted twice");
        label
    }

    pub fn get(&self, label: &str) -> Option<&str> {
        let caps = LABEL_RE.captures(label)?;
        let kind = TokenKind::from_tag(&caps[1])?;
        self.tokens.get(&kind)?.get(label).map(String::as_str)
    }

    pub fn len(&self, kind: TokenKind) -> usize {
        self.tokens.get(&kind).map_or(0, HashMap::len)
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.values().all(HashMap::is_empty)
    }

    /// Rewrites every stored literal of `kind` in place.
    pub fn map_kind<F>(&mut self, kind: TokenKind, mut f: F)
    where
        F: FnMut(&str) -> String,
    {
        if let Some(entries) = self.tokens.get_mut(&kind) {
            for text in entries.values_mut() {
                *text = f(text);
            }
        }
    }

    /// Captures literals of `kind` in `text`, replacing each with a label.
    pub fn capture(&mut self, text: &str, kind: TokenKind, diagnostics: &mut Diagnostics) -> String {
        match kind {
            TokenKind::Comment => self.scan_quoted(text, true, false, diagnostics),
            TokenKind::String => self.scan_quoted(text, false, true, diagnostics),
            TokenKind::Paren => self.capture_parens(text, diagnostics),
            TokenKind::Rule | TokenKind::Url => text.to_string(),
        }
    }

    /// Captures comments and strings in one left-to-right pass, so a `/*`
    /// inside a string or a quote inside a comment is never misread.
    pub fn capture_comments_and_strings(&mut self, text: &str, diagnostics: &mut Diagnostics) -> String {
        self.scan_quoted(text, true, true, diagnostics)
    }

    /// Replaces each top-level parenthesised group with a paren label.
    pub fn capture_parens(&mut self, text: &str, diagnostics: &mut Diagnostics) -> String {
        match match_all_balanced(text, '(', ')', |group| self.add(TokenKind::Paren, group)) {
            Ok(out) => out,
            Err(e) => {
                diagnostics.warn(format!("Could not capture parentheses: {}", e));
                text.to_string()
            }
        }
    }

    /// Restores every label of `kind` in `text`, repeating while restored
    /// literals themselves contain labels of the same kind.
    pub fn restore(&self, text: &str, kind: TokenKind) -> String {
        let Some(entries) = self.tokens.get(&kind) else {
            return text.to_string();
        };
        let tag = kind.tag().to_string();
        let mut out = text.to_string();

        for _ in 0..MAX_RESTORE_PASSES {
            let mut replaced = false;
            let next = LABEL_RE.replace_all(&out, |caps: &Captures| {
                if caps[1] == tag {
                    if let Some(original) = entries.get(&caps[0]) {
                        replaced = true;
                        return original.clone();
                    }
                }
                caps[0].to_string()
            });
            let next = next.into_owned();
            if !replaced {
                break;
            }
            out = next;
        }
        out
    }

    /// Restores comments, strings, urls and parens, in that order, until no
    /// known label is left.
    pub fn restore_all(&self, text: &str) -> String {
        let mut out = text.to_string();
        for _ in 0..MAX_RESTORE_PASSES {
            let next = TokenKind::RESTORE_ORDER
                .iter()
                .fold(out.clone(), |acc, kind| self.restore(&acc, *kind));
            if next == out {
                break;
            }
            out = next;
        }
        out
    }

    fn scan_quoted(
        &mut self,
        text: &str,
        comments: bool,
        strings: bool,
        diagnostics: &mut Diagnostics,
    ) -> String {
        let mut out = String::with_capacity(text.len());
        let mut rest = text;

        while let Some(pos) = rest.find(['/', '"', '\'']) {
            out.push_str(&rest[..pos]);
            let tail = &rest[pos..];

            if tail.starts_with("/*") {
                let Some(close) = tail[2..].find("*/") else {
                    diagnostics.warn("Unterminated comment, left as is");
                    out.push_str(tail);
                    return out;
                };
                let comment = &tail[..close + 4];
                if comments {
                    if self.keep_comments || comment.starts_with("/*!") {
                        let label = self.add(TokenKind::Comment, comment);
                        out.push_str(&label);
                    }
                } else {
                    out.push_str(comment);
                }
                rest = &tail[comment.len()..];
                continue;
            }

            let quote = tail.as_bytes()[0];
            if quote == b'/' {
                out.push('/');
                rest = &tail[1..];
                continue;
            }

            match find_string_end(tail, quote) {
                Some(end) => {
                    let literal = &tail[..end];
                    if strings {
                        let label = self.add(TokenKind::String, literal);
                        out.push_str(&label);
                    } else {
                        out.push_str(literal);
                    }
                    rest = &tail[end..];
                }
                None => {
                    diagnostics.warn("Unterminated string, left as is");
                    out.push(quote as char);
                    rest = &tail[1..];
                }
            }
        }

        out.push_str(rest);
        out
    }
}

/// Returns the byte offset just past the closing quote. Strings may not span
/// unescaped newlines.
fn find_string_end(text: &str, quote: u8) -> Option<usize> {
    let bytes = text.as_bytes();
    let mut i = 1;
    while i < bytes.len() {
        match bytes[i] {
            b'\\' => i += 2,
            b'\n' => return None,
            b if b == quote => return Some(i + 1),
            _ => i += 1,
        }
    }
    None
}

/// Removes every label of `kind` from `text`, returning the trimmed text and
/// the removed labels in order.
pub fn take_labels(text: &str, kind: TokenKind) -> (String, Vec<String>) {
    let mut labels = Vec::new();
    let tag = kind.tag().to_string();
    let stripped = LABEL_RE.replace_all(text, |caps: &Captures| {
        if caps[1] == tag {
            labels.push(caps[0].to_string());
            String::new()
        } else {
            caps[0].to_string()
        }
    });
    (stripped.trim().to_string(), labels)
}
