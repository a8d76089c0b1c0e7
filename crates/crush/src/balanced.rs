//! Balanced bracket matching.
//!
//! Locates `(...)`, `{...}` or `[...]` spans whose nesting depth returns to
//! zero, and splits text on separators that sit outside any brackets.

use crate::error::BalanceError;

/// Nesting bound for a single match. Keeps malformed input from running away.
pub const MAX_DEPTH: usize = 50;

/// A byte range into the scanned text. `end` is exclusive and points just past
/// the closing character.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    /// The text between the brackets, excluding the brackets themselves.
    pub fn inner<'a>(&self, text: &'a str) -> &'a str {
        &text[self.start + 1..self.end - 1]
    }

    pub fn slice<'a>(&self, text: &'a str) -> &'a str {
        &text[self.start..self.end]
    }
}

/// Finds the first balanced `open`/`close` span at or after `start_offset`.
///
/// Fails when the remaining text holds a different number of opening and
/// closing characters, or when nesting exceeds [`MAX_DEPTH`].
pub fn match_balanced(
    text: &str,
    open: char,
    close: char,
    start_offset: usize,
) -> Result<Span, BalanceError> {
    let rest = &text[start_offset..];
    let first = rest.find(open).ok_or(BalanceError::NoOpening(open))?;

    let opens = rest.matches(open).count();
    let closes = rest.matches(close).count();
    if opens != closes {
        return Err(BalanceError::Unbalanced { opens, closes });
    }

    let mut depth = 0usize;
    for (i, c) in rest[first..].char_indices() {
        if c == open {
            depth += 1;
            if depth > MAX_DEPTH {
                return Err(BalanceError::TooDeep { limit: MAX_DEPTH });
            }
        } else if c == close {
            depth -= 1;
            if depth == 0 {
                let start = start_offset + first;
                return Ok(Span {
                    start,
                    end: start + i + c.len_utf8(),
                });
            }
        }
    }

    Err(BalanceError::Unbalanced { opens, closes })
}

/// Replaces every top-level balanced span with the string returned by
/// `replace`. Spans nested inside a replaced span are part of its text.
pub fn match_all_balanced<F>(
    text: &str,
    open: char,
    close: char,
    mut replace: F,
) -> Result<String, BalanceError>
where
    F: FnMut(&str) -> String,
{
    let mut out = String::with_capacity(text.len());
    let mut offset = 0;

    while text[offset..].contains(open) {
        let span = match_balanced(text, open, close, offset)?;
        out.push_str(&text[offset..span.start]);
        out.push_str(&replace(span.slice(text)));
        offset = span.end;
    }

    out.push_str(&text[offset..]);
    Ok(out)
}

/// Splits `text` on `separator` wherever it sits outside `()` and `[]`.
///
/// Pieces are returned untrimmed; empty pieces are kept so callers can decide
/// what an empty entry means.
pub fn split_top_level(text: &str, separator: char) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0i32;
    let mut last = 0;

    for (i, c) in text.char_indices() {
        match c {
            '(' | '[' => depth += 1,
            ')' | ']' => depth -= 1,
            c if c == separator && depth <= 0 => {
                parts.push(&text[last..i]);
                last = i + c.len_utf8();
            }
            _ => {}
        }
    }

    parts.push(&text[last..]);
    parts
}
