//! Error types for the compile pipeline.
//!
//! Malformed user CSS is expected input and never surfaces as an `Err`:
//! such problems are collected as warnings in [`Diagnostics`] and the
//! affected fragment is dropped or passed through. [`CrushError`] is kept for
//! the conditions that end a compile (an unreadable host file, broken
//! configuration) and for internal invariant violations.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that abort a single compile.
///
/// # Examples
///
/// ```rust
/// use crush::{Compiler, Options};
///
/// let compiler = Compiler::default();
/// let output = compiler.compile_file("does/not/exist.css", &Options::default());
/// assert!(output.css.is_empty());
/// assert_eq!(output.errors.len(), 1);
/// ```
#[derive(Error, Debug)]
pub enum CrushError {
    /// The host stylesheet (or an explicitly requested file) could not be read.
    #[error("could not read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Options or alias tables could not be decoded.
    #[error("invalid configuration: {0}")]
    InvalidConfig(#[from] serde_json::Error),

    /// An internal invariant was broken. Indicates a bug, not bad input.
    #[error("internal error: {0}")]
    Internal(String),
}

/// Failure modes of the balanced bracket matcher.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BalanceError {
    /// No opening character was found after the start offset.
    #[error("no opening '{0}' found")]
    NoOpening(char),

    /// The remaining text has a different number of opening and closing characters.
    #[error("unbalanced brackets: {opens} opening vs {closes} closing")]
    Unbalanced { opens: usize, closes: usize },

    /// Nesting went deeper than the matcher allows.
    #[error("nesting deeper than {limit} levels")]
    TooDeep { limit: usize },
}

/// Ordered warnings and errors attached to a compile.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Diagnostics {
    pub warnings: Vec<String>,
    pub errors: Vec<String>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a recoverable problem. Also forwarded to the `log` facade.
    pub fn warn(&mut self, message: impl Into<String>) {
        let message = message.into();
        log::warn!("{}", message);
        self.warnings.push(message);
    }

    /// Records a problem that invalidated the compile.
    pub fn error(&mut self, message: impl Into<String>) {
        let message = message.into();
        log::error!("{}", message);
        self.errors.push(message);
    }

    pub fn is_clean(&self) -> bool {
        self.warnings.is_empty() && self.errors.is_empty()
    }
}
