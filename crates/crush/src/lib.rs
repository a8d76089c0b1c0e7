//! # Crush - CSS preprocessor
//!
//! Crush takes a host stylesheet, inlines its `@import`s, expands the extra
//! syntax on top of plain CSS and writes out minified or pretty-printed CSS.
//!
//! - **Imports**: relative, document-root and media-scoped `@import`s are
//!   inlined, with `url()`s rewritten to stay valid
//! - **Variables**: `@variables { name: value }` blocks, referenced with
//!   `var(name)`, `$(name)`, `${name}` or `$name`
//! - **Functions**: `math()` (or bare parentheses), `percent()`, `floor()`,
//!   `ceil()`, `round()` and `data-uri()`
//! - **Aliases**: vendor-prefixed copies of properties, functions, values and
//!   at-rule blocks from configurable [`AliasTables`]
//! - **Selectors**: `:any()` expansion plus the `:hocus` and `:pocus`
//!   shorthands
//! - **Macros**: [`RuleMacro`] callbacks that rewrite whole rules
//!
//! ## Quick Start
//!
//! ```rust
//! use crush::{CompileContext, Compiler, Options};
//!
//! let source = r#"
//!     @variables { accent: #ff0000; }
//!
//!     .button {
//!         color: $accent;
//!         width: (10 + 10)px;
//!     }
//! "#;
//!
//! let output = Compiler::default().compile(source, &CompileContext::default(), &Options::default());
//! assert_eq!(output.css, ".button{color:#f00;width:20px}");
//! assert!(output.warnings.is_empty());
//! ```
//!
//! ## Pipeline
//!
//! 1. [`import`]: `@import` inlining
//! 2. [`tokens`]: comments and strings are swapped for inert labels
//! 3. [`variables`]: variable blocks are collected and references replaced
//! 4. [`rule`]: every innermost `selector { ... }` span becomes a [`Rule`]
//! 5. [`functions`]: custom functions in declaration values are evaluated
//! 6. [`alias`] and [`macros`]: vendor clones and rule macros, then
//!    [`selectors`] expansion
//! 7. [`render`]: rules are laid out and the labels restored
//!
//! Malformed CSS never fails a compile. Problems are reported in
//! [`CompileOutput::warnings`] and the offending fragment is dropped or
//! passed through.

pub mod alias;
pub mod balanced;
pub mod error;
pub mod fingerprint;
pub mod functions;
pub mod import;
pub mod macros;
pub mod options;
pub mod process;
pub mod render;
pub mod rule;
pub mod selectors;
pub mod tokens;
pub mod variables;

pub use alias::AliasTables;
pub use error::{CrushError, Diagnostics};
pub use fingerprint::{CacheStatus, Fingerprint};
pub use import::{CompileContext, ImportRecord};
pub use macros::RuleMacro;
pub use options::Options;
pub use process::{CompileOutput, Compiler};
pub use rule::{Declaration, Rule};
