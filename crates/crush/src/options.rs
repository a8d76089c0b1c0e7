//! Compile options.
//!
//! Options are plain data. They can be built in code or decoded from JSON,
//! and they serialize deterministically so the cache fingerprint can compare
//! the option set of two compiles.

use std::collections::BTreeMap;
use std::path::PathBuf;

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

use crate::error::CrushError;

bitflags! {
    /// Value-level minification passes.
    ///
    /// ```
    /// use crush::options::MinifyPasses;
    ///
    /// let passes = MinifyPasses::from_names(["colors", "zeros"]);
    /// assert!(passes.contains(MinifyPasses::COLORS));
    /// assert!(!passes.contains(MinifyPasses::TRANSPARENT));
    /// ```
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct MinifyPasses: u8 {
        /// `#aabbcc` becomes `#abc`
        const COLORS      = 0b0000_0001;
        /// `0px` becomes `0`, `0.5` becomes `.5`
        const ZEROS       = 0b0000_0010;
        /// `margin: 0 0 0 0` becomes `margin: 0`
        const ZERO_LISTS  = 0b0000_0100;
        /// `rgba(0,0,0,0)` becomes `transparent`
        const TRANSPARENT = 0b0000_1000;
    }
}

impl MinifyPasses {
    /// Builds a pass set from option names. Unknown names are ignored.
    pub fn from_names<'a>(names: impl IntoIterator<Item = &'a str>) -> Self {
        names
            .into_iter()
            .fold(MinifyPasses::empty(), |acc, name| match name {
                "colors" => acc | MinifyPasses::COLORS,
                "zeros" => acc | MinifyPasses::ZEROS,
                "zero-lists" => acc | MinifyPasses::ZERO_LISTS,
                "transparent" => acc | MinifyPasses::TRANSPARENT,
                other => {
                    log::debug!("Ignoring unknown minify pass: {}", other);
                    acc
                }
            })
    }
}

/// `minify`: a toggle, or a list of value passes to run on pretty output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Minify {
    Toggle(bool),
    Passes(Vec<String>),
}

impl Default for Minify {
    fn default() -> Self {
        Minify::Toggle(true)
    }
}

impl Minify {
    /// Whether output uses the minified layout.
    pub fn is_minified(&self) -> bool {
        matches!(self, Minify::Toggle(true))
    }

    pub fn passes(&self) -> MinifyPasses {
        match self {
            Minify::Toggle(true) => MinifyPasses::all(),
            Minify::Toggle(false) => MinifyPasses::empty(),
            Minify::Passes(names) => MinifyPasses::from_names(names.iter().map(String::as_str)),
        }
    }
}

/// Which vendors alias expansion may produce clones for.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VendorTarget {
    #[default]
    All,
    None,
    Only(Vec<String>),
}

impl VendorTarget {
    /// Whether an alias carrying `vendor` may be generated. Aliases without a
    /// vendor prefix are allowed unless aliasing is disabled.
    pub fn allows(&self, vendor: Option<&str>) -> bool {
        match self {
            VendorTarget::All => true,
            VendorTarget::None => false,
            VendorTarget::Only(vendors) => vendor.is_none_or(|v| vendors.iter().any(|t| t == v)),
        }
    }

    pub fn is_disabled(&self) -> bool {
        matches!(self, VendorTarget::None)
    }
}

/// Declaration block layout for pretty output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FormatterKind {
    #[default]
    Block,
    SingleLine,
    Padded,
}

/// Line ending used in the final output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Newlines {
    Unix,
    Windows,
    #[default]
    UsePlatform,
}

impl Newlines {
    pub fn as_str(self) -> &'static str {
        match self {
            Newlines::Unix => "\n",
            Newlines::Windows => "\r\n",
            Newlines::UsePlatform if cfg!(windows) => "\r\n",
            Newlines::UsePlatform => "\n",
        }
    }
}

/// Options for a single compile.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Options {
    pub minify: Minify,
    /// Text prepended as a preserved comment.
    pub boilerplate: Option<String>,
    /// Runtime variables; highest priority layer.
    pub vars: BTreeMap<String, String>,
    pub vendor_target: VendorTarget,
    /// Names of registered macros to run. `None` runs all of them.
    pub plugins: Option<Vec<String>>,
    pub formatter: FormatterKind,
    pub newlines: Newlines,
    /// Directory used to resolve relative imports when the source has no
    /// location on disk.
    pub context: Option<PathBuf>,
}

impl Options {
    /// Decodes options from JSON. Missing keys take their defaults.
    ///
    /// ```
    /// use crush::options::{Options, VendorTarget};
    ///
    /// let options = Options::from_json(r#"{"minify": false, "vendor_target": {"only": ["webkit"]}}"#).unwrap();
    /// assert!(!options.minify.is_minified());
    /// assert!(options.vendor_target.allows(Some("webkit")));
    /// assert!(!options.vendor_target.allows(Some("moz")));
    /// ```
    pub fn from_json(source: &str) -> Result<Self, CrushError> {
        Ok(serde_json::from_str(source)?)
    }

    /// Pretty-printed output with no value passes.
    pub fn pretty() -> Self {
        Self {
            minify: Minify::Toggle(false),
            ..Self::default()
        }
    }

    /// Stable serialization used for cache fingerprints. JSON fails only on
    /// a non UTF-8 `context` path; the debug form stands in for it then.
    pub fn fingerprint(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|e| {
            log::debug!("Options fingerprint falls back to debug form: {}", e);
            format!("{:?}", self)
        })
    }

    pub fn newline(&self) -> &'static str {
        self.newlines.as_str()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_options() {
        let options = Options::default();
        assert!(options.minify.is_minified());
        assert_eq!(options.minify.passes(), MinifyPasses::all());
        assert_eq!(options.vendor_target, VendorTarget::All);
        assert_eq!(options.formatter, FormatterKind::Block);
    }

    #[test]
    fn test_minify_pass_list_is_pretty() {
        let options = Options::from_json(r#"{"minify": ["colors"]}"#).unwrap();
        assert!(!options.minify.is_minified());
        assert_eq!(options.minify.passes(), MinifyPasses::COLORS);
    }

    #[test]
    fn test_vendor_target_none_blocks_everything() {
        let options = Options::from_json(r#"{"vendor_target": "none", "formatter": "single-line"}"#).unwrap();
        assert!(options.vendor_target.is_disabled());
        assert!(!options.vendor_target.allows(None));
        assert_eq!(options.formatter, FormatterKind::SingleLine);
    }

    #[test]
    fn test_fingerprint_tracks_changes() {
        let a = Options::default();
        let mut b = Options::default();
        assert_eq!(a.fingerprint(), b.fingerprint());
        b.vars.insert("brand".into(), "red".into());
        assert_ne!(a.fingerprint(), b.fingerprint());
    }

    #[cfg(unix)]
    #[test]
    fn test_fingerprint_of_non_utf8_context() {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;

        let a = Options {
            context: Some(PathBuf::from(OsStr::from_bytes(b"/srv/\xff"))),
            ..Options::default()
        };
        let b = Options {
            context: Some(PathBuf::from(OsStr::from_bytes(b"/srv/\xfe"))),
            ..Options::default()
        };
        assert!(!a.fingerprint().is_empty());
        assert_ne!(a.fingerprint(), b.fingerprint());
        assert_eq!(a.fingerprint(), a.clone().fingerprint());
    }
}
