//! `@import` inlining.
//!
//! Imports are resolved depth-first. Each file's own imports resolve against
//! that file's directory, absolute (`/`) imports against the document root.
//! An import carrying a media query is wrapped in an `@media` block, and
//! imports nested inside such a file are dropped since media contexts are
//! not merged.

use std::collections::HashSet;
use std::fs;
use std::path::{Component, Path, PathBuf};
use std::time::UNIX_EPOCH;

use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};

use crate::error::Diagnostics;

static IMPORT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#"@import\s+(?:url\(\s*)?(?:"([^"]*)"|'([^']*)'|([^\s;'"()]+))\s*\)?\s*([^;]*);"#,
    )
    .expect("valid import pattern")
});

static COMMENT_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)/\*.*?\*/").expect("valid comment pattern"));

static URL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"\b(url|data-uri)\(\s*(?:"([^"]*)"|'([^']*)'|([^\s'"()]*))\s*\)"#).expect("valid url pattern")
});

/// Stands in for `@` inside comments while imports are scanned.
const AT_MARKER: &str = "?at?";

/// One `@import` directive met while resolving.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportRecord {
    /// The path as written in the stylesheet.
    pub requested_path: String,
    pub resolved_path: Option<PathBuf>,
    pub media: Option<String>,
    pub is_external: bool,
    /// Seconds since the Unix epoch.
    pub modified: Option<u64>,
}

impl ImportRecord {
    /// Whether this import counts towards the cache fingerprint.
    pub fn is_local(&self) -> bool {
        !self.is_external && self.resolved_path.is_some()
    }
}

/// Where a compile takes its paths from.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompileContext {
    /// Directory of the host stylesheet.
    pub base_dir: PathBuf,
    /// Root for absolute (`/`) imports and assets.
    pub doc_root: PathBuf,
    /// Extra directories searched for relative imports, in order.
    pub import_paths: Vec<PathBuf>,
    /// The host file, when compiling from disk.
    pub host_path: Option<PathBuf>,
}

impl CompileContext {
    /// A context rooted at `base_dir`, which also serves as document root.
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        let base_dir = base_dir.into();
        Self {
            doc_root: base_dir.clone(),
            base_dir,
            ..Self::default()
        }
    }

    pub fn with_doc_root(mut self, doc_root: impl Into<PathBuf>) -> Self {
        self.doc_root = doc_root.into();
        self
    }

    pub fn with_import_paths(mut self, paths: Vec<PathBuf>) -> Self {
        self.import_paths = paths;
        self
    }

    pub fn with_host(mut self, host_path: impl Into<PathBuf>) -> Self {
        self.host_path = Some(host_path.into());
        self
    }
}

/// Modification time of `path` in whole seconds.
pub fn modified_secs(path: &Path) -> Option<u64> {
    let modified = fs::metadata(path).and_then(|m| m.modified()).ok()?;
    modified.duration_since(UNIX_EPOCH).ok().map(|d| d.as_secs())
}

/// Inlines every `@import` of `text`, returning the expanded text and one
/// record per distinct import.
pub fn resolve_imports(
    text: &str,
    context: &CompileContext,
    diagnostics: &mut Diagnostics,
) -> (String, Vec<ImportRecord>) {
    let base_dir = if context.base_dir.as_os_str().is_empty() {
        Path::new(".")
    } else {
        context.base_dir.as_path()
    };
    let mut resolver = Resolver {
        context,
        host_dir: normalize(base_dir),
        diagnostics,
        records: Vec::new(),
        recorded: HashSet::new(),
        stack: Vec::new(),
    };
    if let Some(host) = context.host_path.as_deref().and_then(|p| fs::canonicalize(p).ok()) {
        resolver.stack.push(host);
    }

    let expanded = resolver.expand(text, base_dir, false);
    (expanded.replace(AT_MARKER, "@"), resolver.records)
}

struct Resolver<'a> {
    context: &'a CompileContext,
    host_dir: PathBuf,
    diagnostics: &'a mut Diagnostics,
    records: Vec<ImportRecord>,
    recorded: HashSet<PathBuf>,
    /// Canonical paths of the files currently being expanded.
    stack: Vec<PathBuf>,
}

impl Resolver<'_> {
    fn expand(&mut self, text: &str, dir: &Path, in_media: bool) -> String {
        let text = hide_commented_at_rules(text);
        let mut out = String::with_capacity(text.len());
        let mut offset = 0;

        while let Some(caps) = IMPORT_RE.captures(&text[offset..]) {
            let Some(whole) = caps.get(0) else { break };
            let start = offset + whole.start();
            out.push_str(&self.rewrite_urls(&text[offset..start], dir));
            offset += whole.end();

            let requested = (1..=3)
                .find_map(|i| caps.get(i))
                .map_or("", |m| m.as_str())
                .trim()
                .to_string();
            let media = caps
                .get(4)
                .map(|m| m.as_str().trim().to_string())
                .filter(|m| !m.is_empty());

            if let Some(inlined) = self.import(&requested, media, dir, in_media) {
                out.push_str(&inlined);
            }
        }

        out.push_str(&self.rewrite_urls(&text[offset..], dir));
        out
    }

    fn import(&mut self, requested: &str, media: Option<String>, dir: &Path, in_media: bool) -> Option<String> {
        if requested.is_empty() {
            self.diagnostics.warn("Empty @import dropped");
            return None;
        }

        if is_external(requested) {
            self.diagnostics
                .warn(format!("External import not inlined: {}", requested));
            self.records.push(ImportRecord {
                requested_path: requested.to_string(),
                resolved_path: None,
                media,
                is_external: true,
                modified: None,
            });
            return None;
        }

        if in_media {
            self.diagnostics.warn(format!(
                "Import of '{}' inside a media-scoped import dropped",
                requested
            ));
            return None;
        }

        let Some(path) = self.locate(requested, dir) else {
            self.diagnostics
                .warn(format!("Import file not found: {}", requested));
            return None;
        };
        let canonical = fs::canonicalize(&path).unwrap_or_else(|_| path.clone());

        if self.stack.contains(&canonical) {
            self.diagnostics
                .warn(format!("Recursive import: {}", requested));
            return None;
        }

        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) => {
                self.diagnostics
                    .warn(format!("Could not read import {}: {}", path.display(), e));
                return None;
            }
        };
        log::debug!("Importing {}", path.display());

        if self.recorded.insert(canonical.clone()) {
            self.records.push(ImportRecord {
                requested_path: requested.to_string(),
                resolved_path: Some(canonical.clone()),
                media: media.clone(),
                is_external: false,
                modified: modified_secs(&path),
            });
        }

        let child_dir = canonical
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| dir.to_path_buf());

        self.stack.push(canonical);
        let expanded = self.expand(&content, &child_dir, media.is_some());
        self.stack.pop();

        Some(match media {
            Some(media) => format!("\n@media {} {{\n{}\n}}\n", media, expanded),
            None => format!("\n{}\n", expanded),
        })
    }

    fn locate(&self, requested: &str, dir: &Path) -> Option<PathBuf> {
        if let Some(absolute) = requested.strip_prefix('/') {
            let path = self.context.doc_root.join(absolute);
            return path.is_file().then_some(path);
        }

        std::iter::once(dir)
            .chain(self.context.import_paths.iter().map(PathBuf::as_path))
            .map(|base| base.join(requested))
            .find(|path| path.is_file())
    }

    /// Rewrites relative `url()`s of a chunk from `dir` so they resolve from
    /// the host file's directory.
    fn rewrite_urls(&self, chunk: &str, dir: &Path) -> String {
        let dir = normalize(dir);
        if dir == self.host_dir || !(chunk.contains("url(") || chunk.contains("data-uri(")) {
            return chunk.to_string();
        }

        URL_RE
            .replace_all(chunk, |caps: &Captures| {
                let function = &caps[1];
                let (url, quote) = match (caps.get(2), caps.get(3), caps.get(4)) {
                    (Some(m), _, _) => (m.as_str(), "\""),
                    (_, Some(m), _) => (m.as_str(), "'"),
                    (_, _, Some(m)) => (m.as_str(), ""),
                    _ => return caps[0].to_string(),
                };
                if !is_relative_url(url) {
                    return caps[0].to_string();
                }
                let target = normalize(&dir.join(url));
                let rewritten = relative_path(&target, &self.host_dir);
                format!("{function}({quote}{rewritten}{quote})")
            })
            .into_owned()
    }
}

fn is_external(path: &str) -> bool {
    path.starts_with("http://") || path.starts_with("https://") || path.starts_with("//")
}

fn is_relative_url(url: &str) -> bool {
    !(url.is_empty()
        || url.starts_with('/')
        || url.starts_with('#')
        || url.starts_with("data:")
        || url.contains("://"))
}

/// Replaces `@` inside comments so commented-out imports are never followed.
fn hide_commented_at_rules(text: &str) -> String {
    if !text.contains("/*") {
        return text.to_string();
    }
    COMMENT_RE
        .replace_all(text, |caps: &Captures| caps[0].replace('@', AT_MARKER))
        .into_owned()
}

/// Canonical form of `path` if it exists, otherwise a lexical cleanup.
fn normalize(path: &Path) -> PathBuf {
    if let Ok(canonical) = fs::canonicalize(path) {
        return canonical;
    }
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// `target` expressed relative to `base`, with `/` separators.
pub(crate) fn relative_path(target: &Path, base: &Path) -> String {
    let target: Vec<_> = target.components().collect();
    let base: Vec<_> = base.components().collect();
    let common = target
        .iter()
        .zip(&base)
        .take_while(|(a, b)| a == b)
        .count();

    let mut parts: Vec<String> = std::iter::repeat_n("..".to_string(), base.len() - common).collect();
    parts.extend(
        target[common..]
            .iter()
            .map(|c| c.as_os_str().to_string_lossy().into_owned()),
    );
    parts.join("/")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_relative_path() {
        assert_eq!(
            relative_path(Path::new("/site/css/lib/img/a.png"), Path::new("/site/css")),
            "lib/img/a.png"
        );
        assert_eq!(
            relative_path(Path::new("/site/img/a.png"), Path::new("/site/css")),
            "../img/a.png"
        );
    }

    #[test]
    fn test_comment_imports_are_hidden() {
        let hidden = hide_commented_at_rules("/* @import 'x.css'; */ p{}");
        assert!(!IMPORT_RE.is_match(&hidden));
    }

    #[test]
    fn test_import_pattern_forms() {
        for (source, path, media) in [
            ("@import 'a.css';", "a.css", ""),
            ("@import \"b.css\" print;", "b.css", "print"),
            ("@import url(c.css) screen and (min-width: 10px);", "c.css", "screen and (min-width: 10px)"),
            ("@import url( 'd.css' );", "d.css", ""),
        ] {
            let caps = IMPORT_RE.captures(source).unwrap();
            let found = (1..=3).find_map(|i| caps.get(i)).unwrap().as_str();
            assert_eq!(found, path);
            assert_eq!(caps.get(4).map_or("", |m| m.as_str()).trim(), media);
        }
    }

    #[test]
    fn test_urls_left_alone() {
        for url in ["/abs.png", "data:image/png;base64,AA", "http://x/y.png", "#frag", ""] {
            assert!(!is_relative_url(url), "{url}");
        }
        assert!(is_relative_url("../img/a.png"));
    }
}
