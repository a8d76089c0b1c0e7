//! Cache fingerprints.
//!
//! A compiled stylesheet stays valid while every local import still exists,
//! the sum of the host's and the imports' modification times is unchanged,
//! and the same options are in effect. The caller persists the fingerprint
//! next to its output (typically as JSON) and validates it before reuse.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::CrushError;
use crate::import::{ImportRecord, modified_secs, relative_path};
use crate::options::Options;

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Fingerprint {
    /// Local imports, relative to the host file's directory.
    pub imports: Vec<String>,
    /// Host modification time plus every local import's.
    pub datem_sum: u64,
    /// Serialized options of the compile.
    pub options: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheStatus {
    Fresh,
    Stale,
    /// A recorded import no longer exists. The cached output must go.
    MissingImport(PathBuf),
}

impl Fingerprint {
    /// Builds the fingerprint of a finished compile. Import paths are stored
    /// relative to `host_dir`, the directory [`Fingerprint::validate`] later
    /// resolves them against.
    pub fn new(
        imports: &[ImportRecord],
        host_modified: Option<u64>,
        options: &Options,
        host_dir: &Path,
    ) -> Self {
        let host_dir = if host_dir.as_os_str().is_empty() {
            Path::new(".")
        } else {
            host_dir
        };
        let base = host_dir.canonicalize().unwrap_or_else(|_| host_dir.to_path_buf());
        let mut datem_sum = host_modified.unwrap_or(0);
        let mut paths = Vec::new();

        for record in imports.iter().filter(|r| r.is_local()) {
            let Some(resolved) = &record.resolved_path else {
                continue;
            };
            datem_sum += record.modified.unwrap_or(0);
            let resolved = resolved.canonicalize().unwrap_or_else(|_| resolved.clone());
            paths.push(relative_path(&resolved, &base));
        }

        Self {
            imports: paths,
            datem_sum,
            options: options.fingerprint(),
        }
    }

    pub fn from_json(source: &str) -> Result<Self, CrushError> {
        Ok(serde_json::from_str(source)?)
    }

    pub fn to_json(&self) -> Result<String, CrushError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Checks a stored fingerprint against the files on disk and the options
    /// about to be used.
    pub fn validate(&self, host_path: &Path, options: &Options) -> CacheStatus {
        let base = host_path.parent().unwrap_or_else(|| Path::new("."));
        let mut datem_sum = modified_secs(host_path).unwrap_or(0);

        for import in &self.imports {
            let path = base.join(import);
            match modified_secs(&path) {
                Some(modified) => datem_sum += modified,
                None => {
                    log::debug!("Cached import {} is gone", path.display());
                    return CacheStatus::MissingImport(path);
                }
            }
        }

        if datem_sum != self.datem_sum || options.fingerprint() != self.options {
            return CacheStatus::Stale;
        }
        CacheStatus::Fresh
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(path: &str, modified: u64, external: bool) -> ImportRecord {
        ImportRecord {
            requested_path: path.to_string(),
            resolved_path: (!external).then(|| PathBuf::from("/site/css").join(path)),
            media: None,
            is_external: external,
            modified: (!external).then_some(modified),
        }
    }

    #[test]
    fn test_external_imports_are_ignored() {
        let imports = [
            record("a.css", 100, false),
            record("https://cdn/x.css", 0, true),
            record("lib/b.css", 20, false),
        ];
        let fp = Fingerprint::new(&imports, Some(5), &Options::default(), Path::new("/site/css"));
        assert_eq!(fp.imports, ["a.css", "lib/b.css"]);
        assert_eq!(fp.datem_sum, 125);
    }

    #[test]
    fn test_json_round_trip() {
        let fp = Fingerprint {
            imports: vec!["a.css".into()],
            datem_sum: 42,
            options: Options::default().fingerprint(),
        };
        let json = fp.to_json().unwrap();
        assert_eq!(Fingerprint::from_json(&json).unwrap(), fp);
    }
}
