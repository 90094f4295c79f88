//! Filename-stem matching between remote asset names and local files.

use crate::error::ReconcileError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use unicode_normalization::UnicodeNormalization;

/// How stems are compared. Defaults to exact, case-sensitive comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StemPolicy {
    pub case_sensitive: bool,
    /// NFC-normalize both sides before comparing.
    pub unicode_normalization: bool,
}

impl Default for StemPolicy {
    fn default() -> Self {
        Self {
            case_sensitive: true,
            unicode_normalization: false,
        }
    }
}

impl StemPolicy {
    fn key(&self, stem: &str) -> String {
        let stem: String = if self.unicode_normalization {
            stem.nfc().collect()
        } else {
            stem.to_string()
        };
        if self.case_sensitive {
            stem
        } else {
            stem.to_lowercase()
        }
    }
}

/// Stem of a server-recorded filename; `/` and `\` both separate segments.
pub fn remote_stem(original_filename: &str) -> &str {
    let name = original_filename
        .rsplit(|c: char| c == '/' || c == '\\')
        .next()
        .unwrap_or(original_filename);
    match name.rsplit_once('.') {
        Some((stem, _)) if !stem.is_empty() => stem,
        _ => name,
    }
}

pub fn local_stem(path: &Path) -> Option<String> {
    path.file_stem().map(|s| s.to_string_lossy().into_owned())
}

/// Local files grouped by comparison key, built once per run.
#[derive(Debug, Clone, Default)]
pub struct StemIndex {
    policy: StemPolicy,
    prefix: Option<String>,
    by_stem: HashMap<String, Vec<PathBuf>>,
    files: usize,
}

impl StemIndex {
    pub fn build<I>(paths: I, policy: StemPolicy, prefix: Option<String>) -> Self
    where
        I: IntoIterator<Item = PathBuf>,
    {
        let mut by_stem: HashMap<String, Vec<PathBuf>> = HashMap::new();
        let mut files = 0;
        for path in paths {
            let Some(stem) = local_stem(&path) else {
                continue;
            };
            let bucket = by_stem.entry(policy.key(&stem)).or_default();
            if !bucket.contains(&path) {
                bucket.push(path);
                files += 1;
            }
        }
        Self {
            policy,
            prefix: prefix.filter(|p| !p.is_empty()),
            by_stem,
            files,
        }
    }

    pub fn len(&self) -> usize {
        self.files
    }

    pub fn is_empty(&self) -> bool {
        self.files == 0
    }

    /// Every local path whose stem equals the remote stem, or whose stem
    /// with the try-prefix prepended equals it.
    pub fn candidates(&self, original_filename: &str) -> Vec<&Path> {
        let remote = self.policy.key(remote_stem(original_filename));
        let mut out: Vec<&Path> = self
            .by_stem
            .get(&remote)
            .into_iter()
            .flatten()
            .map(PathBuf::as_path)
            .collect();
        if let Some(prefix) = &self.prefix {
            let prefix = self.policy.key(prefix);
            if let Some(rest) = remote.strip_prefix(prefix.as_str()) {
                if !rest.is_empty() {
                    for path in self.by_stem.get(rest).into_iter().flatten() {
                        if !out.contains(&path.as_path()) {
                            out.push(path);
                        }
                    }
                }
            }
        }
        out
    }

    /// `Ok(None)` when nothing matches; ambiguity is an error.
    pub fn find(&self, original_filename: &str) -> Result<Option<&Path>, ReconcileError> {
        let mut candidates = self.candidates(original_filename);
        match candidates.len() {
            0 => Ok(None),
            1 => Ok(candidates.pop()),
            _ => Err(ReconcileError::AmbiguousMatch {
                stem: remote_stem(original_filename).to_string(),
                candidates: candidates.into_iter().map(Path::to_path_buf).collect(),
            }),
        }
    }
}
