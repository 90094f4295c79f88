//! Enumerates candidate media files under the given roots.

use crate::error::ReconcileError;
use globset::{Glob, GlobSet, GlobSetBuilder};
use std::path::{Path, PathBuf};
use tokio::task;
use tracing::{debug, warn};
use walkdir::WalkDir;

const MEDIA_EXTENSIONS: &[&str] = &[
    "jpg", "jpeg", "rw2", "mp4", "mov", "heic", "tiff", "avif", "3gp", "avi", "webp", "webm",
    "m4v", "m4a",
];

/// Files given directly are kept as-is (if supported); directories are
/// walked recursively, skipping hidden and excluded entries.
pub async fn scan(roots: &[PathBuf], excludes: &[String]) -> anyhow::Result<Vec<PathBuf>> {
    let exclude_set = build_globset(excludes)?;
    for root in roots {
        if !root.exists() {
            return Err(ReconcileError::config(format!(
                "path {} is not a file or directory",
                root.display()
            ))
            .into());
        }
    }
    let roots = roots.to_vec();
    let found = task::spawn_blocking(move || walk(&roots, &exclude_set)).await?;
    Ok(found)
}

fn walk(roots: &[PathBuf], exclude_set: &GlobSet) -> Vec<PathBuf> {
    let mut found = Vec::new();
    for root in roots {
        if root.is_file() {
            if is_media(root) {
                found.push(root.clone());
            } else {
                debug!("Skipping unsupported file type: {}", root.display());
            }
            continue;
        }
        for entry in WalkDir::new(root)
            .follow_links(true)
            .into_iter()
            .filter_entry(|e| e.depth() == 0 || should_descend(e.path(), exclude_set))
        {
            let entry = match entry {
                Ok(e) => e,
                Err(e) => {
                    warn!("walk error under {}: {}", root.display(), e);
                    continue;
                }
            };
            let path = entry.path();
            if !entry.file_type().is_file() {
                continue;
            }
            if !is_media(path) {
                debug!("Skipping unsupported file type: {}", path.display());
                continue;
            }
            found.push(path.to_path_buf());
        }
    }
    found
}

fn build_globset(patterns: &[String]) -> anyhow::Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pat in patterns {
        let glob = Glob::new(pat)?;
        builder.add(glob);
    }
    Ok(builder.build()?)
}

fn should_descend(path: &Path, excludes: &GlobSet) -> bool {
    !is_excluded(path, excludes) && !is_hidden(path)
}

fn is_hidden(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(|s| s.starts_with('.'))
        .unwrap_or(false)
}

fn is_excluded(path: &Path, excludes: &GlobSet) -> bool {
    excludes.is_match(path)
}

pub fn is_media(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| {
            let e = e.to_ascii_lowercase();
            MEDIA_EXTENSIONS.contains(&e.as_str())
        })
        .unwrap_or(false)
}
