//! Source file discovery

use globset::{Glob, GlobSet, GlobSetBuilder};
use ignore::WalkBuilder;
use std::path::{Path, PathBuf};

/// Directory and file names never treated as sources.
const ALWAYS_SKIPPED: &[&str] = &["__pycache__", "__MACOSX", ".upcast", ".git"];

#[derive(Debug, thiserror::Error)]
pub enum DiscoveryError {
    #[error("invalid glob pattern `{pattern}`: {source}")]
    Pattern {
        pattern: String,
        #[source]
        source: globset::Error,
    },
    #[error("root {0} is not a directory")]
    NotADirectory(PathBuf),
}

fn build_set(patterns: &[String]) -> Result<GlobSet, DiscoveryError> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob = Glob::new(pattern).map_err(|source| DiscoveryError::Pattern {
            pattern: pattern.clone(),
            source,
        })?;
        builder.add(glob);
    }
    builder.build().map_err(|source| DiscoveryError::Pattern {
        pattern: patterns.join(", "),
        source,
    })
}

/// Files under `root` matching any of `patterns` and none of `excludes`,
/// sorted. Patterns match the path relative to `root`. Honours `.gitignore`
/// and skips hidden entries, macOS resource forks (`._*`) and cache directories.
pub fn discover_sources(
    root: &Path,
    patterns: &[String],
    excludes: &[String],
) -> Result<Vec<PathBuf>, DiscoveryError> {
    if !root.is_dir() {
        return Err(DiscoveryError::NotADirectory(root.to_path_buf()));
    }
    let include = build_set(patterns)?;
    let exclude = build_set(excludes)?;

    let walker = WalkBuilder::new(root)
        .git_ignore(true)
        .require_git(false)
        .filter_entry(|entry| {
            let name = entry.file_name().to_string_lossy();
            !ALWAYS_SKIPPED.contains(&name.as_ref()) && !name.starts_with("._")
        })
        .build();

    let mut found = Vec::new();
    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                tracing::warn!("Cannot read entry: {}", e);
                continue;
            }
        };
        if !entry.file_type().is_some_and(|t| t.is_file()) {
            continue;
        }
        let path = entry.into_path();
        let relative = path.strip_prefix(root).unwrap_or(&path);
        if include.is_match(relative) && !exclude.is_match(relative) {
            found.push(path);
        }
    }

    found.sort();
    tracing::debug!("Discovered {} source files under {}", found.len(), root.display());
    Ok(found)
}
