//! Source file discovery for the build system.
//!
//! Resolves a stage's glob patterns against a tree root at invocation time.
//! Each match keeps its path relative to the pattern's glob base so stages
//! can mirror the source layout under their destination.

use glob::{glob_with, MatchOptions, Pattern};
use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};
use thiserror::Error;

/// Error during source discovery.
#[derive(Debug, Error)]
pub enum DiscoveryError {
    /// Invalid glob pattern
    #[error("Invalid glob pattern '{0}': {1}")]
    InvalidPattern(String, glob::PatternError),
    /// IO error during file enumeration
    #[error("IO error during discovery: {0}")]
    Io(#[from] std::io::Error),
}

/// A file matched by a stage's source pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    /// Absolute (root-joined) path to the file
    pub path: PathBuf,
    /// Path relative to the glob base of the pattern that matched it
    pub relative: PathBuf,
}

fn match_options() -> MatchOptions {
    MatchOptions { case_sensitive: true, require_literal_separator: true, require_literal_leading_dot: true }
}

fn has_glob_meta(segment: &str) -> bool {
    segment.contains(['*', '?', '[', '{'])
}

/// Leading directory of a pattern that contains no glob metacharacters.
///
/// For a fully literal pattern (a single file) this is its parent directory.
pub fn glob_base(pattern: &str) -> PathBuf {
    let segments: Vec<&str> = pattern.split('/').filter(|s| !s.is_empty()).collect();
    let literal = segments.iter().take_while(|s| !has_glob_meta(s)).count();

    let take = if literal == segments.len() { literal.saturating_sub(1) } else { literal };
    segments[..take].iter().collect()
}

/// Discover files matching a glob pattern under `base_dir`.
///
/// Directories are skipped. The result is sorted so stage output order is
/// stable between runs.
pub fn discover_files(base_dir: &Path, pattern: &str) -> Result<Vec<PathBuf>, DiscoveryError> {
    let escaped_base = Pattern::escape(&base_dir.to_string_lossy());
    let full_pattern = format!("{}/{}", escaped_base.trim_end_matches('/'), pattern);

    let paths = glob_with(&full_pattern, match_options())
        .map_err(|e| DiscoveryError::InvalidPattern(pattern.to_string(), e))?;

    let mut files = Vec::new();
    for entry in paths {
        match entry {
            Ok(path) => {
                if path.is_file() {
                    files.push(path);
                }
            }
            Err(e) => {
                tracing::warn!(pattern, error = %e, "error reading path during discovery");
            }
        }
    }

    files.sort();
    Ok(files)
}

/// Discover all files matching any of `patterns` under `root`.
///
/// A file matched by several patterns is reported once, with the relative
/// path from the first pattern that matched it.
pub fn discover_sources(root: &Path, patterns: &[String]) -> Result<Vec<SourceFile>, DiscoveryError> {
    let mut found: BTreeMap<PathBuf, PathBuf> = BTreeMap::new();

    for pattern in patterns {
        let base = root.join(glob_base(pattern));
        for path in discover_files(root, pattern)? {
            if found.contains_key(&path) {
                continue;
            }
            let relative = path
                .strip_prefix(&base)
                .map(Path::to_path_buf)
                .unwrap_or_else(|_| path.file_name().map(PathBuf::from).unwrap_or_default());
            found.insert(path, relative);
        }
    }

    Ok(found.into_iter().map(|(path, relative)| SourceFile { path, relative }).collect())
}

/// Check whether a root-relative path matches any of the given patterns.
///
/// Invalid patterns never match.
pub fn matches_any(patterns: &[String], relative: &Path) -> bool {
    let normalized: PathBuf = relative
        .components()
        .filter(|c| matches!(c, Component::Normal(_)))
        .collect();

    patterns.iter().any(|p| {
        Pattern::new(p).map(|pat| pat.matches_path_with(&normalized, match_options())).unwrap_or(false)
    })
}
