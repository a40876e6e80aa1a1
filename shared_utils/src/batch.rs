//! Batch Processing Module
//!
//! File discovery for batch runs and the success/skip/failure tally every
//! batch produces.

use serde::Serialize;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Deepest directory level a recursive walk descends to. Guards against
/// pathological trees; symlink cycles are rejected by walkdir itself.
pub const MAX_WALK_DEPTH: usize = 64;

pub fn get_extension_lowercase(path: &Path) -> String {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase())
        .unwrap_or_default()
}

pub fn has_extension(path: &Path, extensions: &[&str]) -> bool {
    let ext = get_extension_lowercase(path);
    extensions.iter().any(|e| e.eq_ignore_ascii_case(&ext))
}

/// Collects regular files under `dir` whose extension matches one of
/// `extensions` (case-insensitive), sorted by path.
///
/// Non-recursive walks only look at `dir` itself and never follow links.
/// Recursive walks follow symlinks; walkdir reports a loop error for any link
/// that points back at one of its ancestors, and such entries are logged and
/// skipped.
pub fn collect_files(dir: &Path, extensions: &[&str], recursive: bool) -> Vec<PathBuf> {
    let walker = if recursive {
        WalkDir::new(dir).follow_links(true).max_depth(MAX_WALK_DEPTH)
    } else {
        WalkDir::new(dir).max_depth(1)
    };

    let mut files: Vec<PathBuf> = walker
        .into_iter()
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(e) => {
                if e.loop_ancestor().is_some() {
                    tracing::warn!(error = %e, "Symlink loop detected, skipping");
                } else {
                    tracing::warn!(error = %e, "Unreadable directory entry, skipping");
                }
                None
            }
        })
        .filter(|e| e.file_type().is_file())
        .filter(|e| has_extension(e.path(), extensions))
        .map(|e| e.into_path())
        .collect();

    files.sort();
    files
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchResult {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub skipped: usize,
    pub errors: Vec<(PathBuf, String)>,
}

impl BatchResult {
    pub fn new() -> Self {
        Self {
            total: 0,
            succeeded: 0,
            failed: 0,
            skipped: 0,
            errors: Vec::new(),
        }
    }

    pub fn success(&mut self) {
        self.total += 1;
        self.succeeded += 1;
    }

    pub fn fail(&mut self, path: PathBuf, error: String) {
        self.total += 1;
        self.failed += 1;
        self.errors.push((path, error));
    }

    pub fn skip(&mut self) {
        self.total += 1;
        self.skipped += 1;
    }

    pub fn has_failures(&self) -> bool {
        self.failed > 0
    }

    pub fn success_rate(&self) -> f64 {
        if self.total == 0 {
            100.0
        } else {
            (self.succeeded as f64 / self.total as f64) * 100.0
        }
    }
}

impl Default for BatchResult {
    fn default() -> Self {
        Self::new()
    }
}
