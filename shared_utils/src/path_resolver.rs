//! Path Resolver
//!
//! Turns whatever the operator typed (relative, absolute, existing or not)
//! into one stable absolute path so that log lines and reports always refer
//! to files the same way.

use std::path::{Component, Path, PathBuf};

/// Resolves `path` to a normalized absolute path. Never fails.
///
/// The parent directory is canonicalized when it exists, which also resolves
/// symlinks in it. Otherwise the path is joined onto the current directory and
/// normalized lexically: `.` components and repeated separators disappear and
/// `..` pops the previous component.
pub fn resolve(path: &Path) -> PathBuf {
    if let Some(resolved) = canonical_parent_join(path) {
        return resolved;
    }

    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .unwrap_or_else(|_| PathBuf::from("/"))
            .join(path)
    };
    normalize_lexically(&absolute)
}

fn canonical_parent_join(path: &Path) -> Option<PathBuf> {
    let name = path.file_name()?;
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    let parent = parent.canonicalize().ok()?;
    Some(parent.join(name))
}

/// Collapses `.`, `..` and redundant separators without touching the
/// filesystem. `..` never climbs above the root.
pub fn normalize_lexically(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Prefix(p) => out.push(p.as_os_str()),
            Component::RootDir => out.push(Component::RootDir.as_os_str()),
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            Component::Normal(part) => out.push(part),
        }
    }
    if out.as_os_str().is_empty() {
        out.push(Component::RootDir.as_os_str());
    }
    out
}
