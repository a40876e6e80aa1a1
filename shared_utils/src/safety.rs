//! Safety Module
//!
//! Refuses destructive batches (deleting originals) rooted at system
//! directories or directly at a home directory.

use std::path::{Path, PathBuf};

const DANGEROUS_DIRS: &[&str] = &[
    "/",
    "/System",
    "/usr",
    "/bin",
    "/sbin",
    "/etc",
    "/var",
    "/private",
    "/Library",
    "/Applications",
    "/Users",
    "/home",
    "/root",
    "/boot",
    "/dev",
    "/proc",
    "/sys",
    "/tmp",
    "/opt",
];

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum UnsafeTargetError {
    #[error("'{0}' is a protected system directory; choose a subdirectory instead")]
    SystemDirectory(PathBuf),
    #[error(
        "'{0}' is too close to a home directory root; \
         choose a subdirectory like ~/Pictures/webp instead"
    )]
    HomeRoot(PathBuf),
}

pub fn check_dangerous_directory(path: &Path) -> Result<(), UnsafeTargetError> {
    let canonical = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());

    for candidate in [path, canonical.as_path()] {
        let path_str = candidate.to_string_lossy();
        let trimmed = match path_str.trim_end_matches('/') {
            "" => "/",
            other => other,
        };
        if DANGEROUS_DIRS.contains(&trimmed) {
            return Err(UnsafeTargetError::SystemDirectory(candidate.to_path_buf()));
        }
    }

    let path_str = canonical.to_string_lossy();
    let is_home = path_str.starts_with("/Users/") || path_str.starts_with("/home/");
    if is_home && canonical.components().count() <= 3 {
        return Err(UnsafeTargetError::HomeRoot(canonical));
    }

    Ok(())
}

/// Guard for operations that remove files. Blocks dangerous roots and warns
/// about common personal-file locations.
pub fn check_safe_for_destructive(path: &Path, operation: &str) -> Result<(), UnsafeTargetError> {
    check_dangerous_directory(path)?;

    let canonical = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
    let path_str = canonical.to_string_lossy();

    if path_str.contains("/Desktop") || path_str.contains("/Downloads") {
        tracing::warn!(
            path = %canonical.display(),
            operation,
            "Destructive operation in a personal folder"
        );
        eprintln!(
            "⚠️  WARNING: You are about to {} files in '{}'.\n\
             ⚠️  This is a common location for important files.\n\
             ⚠️  Make sure you have backups before proceeding.",
            operation,
            canonical.display()
        );
    }

    Ok(())
}
