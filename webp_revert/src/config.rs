//! Run configuration.
//!
//! Built once from the command line, validated before discovery, then shared
//! read-only by every worker.

use crate::errors::ConfigError;
use shared_utils::ProgressMode;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_QUALITY: u32 = 90;
pub const DEFAULT_LIST_LIMIT: usize = 20;
pub const DEFAULT_TIMEOUT_SECS: u64 = 300;
pub const DEFAULT_LOG_DIR: &str = "logs";

#[derive(Debug, Clone)]
pub struct RunConfig {
    /// Directory scanned for `.webp` files.
    pub root: PathBuf,
    /// JPEG quality, 1-100.
    pub quality: u32,
    /// Worker pool width; `None` means one per logical CPU.
    pub parallelism: Option<usize>,
    pub delete_original: bool,
    /// Pre-answers the delete-original confirmation.
    pub assume_yes: bool,
    pub dry_run: bool,
    /// Maximum number of candidates listed in a dry-run preview.
    pub list_limit: usize,
    pub recursive: bool,
    pub progress: ProgressMode,
    /// Explicit ImageMagick binary instead of a PATH lookup.
    pub tool_override: Option<PathBuf>,
    /// Wall-clock limit for every single tool invocation.
    pub timeout: Duration,
    /// Copy the input's modification time onto the output.
    pub preserve_mtime: bool,
    /// Where the per-run log file is created.
    pub log_dir: PathBuf,
    pub json: bool,
    pub verbose: bool,
}

impl RunConfig {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            quality: DEFAULT_QUALITY,
            parallelism: None,
            delete_original: false,
            assume_yes: false,
            dry_run: false,
            list_limit: DEFAULT_LIST_LIMIT,
            recursive: false,
            progress: ProgressMode::default(),
            tool_override: None,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            preserve_mtime: true,
            log_dir: PathBuf::from(DEFAULT_LOG_DIR),
            json: false,
            verbose: false,
        }
    }

    /// Checks every field and resolves `root` to an absolute path.
    pub fn validate(mut self) -> Result<Self, ConfigError> {
        if !(1..=100).contains(&self.quality) {
            return Err(ConfigError::QualityOutOfRange(self.quality));
        }
        if self.parallelism == Some(0) {
            return Err(ConfigError::InvalidParallelism);
        }
        if self.timeout.is_zero() {
            return Err(ConfigError::InvalidTimeout);
        }

        let root = shared_utils::resolve(&self.root);
        if !root.exists() {
            return Err(ConfigError::RootNotFound(root));
        }
        if !root.is_dir() {
            return Err(ConfigError::RootNotDirectory(root));
        }
        self.root = root;

        Ok(self)
    }

    /// Quality as passed to the JPEG encoder. Only meaningful after `validate`.
    pub fn jpeg_quality(&self) -> u8 {
        self.quality.clamp(1, 100) as u8
    }
}
