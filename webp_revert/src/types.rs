//! Core data types: candidates, plans and per-file outcomes.

use serde::Serialize;
use shared_utils::DiagnosticHint;
use std::fmt;
use std::path::{Path, PathBuf};

pub const WEBP_EXTENSION: &str = "webp";

/// Inner extensions that name the intended output container and are dropped
/// from the output file name.
pub const STRIPPED_INNER_EXTENSIONS: &[&str] = &["gif", "png", "jpg", "jpeg"];

/// A discovered `.webp` file with its extension chain split out.
///
/// `photo.gif.webp` → stem `photo`, inner `gif`, outer `webp`.
/// `photo.webp` → stem `photo`, no inner extension.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateFile {
    pub path: PathBuf,
    pub stem: String,
    pub inner_ext: Option<String>,
    pub outer_ext: String,
}

impl CandidateFile {
    /// Returns `None` unless the file name ends in `.webp` (any case) with a
    /// non-empty name in front of it.
    pub fn from_path(path: &Path) -> Option<Self> {
        let name = path.file_name()?.to_str()?;
        let (base, outer) = name.rsplit_once('.')?;
        if base.is_empty() || !outer.eq_ignore_ascii_case(WEBP_EXTENSION) {
            return None;
        }

        let (stem, inner_ext) = match base.rsplit_once('.') {
            Some((stem, inner)) if !stem.is_empty() && !inner.is_empty() => {
                (stem.to_string(), Some(inner.to_string()))
            }
            _ => (base.to_string(), None),
        };

        Some(Self {
            path: path.to_path_buf(),
            stem,
            inner_ext,
            outer_ext: outer.to_string(),
        })
    }

    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    /// The inner extension, lowercased.
    pub fn inner_ext_lower(&self) -> Option<String> {
        self.inner_ext.as_deref().map(str::to_ascii_lowercase)
    }

    /// The file name with the outer `.webp` removed.
    pub fn base_name(&self) -> String {
        match &self.inner_ext {
            Some(inner) => format!("{}.{}", self.stem, inner),
            None => self.stem.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetFormat {
    Gif,
    Png,
    Jpg,
}

impl TargetFormat {
    pub fn extension(self) -> &'static str {
        match self {
            TargetFormat::Gif => "gif",
            TargetFormat::Png => "png",
            TargetFormat::Jpg => "jpg",
        }
    }

    /// ImageMagick coder prefix that forces the container regardless of the
    /// destination file name.
    pub fn encoder_prefix(self) -> &'static str {
        match self {
            TargetFormat::Gif => "GIF",
            TargetFormat::Png => "PNG",
            TargetFormat::Jpg => "JPEG",
        }
    }
}

impl fmt::Display for TargetFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "encoder", rename_all = "lowercase")]
pub enum EncoderParams {
    Gif { colors: u16 },
    Png { compression_level: u8, compression_filter: u8 },
    Jpeg { quality: u8 },
}

impl EncoderParams {
    pub const GIF_COLORS: u16 = 256;
    pub const PNG_COMPRESSION_LEVEL: u8 = 9;
    /// Adaptive filtering.
    pub const PNG_COMPRESSION_FILTER: u8 = 5;

    pub fn for_target(target: TargetFormat, quality: u8) -> Self {
        match target {
            TargetFormat::Gif => EncoderParams::Gif {
                colors: Self::GIF_COLORS,
            },
            TargetFormat::Png => EncoderParams::Png {
                compression_level: Self::PNG_COMPRESSION_LEVEL,
                compression_filter: Self::PNG_COMPRESSION_FILTER,
            },
            TargetFormat::Jpg => EncoderParams::Jpeg { quality },
        }
    }
}

/// What the worker is going to do with one candidate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversionPlan {
    pub input: PathBuf,
    pub target: TargetFormat,
    pub output: PathBuf,
    pub params: EncoderParams,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    UnreadableInput,
    EncoderError,
    InvalidOutput,
    Interrupted,
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FailureReason::UnreadableInput => "unreadable input",
            FailureReason::EncoderError => "encoder error",
            FailureReason::InvalidOutput => "invalid output",
            FailureReason::Interrupted => "interrupted",
        };
        f.write_str(s)
    }
}

/// Result of one candidate. Exactly one per discovered file.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ConversionOutcome {
    Success {
        input: PathBuf,
        output: PathBuf,
        bytes_in: u64,
        bytes_out: u64,
        original_deleted: bool,
    },
    Skipped {
        input: PathBuf,
        existing_output: PathBuf,
    },
    Failed {
        input: PathBuf,
        attempted_output: Option<PathBuf>,
        reason: FailureReason,
        detail: String,
        hint: DiagnosticHint,
    },
}

impl ConversionOutcome {
    pub fn input(&self) -> &Path {
        match self {
            ConversionOutcome::Success { input, .. }
            | ConversionOutcome::Skipped { input, .. }
            | ConversionOutcome::Failed { input, .. } => input,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, ConversionOutcome::Success { .. })
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self, ConversionOutcome::Skipped { .. })
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, ConversionOutcome::Failed { .. })
    }

    pub fn failure_reason(&self) -> Option<FailureReason> {
        match self {
            ConversionOutcome::Failed { reason, .. } => Some(*reason),
            _ => None,
        }
    }
}
