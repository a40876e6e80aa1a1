//! Error types.
//!
//! `ConfigError` and `RunError` are fatal and stop the run before any file is
//! touched. `ToolError` comes out of the ImageMagick wrapper and is mapped to a
//! per-file `ConvertError`, which never aborts sibling conversions.

use crate::types::FailureReason;
use shared_utils::{
    classify_diagnostic, DiagnosticHint, ParseProgressModeError, ProcessError, UnsafeTargetError,
};
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("quality must be between 1 and 100, got {0}")]
    QualityOutOfRange(u32),

    #[error("--jobs must be at least 1")]
    InvalidParallelism,

    #[error("--timeout must be at least 1 second")]
    InvalidTimeout,

    #[error(transparent)]
    ProgressMode(#[from] ParseProgressModeError),

    #[error("directory not found: {0}")]
    RootNotFound(PathBuf),

    #[error("not a directory: {0}")]
    RootNotDirectory(PathBuf),
}

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("ImageMagick not found in PATH (looked for `magick`, then `convert` + `identify`)")]
    NotFound,

    #[error("tool override does not exist: {0}")]
    OverrideMissing(PathBuf),

    #[error("{0} cannot read WebP images (no readable WEBP entry in `-list format`)")]
    NoWebpSupport(PathBuf),

    #[error("{detail}")]
    Failed { detail: String, output: String },

    #[error("could not parse {what} from tool output: {output:?}")]
    Parse { what: &'static str, output: String },

    #[error(transparent)]
    Process(#[from] ProcessError),
}

impl ToolError {
    /// Wraps a non-zero tool exit.
    pub fn failed(output: String) -> Self {
        ToolError::Failed {
            detail: shared_utils::format_tool_error(&output),
            output,
        }
    }

    pub fn hint(&self) -> DiagnosticHint {
        match self {
            ToolError::Failed { output, .. } => classify_diagnostic(output),
            ToolError::Parse { .. } => DiagnosticHint::CorruptInput,
            ToolError::Process(ProcessError::TimedOut { .. }) => DiagnosticHint::Timeout,
            ToolError::Process(ProcessError::Interrupted) => DiagnosticHint::Interrupted,
            ToolError::Process(ProcessError::Spawn { source, .. }) => {
                classify_diagnostic(&source.to_string())
            }
            _ => DiagnosticHint::Unknown,
        }
    }

    pub fn is_interrupted(&self) -> bool {
        matches!(self, ToolError::Process(ProcessError::Interrupted))
    }
}

/// Why one file could not be converted.
#[derive(Debug, Error)]
pub enum ConvertError {
    #[error("unreadable input: {detail}")]
    UnreadableInput { detail: String, hint: DiagnosticHint },

    #[error("encoder failed: {detail}")]
    Encoder { detail: String, hint: DiagnosticHint },

    #[error("invalid output: {detail}")]
    InvalidOutput { detail: String, hint: DiagnosticHint },

    #[error("interrupted before completion")]
    Interrupted,
}

impl ConvertError {
    pub fn unreadable(err: ToolError) -> Self {
        if err.is_interrupted() {
            return ConvertError::Interrupted;
        }
        let hint = match err.hint() {
            DiagnosticHint::Unknown => DiagnosticHint::CorruptInput,
            hint => hint,
        };
        ConvertError::UnreadableInput {
            detail: err.to_string(),
            hint,
        }
    }

    pub fn encoder(err: ToolError) -> Self {
        if err.is_interrupted() {
            return ConvertError::Interrupted;
        }
        ConvertError::Encoder {
            hint: err.hint(),
            detail: err.to_string(),
        }
    }

    pub fn io(context: &str, err: std::io::Error) -> Self {
        let detail = format!("{}: {}", context, err);
        ConvertError::Encoder {
            hint: classify_diagnostic(&detail),
            detail,
        }
    }

    pub fn invalid_output(detail: impl Into<String>) -> Self {
        ConvertError::InvalidOutput {
            detail: detail.into(),
            hint: DiagnosticHint::Unknown,
        }
    }

    pub fn reason(&self) -> FailureReason {
        match self {
            ConvertError::UnreadableInput { .. } => FailureReason::UnreadableInput,
            ConvertError::Encoder { .. } => FailureReason::EncoderError,
            ConvertError::InvalidOutput { .. } => FailureReason::InvalidOutput,
            ConvertError::Interrupted => FailureReason::Interrupted,
        }
    }

    pub fn hint(&self) -> DiagnosticHint {
        match self {
            ConvertError::UnreadableInput { hint, .. }
            | ConvertError::Encoder { hint, .. }
            | ConvertError::InvalidOutput { hint, .. } => *hint,
            ConvertError::Interrupted => DiagnosticHint::Interrupted,
        }
    }

    pub fn detail(&self) -> String {
        match self {
            ConvertError::UnreadableInput { detail, .. }
            | ConvertError::Encoder { detail, .. }
            | ConvertError::InvalidOutput { detail, .. } => detail.clone(),
            ConvertError::Interrupted => "interrupted before completion".to_string(),
        }
    }
}

/// Fatal errors that end a run before or instead of dispatching work.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("missing dependency: {0}")]
    MissingDependency(#[source] ToolError),

    #[error("refusing to delete originals: {0}")]
    UnsafeTarget(#[from] UnsafeTargetError),

    #[error("aborted: deletion of originals was not confirmed")]
    Aborted,

    #[error("could not read confirmation: {0}")]
    Prompt(#[source] std::io::Error),

    #[error("failed to build worker pool: {0}")]
    Pool(#[from] rayon::ThreadPoolBuildError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tool_failure_hint_from_output() {
        let err = ToolError::failed(
            "convert: unable to open image `x.jpg': Permission denied".to_string(),
        );
        assert_eq!(err.hint(), DiagnosticHint::Permission);
        assert!(err.to_string().contains("Permission denied"));
    }

    #[test]
    fn test_unreadable_defaults_to_corrupt_hint() {
        let err =
            ConvertError::unreadable(ToolError::failed("identify: something odd".to_string()));
        assert_eq!(err.reason(), FailureReason::UnreadableInput);
        assert_eq!(err.hint(), DiagnosticHint::CorruptInput);
    }

    #[test]
    fn test_timeout_maps_to_encoder_timeout() {
        let err = ConvertError::encoder(ToolError::Process(ProcessError::TimedOut {
            timeout_secs: 300,
            output: String::new(),
        }));
        assert_eq!(err.reason(), FailureReason::EncoderError);
        assert_eq!(err.hint(), DiagnosticHint::Timeout);
    }

    #[test]
    fn test_interrupted_process_maps_to_interrupted() {
        let err = ConvertError::encoder(ToolError::Process(ProcessError::Interrupted));
        assert_eq!(err.reason(), FailureReason::Interrupted);
        assert_eq!(err.hint(), DiagnosticHint::Interrupted);
    }

    #[test]
    fn test_io_error_disk_space_hint() {
        let io = std::io::Error::new(std::io::ErrorKind::Other, "No space left on device");
        let err = ConvertError::io("failed to create staging file", io);
        assert_eq!(err.hint(), DiagnosticHint::DiskSpace);
    }
}
