//! Format Classifier
//!
//! Decides what a WebP file turns back into, using read-only probes and the
//! file's extension chain:
//!
//! 1. dimensions probe fails → unreadable
//! 2. two or more frames → GIF
//! 3. inner extension `gif` → GIF (even for a single frame)
//! 4. inner extension `png`, or an alpha channel → PNG
//! 5. everything else → JPEG

use crate::errors::ConvertError;
use crate::tool::ImageTool;
use crate::types::{
    CandidateFile, ConversionPlan, EncoderParams, TargetFormat, STRIPPED_INNER_EXTENSIONS,
};
use std::path::PathBuf;

pub fn classify(
    tool: &dyn ImageTool,
    candidate: &CandidateFile,
    quality: u8,
) -> Result<ConversionPlan, ConvertError> {
    let path = &candidate.path;

    tool.dimensions(path).map_err(ConvertError::unreadable)?;
    let frames = tool.frame_count(path).map_err(ConvertError::unreadable)?;
    let inner = candidate.inner_ext_lower();

    let target = if frames >= 2 || inner.as_deref() == Some("gif") {
        TargetFormat::Gif
    } else if inner.as_deref() == Some("png") {
        TargetFormat::Png
    } else {
        let alpha = match tool.has_alpha(path) {
            Ok(alpha) => alpha,
            Err(e) if e.is_interrupted() => return Err(ConvertError::Interrupted),
            Err(e) => {
                tracing::info!(
                    path = %path.display(),
                    error = %e,
                    "Channel probe failed, treating image as opaque"
                );
                false
            }
        };
        if alpha {
            TargetFormat::Png
        } else {
            TargetFormat::Jpg
        }
    };

    tracing::debug!(
        path = %path.display(),
        frames,
        inner = ?inner,
        target = %target,
        "Classified"
    );

    Ok(ConversionPlan {
        input: path.clone(),
        target,
        output: output_path_for(candidate, target),
        params: EncoderParams::for_target(target, quality),
    })
}

/// Output path next to the input: outer `.webp` removed, an inner
/// `gif`/`png`/`jpg`/`jpeg` removed too, then the target extension added.
///
/// `photo.jpg.webp` → `photo.jpg`, `anim.webp` → `anim.gif`,
/// `notes.v2.webp` → `notes.v2.jpg`.
pub fn output_path_for(candidate: &CandidateFile, target: TargetFormat) -> PathBuf {
    let base = match candidate.inner_ext_lower() {
        Some(inner) if STRIPPED_INNER_EXTENSIONS.contains(&inner.as_str()) => {
            candidate.stem.clone()
        }
        _ => candidate.base_name(),
    };
    let file_name = format!("{}.{}", base, target.extension());
    match candidate.path.parent() {
        Some(dir) => dir.join(file_name),
        None => PathBuf::from(file_name),
    }
}
