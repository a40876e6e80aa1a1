//! ImageMagick wrapper.
//!
//! Everything the converter needs from an image tool sits behind
//! [`ImageTool`]: three read-only probes and one encode. `MagickTool` drives
//! ImageMagick 7 (`magick`) or ImageMagick 6 (`convert` + `identify`); tests
//! use the scripted `mock::MockTool` instead.

use crate::errors::ToolError;
use crate::types::{ConversionPlan, EncoderParams};
use serde::Serialize;
use shared_utils::{run_with_timeout, CancelToken};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

pub trait ImageTool: Send + Sync {
    fn name(&self) -> &str;

    /// Width and height of the first frame.
    fn dimensions(&self, path: &Path) -> Result<Dimensions, ToolError>;

    fn frame_count(&self, path: &Path) -> Result<u32, ToolError>;

    fn has_alpha(&self, path: &Path) -> Result<bool, ToolError>;

    /// Encodes `plan.input` into `staging` using the plan's target and params.
    fn convert(&self, plan: &ConversionPlan, staging: &Path) -> Result<(), ToolError>;
}

#[derive(Debug, Clone)]
enum Install {
    /// ImageMagick 7: one binary, `magick identify` for probes.
    V7 { magick: PathBuf },
    /// ImageMagick 6: separate binaries.
    V6 { convert: PathBuf, identify: PathBuf },
}

#[derive(Debug, Clone)]
pub struct MagickTool {
    install: Install,
    timeout: Duration,
    cancel: CancelToken,
}

impl MagickTool {
    /// Finds ImageMagick and checks it can decode WebP.
    ///
    /// An override naming `convert` (or `identify`) is treated as
    /// ImageMagick 6 and its sibling binary is looked up next to it first;
    /// anything else is treated as a `magick` binary.
    pub fn locate(
        tool_override: Option<&Path>,
        timeout: Duration,
        cancel: CancelToken,
    ) -> Result<Self, ToolError> {
        let install = match tool_override {
            Some(path) => install_from_override(path)?,
            None => install_from_path()?,
        };

        let tool = Self {
            install,
            timeout,
            cancel,
        };
        tool.check_webp_support()?;
        tracing::info!(tool = %tool.display_path().display(), "ImageMagick located");
        Ok(tool)
    }

    fn display_path(&self) -> &Path {
        match &self.install {
            Install::V7 { magick } => magick,
            Install::V6 { convert, .. } => convert,
        }
    }

    fn identify_command(&self) -> Command {
        match &self.install {
            Install::V7 { magick } => {
                let mut cmd = Command::new(magick);
                cmd.arg("identify");
                cmd
            }
            Install::V6 { identify, .. } => Command::new(identify),
        }
    }

    fn convert_command(&self) -> Command {
        match &self.install {
            Install::V7 { magick } => Command::new(magick),
            Install::V6 { convert, .. } => Command::new(convert),
        }
    }

    fn check_webp_support(&self) -> Result<(), ToolError> {
        let mut cmd = self.convert_command();
        cmd.args(["-list", "format"]);
        let output = run_with_timeout(&mut cmd, self.timeout, &self.cancel)?;
        if !output.success() {
            return Err(ToolError::failed(output.combined()));
        }
        if supports_webp_read(&output.stdout) {
            Ok(())
        } else {
            Err(ToolError::NoWebpSupport(self.display_path().to_path_buf()))
        }
    }

    /// Runs `identify -format <format> <path>` and returns stdout.
    fn identify(&self, format: &str, path: &Path) -> Result<String, ToolError> {
        let mut cmd = self.identify_command();
        cmd.arg("-format").arg(format).arg(path);
        let output = run_with_timeout(&mut cmd, self.timeout, &self.cancel)?;
        if !output.success() {
            return Err(ToolError::failed(output.combined()));
        }
        Ok(output.stdout)
    }
}

fn install_from_override(path: &Path) -> Result<Install, ToolError> {
    if !path.is_file() {
        return Err(ToolError::OverrideMissing(path.to_path_buf()));
    }
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default();

    let sibling = |name: &str| -> Option<PathBuf> {
        let candidate = path.with_file_name(name);
        if candidate.is_file() {
            Some(candidate)
        } else {
            which::which(name).ok()
        }
    };

    match stem.as_str() {
        "convert" => Ok(Install::V6 {
            convert: path.to_path_buf(),
            identify: sibling("identify").ok_or(ToolError::NotFound)?,
        }),
        "identify" => Ok(Install::V6 {
            convert: sibling("convert").ok_or(ToolError::NotFound)?,
            identify: path.to_path_buf(),
        }),
        _ => Ok(Install::V7 {
            magick: path.to_path_buf(),
        }),
    }
}

fn install_from_path() -> Result<Install, ToolError> {
    if let Ok(magick) = which::which("magick") {
        return Ok(Install::V7 { magick });
    }
    match (which::which("convert"), which::which("identify")) {
        (Ok(convert), Ok(identify)) => Ok(Install::V6 { convert, identify }),
        _ => Err(ToolError::NotFound),
    }
}

/// Scans `-list format` output for a WEBP coder with read support.
///
/// Lines look like `     WEBP* WEBP      rw+   WebP Image Format`; the mode
/// column must contain `r`.
pub fn supports_webp_read(listing: &str) -> bool {
    listing.lines().any(|line| {
        let tokens: Vec<&str> = line.split_whitespace().collect();
        tokens.len() >= 3
            && tokens[0].trim_end_matches('*').eq_ignore_ascii_case("WEBP")
            && tokens[2].contains('r')
    })
}

fn first_line(output: &str) -> Option<&str> {
    output.lines().map(str::trim).find(|l| !l.is_empty())
}

pub fn parse_dimensions(output: &str) -> Result<Dimensions, ToolError> {
    let parse_err = || ToolError::Parse {
        what: "dimensions",
        output: output.to_string(),
    };
    let line = first_line(output).ok_or_else(parse_err)?;
    let mut parts = line.split_whitespace();
    let width: u32 = parts.next().and_then(|w| w.parse().ok()).ok_or_else(parse_err)?;
    let height: u32 = parts.next().and_then(|h| h.parse().ok()).ok_or_else(parse_err)?;
    if width == 0 || height == 0 {
        return Err(parse_err());
    }
    Ok(Dimensions { width, height })
}

pub fn parse_frame_count(output: &str) -> Result<u32, ToolError> {
    first_line(output)
        .and_then(|l| l.split_whitespace().next())
        .and_then(|n| n.parse::<u32>().ok())
        .filter(|n| *n >= 1)
        .ok_or_else(|| ToolError::Parse {
            what: "frame count",
            output: output.to_string(),
        })
}

/// `srgba`, `graya`, `cmyka` carry alpha; `srgb`, `gray` do not.
pub fn parse_has_alpha(output: &str) -> Result<bool, ToolError> {
    first_line(output)
        .and_then(|l| l.split_whitespace().next())
        .map(|token| token.to_ascii_lowercase().ends_with('a'))
        .ok_or_else(|| ToolError::Parse {
            what: "channels",
            output: output.to_string(),
        })
}

/// Full argument list for one encode, ending in `<PREFIX>:<staging>`.
pub fn encoder_args(plan: &ConversionPlan, staging: &Path) -> Vec<OsString> {
    let mut args: Vec<OsString> = vec![plan.input.clone().into_os_string()];

    match plan.params {
        EncoderParams::Jpeg { quality } => {
            args.extend(
                ["-auto-orient", "-strip", "-quality"]
                    .into_iter()
                    .map(OsString::from),
            );
            args.push(quality.to_string().into());
        }
        EncoderParams::Png {
            compression_level,
            compression_filter,
        } => {
            args.push("-define".into());
            args.push(format!("png:compression-level={}", compression_level).into());
            args.push("-define".into());
            args.push(format!("png:compression-filter={}", compression_filter).into());
        }
        EncoderParams::Gif { colors } => {
            args.extend(
                ["-coalesce", "-dither", "FloydSteinberg", "-colors"]
                    .into_iter()
                    .map(OsString::from),
            );
            args.push(colors.to_string().into());
            args.extend(["-layers", "OptimizeFrame"].into_iter().map(OsString::from));
        }
    }

    let mut destination = OsString::from(format!("{}:", plan.target.encoder_prefix()));
    destination.push(staging.as_os_str());
    args.push(destination);
    args
}

impl ImageTool for MagickTool {
    fn name(&self) -> &str {
        match self.install {
            Install::V7 { .. } => "magick",
            Install::V6 { .. } => "convert",
        }
    }

    fn dimensions(&self, path: &Path) -> Result<Dimensions, ToolError> {
        parse_dimensions(&self.identify("%w %h\n", path)?)
    }

    fn frame_count(&self, path: &Path) -> Result<u32, ToolError> {
        parse_frame_count(&self.identify("%n\n", path)?)
    }

    fn has_alpha(&self, path: &Path) -> Result<bool, ToolError> {
        parse_has_alpha(&self.identify("%[channels]\n", path)?)
    }

    fn convert(&self, plan: &ConversionPlan, staging: &Path) -> Result<(), ToolError> {
        let mut cmd = self.convert_command();
        cmd.args(encoder_args(plan, staging));
        let output = run_with_timeout(&mut cmd, self.timeout, &self.cancel)?;
        if output.success() {
            Ok(())
        } else {
            Err(ToolError::failed(output.combined()))
        }
    }
}
