//! webp_revert: converts WebP files back into GIF, PNG or JPEG.
//!
//! Each `.webp` file under a directory is classified (animated → GIF,
//! transparent or `.png.webp` → PNG, otherwise JPEG) and re-encoded next to
//! itself through ImageMagick. Existing outputs are never overwritten, so a
//! second run over the same directory does nothing.
//!
//! ## Modules
//! - `classifier`: target format and output path for one file
//! - `worker`: one file from probe to persisted output
//! - `scheduler`: discovery, worker pool, confirmation
//! - `report`: final tally and exit code
//! - `tool`: `ImageTool` seam and the ImageMagick backend

pub mod classifier;
pub mod config;
pub mod errors;
pub mod report;
pub mod scheduler;
pub mod tool;
pub mod types;
pub mod worker;

pub use classifier::{classify, output_path_for};
pub use config::RunConfig;
pub use errors::{ConfigError, ConvertError, RunError, ToolError};
pub use report::Report;
pub use scheduler::{discover, Confirm, Scheduler, TerminalConfirm};
pub use tool::{ImageTool, MagickTool};
pub use types::{CandidateFile, ConversionOutcome, ConversionPlan, FailureReason, TargetFormat};
pub use worker::{OutputClaims, Worker};
