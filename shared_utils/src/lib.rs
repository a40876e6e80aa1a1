//! Shared Utilities for webp_revert
//!
//! Infrastructure that is not specific to WebP conversion:
//! - Logging (tracing with rolling file) and the per-run durable log
//! - Error reporting and panic hook
//! - Progress counter and display modes
//! - File discovery and batch tallies
//! - Summary report rendering
//! - Worker pool sizing
//! - External tool runner with timeout, cancellation and diagnostics
//! - Path resolution and destructive-operation safety checks

pub mod batch;
pub mod error_handler;
pub mod interrupt;
pub mod logging;
pub mod path_resolver;
pub mod progress;
pub mod report;
pub mod run_log;
pub mod safety;
pub mod thread_manager;
pub mod tool_process;

pub use batch::{collect_files, has_extension, BatchResult, MAX_WALK_DEPTH};
pub use error_handler::{install_panic_handler, report_anyhow, report_error};
pub use interrupt::{global_token, install_ctrlc_handler, CancelToken, INTERRUPTED_EXIT_CODE};
pub use logging::{init_logging, log_external_tool, LogConfig};
pub use path_resolver::resolve;
pub use progress::{
    format_bytes, format_duration, format_size_change, ParseProgressModeError, ProgressCounter,
    ProgressMode, ProgressTracker,
};
pub use report::{render_summary_report, simple_summary_line};
pub use run_log::{RunLog, RunLogMarker};
pub use safety::{check_dangerous_directory, check_safe_for_destructive, UnsafeTargetError};
pub use thread_manager::{effective_workers, resolve_parallelism, MAX_PARALLELISM};
pub use tool_process::{
    classify_diagnostic, format_tool_error, run_with_timeout, DiagnosticHint, ProcessError,
    ProcessOutput,
};
