//! External tool runner.
//!
//! Runs a child process with both pipes drained on their own threads (a full
//! stderr pipe would otherwise block the child forever), a wall-clock limit,
//! and cancellation. On timeout or cancellation the child is killed and
//! reaped before returning.

use crate::interrupt::CancelToken;
use crate::logging::log_external_tool;
use serde::Serialize;
use std::fmt;
use std::io::Read;
use std::process::{Command, ExitStatus, Stdio};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

const POLL_INTERVAL: Duration = Duration::from_millis(20);

#[derive(Debug, Clone)]
pub struct ProcessOutput {
    pub status: ExitStatus,
    pub stdout: String,
    pub stderr: String,
    pub duration: Duration,
}

impl ProcessOutput {
    pub fn success(&self) -> bool {
        self.status.success()
    }

    /// stderr followed by stdout; ImageMagick reports problems on either.
    pub fn combined(&self) -> String {
        match (self.stderr.trim().is_empty(), self.stdout.trim().is_empty()) {
            (false, false) => format!("{}\n{}", self.stderr.trim_end(), self.stdout.trim_end()),
            (false, true) => self.stderr.clone(),
            _ => self.stdout.clone(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ProcessError {
    #[error("failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("timed out after {timeout_secs}s")]
    TimedOut { timeout_secs: u64, output: String },
    #[error("interrupted")]
    Interrupted,
    #[error("failed to wait for child process: {0}")]
    Wait(#[source] std::io::Error),
}

fn drain<R: Read + Send + 'static>(reader: Option<R>) -> Option<JoinHandle<String>> {
    reader.map(|mut r| {
        thread::spawn(move || {
            let mut buf = Vec::new();
            let _ = r.read_to_end(&mut buf);
            String::from_utf8_lossy(&buf).into_owned()
        })
    })
}

fn collect(handle: Option<JoinHandle<String>>) -> String {
    handle
        .map(|h| h.join().unwrap_or_default())
        .unwrap_or_default()
}

/// Runs `cmd` to completion, killing it if `timeout` elapses or `cancel` fires.
pub fn run_with_timeout(
    cmd: &mut Command,
    timeout: Duration,
    cancel: &CancelToken,
) -> Result<ProcessOutput, ProcessError> {
    let program = cmd.get_program().to_string_lossy().into_owned();
    let args: Vec<String> = cmd
        .get_args()
        .map(|a| a.to_string_lossy().into_owned())
        .collect();

    if cancel.is_cancelled() {
        return Err(ProcessError::Interrupted);
    }

    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    let start = Instant::now();
    let mut child = cmd.spawn().map_err(|source| ProcessError::Spawn {
        program: program.clone(),
        source,
    })?;

    let stdout_thread = drain(child.stdout.take());
    let stderr_thread = drain(child.stderr.take());

    let status = loop {
        match child.try_wait() {
            Ok(Some(status)) => break status,
            Ok(None) => {}
            Err(e) => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(ProcessError::Wait(e));
            }
        }

        let timed_out = start.elapsed() >= timeout;
        if timed_out || cancel.is_cancelled() {
            let _ = child.kill();
            let _ = child.wait();
            let stdout = collect(stdout_thread);
            let stderr = collect(stderr_thread);
            let output = format!("{}{}", stderr, stdout);
            log_external_tool(&program, &args, &output, None, start.elapsed());
            return if timed_out {
                Err(ProcessError::TimedOut {
                    timeout_secs: timeout.as_secs(),
                    output,
                })
            } else {
                Err(ProcessError::Interrupted)
            };
        }

        thread::sleep(POLL_INTERVAL);
    };

    let output = ProcessOutput {
        status,
        stdout: collect(stdout_thread),
        stderr: collect(stderr_thread),
        duration: start.elapsed(),
    };
    log_external_tool(
        &program,
        &args,
        &output.combined(),
        status.code(),
        output.duration,
    );
    Ok(output)
}

/// Picks the line of tool output most worth showing an operator: the last
/// line mentioning an error, else the last non-empty line.
pub fn format_tool_error(output: &str) -> String {
    if let Some(line) = output
        .lines()
        .rev()
        .find(|line| line.to_ascii_lowercase().contains("error"))
    {
        return line.trim().to_string();
    }

    output
        .lines()
        .rev()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| "no output from tool".to_string())
}

/// Likely cause of a failed conversion, derived from tool output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosticHint {
    Permission,
    DiskSpace,
    CorruptInput,
    Timeout,
    Interrupted,
    Unknown,
}

impl DiagnosticHint {
    pub fn suggestion(self) -> &'static str {
        match self {
            DiagnosticHint::Permission => {
                "check read/write permissions on the file and its directory"
            }
            DiagnosticHint::DiskSpace => "free up disk space on the output volume",
            DiagnosticHint::CorruptInput => {
                "the source file looks damaged or is not a real WebP image"
            }
            DiagnosticHint::Timeout => "raise --timeout for very large or long animations",
            DiagnosticHint::Interrupted => "rerun the batch; finished files will be skipped",
            DiagnosticHint::Unknown => "rerun with --verbose and check the log for tool output",
        }
    }
}

impl fmt::Display for DiagnosticHint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DiagnosticHint::Permission => "permission",
            DiagnosticHint::DiskSpace => "disk space",
            DiagnosticHint::CorruptInput => "corrupt input",
            DiagnosticHint::Timeout => "timeout",
            DiagnosticHint::Interrupted => "interrupted",
            DiagnosticHint::Unknown => "unknown",
        };
        f.write_str(name)
    }
}

const PERMISSION_PATTERNS: &[&str] = &[
    "permission denied",
    "operation not permitted",
    "read-only file system",
    "access is denied",
];

const DISK_SPACE_PATTERNS: &[&str] = &[
    "no space left",
    "disk full",
    "disk quota exceeded",
    "file too large",
];

const CORRUPT_PATTERNS: &[&str] = &[
    "corrupt",
    "improper image header",
    "insufficient image data",
    "no decode delegate",
    "unexpected end",
    "not a webp",
    "decoding failed",
    "invalid data",
];

/// Maps free-form tool output to a [`DiagnosticHint`]. Case-insensitive;
/// the first matching category wins in the order permission, disk space,
/// corrupt input, timeout.
pub fn classify_diagnostic(output: &str) -> DiagnosticHint {
    let lower = output.to_ascii_lowercase();
    let matches = |patterns: &[&str]| patterns.iter().any(|p| lower.contains(p));

    if matches(PERMISSION_PATTERNS) {
        DiagnosticHint::Permission
    } else if matches(DISK_SPACE_PATTERNS) {
        DiagnosticHint::DiskSpace
    } else if matches(CORRUPT_PATTERNS) {
        DiagnosticHint::CorruptInput
    } else if lower.contains("timed out") || lower.contains("time limit exceeded") {
        DiagnosticHint::Timeout
    } else {
        DiagnosticHint::Unknown
    }
}
