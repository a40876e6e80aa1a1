//! Durable run log.
//!
//! One append-only text file per run, named from the start timestamp, so each
//! invocation leaves its own record (e.g. `./logs/webp_revert_run_2026-02-28_14-30-00_4242.log`).
//! Every line is `[timestamp] <marker> <message>`.
//!
//! Workers append concurrently. Each line goes through one mutex-guarded
//! buffered writer and is flushed before the lock is released, so lines never
//! interleave and nothing is lost if the process is killed.

use chrono::Local;
use std::fs::{File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Status marker printed in front of each run-log line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunLogMarker {
    Start,
    Convert,
    Success,
    Skip,
    Error,
    Delete,
    Warn,
    Summary,
}

impl RunLogMarker {
    pub fn tag(self) -> &'static str {
        match self {
            RunLogMarker::Start => "🚀 START  ",
            RunLogMarker::Convert => "🔄 CONVERT",
            RunLogMarker::Success => "✅ SUCCESS",
            RunLogMarker::Skip => "⏭️ SKIP   ",
            RunLogMarker::Error => "❌ ERROR  ",
            RunLogMarker::Delete => "🗑️ DELETE ",
            RunLogMarker::Warn => "⚠️ WARN   ",
            RunLogMarker::Summary => "📊 SUMMARY",
        }
    }
}

pub struct RunLog {
    path: Option<PathBuf>,
    writer: Mutex<Option<BufWriter<File>>>,
}

impl RunLog {
    /// Creates a fresh log file in `dir`. Never reuses an existing file: a
    /// numeric suffix is appended until the name is free.
    pub fn create(dir: &Path, program_name: &str) -> io::Result<Self> {
        std::fs::create_dir_all(dir)?;
        let timestamp = Local::now().format("%Y-%m-%d_%H-%M-%S").to_string();
        let base = format!("{}_run_{}_{}", program_name, timestamp, std::process::id());

        let mut attempt = 0u32;
        loop {
            let name = if attempt == 0 {
                format!("{}.log", base)
            } else {
                format!("{}_{}.log", base, attempt)
            };
            let path = dir.join(name);
            match OpenOptions::new().append(true).create_new(true).open(&path) {
                Ok(file) => {
                    tracing::info!(run_log = %path.display(), "Run log created");
                    return Ok(Self {
                        path: Some(path),
                        writer: Mutex::new(Some(BufWriter::with_capacity(64 * 1024, file))),
                    });
                }
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists && attempt < 1000 => {
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// A sink that drops every line. Used for dry runs and tests.
    pub fn disabled() -> Self {
        Self {
            path: None,
            writer: Mutex::new(None),
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn event(&self, marker: RunLogMarker, message: &str) {
        let line = format!(
            "[{}] {} {}",
            Local::now().format("%Y-%m-%d %H:%M:%S"),
            marker.tag(),
            message
        );
        self.write_line(&line);
    }

    fn write_line(&self, line: &str) {
        let mut guard = self.writer.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(writer) = guard.as_mut() {
            let result = writeln!(writer, "{}", line).and_then(|_| writer.flush());
            if let Err(e) = result {
                tracing::warn!(error = %e, "Failed to append to run log");
            }
        }
    }

    pub fn flush(&self) {
        let mut guard = self.writer.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(writer) = guard.as_mut() {
            let _ = writer.flush();
        }
    }
}

impl Drop for RunLog {
    fn drop(&mut self) {
        self.flush();
    }
}
