//! Progress accounting for parallel batches.
//!
//! `ProgressCounter` is the exact "N of Total" count shared by every worker.
//! `ProgressTracker` pairs it with one of the display modes: an indicatif bar,
//! one plain line per completed file, or nothing.

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

pub mod templates {
    pub const BATCH: &str = "{spinner:.green} {prefix:.cyan.bold} ▕{bar:35.green/black}▏ {percent:>3}% • {pos}/{len} • ⏱️ {elapsed_precise} • {msg}";
    pub const PROGRESS_CHARS: &str = "█▓░";
    pub const SPINNER_CHARS: &str = "⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏";
}

/// Monotonic completion counter, capped at the candidate total.
#[derive(Debug)]
pub struct ProgressCounter {
    total: usize,
    done: AtomicUsize,
}

impl ProgressCounter {
    pub fn new(total: usize) -> Self {
        Self {
            total,
            done: AtomicUsize::new(0),
        }
    }

    /// Records one completion and returns the value this completion produced.
    /// Concurrent callers always observe distinct values.
    pub fn increment(&self) -> usize {
        match self
            .done
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                (current < self.total).then_some(current + 1)
            }) {
            Ok(previous) => previous + 1,
            Err(current) => {
                tracing::warn!(
                    total = self.total,
                    "Progress counter already at total, extra completion ignored"
                );
                current
            }
        }
    }

    pub fn current(&self) -> usize {
        self.done.load(Ordering::Acquire)
    }

    pub fn total(&self) -> usize {
        self.total
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProgressMode {
    /// Live indicatif bar on stderr.
    #[default]
    Bar,
    /// One `[N/Total] name` line per completed file.
    Simple,
    /// No progress output.
    None,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unrecognized progress mode '{0}' (expected bar, simple or none)")]
pub struct ParseProgressModeError(pub String);

impl FromStr for ProgressMode {
    type Err = ParseProgressModeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "bar" => Ok(ProgressMode::Bar),
            "simple" | "plain" => Ok(ProgressMode::Simple),
            "none" | "off" | "quiet" => Ok(ProgressMode::None),
            other => Err(ParseProgressModeError(other.to_string())),
        }
    }
}

impl fmt::Display for ProgressMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProgressMode::Bar => write!(f, "bar"),
            ProgressMode::Simple => write!(f, "simple"),
            ProgressMode::None => write!(f, "none"),
        }
    }
}

enum Display {
    Bar(ProgressBar),
    Simple,
    Hidden,
}

pub struct ProgressTracker {
    counter: ProgressCounter,
    display: Display,
}

impl ProgressTracker {
    pub fn new(total: usize, prefix: &str, mode: ProgressMode) -> Self {
        let display = match mode {
            ProgressMode::Bar => Display::Bar(create_progress_bar(total as u64, prefix)),
            ProgressMode::Simple => Display::Simple,
            ProgressMode::None => Display::Hidden,
        };
        Self {
            counter: ProgressCounter::new(total),
            display,
        }
    }

    /// Counter without any terminal output.
    pub fn hidden(total: usize) -> Self {
        Self::new(total, "", ProgressMode::None)
    }

    /// Marks one file as done (whatever its outcome) and refreshes the display.
    pub fn complete(&self, label: &str) -> usize {
        let current = self.counter.increment();
        match &self.display {
            Display::Bar(bar) => {
                bar.set_position(current as u64);
                bar.set_message(label.to_string());
            }
            Display::Simple => {
                eprintln!("[{}/{}] {}", current, self.counter.total(), label);
            }
            Display::Hidden => {}
        }
        current
    }

    /// Prints above the bar without tearing it.
    pub fn println(&self, msg: &str) {
        match &self.display {
            Display::Bar(bar) => bar.suspend(|| eprintln!("{}", msg)),
            Display::Simple => eprintln!("{}", msg),
            Display::Hidden => {}
        }
    }

    pub fn finish(&self) {
        if let Display::Bar(bar) = &self.display {
            bar.finish_with_message("Complete!");
        }
    }

    pub fn current(&self) -> usize {
        self.counter.current()
    }

    pub fn total(&self) -> usize {
        self.counter.total()
    }
}

pub fn create_progress_bar(total: u64, prefix: &str) -> ProgressBar {
    let pb = ProgressBar::new(total);
    match ProgressStyle::default_bar().template(templates::BATCH) {
        Ok(style) => pb.set_style(
            style
                .progress_chars(templates::PROGRESS_CHARS)
                .tick_chars(templates::SPINNER_CHARS),
        ),
        Err(e) => tracing::debug!(error = %e, "Falling back to default progress style"),
    }
    pb.set_prefix(prefix.to_string());
    pb.set_draw_target(ProgressDrawTarget::stderr_with_hz(20));
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}

pub fn format_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.2} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    if secs >= 3600 {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    } else if secs >= 60 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}s", secs)
    }
}

/// "size reduced 12.5%" / "size increased 3.0%"; "size unchanged" for an empty input.
pub fn format_size_change(input_size: u64, output_size: u64) -> String {
    if input_size == 0 {
        return "size unchanged".to_string();
    }
    let reduction_pct = (1.0 - output_size as f64 / input_size as f64) * 100.0;
    if reduction_pct >= 0.0 {
        format!("size reduced {:.1}%", reduction_pct)
    } else {
        format!("size increased {:.1}%", -reduction_pct)
    }
}
