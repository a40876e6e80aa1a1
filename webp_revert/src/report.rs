//! Report Aggregator
//!
//! Folds per-file outcomes into the final tally. Built only after every
//! worker has finished.

use crate::types::ConversionOutcome;
use serde::Serialize;
use shared_utils::{render_summary_report, simple_summary_line, BatchResult, RunLog, RunLogMarker};
use std::time::Duration;

const OPERATION_NAME: &str = "WebP Revert";

#[derive(Debug, Clone, Serialize)]
pub struct Report {
    pub tally: BatchResult,
    /// Files discovered. Equals `tally.total` except in dry runs, where no
    /// outcome is produced.
    pub candidates: usize,
    pub bytes_in: u64,
    pub bytes_out: u64,
    pub elapsed_secs: f64,
    pub dry_run: bool,
    pub failures: Vec<ConversionOutcome>,
}

impl Report {
    pub fn empty(dry_run: bool) -> Self {
        Self {
            tally: BatchResult::new(),
            candidates: 0,
            bytes_in: 0,
            bytes_out: 0,
            elapsed_secs: 0.0,
            dry_run,
            failures: Vec::new(),
        }
    }

    pub fn preview(candidates: usize, elapsed: Duration) -> Self {
        Self {
            candidates,
            elapsed_secs: elapsed.as_secs_f64(),
            ..Self::empty(true)
        }
    }

    /// Byte totals only count successful conversions.
    pub fn aggregate(outcomes: &[ConversionOutcome], elapsed: Duration) -> Self {
        let mut report = Self::empty(false);
        report.candidates = outcomes.len();
        report.elapsed_secs = elapsed.as_secs_f64();

        for outcome in outcomes {
            match outcome {
                ConversionOutcome::Success {
                    bytes_in, bytes_out, ..
                } => {
                    report.tally.success();
                    report.bytes_in += bytes_in;
                    report.bytes_out += bytes_out;
                }
                ConversionOutcome::Skipped { .. } => report.tally.skip(),
                ConversionOutcome::Failed {
                    input,
                    reason,
                    detail,
                    ..
                } => {
                    report
                        .tally
                        .fail(input.clone(), format!("{}: {}", reason, detail));
                    report.failures.push(outcome.clone());
                }
            }
        }
        report
    }

    pub fn succeeded(&self) -> usize {
        self.tally.succeeded
    }

    pub fn skipped(&self) -> usize {
        self.tally.skipped
    }

    pub fn failed(&self) -> usize {
        self.tally.failed
    }

    pub fn total(&self) -> usize {
        self.tally.total
    }

    /// 1 when any file failed, else 0. An empty batch is a success.
    pub fn exit_code(&self) -> i32 {
        if self.tally.has_failures() {
            1
        } else {
            0
        }
    }

    pub fn write_to(&self, run_log: &RunLog) {
        run_log.event(
            RunLogMarker::Summary,
            &format!(
                "{} in {:.1}s",
                simple_summary_line(&self.tally),
                self.elapsed_secs
            ),
        );
        run_log.flush();
    }

    pub fn render(&self) -> String {
        if self.dry_run {
            return format!(
                "🔍 Dry run: {} WebP file(s) would be processed, nothing was changed\n",
                self.candidates
            );
        }
        render_summary_report(
            &self.tally,
            Duration::from_secs_f64(self.elapsed_secs),
            self.bytes_in,
            self.bytes_out,
            OPERATION_NAME,
        )
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}
