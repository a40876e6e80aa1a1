//! Report Module
//!
//! Summary box printed at the end of a batch.

use crate::batch::BatchResult;
use crate::progress::{format_bytes, format_duration};
use std::fmt::Write;
use std::time::Duration;

const BORDER: &str =
    "══════════════════════════════════════════════════════════════════════════════";
const RULE: &str =
    "━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━";

/// Percentage saved between the inputs and outputs of the successful files.
pub fn size_reduction_percent(input_bytes: u64, output_bytes: u64) -> f64 {
    if input_bytes > 0 {
        (1.0 - output_bytes as f64 / input_bytes as f64) * 100.0
    } else {
        0.0
    }
}

pub fn render_summary_report(
    result: &BatchResult,
    duration: Duration,
    input_bytes: u64,
    output_bytes: u64,
    operation_name: &str,
) -> String {
    let mut out = String::new();
    let row = |out: &mut String, label: &str, value: String| {
        let _ = writeln!(out, "║  {:<22}{:>12}{:42}║", label, value, "");
    };

    let _ = writeln!(out);
    let _ = writeln!(out, "╔{}╗", BORDER);
    let _ = writeln!(out, "║  📊 {:<73}║", format!("{} Summary Report", operation_name));
    let _ = writeln!(out, "╠{}╣", BORDER);
    row(&mut out, "📁 Files Found:", result.total.to_string());
    row(&mut out, "✅ Converted:", result.succeeded.to_string());
    row(&mut out, "⏭️  Skipped:", result.skipped.to_string());
    row(&mut out, "❌ Failed:", result.failed.to_string());
    row(&mut out, "📈 Success Rate:", format!("{:.1}%", result.success_rate()));
    let _ = writeln!(out, "╠{}╣", BORDER);
    row(&mut out, "💾 Input Size:", format_bytes(input_bytes));
    row(&mut out, "💾 Output Size:", format_bytes(output_bytes));
    row(
        &mut out,
        "📉 Size Change:",
        format!("{:.1}%", -size_reduction_percent(input_bytes, output_bytes)),
    );
    let _ = writeln!(out, "╠{}╣", BORDER);
    row(&mut out, "⏱️  Total Time:", format_duration(duration));
    if result.total > 0 {
        let avg_time = duration.as_secs_f64() / result.total as f64;
        row(&mut out, "⏱️  Avg Time/File:", format!("{:.2}s", avg_time));
    }
    let _ = writeln!(out, "╚{}╝", BORDER);

    if !result.errors.is_empty() {
        let _ = writeln!(out);
        let _ = writeln!(out, "❌ Errors encountered:");
        let _ = writeln!(out, "{}", RULE);
        for (path, error) in &result.errors {
            let _ = writeln!(out, "   {} → {}", path.display(), error);
        }
    }

    out
}

pub fn simple_summary_line(result: &BatchResult) -> String {
    format!(
        "{} converted, {} skipped, {} failed (total: {})",
        result.succeeded, result.skipped, result.failed, result.total
    )
}
