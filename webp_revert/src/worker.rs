//! Conversion Worker
//!
//! Turns one candidate into exactly one outcome:
//! classify → skip check → encode into a hidden staging file → validate →
//! no-clobber move into place → optional timestamp copy and deletion.
//!
//! Progress is advanced once per candidate on every path, including skips
//! and failures.

use crate::classifier::classify;
use crate::config::RunConfig;
use crate::errors::ConvertError;
use crate::tool::ImageTool;
use crate::types::{CandidateFile, ConversionOutcome, ConversionPlan, TargetFormat};
use filetime::FileTime;
use shared_utils::{
    format_bytes, format_size_change, CancelToken, ProgressTracker, RunLog, RunLogMarker,
};
use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tempfile::NamedTempFile;

const STAGING_PREFIX: &str = ".webp-revert-";
const STAGING_SUFFIX: &str = ".partial";

/// Output paths taken by this run. The first candidate to claim a path owns
/// it; later ones mapping to the same output are skipped.
#[derive(Debug, Default)]
pub struct OutputClaims(Mutex<HashSet<PathBuf>>);

impl OutputClaims {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn claim(&self, path: &Path) -> bool {
        let mut claimed = self.0.lock().unwrap_or_else(|e| e.into_inner());
        claimed.insert(path.to_path_buf())
    }
}

pub struct Worker<'a> {
    pub tool: &'a dyn ImageTool,
    pub config: &'a RunConfig,
    pub progress: &'a ProgressTracker,
    pub run_log: &'a RunLog,
    pub claims: &'a OutputClaims,
    pub cancel: &'a CancelToken,
}

enum Staged {
    Converted { output: PathBuf, bytes_out: u64 },
    /// Someone else wrote the output between the skip check and the move.
    LostRace(PathBuf),
}

impl Worker<'_> {
    pub fn convert(&self, candidate: &CandidateFile) -> ConversionOutcome {
        let outcome = if self.cancel.is_cancelled() {
            failed(candidate, None, ConvertError::Interrupted)
        } else {
            self.process(candidate)
        };

        self.record(candidate, &outcome);
        self.progress.complete(&candidate.file_name());
        outcome
    }

    fn process(&self, candidate: &CandidateFile) -> ConversionOutcome {
        let plan = match classify(self.tool, candidate, self.config.jpeg_quality()) {
            Ok(plan) => plan,
            Err(e) => return failed(candidate, None, e),
        };

        if fs::symlink_metadata(&plan.output).is_ok() || !self.claims.claim(&plan.output) {
            return ConversionOutcome::Skipped {
                input: plan.input,
                existing_output: plan.output,
            };
        }

        self.run_log.event(
            RunLogMarker::Convert,
            &format!("{} → {} ({})", plan.input.display(), plan.output.display(), plan.target),
        );

        let bytes_in = fs::metadata(&plan.input).map(|m| m.len()).unwrap_or(0);

        match self.encode(&plan) {
            Ok(Staged::Converted { output, bytes_out }) => {
                let original_deleted =
                    self.config.delete_original && self.delete_original(&plan.input);
                ConversionOutcome::Success {
                    input: plan.input,
                    output,
                    bytes_in,
                    bytes_out,
                    original_deleted,
                }
            }
            Ok(Staged::LostRace(existing_output)) => ConversionOutcome::Skipped {
                input: plan.input,
                existing_output,
            },
            Err(e) => failed(candidate, Some(plan.output), e),
        }
    }

    fn encode(&self, plan: &ConversionPlan) -> Result<Staged, ConvertError> {
        let parent = plan
            .output
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));

        // Removed on drop unless persisted.
        let staging = tempfile::Builder::new()
            .prefix(STAGING_PREFIX)
            .suffix(STAGING_SUFFIX)
            .tempfile_in(parent)
            .map_err(|e| ConvertError::io("failed to create staging file", e))?;

        self.tool
            .convert(plan, staging.path())
            .map_err(ConvertError::encoder)?;

        let bytes_out = self.validate(plan, &staging)?;
        self.copy_permissions(&plan.input, &staging);

        match staging.persist_noclobber(&plan.output) {
            Ok(_) => {}
            Err(e) if e.error.kind() == io::ErrorKind::AlreadyExists => {
                return Ok(Staged::LostRace(plan.output.clone()));
            }
            Err(e) => return Err(ConvertError::io("failed to move output into place", e.error)),
        }

        if self.config.preserve_mtime {
            preserve_mtime(&plan.input, &plan.output);
        }

        Ok(Staged::Converted {
            output: plan.output.clone(),
            bytes_out,
        })
    }

    /// Non-empty and readable by the dimension probe; GIFs must also report
    /// a frame count.
    fn validate(
        &self,
        plan: &ConversionPlan,
        staging: &NamedTempFile,
    ) -> Result<u64, ConvertError> {
        let bytes_out = staging
            .as_file()
            .metadata()
            .map(|m| m.len())
            .map_err(|e| ConvertError::invalid_output(format!("cannot stat output: {}", e)))?;
        if bytes_out == 0 {
            return Err(ConvertError::invalid_output("tool exited 0 but produced an empty file"));
        }

        let path = staging.path();
        self.tool.dimensions(path).map_err(|e| {
            if e.is_interrupted() {
                ConvertError::Interrupted
            } else {
                ConvertError::invalid_output(format!("output is not a readable image: {}", e))
            }
        })?;
        if plan.target == TargetFormat::Gif {
            self.tool.frame_count(path).map_err(|e| {
                if e.is_interrupted() {
                    ConvertError::Interrupted
                } else {
                    ConvertError::invalid_output(format!(
                        "output GIF has no readable frames: {}",
                        e
                    ))
                }
            })?;
        }
        Ok(bytes_out)
    }

    fn copy_permissions(&self, input: &Path, staging: &NamedTempFile) {
        let result =
            fs::metadata(input).and_then(|m| staging.as_file().set_permissions(m.permissions()));
        if let Err(e) = result {
            tracing::debug!(input = %input.display(), error = %e, "Could not copy permissions");
        }
    }

    fn delete_original(&self, input: &Path) -> bool {
        match fs::remove_file(input) {
            Ok(()) => {
                self.run_log
                    .event(RunLogMarker::Delete, &format!("{}", input.display()));
                true
            }
            Err(e) => {
                tracing::info!(input = %input.display(), error = %e, "Failed to delete original");
                self.progress
                    .println(&format!("⚠️  could not delete {}: {}", input.display(), e));
                self.run_log.event(
                    RunLogMarker::Warn,
                    &format!("could not delete {}: {}", input.display(), e),
                );
                false
            }
        }
    }

    fn record(&self, candidate: &CandidateFile, outcome: &ConversionOutcome) {
        match outcome {
            ConversionOutcome::Success {
                output,
                bytes_in,
                bytes_out,
                ..
            } => {
                let message = format!(
                    "{} → {} ({} → {}, {})",
                    candidate.path.display(),
                    output.display(),
                    format_bytes(*bytes_in),
                    format_bytes(*bytes_out),
                    format_size_change(*bytes_in, *bytes_out)
                );
                tracing::info!(
                    input = %candidate.path.display(),
                    output = %output.display(),
                    "Converted"
                );
                self.run_log.event(RunLogMarker::Success, &message);
            }
            ConversionOutcome::Skipped { existing_output, .. } => {
                tracing::debug!(
                    input = %candidate.path.display(),
                    existing = %existing_output.display(),
                    "Skipped"
                );
                self.run_log.event(
                    RunLogMarker::Skip,
                    &format!(
                        "{} (output exists: {})",
                        candidate.path.display(),
                        existing_output.display()
                    ),
                );
            }
            ConversionOutcome::Failed {
                reason, detail, hint, ..
            } => {
                // Shown through the progress display below; stderr tracing
                // would tear the bar.
                tracing::debug!(
                    input = %candidate.path.display(),
                    reason = %reason,
                    hint = %hint,
                    detail = %detail,
                    "Conversion failed"
                );
                self.run_log.event(
                    RunLogMarker::Error,
                    &format!(
                        "{}: {} ({}; hint: {})",
                        candidate.path.display(),
                        reason,
                        detail,
                        hint.suggestion()
                    ),
                );
                self.progress.println(&format!(
                    "❌ {}: {} ({})",
                    candidate.file_name(),
                    reason,
                    detail
                ));
            }
        }
    }
}

fn failed(
    candidate: &CandidateFile,
    attempted_output: Option<PathBuf>,
    err: ConvertError,
) -> ConversionOutcome {
    ConversionOutcome::Failed {
        input: candidate.path.clone(),
        attempted_output,
        reason: err.reason(),
        hint: err.hint(),
        detail: err.detail(),
    }
}

fn preserve_mtime(input: &Path, output: &Path) {
    let result = fs::metadata(input)
        .map(|m| FileTime::from_last_modification_time(&m))
        .and_then(|mtime| filetime::set_file_mtime(output, mtime));
    if let Err(e) = result {
        tracing::debug!(output = %output.display(), error = %e, "Could not copy modification time");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tool::mock::MockTool;
    use crate::types::FailureReason;
    use shared_utils::DiagnosticHint;
    use tempfile::TempDir;

    struct Fixture {
        dir: TempDir,
        tool: MockTool,
        config: RunConfig,
        progress: ProgressTracker,
        run_log: RunLog,
        claims: OutputClaims,
        cancel: CancelToken,
    }

    impl Fixture {
        fn new(total: usize) -> Self {
            let dir = TempDir::new().unwrap();
            let config = RunConfig::new(dir.path());
            Self {
                dir,
                tool: MockTool::new(),
                config,
                progress: ProgressTracker::hidden(total),
                run_log: RunLog::disabled(),
                claims: OutputClaims::new(),
                cancel: CancelToken::new(),
            }
        }

        fn worker(&self) -> Worker<'_> {
            Worker {
                tool: &self.tool,
                config: &self.config,
                progress: &self.progress,
                run_log: &self.run_log,
                claims: &self.claims,
                cancel: &self.cancel,
            }
        }

        fn file(&self, name: &str, content: &str) -> CandidateFile {
            let path = self.dir.path().join(name);
            fs::write(&path, content).unwrap();
            CandidateFile::from_path(&path).unwrap()
        }

        fn staging_leftovers(&self) -> usize {
            fs::read_dir(self.dir.path())
                .unwrap()
                .filter_map(|e| e.ok())
                .filter(|e| e.file_name().to_string_lossy().starts_with(STAGING_PREFIX))
                .count()
        }
    }

    #[test]
    fn test_success_writes_output() {
        let fx = Fixture::new(1);
        let c = fx.file("a.webp", "frames=1");
        let outcome = fx.worker().convert(&c);

        match &outcome {
            ConversionOutcome::Success {
                output,
                bytes_out,
                original_deleted,
                ..
            } => {
                assert_eq!(output, &fx.dir.path().join("a.jpg"));
                assert!(*bytes_out > 0);
                assert!(!original_deleted);
                assert!(output.exists());
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
        assert!(c.path.exists());
        assert_eq!(fx.progress.current(), 1);
        assert_eq!(fx.staging_leftovers(), 0);
    }

    #[test]
    fn test_existing_output_is_skipped_untouched() {
        let fx = Fixture::new(1);
        let c = fx.file("a.webp", "frames=1");
        let existing = fx.dir.path().join("a.jpg");
        fs::write(&existing, "original jpg").unwrap();

        let outcome = fx.worker().convert(&c);
        assert!(outcome.is_skipped());
        assert_eq!(fs::read_to_string(&existing).unwrap(), "original jpg");
        assert_eq!(fx.tool.encodes().len(), 0);
        assert_eq!(fx.progress.current(), 1);
    }

    #[test]
    fn test_existing_directory_counts_as_output() {
        let fx = Fixture::new(1);
        let c = fx.file("a.webp", "frames=1");
        fs::create_dir(fx.dir.path().join("a.jpg")).unwrap();
        assert!(fx.worker().convert(&c).is_skipped());
    }

    #[test]
    fn test_same_output_claimed_once() {
        let fx = Fixture::new(2);
        let a = fx.file("a.webp", "frames=1");
        let b = fx.file("a.jpg.webp", "frames=1");

        let first = fx.worker().convert(&a);
        let second = fx.worker().convert(&b);
        assert!(first.is_success());
        assert!(second.is_skipped());
        assert_eq!(fx.tool.encodes().len(), 1);
    }

    #[test]
    fn test_corrupt_input_fails_unreadable() {
        let fx = Fixture::new(1);
        let c = fx.file("corrupt.webp", "corrupt");
        let outcome = fx.worker().convert(&c);
        match outcome {
            ConversionOutcome::Failed {
                reason,
                attempted_output,
                hint,
                ..
            } => {
                assert_eq!(reason, FailureReason::UnreadableInput);
                assert_eq!(attempted_output, None);
                assert_eq!(hint, DiagnosticHint::CorruptInput);
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
        assert_eq!(fx.progress.current(), 1);
    }

    #[test]
    fn test_encoder_failure_leaves_no_artifact() {
        let fx = Fixture::new(1);
        let c = fx.file("a.webp", "encode=fail");
        let outcome = fx.worker().convert(&c);
        match outcome {
            ConversionOutcome::Failed {
                reason,
                hint,
                attempted_output,
                ..
            } => {
                assert_eq!(reason, FailureReason::EncoderError);
                assert_eq!(hint, DiagnosticHint::Permission);
                assert_eq!(attempted_output, Some(fx.dir.path().join("a.jpg")));
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
        assert!(!fx.dir.path().join("a.jpg").exists());
        assert_eq!(fx.staging_leftovers(), 0);
    }

    #[test]
    fn test_empty_output_is_invalid() {
        let fx = Fixture::new(1);
        let c = fx.file("a.webp", "encode=empty");
        let outcome = fx.worker().convert(&c);
        assert_eq!(outcome.failure_reason(), Some(FailureReason::InvalidOutput));
        assert!(!fx.dir.path().join("a.jpg").exists());
        assert_eq!(fx.staging_leftovers(), 0);
    }

    #[test]
    fn test_unreadable_output_is_invalid() {
        let fx = Fixture::new(1);
        let c = fx.file("a.webp", "encode=garbage");
        let outcome = fx.worker().convert(&c);
        assert_eq!(outcome.failure_reason(), Some(FailureReason::InvalidOutput));
        assert!(!fx.dir.path().join("a.jpg").exists());
    }

    #[test]
    fn test_failures_do_not_log_at_warn() {
        use std::io::Write;
        use std::sync::{Arc, Mutex};

        #[derive(Clone, Default)]
        struct Sink(Arc<Mutex<Vec<u8>>>);

        impl Write for Sink {
            fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
                self.0.lock().unwrap().extend_from_slice(buf);
                Ok(buf.len())
            }

            fn flush(&mut self) -> io::Result<()> {
                Ok(())
            }
        }

        let fx = Fixture::new(3);
        let files = [
            fx.file("a.webp", "corrupt"),
            fx.file("b.webp", "encode=fail"),
            fx.file("c.webp", "encode=garbage"),
        ];

        let sink = Sink::default();
        let writer = sink.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::WARN)
            .with_ansi(false)
            .with_writer(move || writer.clone())
            .finish();
        let outcomes: Vec<_> = tracing::subscriber::with_default(subscriber, || {
            files.iter().map(|c| fx.worker().convert(c)).collect()
        });

        assert!(outcomes.iter().all(|o| o.is_failed()));
        let logged = String::from_utf8_lossy(&sink.0.lock().unwrap()).into_owned();
        assert!(logged.is_empty(), "unexpected stderr output: {logged}");
    }

    #[test]
    fn test_gif_without_frames_is_invalid() {
        let mut fx = Fixture::new(1);
        fx.config.delete_original = true;
        let c = fx.file("anim.webp", "frames=5 encode=noframes");
        let outcome = fx.worker().convert(&c);

        assert_eq!(outcome.failure_reason(), Some(FailureReason::InvalidOutput));
        assert_eq!(fx.tool.encodes(), vec![(c.path.clone(), TargetFormat::Gif)]);
        assert!(!fx.dir.path().join("anim.gif").exists());
        assert!(c.path.exists());
        assert_eq!(fx.staging_leftovers(), 0);
    }

    #[test]
    fn test_delete_original_after_success() {
        let mut fx = Fixture::new(1);
        fx.config.delete_original = true;
        let c = fx.file("b.png.webp", "alpha=true");
        let outcome = fx.worker().convert(&c);

        match outcome {
            ConversionOutcome::Success {
                output,
                original_deleted,
                ..
            } => {
                assert_eq!(output, fx.dir.path().join("b.png"));
                assert!(original_deleted);
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
        assert!(!c.path.exists());
    }

    #[test]
    fn test_failure_never_deletes_original() {
        let mut fx = Fixture::new(1);
        fx.config.delete_original = true;
        let c = fx.file("a.webp", "encode=fail");
        assert!(fx.worker().convert(&c).is_failed());
        assert!(c.path.exists());
    }

    #[test]
    fn test_mtime_copied_to_output() {
        let fx = Fixture::new(1);
        let c = fx.file("a.webp", "frames=1");
        let old = FileTime::from_unix_time(1_500_000_000, 0);
        filetime::set_file_mtime(&c.path, old).unwrap();

        fx.worker().convert(&c);
        let meta = fs::metadata(fx.dir.path().join("a.jpg")).unwrap();
        assert_eq!(FileTime::from_last_modification_time(&meta), old);
    }

    #[test]
    fn test_cancelled_before_start() {
        let fx = Fixture::new(1);
        fx.cancel.cancel();
        let c = fx.file("a.webp", "frames=1");
        let outcome = fx.worker().convert(&c);
        assert_eq!(outcome.failure_reason(), Some(FailureReason::Interrupted));
        assert_eq!(fx.tool.probe_count(), 0);
        assert_eq!(fx.progress.current(), 1);
    }

    #[test]
    fn test_run_log_records_outcome() {
        let mut fx = Fixture::new(1);
        let log_dir = TempDir::new().unwrap();
        fx.run_log = RunLog::create(log_dir.path(), "webp_revert").unwrap();
        let c = fx.file("a.webp", "frames=1");
        fx.worker().convert(&c);

        let content = fs::read_to_string(fx.run_log.path().unwrap()).unwrap();
        assert!(content.contains("CONVERT"));
        assert!(content.contains("SUCCESS"));
    }

    #[test]
    fn test_progress_counts_every_outcome_in_parallel() {
        use rayon::prelude::*;

        let fx = Fixture::new(30);
        let candidates: Vec<_> = (0..30)
            .map(|i| {
                let content = match i % 3 {
                    0 => "corrupt",
                    1 => "frames=1",
                    _ => "frames=4",
                };
                fx.file(&format!("img{:02}.webp", i), content)
            })
            .collect();
        fs::write(fx.dir.path().join("img01.jpg"), "taken").unwrap();

        let worker = fx.worker();
        let outcomes: Vec<_> = candidates.par_iter().map(|c| worker.convert(c)).collect();

        assert_eq!(outcomes.len(), 30);
        assert_eq!(fx.progress.current(), 30);
        assert_eq!(outcomes.iter().filter(|o| o.is_failed()).count(), 10);
        assert_eq!(outcomes.iter().filter(|o| o.is_skipped()).count(), 1);
        assert_eq!(fx.staging_leftovers(), 0);
    }
}
