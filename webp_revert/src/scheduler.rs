//! Job Scheduler
//!
//! Discovers candidates, sizes the worker pool, and runs one conversion per
//! candidate on a rayon pool. The report is built only after the pool has
//! drained.

use crate::classifier::classify;
use crate::config::RunConfig;
use crate::errors::RunError;
use crate::report::Report;
use crate::tool::ImageTool;
use crate::types::{CandidateFile, WEBP_EXTENSION};
use crate::worker::{OutputClaims, Worker};
use console::{style, Term};
use rayon::prelude::*;
use shared_utils::{
    check_safe_for_destructive, collect_files, effective_workers, resolve_parallelism,
    CancelToken, ProgressTracker, RunLog, RunLogMarker,
};
use std::collections::BTreeSet;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Instant;

/// Asks the operator a yes/no question.
pub trait Confirm {
    fn confirm(&self, prompt: &str) -> io::Result<bool>;
}

/// Reads the answer from the terminal. Anything but `y`/`yes` is a no,
/// including an empty line.
pub struct TerminalConfirm;

impl Confirm for TerminalConfirm {
    fn confirm(&self, prompt: &str) -> io::Result<bool> {
        let term = Term::stderr();
        term.write_str(&format!("{} [y/N] ", prompt))?;
        let answer = term.read_line()?;
        Ok(matches!(
            answer.trim().to_ascii_lowercase().as_str(),
            "y" | "yes"
        ))
    }
}

/// All `.webp` files under `root`, sorted by resolved path.
///
/// A file reachable through several symlinked directories is listed once.
pub fn discover(root: &Path, recursive: bool) -> Vec<CandidateFile> {
    let resolved: BTreeSet<PathBuf> = collect_files(root, &[WEBP_EXTENSION], recursive)
        .iter()
        .map(|path| shared_utils::resolve(path))
        .collect();

    resolved
        .into_iter()
        .filter_map(|path| {
            let candidate = CandidateFile::from_path(&path);
            if candidate.is_none() {
                tracing::warn!(path = %path.display(), "Skipping file with a non-UTF-8 name");
            }
            candidate
        })
        .collect()
}

pub struct Scheduler<'a> {
    tool: &'a dyn ImageTool,
    config: &'a RunConfig,
    run_log: &'a RunLog,
    cancel: CancelToken,
    confirm: &'a dyn Confirm,
}

impl<'a> Scheduler<'a> {
    pub fn new(
        tool: &'a dyn ImageTool,
        config: &'a RunConfig,
        run_log: &'a RunLog,
        cancel: CancelToken,
        confirm: &'a dyn Confirm,
    ) -> Self {
        Self {
            tool,
            config,
            run_log,
            cancel,
            confirm,
        }
    }

    pub fn run(&self) -> Result<Report, RunError> {
        let start = Instant::now();
        let config = self.config;

        let candidates = discover(&config.root, config.recursive);
        tracing::info!(
            root = %config.root.display(),
            recursive = config.recursive,
            count = candidates.len(),
            "Discovery finished"
        );

        if candidates.is_empty() {
            if !config.json {
                println!("📂 No WebP files found in {}", config.root.display());
            }
            let report = Report::empty(config.dry_run);
            self.run_log.event(
                RunLogMarker::Start,
                &format!("0 candidate(s) in {}", config.root.display()),
            );
            report.write_to(self.run_log);
            return Ok(report);
        }

        if config.dry_run {
            self.preview(&candidates);
            return Ok(Report::preview(candidates.len(), start.elapsed()));
        }

        if config.delete_original {
            self.confirm_deletion(candidates.len())?;
        }

        let workers = effective_workers(resolve_parallelism(config.parallelism), candidates.len());
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|i| format!("webp-revert-{}", i))
            .build()?;

        self.run_log.event(
            RunLogMarker::Start,
            &format!(
                "{} candidate(s) in {} | workers: {} | quality: {} | delete originals: {}",
                candidates.len(),
                config.root.display(),
                workers,
                config.quality,
                config.delete_original
            ),
        );
        if config.verbose && !config.json {
            eprintln!(
                "🔧 {} file(s), {} parallel worker(s)",
                candidates.len(),
                workers
            );
        }

        let progress = ProgressTracker::new(candidates.len(), "Converting", config.progress);
        let claims = OutputClaims::new();
        let worker = Worker {
            tool: self.tool,
            config,
            progress: &progress,
            run_log: self.run_log,
            claims: &claims,
            cancel: &self.cancel,
        };

        // `collect` returns only after every task finished.
        let outcomes: Vec<_> = pool.install(|| {
            candidates
                .par_iter()
                .map(|candidate| worker.convert(candidate))
                .collect()
        });
        progress.finish();

        if self.cancel.is_cancelled() {
            self.run_log
                .event(RunLogMarker::Warn, "run interrupted, remaining files not started");
        }

        let report = Report::aggregate(&outcomes, start.elapsed());
        report.write_to(self.run_log);
        Ok(report)
    }

    fn confirm_deletion(&self, count: usize) -> Result<(), RunError> {
        check_safe_for_destructive(&self.config.root, "delete")?;
        if self.config.assume_yes {
            return Ok(());
        }
        let prompt = format!(
            "{} Delete up to {} original WebP file(s) after successful conversion?",
            style("⚠️").yellow(),
            count
        );
        if self.confirm.confirm(&prompt).map_err(RunError::Prompt)? {
            Ok(())
        } else {
            tracing::info!("Deletion of originals declined");
            Err(RunError::Aborted)
        }
    }

    /// Lists what a real run would do using read-only probes.
    fn preview(&self, candidates: &[CandidateFile]) {
        if self.config.json {
            return;
        }
        let shown = candidates.len().min(self.config.list_limit);
        println!(
            "🔍 Dry run: {} WebP file(s) found in {}",
            candidates.len(),
            self.config.root.display()
        );
        for candidate in &candidates[..shown] {
            match classify(self.tool, candidate, self.config.jpeg_quality()) {
                Ok(plan) => {
                    let note = if plan.output.exists() {
                        " (exists, would skip)"
                    } else {
                        ""
                    };
                    println!(
                        "   {} → {} [{}]{}",
                        candidate.path.display(),
                        plan.output.display(),
                        plan.target,
                        note
                    );
                }
                Err(e) => println!("   {} → {}", candidate.path.display(), style(e).red()),
            }
        }
        if candidates.len() > shown {
            println!("   ... and {} more", candidates.len() - shown);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tool::mock::MockTool;
    use crate::types::{ConversionOutcome, FailureReason};
    use shared_utils::ProgressMode;
    use std::cell::Cell;
    use std::fs;
    use std::time::Duration;
    use tempfile::TempDir;

    struct Answer {
        value: bool,
        asked: Cell<bool>,
    }

    impl Answer {
        fn new(value: bool) -> Self {
            Self {
                value,
                asked: Cell::new(false),
            }
        }
    }

    impl Confirm for Answer {
        fn confirm(&self, _prompt: &str) -> io::Result<bool> {
            self.asked.set(true);
            Ok(self.value)
        }
    }

    fn config(dir: &TempDir) -> RunConfig {
        let mut config = RunConfig::new(dir.path());
        config.progress = ProgressMode::None;
        config.json = true;
        config.validate().unwrap()
    }

    fn write(dir: &TempDir, name: &str, content: &str) {
        let path = dir.path().join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, content).unwrap();
    }

    fn snapshot(dir: &Path) -> Vec<(String, Vec<u8>)> {
        let mut entries: Vec<_> = list_files(dir)
            .into_iter()
            .map(|p| {
                let content = fs::read(&p).unwrap_or_default();
                (p.to_string_lossy().into_owned(), content)
            })
            .collect();
        entries.sort();
        entries
    }

    fn list_files(dir: &Path) -> Vec<std::path::PathBuf> {
        let mut out = Vec::new();
        for entry in fs::read_dir(dir).unwrap().filter_map(|e| e.ok()) {
            let path = entry.path();
            if path.is_dir() {
                out.extend(list_files(&path));
            } else {
                out.push(path);
            }
        }
        out
    }

    fn run(tool: &MockTool, config: &RunConfig, confirm: &dyn Confirm) -> Result<Report, RunError> {
        let run_log = RunLog::disabled();
        Scheduler::new(tool, config, &run_log, CancelToken::new(), confirm).run()
    }

    #[test]
    fn test_empty_directory() {
        let dir = TempDir::new().unwrap();
        write(&dir, "notes.txt", "hello");
        let report = run(&MockTool::new(), &config(&dir), &Answer::new(false)).unwrap();
        assert_eq!(report.total(), 0);
        assert_eq!(report.exit_code(), 0);
    }

    #[test]
    fn test_empty_directory_run_log_has_banner_and_summary() {
        let dir = TempDir::new().unwrap();
        let log_dir = TempDir::new().unwrap();
        let run_log = RunLog::create(log_dir.path(), "webp_revert").unwrap();

        let report = Scheduler::new(
            &MockTool::new(),
            &config(&dir),
            &run_log,
            CancelToken::new(),
            &Answer::new(false),
        )
        .run()
        .unwrap();
        assert_eq!(report.total(), 0);

        let content = fs::read_to_string(run_log.path().unwrap()).unwrap();
        let lines: Vec<_> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains("START"));
        assert!(lines[1].contains("SUMMARY"));
        assert!(lines[1].contains("(total: 0)"));
    }

    #[test]
    fn test_mixed_batch() {
        let dir = TempDir::new().unwrap();
        write(&dir, "a.webp", "frames=1");
        write(&dir, "b.png.webp", "alpha=true");
        write(&dir, "anim.webp", "frames=8");
        write(&dir, "corrupt.webp", "corrupt");

        let report = run(&MockTool::new(), &config(&dir), &Answer::new(false)).unwrap();
        assert_eq!(report.total(), 4);
        assert_eq!(report.succeeded(), 3);
        assert_eq!(report.failed(), 1);
        assert_eq!(report.exit_code(), 1);
        assert_eq!(
            report.failures[0].failure_reason(),
            Some(FailureReason::UnreadableInput)
        );
        assert!(report.failures[0].input().ends_with("corrupt.webp"));

        assert!(dir.path().join("a.jpg").exists());
        assert!(dir.path().join("b.png").exists());
        assert!(dir.path().join("anim.gif").exists());
    }

    #[test]
    fn test_second_run_is_idempotent() {
        let dir = TempDir::new().unwrap();
        write(&dir, "a.webp", "frames=1");
        write(&dir, "b.png.webp", "alpha=true");
        let config = config(&dir);

        let first = run(&MockTool::new(), &config, &Answer::new(false)).unwrap();
        assert_eq!(first.succeeded(), 2);
        let before = snapshot(dir.path());

        let tool = MockTool::new();
        let second = run(&tool, &config, &Answer::new(false)).unwrap();
        assert_eq!(second.total(), 2);
        assert_eq!(second.skipped(), 2);
        assert_eq!(second.succeeded(), 0);
        assert!(tool.encodes().is_empty());
        assert_eq!(snapshot(dir.path()), before);
    }

    #[test]
    fn test_dry_run_changes_nothing() {
        let dir = TempDir::new().unwrap();
        write(&dir, "a.webp", "frames=1");
        write(&dir, "b.webp", "frames=4");
        let mut config = config(&dir);
        config.dry_run = true;
        config.delete_original = true;
        let before = snapshot(dir.path());

        let tool = MockTool::new();
        let answer = Answer::new(true);
        let report = run(&tool, &config, &answer).unwrap();
        assert!(report.dry_run);
        assert_eq!(report.candidates, 2);
        assert_eq!(report.exit_code(), 0);
        assert!(tool.encodes().is_empty());
        assert!(!answer.asked.get());
        assert_eq!(snapshot(dir.path()), before);
    }

    #[test]
    fn test_concurrency_bound() {
        let dir = TempDir::new().unwrap();
        for i in 0..12 {
            write(&dir, &format!("img{:02}.webp", i), "frames=1");
        }
        let mut config = config(&dir);
        config.parallelism = Some(3);

        let tool = MockTool::with_encode_delay(Duration::from_millis(40));
        let report = run(&tool, &config, &Answer::new(false)).unwrap();
        assert_eq!(report.succeeded(), 12);
        assert!(tool.max_concurrent_encodes() <= 3);
        assert!(tool.max_concurrent_encodes() >= 1);
    }

    #[test]
    fn test_recursive_discovery() {
        let dir = TempDir::new().unwrap();
        write(&dir, "top.webp", "frames=1");
        write(&dir, "nested/deep.webp", "frames=1");

        let shallow = config(&dir);
        assert_eq!(run(&MockTool::new(), &shallow, &Answer::new(false)).unwrap().total(), 1);

        let dir2 = TempDir::new().unwrap();
        write(&dir2, "top.webp", "frames=1");
        write(&dir2, "nested/deep.webp", "frames=1");
        let mut deep = config(&dir2);
        deep.recursive = true;
        let report = run(&MockTool::new(), &deep, &Answer::new(false)).unwrap();
        assert_eq!(report.total(), 2);
        assert!(dir2.path().join("nested/deep.jpg").exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_symlinked_directory_listed_once() {
        let dir = TempDir::new().unwrap();
        write(&dir, "real/a.webp", "frames=1");
        std::os::unix::fs::symlink(dir.path().join("real"), dir.path().join("alias")).unwrap();

        let found = discover(dir.path(), true);
        assert_eq!(found.len(), 1);

        let mut config = config(&dir);
        config.recursive = true;
        let report = run(&MockTool::new(), &config, &Answer::new(false)).unwrap();
        assert_eq!(report.total(), 1);
        assert_eq!(report.succeeded(), 1);
        assert_eq!(report.skipped(), 0);
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_non_utf8_name_is_skipped() {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;

        let dir = TempDir::new().unwrap();
        write(&dir, "ok.webp", "frames=1");
        let bad = dir.path().join(OsStr::from_bytes(b"bad\xff.webp"));
        fs::write(&bad, "frames=1").unwrap();

        let found = discover(dir.path(), false);
        assert_eq!(found.len(), 1);
        assert!(found[0].path.ends_with("ok.webp"));
    }

    #[test]
    fn test_declined_deletion_aborts_before_work() {
        let dir = TempDir::new().unwrap();
        write(&dir, "a.webp", "frames=1");
        let mut config = config(&dir);
        config.delete_original = true;

        let tool = MockTool::new();
        let answer = Answer::new(false);
        let err = run(&tool, &config, &answer).unwrap_err();
        assert!(matches!(err, RunError::Aborted));
        assert!(answer.asked.get());
        assert!(tool.encodes().is_empty());
        assert!(dir.path().join("a.webp").exists());
    }

    #[test]
    fn test_confirmed_deletion_removes_originals() {
        let dir = TempDir::new().unwrap();
        write(&dir, "a.webp", "frames=1");
        let mut config = config(&dir);
        config.delete_original = true;

        let report = run(&MockTool::new(), &config, &Answer::new(true)).unwrap();
        assert_eq!(report.succeeded(), 1);
        assert!(!dir.path().join("a.webp").exists());
        assert!(dir.path().join("a.jpg").exists());
    }

    #[test]
    fn test_assume_yes_skips_prompt() {
        let dir = TempDir::new().unwrap();
        write(&dir, "a.webp", "frames=1");
        let mut config = config(&dir);
        config.delete_original = true;
        config.assume_yes = true;

        let answer = Answer::new(false);
        let report = run(&MockTool::new(), &config, &answer).unwrap();
        assert!(!answer.asked.get());
        assert_eq!(report.succeeded(), 1);
    }

    #[test]
    fn test_cancelled_run_reports_interrupted() {
        let dir = TempDir::new().unwrap();
        write(&dir, "a.webp", "frames=1");
        write(&dir, "b.webp", "frames=1");
        let config = config(&dir);

        let cancel = CancelToken::new();
        cancel.cancel();
        let run_log = RunLog::disabled();
        let tool = MockTool::new();
        let report = Scheduler::new(&tool, &config, &run_log, cancel, &Answer::new(false))
            .run()
            .unwrap();

        assert_eq!(report.total(), 2);
        assert_eq!(report.failed(), 2);
        assert!(report
            .failures
            .iter()
            .all(|o| o.failure_reason() == Some(FailureReason::Interrupted)));
        assert!(!dir.path().join("a.jpg").exists());
    }

    #[test]
    fn test_one_outcome_per_candidate() {
        let dir = TempDir::new().unwrap();
        for i in 0..20 {
            let content = if i % 5 == 0 { "corrupt" } else { "frames=1" };
            write(&dir, &format!("f{:02}.webp", i), content);
        }
        let report = run(&MockTool::new(), &config(&dir), &Answer::new(false)).unwrap();
        assert_eq!(report.total(), 20);
        assert_eq!(
            report.total(),
            report.succeeded() + report.skipped() + report.failed()
        );
        assert_eq!(report.failed(), 4);
        assert!(report
            .failures
            .iter()
            .all(|o| matches!(o, ConversionOutcome::Failed { .. })));
    }

    #[test]
    fn test_run_log_written() {
        let dir = TempDir::new().unwrap();
        write(&dir, "a.webp", "frames=1");
        let config = config(&dir);
        let log_dir = TempDir::new().unwrap();
        let run_log = RunLog::create(log_dir.path(), "webp_revert").unwrap();

        Scheduler::new(&MockTool::new(), &config, &run_log, CancelToken::new(), &Answer::new(false))
            .run()
            .unwrap();

        let content = fs::read_to_string(run_log.path().unwrap()).unwrap();
        assert!(content.contains("START"));
        assert!(content.contains("SUCCESS"));
        assert!(content.contains("SUMMARY"));
    }
}
