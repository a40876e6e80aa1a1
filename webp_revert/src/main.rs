use anyhow::Context;
use clap::error::ErrorKind;
use clap::Parser;
use shared_utils::{
    global_token, init_logging, install_ctrlc_handler, install_panic_handler, report_anyhow,
    report_error, LogConfig, ProgressMode, RunLog, INTERRUPTED_EXIT_CODE,
};
use std::path::PathBuf;
use std::time::Duration;
use webp_revert::config::{
    DEFAULT_LIST_LIMIT, DEFAULT_LOG_DIR, DEFAULT_QUALITY, DEFAULT_TIMEOUT_SECS,
};
use webp_revert::{ConfigError, MagickTool, RunConfig, RunError, Scheduler, TerminalConfirm};

const PROGRAM_NAME: &str = "webp_revert";

#[derive(Parser)]
#[command(name = "webp-revert")]
#[command(version, about = "Convert WebP files back to GIF, PNG or JPEG", long_about = None)]
struct Cli {
    /// Directory to scan for .webp files
    #[arg(value_name = "DIR")]
    dir: PathBuf,

    /// JPEG quality (1-100)
    #[arg(short, long, default_value_t = DEFAULT_QUALITY)]
    quality: u32,

    /// Parallel workers (default: one per CPU)
    #[arg(short, long)]
    jobs: Option<usize>,

    /// Delete each .webp after its output was written successfully
    #[arg(long)]
    delete_original: bool,

    /// Do not ask before deleting originals
    #[arg(short = 'y', long)]
    yes: bool,

    /// List what would be converted without touching anything
    #[arg(long)]
    dry_run: bool,

    /// Files shown in a dry-run preview
    #[arg(long, default_value_t = DEFAULT_LIST_LIMIT)]
    list_limit: usize,

    #[arg(short, long)]
    recursive: bool,

    /// Progress display: bar, simple or none
    #[arg(long, default_value = "bar")]
    progress: String,

    /// ImageMagick binary to use instead of a PATH lookup
    #[arg(long, value_name = "PATH")]
    tool: Option<PathBuf>,

    /// Per-invocation time limit in seconds
    #[arg(long, value_name = "SECS", default_value_t = DEFAULT_TIMEOUT_SECS)]
    timeout: u64,

    /// Leave output modification times at conversion time
    #[arg(long)]
    no_preserve_mtime: bool,

    /// Directory for the per-run log file
    #[arg(long, value_name = "DIR", default_value = DEFAULT_LOG_DIR)]
    log_dir: PathBuf,

    /// Print the final report as JSON
    #[arg(long)]
    json: bool,

    #[arg(short, long)]
    verbose: bool,
}

fn main() {
    let code = match Cli::try_parse() {
        Ok(cli) => run(cli),
        Err(e) => {
            let _ = e.print();
            parse_error_exit_code(e.kind())
        }
    };
    std::process::exit(code);
}

/// Help and version requests succeed; any other parse failure is an invalid
/// configuration.
fn parse_error_exit_code(kind: ErrorKind) -> i32 {
    match kind {
        ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => 0,
        _ => 1,
    }
}

fn run(cli: Cli) -> i32 {
    install_panic_handler();

    if let Err(e) = init_logging(PROGRAM_NAME, LogConfig::default().verbose(cli.verbose)) {
        eprintln!("⚠️  Logging disabled: {:#}", e);
    }

    let config = match build_config(&cli) {
        Ok(config) => config,
        Err(e) => {
            report_error(&RunError::from(e));
            return 1;
        }
    };

    let cancel = match install_ctrlc_handler() {
        Ok(token) => token,
        Err(e) => {
            tracing::warn!(error = %e, "Could not install Ctrl+C handler");
            global_token()
        }
    };

    let located = MagickTool::locate(
        config.tool_override.as_deref(),
        config.timeout,
        cancel.clone(),
    );
    let tool = match located {
        Ok(tool) => tool,
        Err(e) => {
            report_error(&RunError::MissingDependency(e));
            return 1;
        }
    };

    let run_log = if config.dry_run {
        RunLog::disabled()
    } else {
        match RunLog::create(&config.log_dir, PROGRAM_NAME)
            .with_context(|| format!("Failed to create run log in {}", config.log_dir.display()))
        {
            Ok(log) => log,
            Err(e) => {
                report_anyhow(&e);
                return 1;
            }
        }
    };

    let scheduler = Scheduler::new(&tool, &config, &run_log, cancel.clone(), &TerminalConfirm);
    let report = match scheduler.run() {
        Ok(report) => report,
        Err(e) => {
            report_error(&e);
            return 1;
        }
    };

    if config.json {
        match report.to_json() {
            Ok(json) => println!("{}", json),
            Err(e) => {
                report_error(&e);
                return 1;
            }
        }
    } else {
        print!("{}", report.render());
        if let Some(path) = run_log.path() {
            println!("📝 Run log: {}", path.display());
        }
    }

    if cancel.is_cancelled() {
        INTERRUPTED_EXIT_CODE
    } else {
        report.exit_code()
    }
}

fn build_config(cli: &Cli) -> Result<RunConfig, ConfigError> {
    let progress: ProgressMode = cli.progress.parse()?;
    let mut config = RunConfig::new(&cli.dir);
    config.quality = cli.quality;
    config.parallelism = cli.jobs;
    config.delete_original = cli.delete_original;
    config.assume_yes = cli.yes;
    config.dry_run = cli.dry_run;
    config.list_limit = cli.list_limit;
    config.recursive = cli.recursive;
    config.progress = if cli.json { ProgressMode::None } else { progress };
    config.tool_override = cli.tool.clone();
    config.timeout = Duration::from_secs(cli.timeout);
    config.preserve_mtime = !cli.no_preserve_mtime;
    config.log_dir = cli.log_dir.clone();
    config.json = cli.json;
    config.verbose = cli.verbose;
    config.validate()
}
