//! Cooperative cancellation.
//!
//! Ctrl+C flips a shared flag. Workers check it before starting a file, and
//! the process runner kills the child it is waiting on. Files already written
//! stay written; files not yet started are reported as interrupted.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

/// Exit status for a run stopped by SIGINT (128 + 2).
pub const INTERRUPTED_EXIT_CODE: i32 = 130;

#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

static GLOBAL_TOKEN: OnceLock<CancelToken> = OnceLock::new();

/// Process-wide token that the Ctrl+C handler cancels.
pub fn global_token() -> CancelToken {
    GLOBAL_TOKEN.get_or_init(CancelToken::new).clone()
}

/// Routes Ctrl+C into [`global_token`]. A second Ctrl+C exits immediately.
pub fn install_ctrlc_handler() -> Result<CancelToken, ctrlc::Error> {
    let token = global_token();
    let handler_token = token.clone();
    ctrlc::set_handler(move || {
        if handler_token.is_cancelled() {
            eprintln!("\n⚠️  Interrupted again, exiting now");
            std::process::exit(INTERRUPTED_EXIT_CODE);
        }
        eprintln!(
            "\n⚠️  Interrupt received, stopping tool calls and skipping remaining files \
             (Ctrl+C again to force)"
        );
        handler_token.cancel();
    })?;
    Ok(token)
}
