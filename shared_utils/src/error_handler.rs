//! Error Reporting Helpers
//!
//! Loud, chained error output for the binary boundary:
//! - `report_error()`: prints the full cause chain to stderr and to tracing
//! - `install_panic_handler()`: records panics before the default hook runs

use std::panic;

/// Prints `error` and every `source()` below it, both to stderr and to the log.
pub fn report_error<E: std::error::Error + ?Sized>(error: &E) {
    eprintln!("❌ ERROR: {}", error);
    tracing::error!("Error occurred: {}", error);

    for (level, cause) in error_chain(error).iter().enumerate() {
        eprintln!("   {}. Caused by: {}", level + 1, cause);
        tracing::error!("  Caused by (level {}): {}", level + 1, cause);
    }
}

/// Same as [`report_error`] for `anyhow::Error`, which carries its own chain.
pub fn report_anyhow(error: &anyhow::Error) {
    eprintln!("❌ ERROR: {}", error);
    tracing::error!("Error occurred: {}", error);

    for (level, cause) in error.chain().skip(1).enumerate() {
        eprintln!("   {}. Caused by: {}", level + 1, cause);
        tracing::error!("  Caused by (level {}): {}", level + 1, cause);
    }
}

fn error_chain<E: std::error::Error + ?Sized>(error: &E) -> Vec<String> {
    let mut causes = Vec::new();
    let mut source = error.source();
    while let Some(err) = source {
        causes.push(err.to_string());
        source = err.source();
    }
    causes
}

pub fn install_panic_handler() {
    let default_hook = panic::take_hook();

    panic::set_hook(Box::new(move |panic_info| {
        let payload = panic_info.payload();
        let message = if let Some(s) = payload.downcast_ref::<&str>() {
            s.to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "Unknown panic payload".to_string()
        };

        let location = panic_info
            .location()
            .map(|loc| format!("{}:{}:{}", loc.file(), loc.line(), loc.column()))
            .unwrap_or_else(|| "Unknown location".to_string());

        eprintln!("💥 PANIC occurred!");
        eprintln!("   Message: {}", message);
        eprintln!("   Location: {}", location);

        tracing::error!("PANIC: {} at {}", message, location);

        default_hook(panic_info);
    }));
}
