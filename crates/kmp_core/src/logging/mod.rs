//! Logging infrastructure.
//!
//! This module provides:
//! - Per-job loggers with file + callback dual output
//! - Compact mode with progress filtering
//! - Tail buffer for error diagnosis
//! - Global `tracing` subscriber setup (stderr, optional log file)
//!
//! # Example
//!
//! ```no_run
//! use kmp_core::logging::{JobLogger, LogConfig};
//!
//! let logger = JobLogger::new("job-0001", "/tmp/kmp-logs", LogConfig::default(), None).unwrap();
//! logger.phase("Separate");
//! logger.command("python -m demucs --out /tmp/sep chunk_000.wav");
//! logger.progress(50);
//! logger.success("Separation complete");
//! ```

mod job_logger;
mod types;

use std::path::Path;

pub use job_logger::JobLogger;
pub use types::{LogCallback, LogConfig, LogLevel, MessagePrefix};

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Initialize the global tracing subscriber.
///
/// Respects `RUST_LOG`, falling back to `default_level`. Output goes to stderr.
/// Should be called once at application startup.
pub fn init_tracing(default_level: LogLevel) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_level.as_filter_str()));

    let _ = tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).with_thread_ids(false))
        .with(filter)
        .try_init();
}

/// Initialize tracing with an additional application log file in `log_dir`.
///
/// The returned guard must be kept alive for the file writer to flush.
pub fn init_tracing_with_file(
    default_level: LogLevel,
    log_dir: &Path,
) -> std::io::Result<WorkerGuard> {
    std::fs::create_dir_all(log_dir)?;
    let appender = tracing_appender::rolling::never(log_dir, "kmp.log");
    let (writer, guard) = tracing_appender::non_blocking(appender);

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_level.as_filter_str()));

    let _ = tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
        .with(fmt::layer().with_ansi(false).with_writer(writer))
        .with(filter)
        .try_init();

    Ok(guard)
}

/// Initialize tracing for tests (only logs warnings and above).
#[cfg(test)]
pub fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("warn")
        .with_test_writer()
        .try_init();
}
