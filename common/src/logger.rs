use std::fs;
use std::path::Path;

use tracing_appender::{non_blocking::WorkerGuard, rolling};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Installs the global tracing subscriber: a daily rolling file under `log_dir`
/// plus an optional ANSI stdout layer.
///
/// The returned guard must be held for the lifetime of the process, otherwise
/// buffered lines are dropped.
pub fn init_logging(log_dir: &str, log_file: &str, log_level: &str, to_stdout: bool) -> WorkerGuard {
    if !Path::new(log_dir).exists() {
        fs::create_dir_all(log_dir).ok();
    }

    let file_appender = rolling::daily(log_dir, log_file);
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);

    let file_layer = fmt::layer()
        .with_writer(file_writer)
        .with_ansi(false)
        .with_target(true)
        .with_thread_ids(true);

    let stdout_layer = to_stdout.then(|| {
        fmt::layer()
            .with_writer(std::io::stdout)
            .with_ansi(true)
            .with_target(true)
    });

    let env_filter = EnvFilter::try_new(log_level).unwrap_or_else(|_| EnvFilter::new("info"));

    // try_init: tests may install a subscriber more than once
    let _ = tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .with(stdout_layer)
        .try_init();

    guard
}
