//! Structured logging for tempo-agent using tracing.
//!
//! Logs to `~/.tempo/logs/tempo-agent.{date}.log` with automatic daily
//! rotation, keeping 7 days. Level is controlled via `RUST_LOG`, with
//! `TEMPO_DEBUG_LOG=1` as a convenience override.
//!
//! Falls back to stderr logging if the file appender cannot be created.

use fs_err as fs;
use std::path::Path;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

pub fn init(logs_dir: &Path) {
    let _ = fs::create_dir_all(logs_dir);

    let debug_enabled = std::env::var("TEMPO_DEBUG_LOG")
        .map(|value| matches!(value.as_str(), "1" | "true" | "TRUE" | "yes" | "YES"))
        .unwrap_or(false);
    let env_filter = if debug_enabled {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    match create_file_appender(logs_dir) {
        Ok(file_appender) => {
            let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

            // Keep the guard alive for the program's duration so buffered
            // lines flush on exit.
            std::mem::forget(guard);

            tracing_subscriber::registry()
                .with(env_filter)
                .with(
                    fmt::layer()
                        .with_writer(non_blocking)
                        .with_timer(fmt::time::UtcTime::rfc_3339())
                        .with_ansi(false),
                )
                .init();
        }
        Err(_) => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(
                    fmt::layer()
                        .with_writer(std::io::stderr)
                        .with_timer(fmt::time::UtcTime::rfc_3339())
                        .with_ansi(true),
                )
                .init();
        }
    }
}

fn create_file_appender(
    logs_dir: &Path,
) -> Result<RollingFileAppender, tracing_appender::rolling::InitError> {
    RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix("tempo-agent")
        .filename_suffix("log")
        .max_log_files(7)
        .build(logs_dir)
}
