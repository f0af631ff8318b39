//! Logging setup
//!
//! Human-readable output on stderr filtered by `--debug`/`--verbose` (or
//! `RUST_LOG`), plus a JSON log of every event at debug level in
//! `<log_dir>/ipu-<kind>.log`, written by a background worker.

use ipu_engine::ExecutionKind;
use std::path::{Path, PathBuf};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

/// Console level implied by the flags
#[must_use]
pub fn console_level(debug: bool, verbose: bool) -> &'static str {
    if debug {
        "debug"
    } else if verbose {
        "info"
    } else {
        "warn"
    }
}

fn file_prefix(kind: ExecutionKind) -> String {
    format!("ipu-{kind}")
}

/// Log file of a run kind
#[must_use]
pub fn log_file(log_dir: &Path, kind: ExecutionKind) -> PathBuf {
    log_dir.join(format!("{}.log", file_prefix(kind)))
}

/// Install the global subscriber
///
/// Keep the returned guard alive until the run ends; dropping it flushes the
/// JSON log. An unwritable log directory leaves console logging only. A
/// subscriber installed earlier is kept.
#[must_use]
pub fn init(level: &str, log_dir: Option<&Path>, kind: ExecutionKind) -> Option<WorkerGuard> {
    let console = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)));

    let mut open_error = None;
    let appender = log_dir.and_then(|dir| {
        RollingFileAppender::builder()
            .rotation(Rotation::NEVER)
            .filename_prefix(file_prefix(kind))
            .filename_suffix("log")
            .build(dir)
            .map_err(|e| open_error = Some((log_file(dir, kind), e)))
            .ok()
    });
    let (json, guard) = match appender {
        Some(appender) => {
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer()
                .json()
                .with_ansi(false)
                .with_writer(writer)
                .with_filter(EnvFilter::new("debug"));
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    if tracing_subscriber::registry()
        .with(console)
        .with(json)
        .try_init()
        .is_err()
    {
        tracing::debug!("tracing subscriber already installed");
    }
    if let Some((path, e)) = open_error {
        tracing::warn!(path = %path.display(), error = %e, "cannot open log file");
    }
    guard
}
