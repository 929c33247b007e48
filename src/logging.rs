//! Diagnostics for the `memeclip` binary.
//!
//! Stdout carries command results and stderr carries progress, so tracing
//! events go elsewhere: the systemd journal when one is reachable, otherwise
//! a daily `memeclip.log` file.

use anyhow::{Context, Result};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_subscriber::{fmt as fmt_layer, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// `EnvFilter` directive, e.g. `MEMECLIP_LOG=memeclip=debug`
pub const LOG_ENV: &str = "MEMECLIP_LOG";

const LOG_FILE: &str = "memeclip.log";

/// Where events ended up
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogTarget {
    Journald,
    File(PathBuf),
}

impl fmt::Display for LogTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogTarget::Journald => write!(f, "journald"),
            LogTarget::File(dir) => write!(f, "{}", dir.join(LOG_FILE).display()),
        }
    }
}

/// Install the global subscriber. Fails if one is already installed.
///
/// `log_dir` only matters for the file target and defaults to
/// [`default_log_dir`].
pub fn init(log_dir: Option<PathBuf>) -> Result<LogTarget> {
    let registry = tracing_subscriber::registry().with(level_filter());

    #[cfg(target_os = "linux")]
    {
        if let Ok(journald) = tracing_journald::layer() {
            registry
                .with(journald.with_syslog_identifier("memeclip".to_string()))
                .try_init()?;
            tracing::debug!(backend = %LogTarget::Journald, "Logging ready");
            return Ok(LogTarget::Journald);
        }
    }

    let dir = log_dir.unwrap_or_else(default_log_dir);
    registry
        .with(
            fmt_layer::layer()
                .with_writer(file_writer(&dir)?)
                .with_ansi(false),
        )
        .try_init()?;

    let backend = LogTarget::File(dir);
    tracing::debug!(%backend, "Logging ready");
    Ok(backend)
}

fn level_filter() -> EnvFilter {
    EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Non-blocking daily file writer under `dir`.
fn file_writer(dir: &Path) -> Result<NonBlocking> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create log directory {}", dir.display()))?;

    // Buffered lines are lost once the guard drops
    static FLUSH_GUARD: OnceLock<WorkerGuard> = OnceLock::new();

    let (writer, guard) = tracing_appender::non_blocking(tracing_appender::rolling::daily(dir, LOG_FILE));
    let _ = FLUSH_GUARD.set(guard);
    Ok(writer)
}

pub fn default_log_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("memeclip")
        .join("logs")
}
