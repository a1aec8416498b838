//! File logging. The terminal UI owns stdout, so all `tracing` output goes to
//! a daily-rolling file in the platform data directory.

use anyhow::{Context, Result};
use directories::ProjectDirs;
use std::path::PathBuf;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::constants::constants;

/// Where log files are written: `<data dir>/logs`, or `./logs` when the
/// platform has no home directory.
pub fn log_dir() -> PathBuf {
  ProjectDirs::from("", "", "marquee")
    .map(|dirs| dirs.data_local_dir().join("logs"))
    .unwrap_or_else(|| PathBuf::from("logs"))
}

/// Install the global subscriber. `RUST_LOG` wins over `level`.
/// Keep the returned guard alive until exit so buffered lines are flushed.
pub fn init_logging(level: &str) -> Result<WorkerGuard> {
  let dir = log_dir();
  std::fs::create_dir_all(&dir).with_context(|| format!("Failed to create log directory {}", dir.display()))?;

  let appender = RollingFileAppender::new(Rotation::DAILY, &dir, &constants().log_file_prefix);
  let (writer, guard) = tracing_appender::non_blocking(appender);

  let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
  let file_layer = fmt::layer().with_writer(writer).with_ansi(false).with_target(false);

  tracing_subscriber::registry()
    .with(env_filter)
    .with(file_layer)
    .try_init()
    .context("Failed to install tracing subscriber")?;

  Ok(guard)
}
