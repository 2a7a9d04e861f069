//! Tracing setup: env-filtered output to a daily rolling log file.
//!
//! Stdout is reserved for command output, so logs only go to disk.

use color_eyre::{eyre::eyre, Result};
use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Default log filter directive.
pub const DEFAULT_LOG_FILTER: &str = "anitrack=info";

/// Install the global subscriber.
///
/// `RUST_LOG` wins over `level`. The returned guard must be held for the
/// lifetime of the process or buffered lines are lost.
pub fn init(log_dir: &Path, level: Option<&str>) -> Result<WorkerGuard> {
  std::fs::create_dir_all(log_dir)
    .map_err(|e| eyre!("Failed to create log directory {}: {}", log_dir.display(), e))?;

  let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
    let directive = level
      .map(|l| format!("anitrack={}", l))
      .unwrap_or_else(|| DEFAULT_LOG_FILTER.to_string());
    EnvFilter::new(directive)
  });

  let appender = tracing_appender::rolling::daily(log_dir, "anitrack.log");
  let (writer, guard) = tracing_appender::non_blocking(appender);

  tracing_subscriber::registry()
    .with(filter)
    .with(fmt::layer().with_writer(writer).with_ansi(false))
    .try_init()
    .map_err(|e| eyre!("Failed to install tracing subscriber: {}", e))?;

  Ok(guard)
}
