use color_eyre::{eyre::eyre, Result};
use std::path::PathBuf;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

use crate::config::LogConfig;

/// Environment variable that overrides the configured log filter
pub const LOG_ENV: &str = "COLCACHE_LOG";

/// Set up file logging.
///
/// Logs go to a daily-rolling file so that stdout stays reserved for command
/// output. The returned guard flushes the writer on drop and must be kept
/// alive for the lifetime of the program.
pub fn init(config: &LogConfig) -> Result<WorkerGuard> {
  let filter = EnvFilter::try_from_env(LOG_ENV)
    .or_else(|_| EnvFilter::try_new(&config.level))
    .map_err(|e| eyre!("Invalid log filter {}: {}", config.level, e))?;

  let dir = match &config.dir {
    Some(dir) => dir.clone(),
    None => default_log_dir()?,
  };
  std::fs::create_dir_all(&dir)
    .map_err(|e| eyre!("Failed to create log directory {}: {}", dir.display(), e))?;

  let appender = tracing_appender::rolling::daily(&dir, "colcache.log");
  let (writer, guard) = tracing_appender::non_blocking(appender);

  let file_layer = tracing_subscriber::fmt::layer()
    .with_writer(writer)
    .with_ansi(false)
    .with_target(true)
    .with_filter(filter);

  tracing_subscriber::registry()
    .with(file_layer)
    .try_init()
    .map_err(|e| eyre!("Failed to install log subscriber: {}", e))?;

  Ok(guard)
}

/// Get the default log directory
fn default_log_dir() -> Result<PathBuf> {
  let data_dir = dirs::data_dir()
    .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
    .ok_or_else(|| eyre!("Could not determine data directory"))?;

  Ok(data_dir.join("colcache").join("logs"))
}
