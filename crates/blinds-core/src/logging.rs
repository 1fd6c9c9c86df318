//! Logging configuration using tracing

use std::path::PathBuf;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::error::{Result, ResultExt};

/// Environment variable holding the tracing filter directive
pub const LOG_ENV_VAR: &str = "BLINDS_LOG";

const LOG_FILE_PREFIX: &str = "blinds.log";

/// Initialize the logging subsystem
///
/// Logs are written to `~/.local/share/blinds-control/logs/`
/// Log level is controlled by the `BLINDS_LOG` environment variable.
///
/// # Examples
/// ```bash
/// BLINDS_LOG=debug my-host-app
/// BLINDS_LOG=blinds_hub=trace my-host-app
/// ```
pub fn init() -> Result<()> {
    let log_dir = get_log_directory()?;
    std::fs::create_dir_all(&log_dir).context("Failed to create log directory")?;

    let file_appender = RollingFileAppender::new(Rotation::DAILY, &log_dir, LOG_FILE_PREFIX);

    let env_filter = EnvFilter::try_from_env(LOG_ENV_VAR)
        .unwrap_or_else(|_| EnvFilter::new("blinds=info,warn"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            fmt::layer()
                .with_writer(file_appender)
                .with_ansi(false)
                .with_target(true)
                .with_thread_ids(false)
                .with_file(true)
                .with_line_number(true)
                .with_timer(fmt::time::ChronoLocal::new(
                    "%Y-%m-%d %H:%M:%S%.3f".to_string(),
                )),
        )
        .try_init()
        .map_err(|e| crate::error::Error::config(format!("Failed to install logger: {}", e)))?;

    tracing::info!("═══════════════════════════════════════════════════════");
    tracing::info!("Blinds Control starting");
    tracing::info!("Log directory: {}", log_dir.display());
    tracing::info!("═══════════════════════════════════════════════════════");

    Ok(())
}

/// Get the log directory path
fn get_log_directory() -> Result<PathBuf> {
    let base = dirs::data_local_dir().unwrap_or_else(|| PathBuf::from("."));
    Ok(base.join("blinds-control").join("logs"))
}

/// Get the log file path for the current day
pub fn get_current_log_file() -> Result<PathBuf> {
    let dir = get_log_directory()?;
    Ok(dir.join(LOG_FILE_PREFIX))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_file_lives_in_log_directory() {
        let dir = get_log_directory().unwrap();
        let file = get_current_log_file().unwrap();
        assert!(dir.ends_with("blinds-control/logs"));
        assert_eq!(file.parent(), Some(dir.as_path()));
    }
}
