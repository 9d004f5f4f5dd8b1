//! Logging setup.
//!
//! Console output always; a daily-rolling file when a directory is
//! configured. `RUST_LOG` overrides the configured filter.

use crate::config::LoggingSettings;
use crate::error::{CamflowError, Result};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Log file prefix inside the configured directory.
pub const LOG_FILE_PREFIX: &str = "camflow.log";

/// Resolve the filter: `RUST_LOG` if set and valid, else `directive`.
pub fn build_filter(directive: &str) -> Result<EnvFilter> {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }
    EnvFilter::try_new(directive)
        .map_err(|e| CamflowError::Config(format!("Invalid log filter '{}': {}", directive, e)))
}

/// Install the global subscriber.
///
/// Keep the returned guard alive for as long as file logging should run;
/// dropping it flushes and stops the background writer.
pub fn init(settings: &LoggingSettings) -> Result<Option<WorkerGuard>> {
    let filter = build_filter(&settings.filter)?;

    let (file_layer, guard) = match &settings.directory {
        Some(dir) => {
            std::fs::create_dir_all(dir)?;
            let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (
                Some(fmt::layer().with_writer(writer).with_ansi(false)),
                Some(guard),
            )
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer())
        .with(file_layer)
        .try_init()
        .map_err(|e| CamflowError::Config(format!("Failed to install logger: {}", e)))?;

    Ok(guard)
}
