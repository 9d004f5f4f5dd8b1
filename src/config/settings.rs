//! Settings sections of [`AppConfig`](super::AppConfig).

use crate::pipeline::port::DEFAULT_QUEUE_SIZE;
use crate::pipeline::synchronizer::{SyncConfig, DEFAULT_MAX_BACKLOG};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Host queue defaults, applied until the host asks for a queue with
/// explicit parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueSettings {
    pub host_queue_size: usize,
    pub host_queue_blocking: bool,
}

impl Default for QueueSettings {
    fn default() -> Self {
        Self {
            host_queue_size: DEFAULT_QUEUE_SIZE,
            host_queue_blocking: false,
        }
    }
}

/// Stream synchronizer parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncSettings {
    /// Rate of the slowest synchronized stream.
    pub fps: f32,
    /// Tolerance window; the tolerance is `ceil(window_ms / fps)` ms.
    pub window_ms: u64,
    /// Explicit tolerance, overriding the fps-derived one.
    pub tolerance_ms: Option<u64>,
    pub max_backlog: usize,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            fps: 30.0,
            window_ms: 500,
            tolerance_ms: None,
            max_backlog: DEFAULT_MAX_BACKLOG,
        }
    }
}

impl SyncSettings {
    pub fn to_sync_config(&self) -> SyncConfig {
        let config = match self.tolerance_ms {
            Some(ms) => SyncConfig::new(Duration::from_millis(ms)),
            None => SyncConfig::from_fps(self.window_ms, self.fps),
        };
        config.with_max_backlog(self.max_backlog)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceSettings {
    pub name: String,
    /// How long node loops wait on an empty queue before re-checking for
    /// shutdown.
    pub poll_interval_ms: u64,
    /// Capacity of the device event channel.
    pub event_capacity: usize,
}

impl Default for DeviceSettings {
    fn default() -> Self {
        Self {
            name: "host".to_string(),
            poll_interval_ms: 5,
            event_capacity: 256,
        }
    }
}

impl DeviceSettings {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// `EnvFilter` directive; `RUST_LOG` takes precedence.
    pub filter: String,
    /// Directory for daily-rolling log files. Console only when unset.
    pub directory: Option<PathBuf>,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            filter: "info,camflow=debug".to_string(),
            directory: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sync_settings_tolerance() {
        let settings = SyncSettings {
            fps: 15.0,
            ..SyncSettings::default()
        };
        assert_eq!(settings.to_sync_config().tolerance, Duration::from_millis(34));

        let explicit = SyncSettings {
            tolerance_ms: Some(8),
            max_backlog: 10,
            ..SyncSettings::default()
        };
        let config = explicit.to_sync_config();
        assert_eq!(config.tolerance, Duration::from_millis(8));
        assert_eq!(config.max_backlog, 10);
    }

    #[test]
    fn test_poll_interval_never_zero() {
        let settings = DeviceSettings {
            poll_interval_ms: 0,
            ..DeviceSettings::default()
        };
        assert_eq!(settings.poll_interval(), Duration::from_millis(1));
    }
}
