//! Configuration module for camflow
//!
//! `AppConfig` groups the runtime knobs: host queue defaults, synchronizer
//! tolerance, device polling and logging. It is read from TOML (or JSON, by
//! file extension) and every field has a default, so a partial file works.
//!
//! # Config Location
//!
//! The default file lives in the platform config directory:
//! - **Linux**: `~/.config/dev.camflow/camflow.toml`
//! - **macOS**: `~/Library/Application Support/dev.camflow/camflow.toml`
//! - **Windows**: `%APPDATA%\dev.camflow\camflow.toml`
//!
//! # Example
//!
//! ```ignore
//! use camflow::config::AppConfig;
//!
//! let config = AppConfig::load_or_default(AppConfig::default_path());
//! let sync = config.sync.to_sync_config();
//! ```

pub mod settings;

pub use settings::*;

use crate::error::{CamflowError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Application identifier for config directories
pub const APP_ID: &str = "dev.camflow";

/// Config filename
pub const CONFIG_FILE: &str = "camflow.toml";

/// Get the config directory path
pub fn config_dir() -> Option<PathBuf> {
    dirs_next::config_dir().map(|p| p.join(APP_ID))
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub queues: QueueSettings,
    pub sync: SyncSettings,
    pub device: DeviceSettings,
    pub logging: LoggingSettings,
}

fn is_json(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext == "json")
}

impl AppConfig {
    /// Path of the default config file, if the platform has a config dir.
    pub fn default_path() -> Option<PathBuf> {
        config_dir().map(|p| p.join(CONFIG_FILE))
    }

    /// Load a config file. A missing file yields the defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| {
            CamflowError::Config(format!("Failed to read config file {:?}: {}", path, e))
        })?;

        if is_json(path) {
            serde_json::from_str(&content).map_err(|e| {
                CamflowError::Serialization(format!("Failed to parse config {:?}: {}", path, e))
            })
        } else {
            toml::from_str(&content).map_err(|e| {
                CamflowError::Serialization(format!("Failed to parse config {:?}: {}", path, e))
            })
        }
    }

    /// Load a config file, returning defaults on any error
    pub fn load_or_default(path: Option<impl AsRef<Path>>) -> Self {
        let Some(path) = path else {
            return Self::default();
        };
        Self::load(path).unwrap_or_else(|e| {
            tracing::warn!("Failed to load config, using defaults: {}", e);
            Self::default()
        })
    }

    /// Save the config, creating parent directories as needed
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                CamflowError::Config(format!("Failed to create config directory: {}", e))
            })?;
        }

        let content = if is_json(path) {
            serde_json::to_string_pretty(self)
                .map_err(|e| CamflowError::Serialization(format!("Failed to serialize config: {}", e)))?
        } else {
            toml::to_string_pretty(self)
                .map_err(|e| CamflowError::Serialization(format!("Failed to serialize config: {}", e)))?
        };

        std::fs::write(path, content).map_err(|e| {
            CamflowError::Config(format!("Failed to write config file {:?}: {}", path, e))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.queues.host_queue_size, 8);
        assert_eq!(config.sync.max_backlog, 100);
        assert_eq!(config.logging.filter, "info,camflow=debug");
    }

    #[test]
    fn test_partial_toml() {
        let config: AppConfig = toml::from_str(
            r#"
            [sync]
            fps = 15.0
            tolerance_ms = 8
            "#,
        )
        .unwrap();
        assert_eq!(config.sync.fps, 15.0);
        assert_eq!(config.sync.tolerance_ms, Some(8));
        assert_eq!(config.sync.window_ms, 500);
        assert_eq!(config.device, DeviceSettings::default());
    }

    #[test]
    fn test_invalid_toml_is_serialization_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.toml");
        std::fs::write(&path, "[sync\nfps = ").unwrap();
        assert!(matches!(
            AppConfig::load(&path),
            Err(CamflowError::Serialization(_))
        ));
        assert_eq!(AppConfig::load_or_default(Some(&path)), AppConfig::default());
    }

    #[test]
    fn test_missing_file_is_default() {
        let dir = tempfile::tempdir().unwrap();
        let config = AppConfig::load(dir.path().join("absent.toml")).unwrap();
        assert_eq!(config, AppConfig::default());
    }
}
