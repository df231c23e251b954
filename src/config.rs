//! Configuration management for sync.
//!
//! This module handles loading and saving the sync configuration to/from a
//! JSON file (`config.json`) in the configuration directory:
//! - data_dir: where the local collections and the device identity live
//! - sync: backend endpoint, credentials, schedule and merge strategy

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{SyncError, SyncResult};
use crate::merge::MergeStrategy;

/// Sync configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    #[serde(default)]
    pub enabled: bool,
    /// Base URL of the sync backend
    #[serde(default)]
    pub endpoint: String,
    /// Bearer token sent with every request
    #[serde(default)]
    pub token: String,
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub merge_strategy: MergeStrategy,
}

fn default_interval_secs() -> u64 {
    15 * 60
}

fn default_timeout_secs() -> u64 {
    30
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            endpoint: String::new(),
            token: String::new(),
            interval_secs: default_interval_secs(),
            timeout_secs: default_timeout_secs(),
            merge_strategy: MergeStrategy::default(),
        }
    }
}

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConfigData {
    /// Directory holding the synced collections (empty = `<config_dir>/data`)
    #[serde(default)]
    pub data_dir: String,
    #[serde(default)]
    pub sync: SyncConfig,
}

/// Configuration manager
pub struct Config {
    config_dir: PathBuf,
    config_file: PathBuf,
    data: ConfigData,
}

impl Config {
    /// Create a new configuration manager
    ///
    /// Without the `desktop` feature, `config_dir` is required.
    pub fn new(config_dir: Option<PathBuf>) -> SyncResult<Self> {
        let config_dir = match config_dir {
            Some(dir) => dir,
            None => {
                #[cfg(feature = "desktop")]
                {
                    dirs::config_dir()
                        .unwrap_or_else(|| PathBuf::from("."))
                        .join("synccore")
                }
                #[cfg(not(feature = "desktop"))]
                {
                    return Err(SyncError::config("config_dir is required"));
                }
            }
        };

        fs::create_dir_all(&config_dir)?;
        let config_file = config_dir.join("config.json");

        let data = if config_file.exists() {
            let content = fs::read_to_string(&config_file)?;
            match serde_json::from_str(&content) {
                Ok(data) => data,
                Err(e) => {
                    tracing::warn!(
                        path = %config_file.display(),
                        "Invalid config file, using defaults: {}",
                        e
                    );
                    ConfigData::default()
                }
            }
        } else {
            ConfigData::default()
        };

        let config = Self {
            config_dir,
            config_file,
            data,
        };

        // Save default config if it doesn't exist
        if !config.config_file.exists() {
            config.save()?;
        }

        Ok(config)
    }

    /// Save configuration to file
    pub fn save(&self) -> SyncResult<()> {
        let content = serde_json::to_string_pretty(&self.data)?;
        fs::write(&self.config_file, content)?;
        Ok(())
    }

    /// Get the configuration directory path
    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }

    /// Directory holding the local collections and the device identity
    pub fn data_dir(&self) -> PathBuf {
        if self.data.data_dir.is_empty() {
            self.config_dir.join("data")
        } else {
            PathBuf::from(&self.data.data_dir)
        }
    }

    pub fn set_data_dir(&mut self, path: &str) -> SyncResult<()> {
        self.data.data_dir = path.to_string();
        self.save()
    }

    /// Get sync configuration
    pub fn sync_config(&self) -> &SyncConfig {
        &self.data.sync
    }

    /// Check if sync is enabled
    pub fn is_sync_enabled(&self) -> bool {
        self.data.sync.enabled
    }

    /// Enable or disable sync
    pub fn set_sync_enabled(&mut self, enabled: bool) -> SyncResult<()> {
        self.data.sync.enabled = enabled;
        self.save()
    }

    pub fn endpoint(&self) -> &str {
        &self.data.sync.endpoint
    }

    pub fn set_endpoint(&mut self, endpoint: &str) -> SyncResult<()> {
        self.data.sync.endpoint = endpoint.to_string();
        self.save()
    }

    pub fn token(&self) -> &str {
        &self.data.sync.token
    }

    pub fn set_token(&mut self, token: &str) -> SyncResult<()> {
        self.data.sync.token = token.to_string();
        self.save()
    }

    /// Interval between background sync cycles
    pub fn sync_interval(&self) -> Duration {
        Duration::from_secs(self.data.sync.interval_secs)
    }

    pub fn set_sync_interval_secs(&mut self, secs: u64) -> SyncResult<()> {
        if secs == 0 {
            return Err(SyncError::config("sync interval must be at least one second"));
        }
        self.data.sync.interval_secs = secs;
        self.save()
    }

    /// Timeout applied to each backend request
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.data.sync.timeout_secs)
    }

    pub fn set_request_timeout_secs(&mut self, secs: u64) -> SyncResult<()> {
        if secs == 0 {
            return Err(SyncError::config("request timeout must be at least one second"));
        }
        self.data.sync.timeout_secs = secs;
        self.save()
    }

    pub fn merge_strategy(&self) -> MergeStrategy {
        self.data.sync.merge_strategy
    }

    pub fn set_merge_strategy(&mut self, strategy: MergeStrategy) -> SyncResult<()> {
        self.data.sync.merge_strategy = strategy;
        self.save()
    }

    /// Get a configuration value
    pub fn get(&self, key: &str) -> Option<String> {
        match key {
            "data_dir" => Some(self.data_dir().to_string_lossy().into_owned()),
            "sync.enabled" => Some(self.data.sync.enabled.to_string()),
            "sync.endpoint" => Some(self.data.sync.endpoint.clone()),
            "sync.interval_secs" => Some(self.data.sync.interval_secs.to_string()),
            "sync.timeout_secs" => Some(self.data.sync.timeout_secs.to_string()),
            "sync.merge_strategy" => serde_json::to_value(self.data.sync.merge_strategy)
                .ok()
                .and_then(|v| v.as_str().map(String::from)),
            _ => None,
        }
    }

    /// Set a configuration value
    pub fn set(&mut self, key: &str, value: &str) -> SyncResult<()> {
        match key {
            "data_dir" => self.data.data_dir = value.to_string(),
            "sync.enabled" => {
                self.data.sync.enabled = value
                    .parse()
                    .map_err(|_| SyncError::config(format!("Invalid boolean: {}", value)))?
            }
            "sync.endpoint" => self.data.sync.endpoint = value.to_string(),
            "sync.token" => self.data.sync.token = value.to_string(),
            "sync.interval_secs" => {
                let secs: u64 = value
                    .parse()
                    .map_err(|_| SyncError::config(format!("Invalid interval: {}", value)))?;
                return self.set_sync_interval_secs(secs);
            }
            "sync.timeout_secs" => {
                let secs: u64 = value
                    .parse()
                    .map_err(|_| SyncError::config(format!("Invalid timeout: {}", value)))?;
                return self.set_request_timeout_secs(secs);
            }
            "sync.merge_strategy" => {
                self.data.sync.merge_strategy =
                    serde_json::from_value(serde_json::Value::String(value.to_string()))
                        .map_err(|_| SyncError::config(format!("Invalid merge strategy: {}", value)))?
            }
            _ => return Err(SyncError::config(format!("Unknown config key: {}", key))),
        }
        self.save()
    }
}
