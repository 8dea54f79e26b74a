//! Configuration parsing and management.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::history::DEFAULT_HISTORY_CAPACITY;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse YAML: {0}")]
    ParseError(#[from] serde_yaml::Error),
}

/// Main configuration struct matching the corkboard.yml schema
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorkboardConfig {
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,

    #[serde(default = "default_ws_url")]
    pub ws_url: String,

    #[serde(default = "default_true")]
    pub ws_enabled: bool,

    /// Opaque bearer token issued by the auth service.
    #[serde(default)]
    pub auth_token: Option<String>,

    #[serde(default = "default_storage_dir")]
    pub storage_dir: PathBuf,

    #[serde(default = "default_history_capacity")]
    pub history_capacity: usize,

    #[serde(default)]
    pub sync: SyncConfig,

    // Internal: path to config file (for relative path resolution)
    #[serde(skip)]
    config_path: Option<PathBuf>,
}

fn default_api_base_url() -> String {
    String::from("http://localhost:3001/api/v1")
}

fn default_ws_url() -> String {
    String::from("ws://localhost:3001/ws")
}

fn default_true() -> bool {
    true
}

fn default_storage_dir() -> PathBuf {
    PathBuf::from(".corkboard")
}

fn default_history_capacity() -> usize {
    DEFAULT_HISTORY_CAPACITY
}

/// Flush and reconnect timings, in milliseconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncConfig {
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,

    #[serde(default = "default_autosave_interval_ms")]
    pub autosave_interval_ms: u64,

    #[serde(default = "default_ack_fallback_ms")]
    pub ack_fallback_ms: u64,

    #[serde(default = "default_refresh_fallback_ms")]
    pub refresh_fallback_ms: u64,

    #[serde(default = "default_reconnect_base_ms")]
    pub reconnect_base_ms: u64,

    #[serde(default = "default_reconnect_max_ms")]
    pub reconnect_max_ms: u64,

    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

fn default_debounce_ms() -> u64 {
    1000
}

fn default_autosave_interval_ms() -> u64 {
    15_000
}

fn default_ack_fallback_ms() -> u64 {
    500
}

fn default_refresh_fallback_ms() -> u64 {
    1500
}

fn default_reconnect_base_ms() -> u64 {
    1000
}

fn default_reconnect_max_ms() -> u64 {
    15_000
}

fn default_request_timeout_ms() -> u64 {
    10_000
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            debounce_ms: default_debounce_ms(),
            autosave_interval_ms: default_autosave_interval_ms(),
            ack_fallback_ms: default_ack_fallback_ms(),
            refresh_fallback_ms: default_refresh_fallback_ms(),
            reconnect_base_ms: default_reconnect_base_ms(),
            reconnect_max_ms: default_reconnect_max_ms(),
            request_timeout_ms: default_request_timeout_ms(),
        }
    }
}

impl SyncConfig {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn autosave_interval(&self) -> Duration {
        Duration::from_millis(self.autosave_interval_ms)
    }

    pub fn ack_fallback(&self) -> Duration {
        Duration::from_millis(self.ack_fallback_ms)
    }

    pub fn refresh_fallback(&self) -> Duration {
        Duration::from_millis(self.refresh_fallback_ms)
    }

    pub fn reconnect_base(&self) -> Duration {
        Duration::from_millis(self.reconnect_base_ms)
    }

    pub fn reconnect_max(&self) -> Duration {
        Duration::from_millis(self.reconnect_max_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

impl Default for CorkboardConfig {
    fn default() -> Self {
        Self {
            api_base_url: default_api_base_url(),
            ws_url: default_ws_url(),
            ws_enabled: true,
            auth_token: None,
            storage_dir: default_storage_dir(),
            history_capacity: default_history_capacity(),
            sync: SyncConfig::default(),
            config_path: None,
        }
    }
}

impl CorkboardConfig {
    /// Load configuration from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)?;
        let mut config: CorkboardConfig = serde_yaml::from_str(&contents)?;

        // Store config file path for relative path resolution
        config.config_path = Some(path.to_path_buf());

        Ok(config)
    }

    /// Load from `path` if it exists, otherwise fall back to defaults.
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        if path.as_ref().exists() {
            Self::from_file(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Get the storage directory, resolved relative to config file
    pub fn storage_path(&self) -> PathBuf {
        self.resolve_path(&self.storage_dir)
    }

    /// Base URL without a trailing slash
    pub fn api_base(&self) -> &str {
        self.api_base_url.trim_end_matches('/')
    }

    /// Resolve a path relative to the config file location
    fn resolve_path(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else if let Some(config_path) = &self.config_path {
            if let Some(parent) = config_path.parent() {
                parent.join(path)
            } else {
                path.to_path_buf()
            }
        } else {
            path.to_path_buf()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_values() {
        let config = CorkboardConfig::default();
        assert_eq!(config.api_base_url, "http://localhost:3001/api/v1");
        assert_eq!(config.history_capacity, 50);
        assert_eq!(config.sync.debounce(), Duration::from_millis(1000));
        assert_eq!(config.sync.autosave_interval(), Duration::from_secs(15));
        assert!(config.ws_enabled);
    }

    #[test]
    fn test_partial_yaml_uses_defaults() {
        let yaml = "ws_enabled: false\nsync:\n  debounce_ms: 250\n";
        let config: CorkboardConfig = serde_yaml::from_str(yaml).unwrap();
        assert!(!config.ws_enabled);
        assert_eq!(config.sync.debounce_ms, 250);
        assert_eq!(config.sync.ack_fallback_ms, 500);
        assert_eq!(config.storage_dir, PathBuf::from(".corkboard"));
    }

    #[test]
    fn test_storage_dir_relative_to_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("corkboard.yml");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "storage_dir: cache").unwrap();

        let config = CorkboardConfig::from_file(&path).unwrap();
        assert_eq!(config.storage_path(), dir.path().join("cache"));
    }

    #[test]
    fn test_missing_file_defaults_but_bad_yaml_errors() {
        let dir = tempfile::tempdir().unwrap();
        let missing = CorkboardConfig::load_or_default(dir.path().join("nope.yml")).unwrap();
        assert_eq!(missing, CorkboardConfig::default());

        let bad = dir.path().join("bad.yml");
        std::fs::write(&bad, "sync: [unclosed").unwrap();
        assert!(matches!(
            CorkboardConfig::load_or_default(&bad),
            Err(ConfigError::ParseError(_))
        ));
    }
}
