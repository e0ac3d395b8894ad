//! Configuration System
//!
//! Handles loading configuration from files and environment variables.
//! Supports TOML config files and environment variable overrides.

use crate::cache::CacheConfig;
use crate::service::{CertificationThresholds, ServiceConfig};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Main configuration structure
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub store: StoreConfig,

    #[serde(default)]
    pub cache: CacheConfig,

    #[serde(default)]
    pub certification: CertificationThresholds,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Scrobble store configuration
#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    /// JSON snapshot the store is loaded from and saved to
    #[serde(default = "default_data_file")]
    pub data_file: PathBuf,
}

fn default_data_file() -> PathBuf {
    dirs::data_local_dir()
        .map(|p| p.join("scrobbledb").join("scrobbles.json"))
        .unwrap_or_else(|| PathBuf::from("./scrobbledb_data/scrobbles.json"))
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            data_file: default_data_file(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    /// "pretty" or "json"
    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl Config {
    /// Load configuration from a file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;

        Self::parse(&content).map_err(|error| ConfigError::Parse {
            path: path.to_path_buf(),
            error,
        })
    }

    fn parse(content: &str) -> Result<Self, String> {
        toml::from_str(content).map_err(|e| e.to_string())
    }

    /// Load configuration from environment variables only
    pub fn from_env() -> Self {
        let mut config = Config::default();
        config.apply_env_overrides();
        config
    }

    /// Load configuration with environment variable overrides
    pub fn load_with_env(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::load(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Load from default locations or environment
    pub fn load_default() -> Self {
        let config_paths = [
            dirs::config_dir().map(|p| p.join("scrobbledb").join("config.toml")),
            Some(PathBuf::from("./scrobbledb.toml")),
        ];

        for path in config_paths.iter().flatten() {
            if path.exists() {
                match Self::load_with_env(path) {
                    Ok(config) => {
                        tracing::info!("Loaded config from {:?}", path);
                        return config;
                    }
                    Err(e) => {
                        tracing::warn!("Failed to load config from {:?}: {}", path, e);
                    }
                }
            }
        }

        tracing::info!("Using default config with environment overrides");
        Self::from_env()
    }

    /// Settings the query service needs
    pub fn service_config(&self) -> ServiceConfig {
        ServiceConfig {
            cache: self.cache.clone(),
            certification: self.certification.clone(),
        }
    }

    fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Apply `SCROBBLEDB_*` overrides from `lookup`; unparseable values are ignored
    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(data_file) = lookup("SCROBBLEDB_DATA_FILE") {
            self.store.data_file = PathBuf::from(data_file);
        }

        if let Some(enabled) = lookup("SCROBBLEDB_CACHE_ENABLED").and_then(|v| v.parse().ok()) {
            self.cache.enabled = enabled;
        }
        if let Some(max) = lookup("SCROBBLEDB_CACHE_MAX_ENTRIES").and_then(|v| v.parse().ok()) {
            self.cache.max_entries = max;
        }

        if let Some(level) = lookup("SCROBBLEDB_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Some(format) = lookup("SCROBBLEDB_LOG_FORMAT") {
            self.logging.format = format;
        }
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path:?}: {error}")]
    Io { path: PathBuf, error: String },

    #[error("Failed to parse config file {path:?}: {error}")]
    Parse { path: PathBuf, error: String },
}

/// Generate a default config file content
pub fn generate_default_config() -> String {
    r#"# scrobbledb Configuration
#
# Environment variables override these settings:
# - SCROBBLEDB_DATA_FILE
# - SCROBBLEDB_CACHE_ENABLED
# - SCROBBLEDB_CACHE_MAX_ENTRIES
# - SCROBBLEDB_LOG_LEVEL
# - SCROBBLEDB_LOG_FORMAT

[store]
# JSON snapshot holding scrobbles, count-as rules and confirmed-real artists
data_file = "scrobbles.json"

[cache]
# Memoize chart and list queries
enabled = true

# Maximum cached aggregates before least recently used ones are dropped
max_entries = 4096

[certification]
# Lifetime scrobbles for each certification tier
gold = 250
platinum = 500
diamond = 1000

[logging]
# Log level: trace, debug, info, warn, error
level = "info"

# Log format: pretty (for development) or json (for production)
format = "pretty"
"#
    .to_string()
}
