use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::drive::ProviderEndpoints;

/// Every section is optional: a missing file or an empty TOML document
/// yields a fully defaulted configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub ingest: IngestConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub providers: ProvidersConfig,
    #[serde(default)]
    pub log: LogConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "default_db_url")]
    pub url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct IngestConfig {
    /// Number of extraction workers allowed in flight at once.
    #[serde(default = "default_pool_size")]
    pub pool_size: usize,
    /// WebP quality for normalized covers (0-100).
    #[serde(default = "default_cover_quality")]
    pub cover_quality: f32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    /// Freshness window for identity lookups (default 24h).
    #[serde(default = "default_identity_ttl_secs")]
    pub identity_ttl_secs: u64,
    /// Freshness window for folder/file listings (default 1h).
    #[serde(default = "default_listing_ttl_secs")]
    pub listing_ttl_secs: u64,
}

impl CacheConfig {
    pub fn identity_ttl(&self) -> Duration {
        Duration::from_secs(self.identity_ttl_secs)
    }

    pub fn listing_ttl(&self) -> Duration {
        Duration::from_secs(self.listing_ttl_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProvidersConfig {
    #[serde(default = "default_gdrive_base")]
    pub gdrive_base: String,
    #[serde(default = "default_onedrive_base")]
    pub onedrive_base: String,
}

impl From<&ProvidersConfig> for ProviderEndpoints {
    fn from(cfg: &ProvidersConfig) -> Self {
        Self {
            gdrive_base: cfg.gdrive_base.clone(),
            onedrive_base: cfg.onedrive_base.clone(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LogConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
            path: path.to_path_buf(),
            source: e,
        })?;
        let config: Config = toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            source: e,
        })?;
        Ok(config)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    ReadFile {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
}

// Default value functions

fn default_db_url() -> String {
    "sqlite://driveshelf.db".to_string()
}

fn default_pool_size() -> usize {
    3
}

fn default_cover_quality() -> f32 {
    70.0
}

fn default_identity_ttl_secs() -> u64 {
    86_400
}

fn default_listing_ttl_secs() -> u64 {
    3_600
}

fn default_gdrive_base() -> String {
    "https://www.googleapis.com".to_string()
}

fn default_onedrive_base() -> String {
    "https://graph.microsoft.com/v1.0".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            url: default_db_url(),
        }
    }
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            pool_size: default_pool_size(),
            cover_quality: default_cover_quality(),
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            identity_ttl_secs: default_identity_ttl_secs(),
            listing_ttl_secs: default_listing_ttl_secs(),
        }
    }
}

impl Default for ProvidersConfig {
    fn default() -> Self {
        Self {
            gdrive_base: default_gdrive_base(),
            onedrive_base: default_onedrive_base(),
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}
