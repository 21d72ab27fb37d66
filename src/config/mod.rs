//! Configuration management for affilink.
//!
//! Configuration is read from `~/.config/affilink/config.toml` at startup
//! (or from an explicit path). If the default file doesn't exist, one with
//! commented examples is created. Everything is immutable once loaded.

pub mod network;

pub use network::{DomainRuleConfig, NetworkConfig, RetryConfig};

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

/// Main configuration struct.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Where caches and credentials live (default: platform data dir + `affilink`)
    pub data_dir: Option<PathBuf>,

    pub networks: Vec<NetworkConfig>,
}

impl Config {
    /// Load configuration from the default path.
    ///
    /// If the config file doesn't exist, creates a default one with comments.
    /// If the config file exists but is invalid, returns an error.
    /// Missing fields in the config file will use default values.
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::default_config_path()?;

        if !config_path.exists() {
            Self::create_default_config(&config_path)?;
            return Ok(Self::default());
        }

        Self::load_from(&config_path)
    }

    /// Load and validate configuration from `path`.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;

        let config: Config = toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            source: e,
        })?;

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut seen = HashSet::new();
        for network in &self.networks {
            network.validate()?;
            if !seen.insert(network.name.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "duplicate network name '{}'",
                    network.name
                )));
            }
        }
        Ok(())
    }

    pub fn network(&self, name: &str) -> Option<&NetworkConfig> {
        self.networks.iter().find(|n| n.name == name)
    }

    /// Get the default config file path: `~/.config/affilink/config.toml`
    pub fn default_config_path() -> Result<PathBuf, ConfigError> {
        let config_dir = dirs::config_dir().ok_or(ConfigError::NoConfigDir)?;
        Ok(config_dir.join("affilink").join("config.toml"))
    }

    /// Resolved data directory
    pub fn data_dir(&self) -> Result<PathBuf, ConfigError> {
        match &self.data_dir {
            Some(dir) => Ok(dir.clone()),
            None => dirs::data_dir()
                .map(|d| d.join("affilink"))
                .ok_or(ConfigError::NoDataDir),
        }
    }

    fn create_default_config(path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| ConfigError::Io {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }

        fs::write(path, Self::default_config_content()).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            source: e,
        })
    }

    /// Generate the default config file content with comments.
    fn default_config_content() -> &'static str {
        r##"# affilink configuration
#
# Each [[networks]] entry is one affiliate network. A URL is enriched by the
# first network whose domain list accepts it; every other URL passes through
# unchanged.

# Where link caches and credentials are stored (default: platform data dir)
# data_dir = "/var/lib/affilink"

# [[networks]]
# name = "shopnet"
# endpoint = "https://api.partner.example/v1/links"
#
# # Credential refresh interval (seconds)
# refresh_interval_secs = 60
#
# # Upper bounds for one login/refresh and one link request (seconds)
# auth_timeout_secs = 90
# api_timeout_secs = 20
#
# # Maximum number of cached links; the oldest are evicted first
# cache_capacity = 5000
#
# [networks.retry]
# # Attempts when the partner reports a generation already in progress
# max_attempts = 4
# delay_ms = 1500
#
# [networks.browser]
# # Page of the logged-in partner dashboard and the JS expression yielding the token
# login_url = "https://partner.example/dashboard"
# token_script = "localStorage.getItem('token')"
# # Persistent profile so the partner login survives restarts
# profile_dir = "/var/lib/affilink/shopnet-profile"
# headless = true
# wait_after_load_ms = 2000
#
# [[networks.domains]]
# suffix = "example-shop.com"
# # Capture group 1 is the stable product id segment
# pattern = '/(p/\d+)'
#
# [[networks.domains]]
# suffix = "example-shop.de"
# pattern = '/(p/\d+)'
"##
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Could not determine config directory")]
    NoConfigDir,

    #[error("Could not determine data directory")]
    NoDataDir,

    #[error("Failed to read/write config file at {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file at {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}
