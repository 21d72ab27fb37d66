use std::time::Duration;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::canonical::UrlCanonicalizer;
use crate::config::ConfigError;
use crate::domain::DomainRule;
use crate::engine::RetryPolicy;
use crate::partner::BrowserAuthConfig;

/// One affiliate network: its allow-list, partner endpoints and tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Unique name; also names the network's data directory
    pub name: String,

    /// Link-generation API endpoint
    pub endpoint: String,

    /// Credential refresh interval in seconds (default: 60)
    pub refresh_interval_secs: u64,

    /// Upper bound on one login or refresh in seconds (default: 90)
    pub auth_timeout_secs: u64,

    /// Upper bound on one link-generation request in seconds (default: 20)
    pub api_timeout_secs: u64,

    /// Maximum number of cached links (default: 5000)
    pub cache_capacity: usize,

    pub retry: RetryConfig,

    /// Domains eligible for enrichment
    pub domains: Vec<DomainRuleConfig>,

    /// How to obtain a bearer token from the partner's web session
    pub browser: BrowserAuthConfig,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            name: String::new(),
            endpoint: String::new(),
            refresh_interval_secs: 60,
            auth_timeout_secs: 90,
            api_timeout_secs: 20,
            cache_capacity: 5000,
            retry: RetryConfig::default(),
            domains: Vec::new(),
            browser: BrowserAuthConfig::default(),
        }
    }
}

/// Retry settings for "generation already in progress" answers
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Attempts including the first (default: 4)
    pub max_attempts: u32,

    /// Delay between attempts in milliseconds (default: 1500)
    pub delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            delay_ms: 1500,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DomainRuleConfig {
    pub suffix: String,

    /// Regex run against the URL path; capture group 1 (or the whole match)
    /// is the stable product segment
    #[serde(default)]
    pub pattern: Option<String>,
}

impl DomainRuleConfig {
    pub fn compile(&self) -> Result<DomainRule, ConfigError> {
        if self.suffix.trim().trim_start_matches('.').is_empty() {
            return Err(ConfigError::Invalid("domain suffix must not be empty".into()));
        }
        let pattern = match self.pattern.as_deref() {
            Some(p) => Some(Regex::new(p).map_err(|e| {
                ConfigError::Invalid(format!("bad pattern for {}: {}", self.suffix, e))
            })?),
            None => None,
        };
        Ok(DomainRule::new(&self.suffix, pattern))
    }
}

impl NetworkConfig {
    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_secs)
    }

    pub fn auth_timeout(&self) -> Duration {
        Duration::from_secs(self.auth_timeout_secs)
    }

    pub fn api_timeout(&self) -> Duration {
        Duration::from_secs(self.api_timeout_secs)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.retry.max_attempts,
            Duration::from_millis(self.retry.delay_ms),
        )
    }

    pub fn canonicalizer(&self) -> Result<UrlCanonicalizer, ConfigError> {
        let rules = self
            .domains
            .iter()
            .map(DomainRuleConfig::compile)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(UrlCanonicalizer::new(rules))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: &str| -> Result<(), ConfigError> {
            Err(ConfigError::Invalid(format!("network '{}': {}", self.name, msg)))
        };

        if self.name.trim().is_empty() {
            return Err(ConfigError::Invalid("network name must not be empty".into()));
        }
        if self.name.contains(['/', '\\']) || self.name.starts_with('.') {
            return invalid("name must be usable as a directory name");
        }
        if self.cache_capacity == 0 {
            return invalid("cache_capacity must be at least 1");
        }
        if self.retry.max_attempts == 0 {
            return invalid("retry.max_attempts must be at least 1");
        }
        if self.refresh_interval_secs == 0 {
            return invalid("refresh_interval_secs must be at least 1");
        }
        if self.domains.is_empty() {
            return invalid("at least one domain is required");
        }
        self.canonicalizer()?;
        Ok(())
    }
}
