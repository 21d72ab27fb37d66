use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::info;

use crate::app::error::{AppError, Result};
use crate::config::{Config, NetworkConfig};
use crate::engine::{EnrichmentService, LinkEnrichmentEngine};
use crate::partner::{BrowserAuthenticator, HttpLinkApi};
use crate::session::{Clock, SessionManager, SystemClock};
use crate::store::{CredentialFile, LinkCache};

const LINK_CACHE_FILE: &str = "links.json";
const CREDENTIAL_FILE: &str = "credential.json";
const PROFILE_DIR: &str = "browser-profile";

pub struct AppContext {
    pub config: Config,
    pub data_dir: PathBuf,
    pub service: EnrichmentService,
}

impl AppContext {
    /// Load the configuration (default location unless `config_path` is set)
    /// and wire one engine per configured network.
    pub fn new(config_path: Option<&Path>) -> Result<Self> {
        let config = match config_path {
            Some(path) => Config::load_from(path)?,
            None => Config::load()?,
        };
        Self::from_config(config)
    }

    pub fn from_config(config: Config) -> Result<Self> {
        let data_dir = config.data_dir()?;
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);

        let engines = config
            .networks
            .iter()
            .map(|network| Self::build_engine(network, &data_dir, clock.clone()))
            .collect::<Result<Vec<_>>>()?;

        if engines.is_empty() {
            info!("No networks configured; every URL will pass through unchanged");
        }

        Ok(Self {
            config,
            data_dir,
            service: EnrichmentService::new(engines),
        })
    }

    pub fn engine(&self, network: &str) -> Result<&LinkEnrichmentEngine> {
        self.service
            .engine(network)
            .ok_or_else(|| AppError::NetworkNotFound(network.to_string()))
    }

    fn build_engine(
        network: &NetworkConfig,
        data_dir: &Path,
        clock: Arc<dyn Clock>,
    ) -> Result<LinkEnrichmentEngine> {
        let network_dir = data_dir.join(&network.name);
        std::fs::create_dir_all(&network_dir)?;

        let mut browser = network.browser.clone();
        if browser.profile_dir.is_none() {
            browser.profile_dir = Some(network_dir.join(PROFILE_DIR));
        }

        let session = SessionManager::with_credential_file(
            network.name.clone(),
            Arc::new(BrowserAuthenticator::new(browser)),
            clock.clone(),
            CredentialFile::new(network_dir.join(CREDENTIAL_FILE)),
            network.refresh_interval(),
            network.auth_timeout(),
        );

        let cache = Arc::new(LinkCache::open(
            network_dir.join(LINK_CACHE_FILE),
            network.cache_capacity,
            clock,
        ));

        let api = Arc::new(HttpLinkApi::new(&network.endpoint, network.api_timeout())?);

        Ok(LinkEnrichmentEngine::new(
            network.canonicalizer()?,
            cache,
            session,
            api,
            network.retry_policy(),
            network.api_timeout(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DomainRuleConfig;
    use tempfile::TempDir;

    fn config(dir: &Path) -> Config {
        Config {
            data_dir: Some(dir.to_path_buf()),
            networks: vec![NetworkConfig {
                name: "shopnet".into(),
                endpoint: "https://api.partner.example/v1/links".into(),
                domains: vec![DomainRuleConfig {
                    suffix: "example-shop.com".into(),
                    pattern: Some(r"/(p/\d+)".into()),
                }],
                ..Default::default()
            }],
        }
    }

    #[test]
    fn test_context_wires_one_engine_per_network() {
        let dir = TempDir::new().unwrap();
        let ctx = AppContext::from_config(config(dir.path())).unwrap();

        assert_eq!(ctx.service.engines().len(), 1);
        let engine = ctx.engine("shopnet").unwrap();
        assert_eq!(
            engine.cache().path(),
            Some(dir.path().join("shopnet").join(LINK_CACHE_FILE).as_path())
        );
        assert!(dir.path().join("shopnet").is_dir());
    }

    #[test]
    fn test_unknown_network() {
        let dir = TempDir::new().unwrap();
        let ctx = AppContext::from_config(config(dir.path())).unwrap();
        assert!(matches!(ctx.engine("nope"), Err(AppError::NetworkNotFound(_))));
    }

    #[test]
    fn test_bad_endpoint_is_an_error() {
        let dir = TempDir::new().unwrap();
        let mut config = config(dir.path());
        config.networks[0].endpoint = "not a url".into();
        assert!(AppContext::from_config(config).is_err());
    }
}
