//! Affiliate link enrichment.
//!
//! ```text
//! raw URL → canonicalize (eligible?) → cache hit? → ensure_usable → create_link (retry) → cache put
//!               └ no: original URL        └ yes: cached link   └ error: original URL   └ failure: original URL
//! ```
//!
//! [`LinkEnrichmentEngine::enrich`] never fails: the caller always gets a
//! usable URL back, enriched or not. Concurrent misses for the same URL are
//! not coalesced and may each call the partner API; the partner treats
//! repeated submissions of one URL as idempotent, so the only cost is a
//! duplicate remote request.

mod retry;
mod service;

pub use retry::{Attempt, RetryOutcome, RetryPolicy};
pub use service::EnrichmentService;

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::canonical::{CanonicalUrl, UrlCanonicalizer};
use crate::partner::{LinkApi, LinkOutcome};
use crate::session::{spawn_refresh_task, RefreshTaskHandle, SessionManager};
use crate::store::LinkCache;

/// Enrichment for a single affiliate network
pub struct LinkEnrichmentEngine {
    network: String,
    canonicalizer: UrlCanonicalizer,
    cache: Arc<LinkCache>,
    session: SessionManager,
    api: Arc<dyn LinkApi>,
    retry: RetryPolicy,
    api_timeout: Duration,
    refresher: Mutex<Option<RefreshTaskHandle>>,
}

impl LinkEnrichmentEngine {
    pub fn new(
        canonicalizer: UrlCanonicalizer,
        cache: Arc<LinkCache>,
        session: SessionManager,
        api: Arc<dyn LinkApi>,
        retry: RetryPolicy,
        api_timeout: Duration,
    ) -> Self {
        Self {
            network: session.network().to_string(),
            canonicalizer,
            cache,
            session,
            api,
            retry,
            api_timeout,
            refresher: Mutex::new(None),
        }
    }

    pub fn network(&self) -> &str {
        &self.network
    }

    pub fn cache(&self) -> &LinkCache {
        &self.cache
    }

    pub fn session(&self) -> &SessionManager {
        &self.session
    }

    pub fn canonicalize(&self, url: &str) -> CanonicalUrl {
        self.canonicalizer.canonicalize(url)
    }

    pub fn is_eligible(&self, url: &str) -> bool {
        self.canonicalizer.is_eligible(url)
    }

    /// Start the background credential refresher if it is not running yet
    pub fn start_refresher(&self) {
        let mut slot = self.refresher.lock().unwrap_or_else(|e| e.into_inner());
        if slot.is_none() {
            *slot = Some(spawn_refresh_task(
                self.session.clone(),
                self.session.refresh_interval(),
            ));
        }
    }

    /// Return a monetized link for `url`, or `url` itself.
    pub async fn enrich(&self, url: &str) -> String {
        let canonical = self.canonicalizer.canonicalize(url);
        if !canonical.eligible {
            debug!(network = %self.network, "Ineligible URL passed through: {}", url);
            return url.to_string();
        }

        if let Some(link) = self.cache.get(&canonical.key) {
            debug!(network = %self.network, "Cache hit for {}", canonical.key);
            return link;
        }

        let credential = match self.session.ensure_usable().await {
            Ok(credential) => credential,
            Err(e) => {
                warn!(network = %self.network, "No usable session, passing {} through: {}", url, e);
                return url.to_string();
            }
        };

        let target = url.trim();
        let key = canonical.key.as_str();
        let credential = &credential;
        let outcome = self
            .retry
            .run(|attempt| async move {
                let call = self.api.create_link(target, credential);
                match tokio::time::timeout(self.api_timeout, call).await {
                    Ok(LinkOutcome::Transient) => {
                        debug!(
                            network = %self.network,
                            "Link generation in progress for {} (attempt {})",
                            key,
                            attempt
                        );
                        Attempt::Retry
                    }
                    Ok(outcome) => Attempt::from(outcome),
                    Err(_) => Attempt::Abort(format!(
                        "link request timed out after {:?}",
                        self.api_timeout
                    )),
                }
            })
            .await;

        match outcome {
            RetryOutcome::Succeeded { value, attempts } => {
                self.cache.put(&canonical.key, target, &value);
                info!(
                    network = %self.network,
                    "Generated link for {} after {} attempt(s)",
                    canonical.key,
                    attempts
                );
                value
            }
            RetryOutcome::Exhausted { attempts } => {
                warn!(
                    network = %self.network,
                    "Link generation still in progress after {} attempts, passing {} through",
                    attempts,
                    url
                );
                url.to_string()
            }
            RetryOutcome::Aborted { reason, .. } => {
                warn!(network = %self.network, "Link generation failed for {}: {}", url, reason);
                url.to_string()
            }
        }
    }

    /// Stop the background refresher and flush the cache.
    pub async fn shutdown(&self) {
        let refresher = self
            .refresher
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        if let Some(refresher) = refresher {
            refresher.shutdown().await;
        }

        if let Err(e) = self.cache.persist() {
            warn!(network = %self.network, "Failed to flush link cache on shutdown: {}", e);
        }
        info!(network = %self.network, "Engine stopped ({} cached links)", self.cache.len());
    }
}
