use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use futures::future::join_all;
use regex::Regex;
use tempfile::TempDir;

use affilink::app::AuthError;
use affilink::canonical::UrlCanonicalizer;
use affilink::domain::{Credential, DomainRule};
use affilink::engine::{EnrichmentService, LinkEnrichmentEngine, RetryPolicy};
use affilink::partner::{Authenticator, LinkApi, LinkOutcome};
use affilink::session::{Clock, ManualClock, SessionManager};
use affilink::store::{CredentialFile, LinkCache};

const REFRESH_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Clone, Copy, PartialEq)]
enum AuthMode {
    Ok,
    Fail,
    Hang,
}

struct MockAuth {
    mode: AuthMode,
    delay: Duration,
    logins: AtomicUsize,
    refreshes: AtomicUsize,
}

impl MockAuth {
    fn new(mode: AuthMode) -> Arc<Self> {
        Self::with_delay(mode, Duration::ZERO)
    }

    fn with_delay(mode: AuthMode, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            mode,
            delay,
            logins: AtomicUsize::new(0),
            refreshes: AtomicUsize::new(0),
        })
    }

    fn calls(&self) -> usize {
        self.logins.load(Ordering::SeqCst) + self.refreshes.load(Ordering::SeqCst)
    }

    async fn issue(&self, token: String) -> Result<Credential, AuthError> {
        match self.mode {
            AuthMode::Ok => {
                tokio::time::sleep(self.delay).await;
                Ok(Credential::fresh(token, Utc::now()))
            }
            AuthMode::Fail => Err(AuthError::Rejected("invalid session".into())),
            AuthMode::Hang => {
                tokio::time::sleep(Duration::from_secs(24 * 3600)).await;
                Err(AuthError::Unavailable("unreachable".into()))
            }
        }
    }
}

#[async_trait]
impl Authenticator for MockAuth {
    async fn login(&self) -> Result<Credential, AuthError> {
        let n = self.logins.fetch_add(1, Ordering::SeqCst);
        self.issue(format!("login-{n}")).await
    }

    async fn refresh(&self) -> Result<Credential, AuthError> {
        let n = self.refreshes.fetch_add(1, Ordering::SeqCst);
        self.issue(format!("refresh-{n}")).await
    }
}

/// Answers `transient_first` conflicts, then links (or a fixed error).
struct MockApi {
    transient_first: usize,
    fatal: bool,
    fixed_link: Option<String>,
    calls: AtomicUsize,
    tokens: Mutex<Vec<String>>,
}

impl MockApi {
    fn ok() -> Arc<Self> {
        Self::build(0, false, None)
    }

    fn returning(link: &str) -> Arc<Self> {
        Self::build(0, false, Some(link.to_string()))
    }

    fn transient_then_ok(transient_first: usize) -> Arc<Self> {
        Self::build(transient_first, false, None)
    }

    fn failing() -> Arc<Self> {
        Self::build(0, true, None)
    }

    fn build(transient_first: usize, fatal: bool, fixed_link: Option<String>) -> Arc<Self> {
        Arc::new(Self {
            transient_first,
            fatal,
            fixed_link,
            calls: AtomicUsize::new(0),
            tokens: Mutex::new(Vec::new()),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn last_token(&self) -> Option<String> {
        self.tokens.lock().unwrap().last().cloned()
    }
}

#[async_trait]
impl LinkApi for MockApi {
    async fn create_link(&self, url: &str, credential: &Credential) -> LinkOutcome {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        self.tokens.lock().unwrap().push(credential.token.clone());

        if n < self.transient_first {
            return LinkOutcome::Transient;
        }
        if self.fatal {
            return LinkOutcome::Fatal("HTTP 403 Forbidden".into());
        }
        let link = self
            .fixed_link
            .clone()
            .unwrap_or_else(|| format!("https://aff.example/go?u={url}"));
        LinkOutcome::Success(link)
    }
}

struct Harness {
    engine: LinkEnrichmentEngine,
    cache: Arc<LinkCache>,
    auth: Arc<MockAuth>,
    api: Arc<MockApi>,
    clock: Arc<ManualClock>,
}

fn shop_rules() -> Vec<DomainRule> {
    vec![
        DomainRule::new("example-shop.com", Some(Regex::new(r"/(p/\d+)").unwrap())),
        DomainRule::new("amazon.com", Some(Regex::new(r"/(dp/[A-Z0-9]{10})").unwrap())),
    ]
}

fn harness_with(
    auth: Arc<MockAuth>,
    api: Arc<MockApi>,
    cache: impl FnOnce(Arc<ManualClock>) -> LinkCache,
    retry: RetryPolicy,
) -> Harness {
    let clock = Arc::new(ManualClock::default());
    let cache = Arc::new(cache(clock.clone()));
    let session = SessionManager::new(
        "shopnet",
        auth.clone(),
        clock.clone(),
        REFRESH_INTERVAL,
        Duration::from_secs(5),
    );
    let engine = LinkEnrichmentEngine::new(
        UrlCanonicalizer::new(shop_rules()),
        cache.clone(),
        session,
        api.clone(),
        retry,
        Duration::from_secs(20),
    );
    Harness {
        engine,
        cache,
        auth,
        api,
        clock,
    }
}

fn harness(auth: Arc<MockAuth>, api: Arc<MockApi>) -> Harness {
    harness_with(
        auth,
        api,
        |clock| LinkCache::in_memory(100, clock),
        RetryPolicy::new(4, Duration::from_millis(10)),
    )
}

#[tokio::test]
async fn test_first_request_generates_and_caches() {
    let h = harness(MockAuth::new(AuthMode::Ok), MockApi::returning("https://aff.example/xyz"));

    let link = h.engine.enrich("https://example-shop.com/p/12345?ref=abc").await;

    assert_eq!(link, "https://aff.example/xyz");
    assert_eq!(h.api.calls(), 1);
    assert_eq!(h.cache.get("example-shop.com/p/12345").as_deref(), Some("https://aff.example/xyz"));
    let entry = h.cache.entry("example-shop.com/p/12345").unwrap();
    assert_eq!(entry.original_url, "https://example-shop.com/p/12345?ref=abc");
}

#[tokio::test]
async fn test_repeat_with_other_query_is_served_from_cache() {
    let h = harness(MockAuth::new(AuthMode::Ok), MockApi::returning("https://aff.example/xyz"));

    h.engine.enrich("https://example-shop.com/p/12345?ref=abc").await;
    let again = h
        .engine
        .enrich("https://EXAMPLE-SHOP.com/p/12345?utm_source=chat&ref=zzz")
        .await;

    assert_eq!(again, "https://aff.example/xyz");
    assert_eq!(h.api.calls(), 1);
    assert_eq!(h.auth.calls(), 1);
}

#[tokio::test]
async fn test_capacity_two_keeps_two_newest() {
    let h = harness_with(
        MockAuth::new(AuthMode::Ok),
        MockApi::ok(),
        |clock| LinkCache::in_memory(2, clock),
        RetryPolicy::default(),
    );

    for id in ["1", "2", "3"] {
        h.engine.enrich(&format!("https://example-shop.com/p/{id}")).await;
        h.clock.advance(chrono::Duration::seconds(1));
    }

    assert_eq!(h.cache.len(), 2);
    assert!(h.cache.get("example-shop.com/p/1").is_none());
    assert!(h.cache.get("example-shop.com/p/2").is_some());
    assert!(h.cache.get("example-shop.com/p/3").is_some());
}

#[tokio::test]
async fn test_stale_credential_refreshes_once_before_api_call() {
    let h = harness(MockAuth::new(AuthMode::Ok), MockApi::ok());

    h.engine.enrich("https://example-shop.com/p/1").await;
    assert_eq!(h.auth.logins.load(Ordering::SeqCst), 1);
    assert_eq!(h.api.last_token().as_deref(), Some("login-0"));

    h.clock.advance(chrono::Duration::seconds(61));
    h.engine.enrich("https://example-shop.com/p/2").await;

    assert_eq!(h.auth.logins.load(Ordering::SeqCst), 1);
    assert_eq!(h.auth.refreshes.load(Ordering::SeqCst), 1);
    assert_eq!(h.api.last_token().as_deref(), Some("refresh-0"));
}

#[tokio::test(start_paused = true)]
async fn test_transient_conflicts_then_success() {
    let h = harness(MockAuth::new(AuthMode::Ok), MockApi::transient_then_ok(3));
    let url = "https://www.amazon.com/gp/aw/dp/B00ABC1234/ref=sr_1";

    let link = h.engine.enrich(url).await;

    assert_ne!(link, url);
    assert!(link.starts_with("https://aff.example/"));
    assert_eq!(h.api.calls(), 4);
    assert!(h.cache.get("www.amazon.com/dp/B00ABC1234").is_some());
}

#[tokio::test]
async fn test_unrelated_host_passes_through_untouched() {
    let h = harness(MockAuth::new(AuthMode::Ok), MockApi::ok());
    let url = "https://unrelated-site.org/p/12345";

    assert_eq!(h.engine.enrich(url).await, url);
    assert!(h.cache.is_empty());
    assert_eq!(h.api.calls(), 0);
    assert_eq!(h.auth.calls(), 0);
}

#[tokio::test]
async fn test_lookalike_host_is_not_eligible() {
    let h = harness(MockAuth::new(AuthMode::Ok), MockApi::ok());
    let url = "https://not-example-shop.com/p/1";

    assert_eq!(h.engine.enrich(url).await, url);
    assert_eq!(h.api.calls(), 0);
}

#[tokio::test]
async fn test_garbage_input_passes_through() {
    let h = harness(MockAuth::new(AuthMode::Ok), MockApi::ok());

    for input in ["", "not a url", "mailto:deals@example-shop.com", "http://"] {
        assert_eq!(h.engine.enrich(input).await, input);
    }
    assert_eq!(h.api.calls(), 0);
}

#[tokio::test]
async fn test_auth_failure_degrades_to_pass_through() {
    let h = harness(MockAuth::new(AuthMode::Fail), MockApi::ok());
    let url = "https://example-shop.com/p/7";

    assert_eq!(h.engine.enrich(url).await, url);
    assert_eq!(h.api.calls(), 0);
    assert!(h.cache.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_hanging_authenticator_does_not_hang_enrich() {
    let h = harness(MockAuth::new(AuthMode::Hang), MockApi::ok());
    let url = "https://example-shop.com/p/7";

    assert_eq!(h.engine.enrich(url).await, url);
    assert_eq!(h.api.calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_bounded_retry_gives_up_with_original() {
    let h = harness_with(
        MockAuth::new(AuthMode::Ok),
        MockApi::transient_then_ok(usize::MAX),
        |clock| LinkCache::in_memory(100, clock),
        RetryPolicy::new(3, Duration::from_millis(1500)),
    );
    let url = "https://example-shop.com/p/9";

    assert_eq!(h.engine.enrich(url).await, url);
    assert_eq!(h.api.calls(), 3);
    assert!(h.cache.is_empty());
}

#[tokio::test]
async fn test_fatal_api_error_is_not_retried() {
    let h = harness(MockAuth::new(AuthMode::Ok), MockApi::failing());
    let url = "https://example-shop.com/p/9";

    assert_eq!(h.engine.enrich(url).await, url);
    assert_eq!(h.api.calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_stale_requests_share_one_refresh() {
    let h = harness(
        MockAuth::with_delay(AuthMode::Ok, Duration::from_secs(2)),
        MockApi::ok(),
    );

    h.engine.enrich("https://example-shop.com/p/0").await;
    h.clock.advance(chrono::Duration::seconds(120));

    let urls: Vec<String> = (1..=16)
        .map(|i| format!("https://example-shop.com/p/{i}"))
        .collect();
    let links = join_all(urls.iter().map(|u| h.engine.enrich(u))).await;

    assert_eq!(h.auth.logins.load(Ordering::SeqCst), 1);
    assert_eq!(h.auth.refreshes.load(Ordering::SeqCst), 1);
    assert!(links.iter().zip(&urls).all(|(link, url)| link != url));
    assert_eq!(h.api.calls(), 17);
}

#[tokio::test]
async fn test_cache_survives_restart() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("links.json");

    let link = {
        let h = harness_with(
            MockAuth::new(AuthMode::Ok),
            MockApi::ok(),
            |clock| LinkCache::open(&path, 100, clock),
            RetryPolicy::default(),
        );
        let link = h.engine.enrich("https://example-shop.com/p/42?ref=a").await;
        h.engine.shutdown().await;
        link
    };

    let h = harness_with(
        MockAuth::new(AuthMode::Ok),
        MockApi::ok(),
        |clock| LinkCache::open(&path, 100, clock),
        RetryPolicy::default(),
    );
    assert_eq!(h.engine.enrich("https://example-shop.com/p/42?ref=b").await, link);
    assert_eq!(h.api.calls(), 0);
    assert_eq!(h.auth.calls(), 0);
}

#[tokio::test]
async fn test_persisted_credential_avoids_login() {
    let dir = TempDir::new().unwrap();
    let file = CredentialFile::new(dir.path().join("credential.json"));
    let clock = Arc::new(ManualClock::default());
    file.save(&Credential::fresh("stored-token", clock.now())).unwrap();

    let auth = MockAuth::new(AuthMode::Ok);
    let api = MockApi::ok();
    let session = SessionManager::with_credential_file(
        "shopnet",
        auth.clone(),
        clock.clone(),
        file,
        REFRESH_INTERVAL,
        Duration::from_secs(5),
    );
    let engine = LinkEnrichmentEngine::new(
        UrlCanonicalizer::new(shop_rules()),
        Arc::new(LinkCache::in_memory(10, clock.clone())),
        session,
        api.clone(),
        RetryPolicy::default(),
        Duration::from_secs(20),
    );

    engine.enrich("https://example-shop.com/p/1").await;

    assert_eq!(auth.calls(), 0);
    assert_eq!(api.last_token().as_deref(), Some("stored-token"));
}

#[tokio::test]
async fn test_service_routes_to_the_accepting_network() {
    let shop_api = MockApi::returning("https://aff.shop/1");
    let market_api = MockApi::returning("https://aff.market/1");
    let clock = Arc::new(ManualClock::default());

    let engine = |name: &str, rule: DomainRule, api: Arc<MockApi>| {
        let session = SessionManager::new(
            name,
            MockAuth::new(AuthMode::Ok),
            clock.clone(),
            REFRESH_INTERVAL,
            Duration::from_secs(5),
        );
        LinkEnrichmentEngine::new(
            UrlCanonicalizer::new(vec![rule]),
            Arc::new(LinkCache::in_memory(10, clock.clone())),
            session,
            api,
            RetryPolicy::default(),
            Duration::from_secs(20),
        )
    };

    let service = EnrichmentService::new(vec![
        engine(
            "shopnet",
            DomainRule::new("example-shop.com", Some(Regex::new(r"/(p/\d+)").unwrap())),
            shop_api.clone(),
        ),
        engine("marketnet", DomainRule::new("amazon.com", None), market_api.clone()),
    ]);

    let text = "Two deals: https://example-shop.com/p/1?ref=x, https://amazon.com/dp/B00ABC1234 \
                and https://example-shop.com/p/1?ref=x again. Docs: https://docs.rs/tokio.";
    let rewritten = service.rewrite_text(text).await;

    assert_eq!(
        rewritten,
        "Two deals: https://aff.shop/1, https://aff.market/1 \
         and https://aff.shop/1 again. Docs: https://docs.rs/tokio."
    );
    assert_eq!(shop_api.calls(), 1);
    assert_eq!(market_api.calls(), 1);
    assert_eq!(service.route("https://docs.rs/tokio").map(|e| e.network()), None);

    service.shutdown().await;
}
