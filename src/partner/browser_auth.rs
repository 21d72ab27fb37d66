use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::Page;
use chrono::Utc;
use futures::future::{BoxFuture, FutureExt};
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::app::AuthError;
use crate::domain::Credential;
use crate::partner::Authenticator;

/// Configuration for reading a bearer token out of a partner's web session
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BrowserAuthConfig {
    /// Page that requires the logged-in partner session
    pub login_url: String,

    /// JavaScript expression evaluated on that page; must yield the token string
    pub token_script: String,

    /// Persistent browser profile so an existing partner login is reused
    pub profile_dir: Option<PathBuf>,

    /// Whether to run the browser in headless mode (default: true)
    pub headless: bool,

    /// Wait time after page load before reading the token in milliseconds (default: 2000)
    pub wait_after_load_ms: u64,

    /// User agent string to use
    pub user_agent: Option<String>,
}

impl Default for BrowserAuthConfig {
    fn default() -> Self {
        Self {
            login_url: String::new(),
            token_script: "localStorage.getItem('token')".to_string(),
            profile_dir: None,
            headless: true,
            wait_after_load_ms: 2000,
            user_agent: Some(
                "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 \
                 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36"
                    .to_string(),
            ),
        }
    }
}

impl BrowserAuthConfig {
    pub fn wait_after_load(&self) -> Duration {
        Duration::from_millis(self.wait_after_load_ms)
    }
}

/// Authenticator backed by a Chrome session driven through chromiumoxide.
///
/// The browser is launched on first use and kept for later refreshes; it is
/// relaunched after any browser-level failure.
pub struct BrowserAuthenticator {
    config: BrowserAuthConfig,
    browser: Mutex<Option<Browser>>,
}

impl BrowserAuthenticator {
    pub fn new(config: BrowserAuthConfig) -> Self {
        Self {
            config,
            browser: Mutex::new(None),
        }
    }

    async fn launch(&self) -> Result<Browser, AuthError> {
        let mut builder = BrowserConfig::builder()
            .arg("--no-sandbox")
            .arg("--disable-gpu")
            .arg("--disable-dev-shm-usage");

        if !self.config.headless {
            builder = builder.with_head();
        }
        if let Some(ref dir) = self.config.profile_dir {
            builder = builder.user_data_dir(dir);
        }

        let browser_config = builder
            .build()
            .map_err(|e| AuthError::Unavailable(format!("Failed to build browser config: {}", e)))?;

        let (browser, mut handler) = Browser::launch(browser_config).await.map_err(|e| {
            AuthError::Unavailable(format!(
                "Failed to launch browser: {}. Is Chrome or Chromium installed and in PATH?",
                e
            ))
        })?;

        tokio::spawn(async move {
            while let Some(_event) = handler.next().await {}
        });

        info!("Launched browser for partner session");
        Ok(browser)
    }

    async fn read_token(&self) -> Result<Credential, AuthError> {
        if self.config.login_url.is_empty() {
            return Err(AuthError::Unavailable("no login_url configured".to_string()));
        }

        let mut slot = self.browser.lock().await;
        if slot.is_none() {
            *slot = Some(self.launch().await?);
        }
        let Some(browser) = slot.as_ref() else {
            return Err(AuthError::Unavailable("browser not running".to_string()));
        };

        let result = self.token_from_page(browser).await;
        if let Err(AuthError::Unavailable(ref reason)) = result {
            warn!("Dropping browser after failure: {}", reason);
            *slot = None;
        }
        result
    }

    async fn token_from_page(&self, browser: &Browser) -> Result<Credential, AuthError> {
        let page = browser
            .new_page(self.config.login_url.as_str())
            .await
            .map_err(|e| AuthError::Unavailable(format!("Failed to create page: {}", e)))?;

        // Closed on every exit, including cancellation by the auth timeout.
        let tab = TabGuard::new(page.clone());
        let result = self.read_page_token(&page).await;
        tab.close().await;
        result
    }

    async fn read_page_token(&self, page: &Page) -> Result<Credential, AuthError> {
        if let Some(ref ua) = self.config.user_agent {
            page.set_user_agent(ua)
                .await
                .map_err(|e| AuthError::Unavailable(format!("Failed to set user agent: {}", e)))?;
        }

        page.wait_for_navigation()
            .await
            .map_err(|e| AuthError::Unavailable(format!("Navigation failed: {}", e)))?;

        tokio::time::sleep(self.config.wait_after_load()).await;

        let value: serde_json::Value = page
            .evaluate(self.config.token_script.as_str())
            .await
            .map_err(|e| AuthError::Unavailable(format!("Script execution failed: {}", e)))?
            .into_value()
            .map_err(|e| AuthError::Unavailable(format!("Failed to parse result: {:?}", e)))?;

        match value {
            serde_json::Value::String(token) if !token.trim().is_empty() => {
                debug!("Read {} char token from browser session", token.trim().len());
                Ok(Credential::fresh(token.trim(), Utc::now()))
            }
            _ => Err(AuthError::Rejected(
                "no token in browser session; is the partner account logged in?".to_string(),
            )),
        }
    }
}

/// A browser tab that can be closed asynchronously
trait Tab: Send + 'static {
    fn close_tab(self) -> BoxFuture<'static, ()>;
}

impl Tab for Page {
    fn close_tab(self) -> BoxFuture<'static, ()> {
        async move {
            if let Err(e) = Page::close(self).await {
                debug!("Failed to close tab: {}", e);
            }
        }
        .boxed()
    }
}

/// Closes its tab when dropped without an explicit [`TabGuard::close`].
struct TabGuard<T: Tab> {
    tab: Option<T>,
}

impl<T: Tab> TabGuard<T> {
    fn new(tab: T) -> Self {
        Self { tab: Some(tab) }
    }

    async fn close(mut self) {
        if let Some(tab) = self.tab.take() {
            tab.close_tab().await;
        }
    }
}

impl<T: Tab> Drop for TabGuard<T> {
    fn drop(&mut self) {
        if let Some(tab) = self.tab.take() {
            if let Ok(handle) = tokio::runtime::Handle::try_current() {
                handle.spawn(tab.close_tab());
            }
        }
    }
}

#[async_trait]
impl Authenticator for BrowserAuthenticator {
    async fn login(&self) -> Result<Credential, AuthError> {
        info!("Logging in through browser session at {}", self.config.login_url);
        self.read_token().await
    }

    async fn refresh(&self) -> Result<Credential, AuthError> {
        self.read_token().await
    }
}
