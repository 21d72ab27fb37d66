//! Partner-side collaborators.
//!
//! The engine only needs two capabilities from an affiliate network:
//!
//! ```text
//! Authenticator::login/refresh → Credential
//! LinkApi::create_link(url, credential) → Success | Transient | Fatal
//! ```
//!
//! - [`HttpLinkApi`]: reqwest-based link generation endpoint
//! - [`BrowserAuthenticator`]: reads a bearer token out of a logged-in browser session

mod browser_auth;
mod http_api;

pub use browser_auth::{BrowserAuthConfig, BrowserAuthenticator};
pub use http_api::HttpLinkApi;

use async_trait::async_trait;

use crate::app::AuthError;
use crate::domain::Credential;

/// Result of one link-generation request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkOutcome {
    /// The partner returned a monetized link
    Success(String),
    /// The partner is already generating a link for this URL; try again shortly
    Transient,
    /// Anything else; the original URL should be used
    Fatal(String),
}

/// Obtains bearer credentials for a partner's API
#[async_trait]
pub trait Authenticator: Send + Sync {
    /// Full login, used when no credential exists yet
    async fn login(&self) -> Result<Credential, AuthError>;

    /// Obtain a new credential from an existing session
    async fn refresh(&self) -> Result<Credential, AuthError>;
}

/// Turns a plain product URL into a monetized link
#[async_trait]
pub trait LinkApi: Send + Sync {
    async fn create_link(&self, url: &str, credential: &Credential) -> LinkOutcome;
}
