//! # Affilink
//!
//! Rewrites product links into monetized affiliate links.
//!
//! ## Architecture
//!
//! Every configured affiliate network runs the same pipeline:
//!
//! ```text
//! URL → Canonicalizer → LinkCache → SessionManager → LinkApi → LinkCache
//! ```
//!
//! - [`canonical`]: Allow-list check and query-independent cache keys
//! - [`store`]: Persistent bounded link cache and credential file
//! - [`session`]: Partner credential lifecycle with single-flight refresh
//! - [`engine`]: The enrichment pipeline and its multi-network front
//!
//! ## Quick Start
//!
//! ```bash
//! # Enrich a single URL
//! affilink enrich "https://www.example-shop.com/p/123?utm_source=x"
//!
//! # Rewrite chat messages read from stdin
//! some-bot --dump | affilink rewrite
//!
//! # See which network accepts a URL and under which key
//! affilink check https://www.amazon.com/dp/B00ABC1234
//! ```
//!
//! ## Modules
//!
//! - [`app`]: Application context and error types
//! - [`cli`]: Command-line interface definitions
//! - [`config`]: TOML configuration
//! - [`domain`]: Core domain models (CacheEntry, Credential, DomainRule)
//! - [`partner`]: Partner authentication and link-generation clients

/// Application context and error handling.
///
/// The [`AppContext`](app::AppContext) struct builds one engine per
/// configured network from the loaded [`Config`](config::Config).
pub mod app;

/// URL canonicalization.
///
/// [`UrlCanonicalizer`](canonical::UrlCanonicalizer) decides whether a URL
/// belongs to a network and derives the cache key that survives tracking
/// parameters.
pub mod canonical;

/// Command-line interface using clap.
///
/// - `enrich <url>...` - Enrich URLs
/// - `rewrite` - Enrich every URL in text read from stdin
/// - `check <url>` - Show canonical keys without network calls
/// - `cache list` - Show cached links
/// - `session status|refresh` - Inspect or refresh credentials
pub mod cli;

/// Configuration management.
///
/// Loads from `~/.config/affilink/config.toml` (or `--config`), with one
/// `[[networks]]` table per affiliate network.
pub mod config;

/// Core domain models.
///
/// - [`CacheEntry`](domain::CacheEntry): One generated link
/// - [`Credential`](domain::Credential): Bearer token with its acquisition time
/// - [`DomainRule`](domain::DomainRule): Allow-listed domain suffix and product pattern
pub mod domain;

/// Link enrichment.
///
/// - [`LinkEnrichmentEngine`](engine::LinkEnrichmentEngine): One network's pipeline
/// - [`EnrichmentService`](engine::EnrichmentService): Routing and text rewriting
/// - [`RetryPolicy`](engine::RetryPolicy): Bounded retry of transient partner answers
pub mod engine;

/// Partner-facing collaborators.
///
/// - [`Authenticator`](partner::Authenticator): Login and refresh
/// - [`LinkApi`](partner::LinkApi): Link generation
/// - [`BrowserAuthenticator`](partner::BrowserAuthenticator): chromiumoxide-based token reader
/// - [`HttpLinkApi`](partner::HttpLinkApi): reqwest-based link generation
pub mod partner;

/// Session lifecycle.
///
/// [`SessionManager`](session::SessionManager) keeps a partner credential
/// usable; at most one refresh runs at a time per network, shared by the
/// background task and request-time callers.
pub mod session;

/// Persistence.
///
/// - [`LinkCache`](store::LinkCache): Bounded, oldest-first evicting JSON cache
/// - [`CredentialFile`](store::CredentialFile): Last known credential
pub mod store;
