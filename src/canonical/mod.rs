//! URL validation and canonicalization.
//!
//! Maps an arbitrary product URL to a stable cache key so that tracking
//! parameters, fragments, schemes and locale prefixes do not fragment the
//! link cache, and decides whether the URL belongs to a network's allow-list.
//!
//! ```text
//! https://www.Example-Shop.com/en/p/12345?ref=abc#reviews
//!         └─ host (lower-cased) ─┘  └ segment ┘ (query + fragment dropped)
//! key: www.example-shop.com/p/12345
//! ```

use url::Url;

use crate::domain::DomainRule;

/// Result of canonicalizing a URL
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CanonicalUrl {
    /// Stable cache key (`host/segment` or `host/path`)
    pub key: String,
    /// Whether the host is on the allow-list
    pub eligible: bool,
}

impl CanonicalUrl {
    fn ineligible(raw: &str) -> Self {
        Self {
            key: raw.to_string(),
            eligible: false,
        }
    }
}

/// Pure URL canonicalizer over an immutable set of domain rules.
///
/// Canonicalization is idempotent as long as each rule's pattern, applied to
/// `/<segment>`, yields `<segment>` again (or does not match at all).
#[derive(Debug, Clone, Default)]
pub struct UrlCanonicalizer {
    rules: Vec<DomainRule>,
}

impl UrlCanonicalizer {
    pub fn new(rules: Vec<DomainRule>) -> Self {
        Self { rules }
    }

    pub fn rules(&self) -> &[DomainRule] {
        &self.rules
    }

    pub fn canonicalize(&self, raw: &str) -> CanonicalUrl {
        let raw = raw.trim();
        let Some(url) = parse_lenient(raw) else {
            return CanonicalUrl::ineligible(raw);
        };
        let Some(host) = url.host_str() else {
            return CanonicalUrl::ineligible(raw);
        };
        let host = host.strip_suffix('.').unwrap_or(host).to_lowercase();

        let rule = self.rule_for_host(&host);
        let path = url.path();

        let key = match rule.and_then(|r| r.extract_segment(path)) {
            Some(segment) => format!("{}/{}", host, segment),
            None => format!("{}{}", host, path.trim_end_matches('/')),
        };

        CanonicalUrl {
            key,
            eligible: rule.is_some(),
        }
    }

    pub fn is_eligible(&self, raw: &str) -> bool {
        self.canonicalize(raw).eligible
    }

    /// Most specific (longest suffix) rule matching `host`
    fn rule_for_host(&self, host: &str) -> Option<&DomainRule> {
        self.rules
            .iter()
            .filter(|rule| rule.matches_host(host))
            .max_by_key(|rule| rule.suffix().len())
    }
}

/// Parse `raw`, retrying once with an `https://` prefix when it is not an
/// absolute URL (e.g. `shop.com/p/1` or a bare cache key).
fn parse_lenient(raw: &str) -> Option<Url> {
    if raw.is_empty() {
        return None;
    }

    let with_https = || {
        Url::parse(&format!("https://{}", raw))
            .ok()
            .filter(|url| url.host_str().is_some())
    };

    match Url::parse(raw) {
        Ok(url) if url.host_str().is_some() => Some(url),
        // `shop.com:8080/p/1` parses with `shop.com` as its scheme
        Ok(url) if !raw.contains("://") && url.scheme().contains('.') => with_https(),
        Ok(_) => None,
        Err(_) if !raw.contains("://") => with_https(),
        Err(_) => None,
    }
}
