use std::collections::HashMap;
use std::sync::LazyLock;

use futures::future::join_all;
use regex::Regex;
use tracing::debug;

use crate::engine::LinkEnrichmentEngine;

static URL_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"https?://[^\s<>"'`]+"#).expect("Invalid URL regex"));

const TRAILING_PUNCTUATION: &[char] = &['.', ',', ';', ':', '!', '?', ']', '}', '*', '_', '~'];

/// All configured affiliate networks behind one entry point.
///
/// A URL goes to the first network whose allow-list accepts it.
pub struct EnrichmentService {
    engines: Vec<LinkEnrichmentEngine>,
}

impl EnrichmentService {
    pub fn new(engines: Vec<LinkEnrichmentEngine>) -> Self {
        Self { engines }
    }

    pub fn engines(&self) -> &[LinkEnrichmentEngine] {
        &self.engines
    }

    pub fn engine(&self, network: &str) -> Option<&LinkEnrichmentEngine> {
        self.engines.iter().find(|e| e.network() == network)
    }

    /// The engine responsible for `url`, if any
    pub fn route(&self, url: &str) -> Option<&LinkEnrichmentEngine> {
        self.engines.iter().find(|e| e.is_eligible(url))
    }

    pub async fn enrich(&self, url: &str) -> String {
        match self.route(url) {
            Some(engine) => engine.enrich(url).await,
            None => {
                debug!("No network accepts {}", url);
                url.to_string()
            }
        }
    }

    /// Rewrite every URL in a message body, enriching each distinct URL once.
    pub async fn rewrite_text(&self, text: &str) -> String {
        let urls = find_urls(text);
        if urls.is_empty() {
            return text.to_string();
        }

        let mut distinct: Vec<&str> = Vec::new();
        for url in &urls {
            if !distinct.contains(&url.url) {
                distinct.push(url.url);
            }
        }

        let enriched = join_all(distinct.iter().map(|url| self.enrich(url))).await;
        let replacements: HashMap<&str, String> = distinct.into_iter().zip(enriched).collect();

        let mut out = String::with_capacity(text.len());
        let mut last = 0;
        for found in urls {
            out.push_str(&text[last..found.start]);
            out.push_str(
                replacements
                    .get(found.url)
                    .map(String::as_str)
                    .unwrap_or(found.url),
            );
            last = found.start + found.url.len();
        }
        out.push_str(&text[last..]);
        out
    }

    /// Start every network's background credential refresher
    pub fn start_refreshers(&self) {
        for engine in &self.engines {
            engine.start_refresher();
        }
    }

    /// Stop all refreshers and flush all caches
    pub async fn shutdown(&self) {
        join_all(self.engines.iter().map(|e| e.shutdown())).await;
    }
}

struct FoundUrl<'a> {
    start: usize,
    url: &'a str,
}

/// URLs in `text` with trailing punctuation left out
fn find_urls(text: &str) -> Vec<FoundUrl<'_>> {
    URL_REGEX
        .find_iter(text)
        .filter_map(|m| {
            let url = trim_trailing(m.as_str());
            let has_host = url.split_once("://").is_some_and(|(_, rest)| !rest.is_empty());
            has_host.then_some(FoundUrl {
                start: m.start(),
                url,
            })
        })
        .collect()
}

/// Strip sentence punctuation after a URL. A closing parenthesis is kept
/// while it balances an opening one inside the URL.
fn trim_trailing(mut url: &str) -> &str {
    loop {
        let trimmed = url.trim_end_matches(TRAILING_PUNCTUATION);
        match trimmed.strip_suffix(')') {
            Some(rest) if trimmed.matches('(').count() < trimmed.matches(')').count() => {
                url = rest;
            }
            _ => return trimmed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn urls(text: &str) -> Vec<&str> {
        find_urls(text).into_iter().map(|f| f.url).collect()
    }

    #[test]
    fn test_find_urls_in_message() {
        let text = "Deal! https://example-shop.com/p/1?ref=x and (https://amazon.com/dp/B00ABC1234).";
        assert_eq!(
            urls(text),
            vec!["https://example-shop.com/p/1?ref=x", "https://amazon.com/dp/B00ABC1234"]
        );
    }

    #[test]
    fn test_find_urls_keeps_balanced_parentheses() {
        let text = "See https://en.wikipedia.org/wiki/Rust_(programming_language), \
                    or (https://example-shop.com/p/(1)). Also (https://example-shop.com/p/2)!";
        assert_eq!(
            urls(text),
            vec![
                "https://en.wikipedia.org/wiki/Rust_(programming_language)",
                "https://example-shop.com/p/(1)",
                "https://example-shop.com/p/2",
            ]
        );
    }

    #[test]
    fn test_find_urls_ignores_bare_scheme() {
        assert!(urls("see http:// for details").is_empty());
        assert!(urls("no links here").is_empty());
    }

    #[test]
    fn test_find_urls_stops_at_markup() {
        assert_eq!(
            urls("<a href=\"https://shop.com/x\">link</a>"),
            vec!["https://shop.com/x"]
        );
    }

    #[tokio::test]
    async fn test_rewrite_without_networks_is_identity() {
        let service = EnrichmentService::new(Vec::new());
        let text = "Look: https://example-shop.com/p/1, cheap!";
        assert_eq!(service.rewrite_text(text).await, text);
        assert_eq!(service.enrich("https://example-shop.com/p/1").await, "https://example-shop.com/p/1");
    }
}
