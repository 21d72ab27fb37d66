use regex::Regex;

/// A domain (or domain suffix) eligible for enrichment, with an optional
/// pattern that pulls a stable product identifier out of the URL path.
#[derive(Debug, Clone)]
pub struct DomainRule {
    suffix: String,
    pattern: Option<Regex>,
}

impl DomainRule {
    pub fn new(suffix: &str, pattern: Option<Regex>) -> Self {
        let suffix = suffix.trim().trim_start_matches('.').to_lowercase();
        Self { suffix, pattern }
    }

    pub fn suffix(&self) -> &str {
        &self.suffix
    }

    /// True if `host` is the suffix itself or a subdomain of it.
    ///
    /// `host` must already be lower-cased; one trailing root dot is ignored.
    pub fn matches_host(&self, host: &str) -> bool {
        if self.suffix.is_empty() {
            return false;
        }
        let host = host.strip_suffix('.').unwrap_or(host);
        match host.strip_suffix(self.suffix.as_str()) {
            Some("") => true,
            Some(prefix) => prefix.ends_with('.'),
            None => false,
        }
    }

    /// Extract the product segment from `path`, without a leading slash.
    ///
    /// Uses the first capture group when the pattern has one, otherwise the
    /// whole match.
    pub fn extract_segment<'a>(&self, path: &'a str) -> Option<&'a str> {
        let pattern = self.pattern.as_ref()?;
        let captures = pattern.captures(path)?;
        let segment = captures.get(1).or_else(|| captures.get(0))?.as_str();
        let segment = segment.trim_matches('/');
        (!segment.is_empty()).then_some(segment)
    }
}
