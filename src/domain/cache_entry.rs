use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One generated affiliate link, keyed by the canonical form of the product URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub canonical_key: String,
    pub original_url: String,
    pub generated_link: String,
    pub created_at: DateTime<Utc>,
}

impl CacheEntry {
    pub fn new(
        canonical_key: impl Into<String>,
        original_url: impl Into<String>,
        generated_link: impl Into<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            canonical_key: canonical_key.into(),
            original_url: original_url.into(),
            generated_link: generated_link.into(),
            created_at,
        }
    }
}
