use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Where the credential currently held in memory came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CredentialSource {
    /// Obtained by a login or refresh during this run
    Fresh,
    /// Loaded from the credential file at startup
    Cached,
}

impl fmt::Display for CredentialSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CredentialSource::Fresh => write!(f, "fresh"),
            CredentialSource::Cached => write!(f, "cached"),
        }
    }
}

/// Opaque bearer token for a partner's link-generation API.
///
/// Always fully formed: a token without an acquisition time cannot be built.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    pub token: String,
    pub acquired_at: DateTime<Utc>,
    #[serde(skip, default = "cached_source")]
    pub source: CredentialSource,
}

fn cached_source() -> CredentialSource {
    CredentialSource::Cached
}

impl Credential {
    pub fn fresh(token: impl Into<String>, acquired_at: DateTime<Utc>) -> Self {
        Self {
            token: token.into(),
            acquired_at,
            source: CredentialSource::Fresh,
        }
    }

    pub fn age(&self, now: DateTime<Utc>) -> Duration {
        now.signed_duration_since(self.acquired_at)
    }

    /// Whether the credential has reached the refresh interval at `now`
    pub fn is_stale(&self, now: DateTime<Utc>, refresh_interval: std::time::Duration) -> bool {
        let interval = Duration::from_std(refresh_interval).unwrap_or(Duration::MAX);
        self.age(now) >= interval
    }
}

// Tokens never end up in logs.
impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("token", &format_args!("<{} chars>", self.token.len()))
            .field("acquired_at", &self.acquired_at)
            .field("source", &self.source)
            .finish()
    }
}
