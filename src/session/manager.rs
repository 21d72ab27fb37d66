use std::fmt;
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::future::{BoxFuture, FutureExt, Shared};
use tracing::{debug, info, warn};

use crate::app::AuthError;
use crate::domain::{Credential, CredentialSource};
use crate::partner::Authenticator;
use crate::session::Clock;
use crate::store::CredentialFile;

/// Observable lifecycle of a partner session.
///
/// ```text
/// Uninitialized → Authenticating → Active → (interval) Stale → Refreshing → Active
///                       └──────────────→ Failed ←──────────────────┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Uninitialized,
    Authenticating,
    Active,
    Stale,
    Refreshing,
    Failed,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Uninitialized => "uninitialized",
            SessionState::Authenticating => "authenticating",
            SessionState::Active => "active",
            SessionState::Stale => "stale",
            SessionState::Refreshing => "refreshing",
            SessionState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Point-in-time view of a session, safe to print
#[derive(Debug, Clone)]
pub struct SessionStatus {
    pub state: SessionState,
    pub source: Option<CredentialSource>,
    pub acquired_at: Option<DateTime<Utc>>,
    pub age: Option<chrono::Duration>,
    pub last_error: Option<AuthError>,
}

type RefreshFuture = Shared<BoxFuture<'static, Result<Credential, AuthError>>>;

// Stored phase; `Stale` is derived from the credential age on read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Uninitialized,
    Authenticating,
    Active,
    Refreshing,
    Failed,
}

struct Current {
    phase: Phase,
    credential: Option<Credential>,
    last_attempt: Option<DateTime<Utc>>,
    last_error: Option<AuthError>,
}

struct Inner {
    network: String,
    authenticator: Arc<dyn Authenticator>,
    clock: Arc<dyn Clock>,
    credential_file: Option<CredentialFile>,
    refresh_interval: Duration,
    auth_timeout: Duration,
    current: RwLock<Current>,
    in_flight: Mutex<Option<RefreshFuture>>,
}

/// Owns one network's bearer credential.
///
/// All refreshes, whether requested by traffic or by the background timer,
/// go through a single in-flight operation: late callers await the refresh
/// already running instead of starting another login against the partner.
#[derive(Clone)]
pub struct SessionManager {
    inner: Arc<Inner>,
}

impl SessionManager {
    pub fn new(
        network: impl Into<String>,
        authenticator: Arc<dyn Authenticator>,
        clock: Arc<dyn Clock>,
        refresh_interval: Duration,
        auth_timeout: Duration,
    ) -> Self {
        Self::build(network.into(), authenticator, clock, None, refresh_interval, auth_timeout)
    }

    /// Session that persists every fresh credential to `file` and starts from
    /// whatever credential the file already holds.
    pub fn with_credential_file(
        network: impl Into<String>,
        authenticator: Arc<dyn Authenticator>,
        clock: Arc<dyn Clock>,
        file: CredentialFile,
        refresh_interval: Duration,
        auth_timeout: Duration,
    ) -> Self {
        let network = network.into();
        let stored = match file.load() {
            Ok(stored) => stored,
            Err(e) => {
                warn!(network = %network, "Ignoring unreadable credential file {}: {}", file.path().display(), e);
                None
            }
        };

        let session = Self::build(
            network,
            authenticator,
            clock,
            Some(file),
            refresh_interval,
            auth_timeout,
        );

        if let Some(credential) = stored {
            debug!(
                network = %session.inner.network,
                "Loaded cached credential acquired at {}",
                credential.acquired_at
            );
            {
                let mut current = session.inner.write_current();
                current.phase = Phase::Active;
                current.credential = Some(credential);
            }
        }
        session
    }

    fn build(
        network: String,
        authenticator: Arc<dyn Authenticator>,
        clock: Arc<dyn Clock>,
        credential_file: Option<CredentialFile>,
        refresh_interval: Duration,
        auth_timeout: Duration,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                network,
                authenticator,
                clock,
                credential_file,
                refresh_interval,
                auth_timeout,
                current: RwLock::new(Current {
                    phase: Phase::Uninitialized,
                    credential: None,
                    last_attempt: None,
                    last_error: None,
                }),
                in_flight: Mutex::new(None),
            }),
        }
    }

    pub fn network(&self) -> &str {
        &self.inner.network
    }

    pub fn refresh_interval(&self) -> Duration {
        self.inner.refresh_interval
    }

    pub fn state(&self) -> SessionState {
        let now = self.inner.clock.now();
        let current = self.inner.read_current();
        match current.phase {
            Phase::Uninitialized => SessionState::Uninitialized,
            Phase::Authenticating => SessionState::Authenticating,
            Phase::Refreshing => SessionState::Refreshing,
            Phase::Failed => SessionState::Failed,
            Phase::Active => {
                let stale = current
                    .credential
                    .as_ref()
                    .is_none_or(|c| c.is_stale(now, self.inner.refresh_interval));
                if stale {
                    SessionState::Stale
                } else {
                    SessionState::Active
                }
            }
        }
    }

    pub fn credential(&self) -> Option<Credential> {
        self.inner.read_current().credential.clone()
    }

    pub fn status(&self) -> SessionStatus {
        let now = self.inner.clock.now();
        let state = self.state();
        let current = self.inner.read_current();
        SessionStatus {
            state,
            source: current.credential.as_ref().map(|c| c.source),
            acquired_at: current.credential.as_ref().map(|c| c.acquired_at),
            age: current.credential.as_ref().map(|c| c.age(now)),
            last_error: current.last_error.clone(),
        }
    }

    /// Whether a request arriving now would trigger (or join) a refresh
    pub fn needs_refresh(&self) -> bool {
        self.inner.refresh_due(self.inner.clock.now())
    }

    /// Return a credential usable for a partner call, refreshing first if the
    /// current one is missing or stale.
    ///
    /// When a refresh fails but an older credential exists, that credential is
    /// returned anyway: it may still be accepted by the partner.
    pub async fn ensure_usable(&self) -> Result<Credential, AuthError> {
        if !self.needs_refresh() {
            return self.inner.current_or_last_error();
        }

        let flight = match self.join_or_start(true) {
            Ok(flight) => flight,
            Err(ready) => return ready,
        };

        match flight.await {
            Ok(credential) => Ok(credential),
            Err(e) => match self.credential() {
                Some(stale) => {
                    warn!(network = %self.inner.network, "Refresh failed ({}); using previous credential", e);
                    Ok(stale)
                }
                None => Err(e),
            },
        }
    }

    /// Obtain a fresh credential, joining a refresh that is already running.
    pub async fn refresh(&self) -> Result<Credential, AuthError> {
        match self.join_or_start(false) {
            Ok(flight) => flight.await,
            Err(ready) => ready,
        }
    }

    /// The in-flight refresh, starting one if none is running.
    ///
    /// With `only_if_due`, a refresh that completed while this caller was
    /// deciding is not repeated: the current credential is returned instead.
    fn join_or_start(
        &self,
        only_if_due: bool,
    ) -> Result<RefreshFuture, Result<Credential, AuthError>> {
        let mut slot = self.inner.in_flight.lock().unwrap_or_else(|e| e.into_inner());

        if let Some(flight) = slot.as_ref() {
            return Ok(flight.clone());
        }

        if only_if_due && !self.inner.refresh_due(self.inner.clock.now()) {
            return Err(self.inner.current_or_last_error());
        }

        // The refresh runs as its own task so it completes (and clears the
        // slot) even if every caller waiting on it is cancelled.
        let had_credential = self.inner.begin_refresh();
        let inner = Arc::clone(&self.inner);
        let task = tokio::spawn(async move { inner.run_refresh(had_credential).await });
        let flight = task
            .map(|joined| {
                joined.unwrap_or_else(|e| {
                    Err(AuthError::Unavailable(format!("refresh task failed: {}", e)))
                })
            })
            .boxed()
            .shared();
        *slot = Some(flight.clone());
        Ok(flight)
    }
}

impl Inner {
    fn read_current(&self) -> std::sync::RwLockReadGuard<'_, Current> {
        self.current.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write_current(&self) -> std::sync::RwLockWriteGuard<'_, Current> {
        self.current.write().unwrap_or_else(|e| e.into_inner())
    }

    fn refresh_due(&self, now: DateTime<Utc>) -> bool {
        let current = self.read_current();
        match current.phase {
            Phase::Uninitialized | Phase::Authenticating | Phase::Refreshing => true,
            Phase::Active => current
                .credential
                .as_ref()
                .is_none_or(|c| c.is_stale(now, self.refresh_interval)),
            // Back off after a failure: retry once per refresh interval.
            Phase::Failed => {
                let young = current
                    .credential
                    .as_ref()
                    .is_some_and(|c| !c.is_stale(now, self.refresh_interval));
                let retry_due = current.last_attempt.is_none_or(|at| {
                    now.signed_duration_since(at)
                        >= chrono::Duration::from_std(self.refresh_interval)
                            .unwrap_or(chrono::Duration::MAX)
                });
                !young && retry_due
            }
        }
    }

    fn current_or_last_error(&self) -> Result<Credential, AuthError> {
        let current = self.read_current();
        match (&current.credential, &current.last_error) {
            (Some(credential), _) => Ok(credential.clone()),
            (None, Some(e)) => Err(e.clone()),
            (None, None) => Err(AuthError::Unavailable("no credential".to_string())),
        }
    }

    /// Mark the session as (re)authenticating; returns whether a credential exists.
    fn begin_refresh(&self) -> bool {
        let mut current = self.write_current();
        let had = current.credential.is_some();
        current.phase = if had {
            Phase::Refreshing
        } else {
            Phase::Authenticating
        };
        had
    }

    async fn run_refresh(&self, had_credential: bool) -> Result<Credential, AuthError> {
        let authenticator = Arc::clone(&self.authenticator);
        let mut call = tokio::spawn(async move {
            if had_credential {
                authenticator.refresh().await
            } else {
                authenticator.login().await
            }
        });

        let result = match tokio::time::timeout(self.auth_timeout, &mut call).await {
            Ok(Ok(result)) => result,
            Ok(Err(e)) if e.is_panic() => {
                Err(AuthError::Unavailable("authenticator panicked".to_string()))
            }
            Ok(Err(e)) => Err(AuthError::Unavailable(format!("authenticator task failed: {}", e))),
            Err(_) => {
                call.abort();
                Err(AuthError::Timeout(self.auth_timeout))
            }
        };

        let now = self.clock.now();
        let result = result.map(|credential| Credential {
            acquired_at: now,
            source: CredentialSource::Fresh,
            ..credential
        });

        match &result {
            Ok(credential) => {
                if let Some(ref file) = self.credential_file {
                    if let Err(e) = file.save(credential) {
                        warn!(network = %self.network, "Failed to persist credential: {}", e);
                    }
                }
                let mut current = self.write_current();
                current.phase = Phase::Active;
                current.credential = Some(credential.clone());
                current.last_attempt = Some(now);
                current.last_error = None;
                info!(
                    network = %self.network,
                    "{} succeeded ({} char token)",
                    if had_credential { "Refresh" } else { "Login" },
                    credential.token.len()
                );
            }
            Err(e) => {
                let mut current = self.write_current();
                current.phase = Phase::Failed;
                current.last_attempt = Some(now);
                current.last_error = Some(e.clone());
                warn!(network = %self.network, "Authentication failed: {}", e);
            }
        }

        // State is updated before the slot clears, so nobody who finds the
        // slot empty can observe the pre-refresh state.
        *self.in_flight.lock().unwrap_or_else(|e| e.into_inner()) = None;
        result
    }
}
