//! Partner session lifecycle.
//!
//! A [`SessionManager`] owns one network's credential: it loads the last
//! persisted token at startup, refreshes it when it goes stale, collapses
//! concurrent refreshes into one, and writes every fresh token back to disk.
//! [`spawn_refresh_task`] keeps the credential warm in the background.

mod clock;
mod manager;
mod refresh_task;

pub use clock::{Clock, ManualClock, SystemClock};
pub use manager::{SessionManager, SessionState, SessionStatus};
pub use refresh_task::{spawn_refresh_task, RefreshMessage, RefreshTask, RefreshTaskHandle};
