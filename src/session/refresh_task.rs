use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::session::SessionManager;

/// Message type for the background refresher
#[derive(Debug)]
pub enum RefreshMessage {
    /// Refresh immediately instead of waiting for the next tick
    RefreshNow,
    /// Stop the refresher
    Shutdown,
}

/// Handle owning a running background refresher
pub struct RefreshTaskHandle {
    tx: mpsc::Sender<RefreshMessage>,
    task: JoinHandle<()>,
}

impl RefreshTaskHandle {
    pub async fn refresh_now(&self) {
        if let Err(e) = self.tx.send(RefreshMessage::RefreshNow).await {
            warn!("Failed to request refresh: {}", e);
        }
    }

    /// Stop the refresher and wait for it to exit.
    ///
    /// A refresh already running is allowed to finish; it is bounded by the
    /// session's authentication timeout.
    pub async fn shutdown(self) {
        let _ = self.tx.send(RefreshMessage::Shutdown).await;
        if let Err(e) = self.task.await {
            error!("Refresh task join error: {}", e);
        }
    }
}

/// Keeps a session warm by refreshing it on a fixed interval, independent of traffic
pub struct RefreshTask {
    session: SessionManager,
    every: Duration,
    rx: mpsc::Receiver<RefreshMessage>,
}

impl RefreshTask {
    pub fn new(session: SessionManager, every: Duration) -> (Self, mpsc::Sender<RefreshMessage>) {
        let (tx, rx) = mpsc::channel(8);
        (Self { session, every, rx }, tx)
    }

    pub async fn run(mut self) {
        info!(
            network = %self.session.network(),
            "Credential refresher started (every {:?})",
            self.every
        );

        if self.session.needs_refresh() {
            self.refresh().await;
        }

        let mut timer = interval(self.every);
        timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
        timer.tick().await; // Skip the first immediate tick

        loop {
            tokio::select! {
                _ = timer.tick() => self.refresh().await,
                msg = self.rx.recv() => match msg {
                    Some(RefreshMessage::RefreshNow) => self.refresh().await,
                    Some(RefreshMessage::Shutdown) | None => break,
                },
            }
        }

        info!(network = %self.session.network(), "Credential refresher shutting down");
    }

    async fn refresh(&self) {
        match self.session.refresh().await {
            Ok(_) => debug!(network = %self.session.network(), "Scheduled refresh complete"),
            Err(e) => warn!(network = %self.session.network(), "Scheduled refresh failed: {}", e),
        }
    }
}

/// Spawn the refresher for `session` as a tokio task
pub fn spawn_refresh_task(session: SessionManager, every: Duration) -> RefreshTaskHandle {
    let (refresher, tx) = RefreshTask::new(session, every);
    let task = tokio::spawn(async move {
        refresher.run().await;
    });
    RefreshTaskHandle { tx, task }
}
