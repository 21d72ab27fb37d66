use std::future::Future;
use std::time::Duration;

use crate::partner::LinkOutcome;

/// How one attempt of a retried operation ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Attempt<T> {
    Done(T),
    Retry,
    Abort(String),
}

impl From<LinkOutcome> for Attempt<String> {
    fn from(outcome: LinkOutcome) -> Self {
        match outcome {
            LinkOutcome::Success(link) => Attempt::Done(link),
            LinkOutcome::Transient => Attempt::Retry,
            LinkOutcome::Fatal(reason) => Attempt::Abort(reason),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryOutcome<T> {
    Succeeded { value: T, attempts: u32 },
    Exhausted { attempts: u32 },
    Aborted { attempts: u32, reason: String },
}

impl<T> RetryOutcome<T> {
    pub fn attempts(&self) -> u32 {
        match self {
            RetryOutcome::Succeeded { attempts, .. }
            | RetryOutcome::Exhausted { attempts }
            | RetryOutcome::Aborted { attempts, .. } => *attempts,
        }
    }

    pub fn into_value(self) -> Option<T> {
        match self {
            RetryOutcome::Succeeded { value, .. } => Some(value),
            _ => None,
        }
    }
}

/// Bounded retry with a fixed delay between attempts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
    delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(4, Duration::from_millis(1500))
    }
}

impl RetryPolicy {
    /// `max_attempts` counts the first try; it is at least 1.
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            delay,
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Run `op` until it finishes, aborts, or the attempts run out.
    ///
    /// `op` receives the 1-based attempt number.
    pub async fn run<T, F, Fut>(&self, mut op: F) -> RetryOutcome<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Attempt<T>>,
    {
        for attempt in 1..=self.max_attempts {
            match op(attempt).await {
                Attempt::Done(value) => {
                    return RetryOutcome::Succeeded {
                        value,
                        attempts: attempt,
                    }
                }
                Attempt::Abort(reason) => {
                    return RetryOutcome::Aborted {
                        attempts: attempt,
                        reason,
                    }
                }
                Attempt::Retry if attempt < self.max_attempts => {
                    tokio::time::sleep(self.delay).await;
                }
                Attempt::Retry => {}
            }
        }

        RetryOutcome::Exhausted {
            attempts: self.max_attempts,
        }
    }
}
