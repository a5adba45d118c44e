//! # Remote Accessor
//!
//! The engine never talks HTTP. It talks to a [`RemoteApi`] per identifier/wire-model
//! pair, and optionally to a [`SecretLister`] for values the read path never returns.
//!
//! Writes and deletes hand back a [`Submission`]:
//!
//! - `Completed` when the service finished synchronously,
//! - `Pending` with a [`Poller`] when it started a long-running operation,
//! - `Accepted` when it acknowledged the request asynchronously but gave nothing to poll.
//!   The engine then re-reads existence until the object reaches the expected state.

use crate::error::RemoteError;
use async_trait::async_trait;
use rand::Rng;
use std::fmt;
use std::time::Duration;
use tracing::trace;

/// Result of one poll of a long-running operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollStatus {
    InProgress,
    Succeeded,
    Failed(String),
}

/// Handle on a long-running remote operation.
#[async_trait]
pub trait Poller: Send {
    async fn poll(&mut self) -> Result<PollStatus, RemoteError>;

    /// Delay the service asked for before the next poll, if any.
    fn retry_after(&self) -> Option<Duration> {
        None
    }
}

/// Outcome of submitting a write or delete.
pub enum Submission {
    Completed,
    Pending(Box<dyn Poller>),
    Accepted,
}

impl fmt::Debug for Submission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Submission::Completed => f.write_str("Completed"),
            Submission::Pending(_) => f.write_str("Pending"),
            Submission::Accepted => f.write_str("Accepted"),
        }
    }
}

/// Typed access to one kind of remote object.
#[async_trait]
pub trait RemoteApi<I, W>: Send + Sync
where
    I: Send + Sync,
    W: Send,
{
    /// Fetch the object. A missing object is `Ok(None)`, never an error.
    async fn get(&self, id: &I) -> Result<Option<W>, RemoteError>;

    /// Write the full object.
    async fn create_or_update(&self, id: &I, model: W) -> Result<Submission, RemoteError>;

    /// Remove the object. A missing object is `Err(RemoteError::NotFound)`.
    async fn delete(&self, id: &I) -> Result<Submission, RemoteError>;
}

/// Lists secret values that [`RemoteApi::get`] redacts.
#[async_trait]
pub trait SecretLister<I, S>: Send + Sync
where
    I: Send + Sync,
{
    async fn list_secrets(&self, id: &I) -> Result<Vec<S>, RemoteError>;
}

/// Backoff between polls of a long-running operation.
///
/// Exponential with jitter, capped at `max_interval`. A `Retry-After` from the service
/// takes precedence.
#[derive(Debug, Clone)]
pub struct PollBackoff {
    next: Duration,
    max_interval: Duration,
    multiplier: f64,
}

impl PollBackoff {
    pub fn new(initial: Duration, max_interval: Duration) -> Self {
        Self {
            next: initial,
            max_interval,
            multiplier: 1.5,
        }
    }

    /// The delay before the next attempt, advancing the schedule.
    pub fn next_delay(&mut self) -> Duration {
        let base = self.next;
        self.next = Duration::from_secs_f64(
            (base.as_secs_f64() * self.multiplier).min(self.max_interval.as_secs_f64()),
        );
        if base.is_zero() {
            return base;
        }
        // 0.5x to 1.5x jitter
        let jitter = rand::thread_rng().gen_range(0.5..1.5);
        Duration::from_secs_f64(base.as_secs_f64() * jitter).min(self.max_interval)
    }
}

/// Poll until the operation reaches a terminal state.
///
/// There is no deadline here; the engine bounds the whole phase with a timeout.
pub async fn poll_until_done(
    poller: &mut dyn Poller,
    backoff: &mut PollBackoff,
) -> Result<(), RemoteError> {
    let mut attempt = 0u32;
    loop {
        attempt += 1;
        match poller.poll().await? {
            PollStatus::Succeeded => return Ok(()),
            PollStatus::Failed(reason) => return Err(RemoteError::OperationFailed(reason)),
            PollStatus::InProgress => {
                let delay = poller.retry_after().unwrap_or_else(|| backoff.next_delay());
                trace!(attempt, delay_ms = delay.as_millis() as u64, "Operation in progress");
                tokio::time::sleep(delay).await;
            }
        }
    }
}
