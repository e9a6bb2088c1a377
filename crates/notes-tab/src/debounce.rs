//! Trailing-edge debouncer for local edits.
//!
//! Every `schedule` replaces the pending value and pushes the deadline out by
//! the full delay, so only the last value of a burst is committed. The owner
//! awaits `ready()` in its event loop and then calls `take()`.

use std::future::pending;
use std::time::Duration;
use tokio::time::{Instant, sleep_until};

#[derive(Debug)]
pub struct Debouncer<T> {
    delay: Duration,
    pending: Option<(T, Instant)>,
}

impl<T> Debouncer<T> {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            pending: None,
        }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Replace the pending value and restart the quiet period.
    pub fn schedule(&mut self, value: T) {
        self.pending = Some((value, Instant::now() + self.delay));
    }

    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    pub fn peek(&self) -> Option<&T> {
        self.pending.as_ref().map(|(value, _)| value)
    }

    /// Whether the quiet period has elapsed.
    pub fn is_due(&self) -> bool {
        self.pending
            .as_ref()
            .is_some_and(|(_, deadline)| *deadline <= Instant::now())
    }

    /// Resolves once the quiet period ends. Never resolves when nothing is
    /// pending.
    pub async fn ready(&self) {
        match &self.pending {
            Some((_, deadline)) => sleep_until(*deadline).await,
            None => pending::<()>().await,
        }
    }

    /// Remove the pending value regardless of its deadline.
    pub fn take(&mut self) -> Option<T> {
        self.pending.take().map(|(value, _)| value)
    }

    /// Drop the pending value without committing it.
    pub fn cancel(&mut self) {
        self.pending = None;
    }
}
