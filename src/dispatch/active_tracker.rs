//! # Active Message Tracking
//!
//! A single atomic counter of in-flight handler executions. The hosting
//! harness consults it before honoring a shutdown or time-to-live
//! request: shutdown waits until the counter reaches zero and never
//! pre-empts an in-flight handler.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Shared counter of messages currently executing.
#[derive(Debug, Default)]
pub struct ActiveMessageTracker {
    active: AtomicI64,
}

impl ActiveMessageTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that a message entered execution.
    pub fn increment_active_messages(&self) {
        self.active.fetch_add(1, Ordering::SeqCst);
    }

    /// Record that a message left execution.
    pub fn decrement_active_messages(&self) {
        self.active.fetch_sub(1, Ordering::SeqCst);
    }

    /// Messages currently executing.
    pub fn active_messages_count(&self) -> i64 {
        self.active.load(Ordering::SeqCst)
    }

    /// Whether it is safe to shut down.
    pub fn is_idle(&self) -> bool {
        self.active_messages_count() == 0
    }

    /// Wait until every in-flight handler has exited.
    pub async fn wait_until_idle(&self, poll_interval: Duration) {
        while !self.is_idle() {
            tokio::time::sleep(poll_interval).await;
        }
    }
}

/// Guard that holds one slot of the counter for its lifetime, so every
/// dispatch exit path decrements, including exceptional ones.
#[derive(Debug)]
pub struct ActiveMessageGuard {
    tracker: Arc<ActiveMessageTracker>,
}

impl ActiveMessageGuard {
    pub fn new(tracker: Arc<ActiveMessageTracker>) -> Self {
        tracker.increment_active_messages();
        Self { tracker }
    }
}

impl Drop for ActiveMessageGuard {
    fn drop(&mut self) {
        self.tracker.decrement_active_messages();
    }
}
