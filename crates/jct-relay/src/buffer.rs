// SPDX-License-Identifier: MIT OR Apache-2.0
use serde_json::Value;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::time::Instant;

/// How often the wait primitives re-scan the buffer.
pub const POLL_INTERVAL: Duration = Duration::from_millis(200);

/// Append-only, shareable list of received events.
///
/// The relay reader is the only producer; test bodies read snapshots and
/// never remove entries except through [`clear`](Self::clear).
#[derive(Debug, Clone, Default)]
pub struct EventBuffer {
    events: Arc<Mutex<Vec<Value>>>,
}

impl EventBuffer {
    /// An empty buffer.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Value>> {
        self.events.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append one event.
    pub fn push(&self, event: Value) {
        self.lock().push(event);
    }

    /// Copy of every buffered event, oldest first.
    pub fn snapshot(&self) -> Vec<Value> {
        self.lock().clone()
    }

    /// Number of buffered events.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Returns `true` if nothing has been received.
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Drop every buffered event.
    pub fn clear(&self) {
        self.lock().clear();
    }

    fn first_match<F>(&self, predicate: &F) -> Option<Value>
    where
        F: Fn(&Value) -> bool,
    {
        self.lock().iter().find(|e| predicate(e)).cloned()
    }

    /// Wait until at least `count` events are buffered or `timeout` passes,
    /// then return a snapshot either way.
    pub async fn wait_for_count(&self, count: usize, timeout: Duration) -> Vec<Value> {
        let deadline = Instant::now() + timeout;
        loop {
            let now = Instant::now();
            if self.len() >= count || now >= deadline {
                return self.snapshot();
            }
            tokio::time::sleep(POLL_INTERVAL.min(deadline - now)).await;
        }
    }

    /// First buffered event satisfying `predicate`, waiting up to `timeout`.
    pub async fn wait_for_match<F>(&self, predicate: F, timeout: Duration) -> Option<Value>
    where
        F: Fn(&Value) -> bool,
    {
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(hit) = self.first_match(&predicate) {
                return Some(hit);
            }
            let now = Instant::now();
            if now >= deadline {
                return None;
            }
            tokio::time::sleep(POLL_INTERVAL.min(deadline - now)).await;
        }
    }
}
