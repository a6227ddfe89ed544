// SPDX-License-Identifier: MIT OR Apache-2.0
use std::sync::Arc;
use tokio::sync::watch;

/// Stop signal shared between a [`RelayChannel`](crate::RelayChannel) and
/// its background reader task.
///
/// Clones observe the same state. Once raised the signal stays raised.
#[derive(Clone)]
pub struct CancellationToken {
    stop: Arc<watch::Sender<bool>>,
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}

impl CancellationToken {
    /// A token that has not been raised.
    #[must_use]
    pub fn new() -> Self {
        let (stop, _) = watch::channel(false);
        Self {
            stop: Arc::new(stop),
        }
    }

    /// Raise the signal. Raising twice is harmless.
    pub fn cancel(&self) {
        self.stop.send_replace(true);
    }

    /// Whether the signal has been raised.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        *self.stop.borrow()
    }

    /// Resolve once the signal is raised.
    pub async fn cancelled(&self) {
        let mut rx = self.stop.subscribe();
        // The sender lives as long as `self`, so `wait_for` only returns
        // once the value is `true`.
        let _ = rx.wait_for(|raised| *raised).await;
    }
}

impl std::fmt::Debug for CancellationToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "CancellationToken(raised={})", self.is_cancelled())
    }
}
