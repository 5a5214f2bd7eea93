//! Engine lifecycle.
//!
//! ```text
//!  new() ──► Created ── start() ──► Running ── request_stop() ──► Stopping
//!                                                                    │
//!                                     await_drained() returns ◄──────┘
//!                                     once every tracked task ends
//! ```
//!
//! Every task the engine spawns (ordered workers, concurrent invocations)
//! is tracked, so shutdown can wait for in-flight work to finish.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{info, warn};

/// Start/stop control shared by the dispatcher and its workers.
#[derive(Debug, Clone, Default)]
pub struct Lifecycle {
    started: Arc<AtomicBool>,
    token: CancellationToken,
    tracker: TaskTracker,
}

impl Lifecycle {
    /// Creates a lifecycle in the created state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Begins accepting work.
    pub fn start(&self) {
        if !self.started.swap(true, Ordering::SeqCst) {
            info!("Dispatcher started");
        }
    }

    /// Returns `true` between [`start`](Self::start) and [`request_stop`](Self::request_stop).
    pub fn is_running(&self) -> bool {
        self.started.load(Ordering::SeqCst) && !self.token.is_cancelled()
    }

    /// Returns `true` once a stop has been requested.
    pub fn is_stopping(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Stops accepting work and signals workers to drain and exit.
    pub fn request_stop(&self) {
        if !self.token.is_cancelled() {
            info!(in_flight = self.tracker.len(), "Dispatcher stop requested");
        }
        self.token.cancel();
        self.tracker.close();
    }

    /// Waits for every tracked task to finish.
    ///
    /// Only completes after [`request_stop`](Self::request_stop). Returns
    /// `false` if `timeout` elapsed first.
    pub async fn await_drained(&self, timeout: Option<Duration>) -> bool {
        let Some(timeout) = timeout else {
            self.tracker.wait().await;
            return true;
        };
        match tokio::time::timeout(timeout, self.tracker.wait()).await {
            Ok(()) => true,
            Err(_) => {
                warn!(
                    remaining = self.tracker.len(),
                    timeout_ms = timeout.as_millis() as u64,
                    "Timed out waiting for handlers to drain"
                );
                false
            }
        }
    }

    /// The cancellation signal observed by workers.
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Spawns a tracked task.
    pub fn spawn<F>(&self, task: F) -> JoinHandle<F::Output>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        self.tracker.spawn(task)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_state_transitions() {
        let lifecycle = Lifecycle::new();
        assert!(!lifecycle.is_running());

        lifecycle.start();
        assert!(lifecycle.is_running());
        assert!(!lifecycle.is_stopping());

        lifecycle.request_stop();
        assert!(!lifecycle.is_running());
        assert!(lifecycle.is_stopping());
        assert!(lifecycle.token().is_cancelled());
    }

    #[tokio::test]
    async fn test_await_drained_waits_for_tasks() {
        let lifecycle = Lifecycle::new();
        lifecycle.start();
        let (tx, rx) = tokio::sync::oneshot::channel::<()>();
        lifecycle.spawn(async move {
            let _ = rx.await;
        });

        lifecycle.request_stop();
        assert!(!lifecycle.await_drained(Some(Duration::from_millis(20))).await);

        tx.send(()).unwrap();
        assert!(lifecycle.await_drained(Some(Duration::from_secs(1))).await);
    }
}
