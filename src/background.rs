//! Deferred cache writes that outlive the request that scheduled them.
//!
//! A strategy may hand its response back to the caller while a cache write
//! is still running. Those writes are spawned onto a [`TaskTracker`] so they
//! are never abandoned, and so shutdown paths and tests can wait for them
//! with [`BackgroundWrites::settle`] instead of sleeping.

use std::future::Future;
use std::sync::Arc;

use tokio::sync::Mutex;
use tokio_util::task::TaskTracker;

use crate::error::Result;

/// Tracker for in-flight background cache writes.
#[derive(Debug, Clone, Default)]
pub struct BackgroundWrites {
    tracker: TaskTracker,
    // Held across close/wait/reopen so concurrent settles cannot interleave.
    settling: Arc<Mutex<()>>,
}

impl BackgroundWrites {
    /// Creates an empty tracker.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawns `write` in the background.
    ///
    /// The write's outcome is intentionally non-fatal: an error is logged
    /// under `label` and otherwise discarded. Must be called from within a
    /// Tokio runtime.
    pub fn spawn<F>(&self, label: String, write: F)
    where
        F: Future<Output = Result<()>> + Send + 'static,
    {
        self.tracker.spawn(async move {
            match write.await {
                Ok(()) => log::debug!("Background write finished: {label}"),
                Err(e) => log::warn!("Background write failed: {label}: {e}"),
            }
        });
    }

    /// Number of writes that have not finished yet.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.tracker.len()
    }

    /// Waits for every write spawned so far to finish.
    ///
    /// New writes may still be spawned afterwards. Safe to call from any
    /// number of clones at once.
    pub async fn settle(&self) {
        let _guard = self.settling.lock().await;
        self.tracker.close();
        self.tracker.wait().await;
        self.tracker.reopen();
    }
}
