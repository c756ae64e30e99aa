//! Background trim and journal compaction

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::runtime::Handle;
use tracing::warn;

/// Runs cleanup jobs one at a time.
///
/// A request made while another is still queued is folded into the queued one.
/// Jobs run on the runtime's blocking pool; without a runtime they run on the
/// calling thread.
pub(crate) struct CleanupWorker {
    runtime: Option<Handle>,
    scheduled: Arc<AtomicBool>,
}

impl CleanupWorker {
    pub fn new(runtime: Option<Handle>) -> Self {
        Self {
            runtime,
            scheduled: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Schedule `job`. Returns false when a queued job already covers it.
    pub fn schedule<F>(&self, job: F) -> bool
    where
        F: FnOnce() + Send + 'static,
    {
        if self.scheduled.swap(true, Ordering::AcqRel) {
            return false;
        }
        match &self.runtime {
            Some(handle) => {
                let task = handle.spawn_blocking(job);
                // A job that panicked or was cancelled must not hold the slot.
                let scheduled = Arc::clone(&self.scheduled);
                handle.spawn(async move {
                    if let Err(e) = task.await {
                        warn!(error = %e, "Cleanup job did not complete");
                        scheduled.store(false, Ordering::Release);
                    }
                });
            }
            None => job(),
        }
        true
    }

    /// Called by a job as it starts so later requests queue a fresh run.
    pub fn started(&self) {
        self.scheduled.store(false, Ordering::Release);
    }

    pub fn is_background(&self) -> bool {
        self.runtime.is_some()
    }
}
