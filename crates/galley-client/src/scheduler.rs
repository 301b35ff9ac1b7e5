//! Single-slot debounce timer.
//!
//! The autosave path needs exactly one outstanding timer per section:
//! re-arming cancels the previous timer, manual save and teardown cancel
//! outright. Modeling this as an explicit `arm`/`cancel` pair keeps the
//! cancellation story unambiguous and unit-testable under a paused tokio
//! clock.

use std::future::Future;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::trace;

/// One cancellable, re-armable delayed task.
///
/// Dropping the timer aborts any pending fire.
#[derive(Debug, Default)]
pub struct DebounceTimer {
    handle: Option<JoinHandle<()>>,
}

impl DebounceTimer {
    pub fn new() -> Self {
        Self { handle: None }
    }

    /// Arm the timer: run `task` after `delay`. A previously armed timer is
    /// cancelled first — at most one fire is ever outstanding.
    pub fn arm<F>(&mut self, delay: Duration, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.cancel();
        trace!("arming debounce timer for {:?}", delay);
        self.handle = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            task.await;
        }));
    }

    /// Cancel the pending fire, if any.
    pub fn cancel(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }

    /// Whether a fire is still pending (best-effort: a completed task counts
    /// as disarmed).
    pub fn is_armed(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }
}

impl Drop for DebounceTimer {
    fn drop(&mut self) {
        self.cancel();
    }
}

// ============================================================================
// Tests
// ============================================================================
