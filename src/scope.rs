//! Scoped ownership of one subscription runner thread.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;

/// Exclusive handle to a running subscription.
///
/// Dropping the scope requests termination and joins the runner thread,
/// so a subscriber can never outlive the frame that created it.
/// Moveable, not clonable.
pub struct SubscriberScope {
    handle: Option<JoinHandle<()>>,
    request_terminate: Box<dyn Fn() + Send + Sync>,
    termination_requested: AtomicBool,
    done: Arc<AtomicBool>,
}

impl SubscriberScope {
    pub(crate) fn new(
        handle: JoinHandle<()>,
        request_terminate: Box<dyn Fn() + Send + Sync>,
        done: Arc<AtomicBool>,
    ) -> Self {
        Self {
            handle: Some(handle),
            request_terminate,
            termination_requested: AtomicBool::new(false),
            done,
        }
    }

    /// Request termination without waiting for the runner to finish.
    /// Idempotent.
    pub fn async_terminate(&self) {
        if !self.termination_requested.swap(true, Ordering::AcqRel) {
            (self.request_terminate)();
        }
    }

    /// Whether the runner has delivered its last callback and exited the
    /// loop.
    pub fn is_done(&self) -> bool {
        self.done.load(Ordering::Acquire)
    }
}

impl Drop for SubscriberScope {
    fn drop(&mut self) {
        self.async_terminate();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl std::fmt::Debug for SubscriberScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriberScope")
            .field(
                "termination_requested",
                &self.termination_requested.load(Ordering::Acquire),
            )
            .field("done", &self.is_done())
            .finish()
    }
}
