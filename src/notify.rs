//! Wakeup primitives for blocked subscriber runners.
//!
//! The notifier is a broadcast condition variable paired with the
//! stream's publish mutex: publishers broadcast after every append or
//! head advance, runners re-check their predicate under the same guard,
//! so a wakeup can never be lost between the check and the sleep.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, MutexGuard, PoisonError};

#[derive(Debug, Default)]
pub(crate) struct Notifier {
    cvar: Condvar,
}

impl Notifier {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Wake every blocked runner. Callers hold the publish mutex around
    /// the state change that justifies the broadcast.
    pub(crate) fn notify_all(&self) {
        self.cvar.notify_all();
    }

    pub(crate) fn wait<'a, T>(&self, guard: MutexGuard<'a, T>) -> MutexGuard<'a, T> {
        self.cvar
            .wait(guard)
            .unwrap_or_else(PoisonError::into_inner)
    }
}

/// Per-subscription termination request.
///
/// Raised under the publish mutex and followed by a broadcast, so a
/// runner blocked on the notifier observes it on the next predicate
/// check. Cheap to clone; all clones share the flag.
#[derive(Clone, Debug, Default)]
pub(crate) struct TerminateSignal {
    raised: Arc<AtomicBool>,
}

impl TerminateSignal {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn raised(&self) -> bool {
        self.raised.load(Ordering::Acquire)
    }

    /// Set the flag. The caller holds the publish mutex and broadcasts
    /// the notifier right after.
    pub(crate) fn set(&self) {
        self.raised.store(true, Ordering::Release);
    }
}
