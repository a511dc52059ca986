//! The per-subscription runner thread.
//!
//! Each subscription drains available entries in index order, delivers a
//! head callback once caught up past a moved head, then blocks on the
//! notifier until there is data, head movement, or a termination
//! request. Entries are copied out in bounded batches under the publish
//! lock and delivered with the lock released, so user callbacks never
//! stall the publisher.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::{debug, error};

use crate::core::Micros;
use crate::notify::TerminateSignal;
use crate::persist::Persister;
use crate::scope::SubscriberScope;
use crate::stream::StreamState;
use crate::subscriber::{EntryResponse, Subscriber, TerminationResponse};

/// Invoked under the registry lock after the runner finishes.
pub(crate) type DoneCallback = Box<dyn FnOnce() + Send>;

/// Upper bound on entries copied out per lock acquisition.
const ENTRY_BATCH: u64 = 256;

pub(crate) fn spawn<P, S>(
    state: Arc<StreamState<P>>,
    subscriber: S,
    begin_idx: u64,
    done_cb: Option<DoneCallback>,
) -> SubscriberScope
where
    P: Persister,
    S: Subscriber<P::Entry> + 'static,
{
    let signal = TerminateSignal::new();
    let done = Arc::new(AtomicBool::new(false));

    let thread_state = Arc::clone(&state);
    let thread_signal = signal.clone();
    let thread_done = Arc::clone(&done);
    let handle = std::thread::Builder::new()
        .name("strand-subscriber".to_string())
        .spawn(move || {
            run(
                thread_state,
                subscriber,
                begin_idx,
                thread_signal,
                thread_done,
                done_cb,
            );
        })
        .expect("spawn subscriber thread");

    let terminate_state = Arc::clone(&state);
    let terminate_signal = signal.clone();
    let request_terminate = Box::new(move || terminate_state.raise(&terminate_signal));

    SubscriberScope::new(handle, request_terminate, done)
}

fn run<P, S>(
    state: Arc<StreamState<P>>,
    mut subscriber: S,
    begin_idx: u64,
    signal: TerminateSignal,
    done: Arc<AtomicBool>,
    done_cb: Option<DoneCallback>,
) where
    P: Persister,
    S: Subscriber<P::Entry>,
{
    debug!(begin_idx, "subscription runner started");
    let outcome = catch_unwind(AssertUnwindSafe(|| {
        drive(&state, &mut subscriber, begin_idx, &signal);
    }));
    if outcome.is_err() {
        // A panicking callback kills only this subscription.
        error!(begin_idx, "subscriber callback panicked; subscription closed");
    }

    done.store(true, Ordering::Release);
    // The registry lock serializes the done callback against registration
    // and cleanup of this subscription's registry slot.
    let _registry = state.lock_http_subs();
    if let Some(cb) = done_cb {
        cb();
    }
    debug!(begin_idx, "subscription runner finished");
}

fn drive<P, S>(
    state: &StreamState<P>,
    subscriber: &mut S,
    begin_idx: u64,
    signal: &TerminateSignal,
) where
    P: Persister,
    S: Subscriber<P::Entry>,
{
    let mut index = begin_idx;
    let mut head_seen: Option<Micros> = None;
    let mut terminate_sent = false;

    macro_rules! deliver_terminate_once {
        () => {
            if signal.raised() && !terminate_sent {
                terminate_sent = true;
                if subscriber.on_terminate() == TerminationResponse::Done {
                    return;
                }
            }
        };
    }

    loop {
        deliver_terminate_once!();

        let frontier = state.lock_persister().head_and_last();
        let size = frontier.size();
        let head_moved = head_seen.is_none_or(|seen| frontier.head > seen);

        if size > index || head_moved {
            if size > index {
                let end = size.min(index + ENTRY_BATCH);
                let batch = state.lock_persister().entries(index, end);
                for item in batch {
                    deliver_terminate_once!();
                    let last_known = frontier.last.unwrap_or(item.idx_ts);
                    let response = subscriber.on_entry(&item.entry, item.idx_ts, last_known);
                    index = item.idx_ts.index + 1;
                    if response == EntryResponse::Done {
                        return;
                    }
                }
                if index < size {
                    // More already-published entries to drain before any
                    // head callback.
                    continue;
                }
            }
            if size > begin_idx
                && head_moved
                && let Some(last) = frontier.last
                && frontier.head > last.us
                && subscriber.on_head(frontier.head) == EntryResponse::Done
            {
                return;
            }
            head_seen = Some(frontier.head);
        } else {
            if terminate_sent {
                // The subscriber asked to linger (`Wait`); it is caught up
                // now, so the drain is over.
                return;
            }
            let mut guard = state.lock_persister();
            while !(signal.raised()
                || guard.size() > index
                || (index > begin_idx
                    && head_seen.is_some_and(|seen| guard.current_head() > seen)))
            {
                guard = state.notifier.wait(guard);
            }
        }
    }
}
