//! Subscriber capability set and sum-type case projection.

use std::marker::PhantomData;

use crate::core::{IndexTs, Micros};
use crate::{Result, StreamError};

/// Flow-control answer from an entry or head callback.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EntryResponse {
    /// Keep the subscription running.
    More,
    /// Close the subscription; the runner exits cleanly.
    Done,
}

/// Answer to the one-shot terminate callback.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TerminationResponse {
    /// Drain whatever is already published, then exit.
    Wait,
    /// Exit immediately.
    Done,
}

/// Consumer callbacks, invoked from the subscription's dedicated thread.
///
/// `on_entry` sees entries strictly in index order; `on_head` fires only
/// once every entry at or before that head has been delivered.
pub trait Subscriber<E>: Send {
    fn on_entry(&mut self, entry: &E, current: IndexTs, last_known: IndexTs) -> EntryResponse;

    fn on_head(&mut self, head: Micros) -> EntryResponse {
        let _ = head;
        EntryResponse::More
    }

    /// Delivered exactly once when termination is requested, unless the
    /// subscriber already answered `Done`.
    fn on_terminate(&mut self) -> TerminationResponse {
        TerminationResponse::Done
    }

    /// Consulted when a case filter swallows an entry, letting a filtered
    /// subscriber close the subscription anyway.
    fn response_if_case_filtered(&mut self) -> EntryResponse {
        EntryResponse::More
    }
}

/// One alternative of a sum-type entry.
///
/// Implemented by exhaustive `match` over the entry enum; the `NAME` is
/// what case errors report.
pub trait EntryCase<E>: Sized {
    const NAME: &'static str;

    /// Borrow the case out of the entry, if it is the one held.
    fn peek(entry: &E) -> Option<&Self>;

    /// Consume the entry into the case, handing the entry back on
    /// mismatch.
    fn take(entry: E) -> std::result::Result<Self, E>;
}

/// Borrowing projection: fails with `NoValueOfType` when the entry holds
/// a different case.
pub fn case<E, C: EntryCase<E>>(entry: &E) -> Result<&C> {
    C::peek(entry).ok_or(StreamError::NoValueOfType { case: C::NAME })
}

/// Projection through an optional entry: `None` is `UninitializedCase`.
pub fn case_opt<E, C: EntryCase<E>>(entry: Option<&E>) -> Result<&C> {
    match entry {
        Some(entry) => case(entry),
        None => Err(StreamError::UninitializedCase),
    }
}

/// Consuming projection: fails with `IncompatibleCase` on mismatch.
pub fn into_case<E, C: EntryCase<E>>(entry: E) -> Result<C> {
    C::take(entry).map_err(|_| StreamError::IncompatibleCase { case: C::NAME })
}

/// Adapts a `Subscriber<C>` to a stream of `E`, forwarding only entries
/// holding case `C` and consulting `response_if_case_filtered` for the
/// rest.
pub struct CaseSubscriber<S, C> {
    inner: S,
    _case: PhantomData<fn() -> C>,
}

impl<S, C> CaseSubscriber<S, C> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            _case: PhantomData,
        }
    }

    pub fn into_inner(self) -> S {
        self.inner
    }
}

impl<E, C, S> Subscriber<E> for CaseSubscriber<S, C>
where
    C: EntryCase<E> + Send,
    S: Subscriber<C>,
{
    fn on_entry(&mut self, entry: &E, current: IndexTs, last_known: IndexTs) -> EntryResponse {
        match C::peek(entry) {
            Some(matched) => self.inner.on_entry(matched, current, last_known),
            None => self.inner.response_if_case_filtered(),
        }
    }

    fn on_head(&mut self, head: Micros) -> EntryResponse {
        self.inner.on_head(head)
    }

    fn on_terminate(&mut self) -> TerminationResponse {
        self.inner.on_terminate()
    }

    fn response_if_case_filtered(&mut self) -> EntryResponse {
        self.inner.response_if_case_filtered()
    }
}
