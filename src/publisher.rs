//! The single-holder write capability.
//!
//! Exactly one `Publisher` exists per stream at any time. A stream is
//! born holding its own; replication tooling that must be the sole
//! writer takes it over with `Stream::move_publisher_to` and hands it
//! back with `Stream::acquire_publisher`.

use std::sync::Arc;

use crate::Result;
use crate::core::{IndexTs, Micros};
use crate::persist::Persister;
use crate::stream::StreamState;

/// Move-only append/head-advance capability over one stream.
pub struct Publisher<P> {
    state: Arc<StreamState<P>>,
}

impl<P: Persister> Publisher<P> {
    pub(crate) fn new(state: Arc<StreamState<P>>) -> Self {
        Self { state }
    }

    /// Append with an auto-assigned timestamp.
    pub fn publish(&self, entry: P::Entry) -> Result<IndexTs> {
        self.mutate(|persister| persister.append(entry))
    }

    /// Append at a caller-supplied timestamp.
    pub fn publish_at(&self, entry: P::Entry, us: Micros) -> Result<IndexTs> {
        self.mutate(|persister| persister.append_at(entry, us))
    }

    /// Advance the head without appending (heartbeat).
    pub fn update_head(&self) -> Result<Micros> {
        self.mutate(|persister| persister.update_head())
    }

    /// Advance the head to a caller-supplied timestamp.
    pub fn update_head_at(&self, us: Micros) -> Result<()> {
        self.mutate(|persister| persister.update_head_at(us))
    }

    /// Lock, mutate, broadcast. Subscribers observe the mutation on the
    /// next predicate check; nothing is broadcast on failure.
    fn mutate<T>(&self, op: impl FnOnce(&mut P) -> Result<T>) -> Result<T> {
        self.state.check_open()?;
        let mut persister = self.state.lock_persister();
        let result = op(&mut persister)?;
        self.state.notifier.notify_all();
        Ok(result)
    }
}

impl<P> std::fmt::Debug for Publisher<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Publisher").finish_non_exhaustive()
    }
}

/// Receiver side of a publisher transfer.
pub trait PublisherAcquirer<P: Persister> {
    fn accept_publisher(&mut self, publisher: Publisher<P>);
}

/// The trivial acquirer: stashes the publisher in an `Option`.
impl<P: Persister> PublisherAcquirer<P> for Option<Publisher<P>> {
    fn accept_publisher(&mut self, publisher: Publisher<P>) {
        *self = Some(publisher);
    }
}
