//! Persistence contract and backends.
//!
//! A persister owns the ordered entry sequence and the head timestamp.
//! It performs no locking of its own: the stream wraps the persister in
//! its publish mutex, and holding that guard is what authorizes calls
//! here. Readers that need an atomic view take `head_and_last` under the
//! same guard.

mod file;
mod memory;

pub use file::FilePersister;
pub use memory::MemoryPersister;

use crate::Result;
use crate::clock;
use crate::core::{HeadAndLast, IndexTs, IndexedEntry, Micros};

/// Append-only storage for one stream.
///
/// Invariants every implementation upholds:
/// - indices are dense and 0-based;
/// - entry timestamps are strictly increasing;
/// - the head is non-decreasing and never behind the last entry.
pub trait Persister: Send + 'static {
    type Entry: Clone + Send + Sync + 'static;

    /// Append with a caller-supplied timestamp.
    ///
    /// Requires `us` strictly past the last entry (`InconsistentTimestamp`)
    /// and at least at the head (`HeadAlreadyPast`). Advances the head to
    /// `us`. On error the sequence and head are unchanged.
    fn append_at(&mut self, entry: Self::Entry, us: Micros) -> Result<IndexTs>;

    /// Append with an auto-assigned timestamp (wall clock, nudged past
    /// the last entry and the head).
    fn append(&mut self, entry: Self::Entry) -> Result<IndexTs> {
        let us = clock::next_publish_us(&self.head_and_last());
        self.append_at(entry, us)
    }

    /// Advance the head to `us` without appending. Requires `us` at or
    /// past the current head (`HeadWouldRegress`).
    fn update_head_at(&mut self, us: Micros) -> Result<()>;

    /// Advance the head past its current value using the wall clock.
    fn update_head(&mut self) -> Result<Micros> {
        let us = clock::next_head_us(self.current_head());
        self.update_head_at(us)?;
        Ok(us)
    }

    fn size(&self) -> u64;

    /// Head and last-entry position as one consistent snapshot.
    fn head_and_last(&self) -> HeadAndLast;

    fn current_head(&self) -> Micros {
        self.head_and_last().head
    }

    /// Copy of the entries in `[begin_idx, end_idx)`, clamped to the
    /// current size. Tolerates `end_idx` past the end.
    fn entries(&self, begin_idx: u64, end_idx: u64) -> Vec<IndexedEntry<Self::Entry>>;

    /// `(first index with us >= from, first index with us > till)` by
    /// binary search over the timestamp column. `None` means unbounded,
    /// so the second component is the current size.
    fn index_range_by_timestamp(&self, from: Micros, till: Option<Micros>) -> (u64, u64);
}
