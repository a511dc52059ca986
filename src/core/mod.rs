//! Time and log-position primitives shared by every layer.

pub mod error;

use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Epoch-microsecond wall time.
///
/// The ordering primitive of a stream: entry timestamps are strictly
/// increasing, the head is non-decreasing, and both are `Micros`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Micros(pub u64);

impl Micros {
    pub const ZERO: Micros = Micros(0);

    pub fn as_u64(self) -> u64 {
        self.0
    }

    /// The next representable instant. Used to nudge auto-assigned
    /// timestamps past a tie.
    pub fn next(self) -> Micros {
        Micros(self.0.saturating_add(1))
    }

    pub fn saturating_sub(self, us: u64) -> Micros {
        Micros(self.0.saturating_sub(us))
    }
}

impl fmt::Display for Micros {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}us", self.0)
    }
}

impl From<u64> for Micros {
    fn from(us: u64) -> Self {
        Micros(us)
    }
}

/// Position of one entry: dense 0-based index plus its timestamp.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexTs {
    pub index: u64,
    pub us: Micros,
}

impl IndexTs {
    pub fn new(index: u64, us: Micros) -> Self {
        Self { index, us }
    }
}

impl PartialOrd for IndexTs {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for IndexTs {
    fn cmp(&self, other: &Self) -> Ordering {
        // Index and timestamp order agree on any one stream; index wins
        // for cross-stream comparisons of equal timestamps.
        self.index
            .cmp(&other.index)
            .then_with(|| self.us.cmp(&other.us))
    }
}

/// One persisted record: position plus the user payload.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexedEntry<E> {
    pub idx_ts: IndexTs,
    pub entry: E,
}

impl<E> IndexedEntry<E> {
    pub fn new(idx_ts: IndexTs, entry: E) -> Self {
        Self { idx_ts, entry }
    }
}

/// Atomic snapshot of the stream frontier.
///
/// `head >= last.us` whenever `last` exists; the head may run ahead of
/// the last entry (heartbeat).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HeadAndLast {
    pub head: Micros,
    pub last: Option<IndexTs>,
}

impl HeadAndLast {
    /// Number of entries implied by the snapshot.
    pub fn size(&self) -> u64 {
        self.last.map_or(0, |last| last.index + 1)
    }
}

/// Who currently holds the write capability for a stream.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Authority {
    /// The stream holds its own publisher.
    Own,
    /// The publisher was moved out to external tooling.
    External,
}

/// Names under which the entry type is exposed by the schema endpoint.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamNamespaceName {
    pub namespace_name: String,
    pub entry_name: String,
}

impl StreamNamespaceName {
    pub fn new(namespace_name: impl Into<String>, entry_name: impl Into<String>) -> Self {
        Self {
            namespace_name: namespace_name.into(),
            entry_name: entry_name.into(),
        }
    }
}

impl Default for StreamNamespaceName {
    fn default() -> Self {
        Self::new("StrandSchema", "TopLevelEntry")
    }
}
