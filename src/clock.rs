//! Epoch-microsecond wall clock and timestamp auto-assignment.
//!
//! The clock itself is not required to be monotonic; strict ordering is
//! enforced where timestamps meet the log, by nudging an auto-assigned
//! timestamp past whatever the stream has already seen.

use std::time::{SystemTime, UNIX_EPOCH};

use crate::core::{HeadAndLast, Micros};

/// Current wall time in microseconds since the Unix epoch.
pub fn now_us() -> Micros {
    let us = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_micros();
    Micros(us as u64)
}

/// Timestamp for an auto-timestamped publish.
///
/// Strictly past the last entry and at least at the head, even when the
/// wall clock stalls or jumps backward.
pub fn next_publish_us(frontier: &HeadAndLast) -> Micros {
    let mut us = now_us();
    if let Some(last) = frontier.last {
        us = us.max(last.us.next());
    }
    us.max(frontier.head.next())
}

/// Timestamp for an auto-timestamped head update: strictly past the
/// current head.
pub fn next_head_us(head: Micros) -> Micros {
    now_us().max(head.next())
}
