//! In-memory persister: the default backend.

use crate::core::{HeadAndLast, IndexTs, IndexedEntry, Micros};
use crate::{Result, StreamError};

use super::Persister;

/// Growable vector of entries plus the head timestamp.
#[derive(Debug, Default)]
pub struct MemoryPersister<E> {
    entries: Vec<IndexedEntry<E>>,
    head: Micros,
}

impl<E> MemoryPersister<E> {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            head: Micros::ZERO,
        }
    }
}

/// Shared ordering checks for every backend.
pub(super) fn check_append(last: Option<IndexTs>, head: Micros, us: Micros) -> Result<u64> {
    if let Some(last) = last
        && us <= last.us
    {
        return Err(StreamError::InconsistentTimestamp { us, last_us: last.us });
    }
    if us < head {
        return Err(StreamError::HeadAlreadyPast { us, head });
    }
    Ok(last.map_or(0, |last| last.index + 1))
}

pub(super) fn check_head_update(head: Micros, us: Micros) -> Result<()> {
    if us < head {
        return Err(StreamError::HeadWouldRegress { us, head });
    }
    Ok(())
}

pub(super) fn clamp_range(size: u64, begin_idx: u64, end_idx: u64) -> (usize, usize) {
    let end = end_idx.min(size);
    let begin = begin_idx.min(end);
    (begin as usize, end as usize)
}

pub(super) fn timestamp_range<E>(
    entries: &[IndexedEntry<E>],
    from: Micros,
    till: Option<Micros>,
) -> (u64, u64) {
    let first = entries.partition_point(|e| e.idx_ts.us < from) as u64;
    let past = match till {
        Some(till) => entries.partition_point(|e| e.idx_ts.us <= till) as u64,
        None => entries.len() as u64,
    };
    (first, past)
}

impl<E: Clone + Send + Sync + 'static> Persister for MemoryPersister<E> {
    type Entry = E;

    fn append_at(&mut self, entry: E, us: Micros) -> Result<IndexTs> {
        let index = check_append(self.entries.last().map(|e| e.idx_ts), self.head, us)?;
        let idx_ts = IndexTs::new(index, us);
        self.entries.push(IndexedEntry::new(idx_ts, entry));
        self.head = us;
        Ok(idx_ts)
    }

    fn update_head_at(&mut self, us: Micros) -> Result<()> {
        check_head_update(self.head, us)?;
        self.head = us;
        Ok(())
    }

    fn size(&self) -> u64 {
        self.entries.len() as u64
    }

    fn head_and_last(&self) -> HeadAndLast {
        HeadAndLast {
            head: self.head,
            last: self.entries.last().map(|e| e.idx_ts),
        }
    }

    fn entries(&self, begin_idx: u64, end_idx: u64) -> Vec<IndexedEntry<E>> {
        let (begin, end) = clamp_range(self.size(), begin_idx, end_idx);
        self.entries[begin..end].to_vec()
    }

    fn index_range_by_timestamp(&self, from: Micros, till: Option<Micros>) -> (u64, u64) {
        timestamp_range(&self.entries, from, till)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn persister_with(timestamps: &[u64]) -> MemoryPersister<String> {
        let mut p = MemoryPersister::new();
        for (i, us) in timestamps.iter().enumerate() {
            p.append_at(format!("e{i}"), Micros(*us)).unwrap();
        }
        p
    }

    #[test]
    fn appends_are_dense_and_strictly_ordered() {
        let p = persister_with(&[100, 200, 300]);
        assert_eq!(p.size(), 3);
        let all = p.entries(0, 3);
        for (i, e) in all.iter().enumerate() {
            assert_eq!(e.idx_ts.index, i as u64);
        }
        assert!(all[0].idx_ts.us < all[1].idx_ts.us);
        assert_eq!(p.current_head(), Micros(300));
    }

    #[test]
    fn stale_timestamp_is_rejected_and_state_unchanged() {
        let mut p = persister_with(&[200]);
        let err = p.append_at("b".to_string(), Micros(100)).unwrap_err();
        assert!(matches!(err, StreamError::InconsistentTimestamp { .. }));
        assert_eq!(p.size(), 1);
        assert_eq!(p.current_head(), Micros(200));
    }

    #[test]
    fn timestamp_behind_head_is_rejected() {
        let mut p = persister_with(&[100]);
        p.update_head_at(Micros(500)).unwrap();
        let err = p.append_at("b".to_string(), Micros(300)).unwrap_err();
        assert!(matches!(err, StreamError::HeadAlreadyPast { .. }));
        assert_eq!(p.size(), 1);
    }

    #[test]
    fn head_equal_timestamp_is_accepted() {
        let mut p = persister_with(&[100]);
        p.update_head_at(Micros(500)).unwrap();
        let idx_ts = p.append_at("b".to_string(), Micros(500)).unwrap();
        assert_eq!(idx_ts, IndexTs::new(1, Micros(500)));
    }

    #[test]
    fn head_never_regresses() {
        let mut p = persister_with(&[100]);
        let err = p.update_head_at(Micros(50)).unwrap_err();
        assert!(matches!(err, StreamError::HeadWouldRegress { .. }));
        assert_eq!(p.current_head(), Micros(100));
    }

    #[test]
    fn auto_timestamps_strictly_increase() {
        let mut p = MemoryPersister::new();
        let a = p.append("a".to_string()).unwrap();
        let b = p.append("b".to_string()).unwrap();
        let c = p.append("c".to_string()).unwrap();
        assert!(a.us < b.us && b.us < c.us);
        assert_eq!((a.index, b.index, c.index), (0, 1, 2));
    }

    #[test]
    fn auto_head_update_advances_past_the_current_head() {
        let mut p = persister_with(&[100]);
        let head = p.update_head().unwrap();
        assert!(head > Micros(100));
        assert_eq!(p.current_head(), head);
        assert!(p.update_head().unwrap() > head);
    }

    #[test]
    fn range_copy_is_clamped() {
        let p = persister_with(&[100, 200, 300]);
        assert_eq!(p.entries(1, 100).len(), 2);
        assert_eq!(p.entries(5, 9), vec![]);
        assert_eq!(p.entries(0, 0), vec![]);
    }

    #[test]
    fn timestamp_binary_search() {
        let p = persister_with(&[100, 200, 300]);
        assert_eq!(p.index_range_by_timestamp(Micros(200), None), (1, 3));
        assert_eq!(
            p.index_range_by_timestamp(Micros(150), Some(Micros(250))),
            (1, 2)
        );
        assert_eq!(p.index_range_by_timestamp(Micros(400), None), (3, 3));
        assert_eq!(p.index_range_by_timestamp(Micros::ZERO, None), (0, 3));
    }
}
