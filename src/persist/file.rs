//! File-backed persister: append-only JSON lines with replay-on-open.
//!
//! Two record shapes, one per line, LF-terminated:
//!
//! - entry:     `{"index":I,"us":U}\t<entry JSON>`
//! - head-only: `{"head":U}`
//!
//! Replay enforces dense indices, strictly increasing entry timestamps
//! and a non-regressing head; the first violation aborts `open`. Entries
//! are kept in memory append-through, so reads never touch the disk
//! after recovery. Appends are flushed before returning.

use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::core::error::RecoveryError;
use crate::core::{HeadAndLast, IndexTs, IndexedEntry, Micros};
use crate::{Result, StreamError};

use super::Persister;
use super::memory::{check_append, check_head_update, clamp_range, timestamp_range};

#[derive(Debug, Serialize, Deserialize)]
struct HeadLine {
    head: Micros,
}

/// Append-only file of JSON records plus the in-memory replica built at
/// open time.
#[derive(Debug)]
pub struct FilePersister<E> {
    path: PathBuf,
    writer: BufWriter<File>,
    entries: Vec<IndexedEntry<E>>,
    head: Micros,
}

impl<E> FilePersister<E>
where
    E: Serialize + DeserializeOwned,
{
    /// Open (or create) the backing file and replay it.
    pub fn open(path: impl AsRef<Path>) -> std::result::Result<Self, RecoveryError> {
        let path = path.as_ref().to_path_buf();
        let io_err = |source| RecoveryError::Io {
            path: path.clone(),
            source,
        };

        let file = OpenOptions::new()
            .read(true)
            .append(true)
            .create(true)
            .open(&path)
            .map_err(io_err)?;

        let mut entries: Vec<IndexedEntry<E>> = Vec::new();
        let mut head = Micros::ZERO;
        let reader = BufReader::new(file.try_clone().map_err(io_err)?);
        for (number, line) in reader.lines().enumerate() {
            let line = line.map_err(io_err)?;
            let line_no = number + 1;
            replay_line(&line, line_no, &mut entries, &mut head)?;
        }

        debug!(
            path = %path.display(),
            entries = entries.len(),
            head = head.as_u64(),
            "replayed stream file"
        );

        Ok(Self {
            path,
            writer: BufWriter::new(file),
            entries,
            head,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn write_line(&mut self, line: &str) -> Result<()> {
        let path = &self.path;
        let io_err = |source| StreamError::Io {
            path: path.clone(),
            source,
        };
        self.writer.write_all(line.as_bytes()).map_err(io_err)?;
        self.writer.write_all(b"\n").map_err(io_err)?;
        // Durable before the publish returns.
        self.writer.flush().map_err(io_err)
    }
}

fn replay_line<E: DeserializeOwned>(
    line: &str,
    line_no: usize,
    entries: &mut Vec<IndexedEntry<E>>,
    head: &mut Micros,
) -> std::result::Result<(), RecoveryError> {
    if let Some((position, payload)) = line.split_once('\t') {
        let idx_ts: IndexTs =
            serde_json::from_str(position).map_err(|source| RecoveryError::Decode {
                line: line_no,
                source,
            })?;
        let expected = entries.len() as u64;
        if idx_ts.index != expected {
            return Err(RecoveryError::IndexGap {
                line: line_no,
                expected,
                got: idx_ts.index,
            });
        }
        if let Some(last) = entries.last()
            && idx_ts.us <= last.idx_ts.us
        {
            return Err(RecoveryError::TimestampRegression {
                line: line_no,
                us: idx_ts.us,
                prev: last.idx_ts.us,
            });
        }
        let entry: E = serde_json::from_str(payload).map_err(|source| RecoveryError::Decode {
            line: line_no,
            source,
        })?;
        if idx_ts.us < *head {
            return Err(RecoveryError::HeadRegression {
                line: line_no,
                us: idx_ts.us,
                head: *head,
            });
        }
        entries.push(IndexedEntry::new(idx_ts, entry));
        *head = idx_ts.us;
        Ok(())
    } else if line.is_empty() {
        Err(RecoveryError::Malformed {
            line: line_no,
            reason: "empty line",
        })
    } else {
        let head_line: HeadLine =
            serde_json::from_str(line).map_err(|source| RecoveryError::Decode {
                line: line_no,
                source,
            })?;
        if head_line.head < *head {
            return Err(RecoveryError::HeadRegression {
                line: line_no,
                us: head_line.head,
                head: *head,
            });
        }
        *head = head_line.head;
        Ok(())
    }
}

impl<E> Persister for FilePersister<E>
where
    E: Clone + Send + Sync + Serialize + DeserializeOwned + 'static,
{
    type Entry = E;

    fn append_at(&mut self, entry: E, us: Micros) -> Result<IndexTs> {
        let index = check_append(self.entries.last().map(|e| e.idx_ts), self.head, us)?;
        let idx_ts = IndexTs::new(index, us);
        let position =
            serde_json::to_string(&idx_ts).map_err(|source| StreamError::Encode { source })?;
        let payload =
            serde_json::to_string(&entry).map_err(|source| StreamError::Encode { source })?;
        self.write_line(&format!("{position}\t{payload}"))?;
        self.entries.push(IndexedEntry::new(idx_ts, entry));
        self.head = us;
        Ok(idx_ts)
    }

    fn update_head_at(&mut self, us: Micros) -> Result<()> {
        check_head_update(self.head, us)?;
        let line = serde_json::to_string(&HeadLine { head: us })
            .map_err(|source| StreamError::Encode { source })?;
        self.write_line(&line)?;
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

    use std::fs;

    use tempfile::TempDir;

    fn open(dir: &TempDir) -> FilePersister<String> {
        FilePersister::open(dir.path().join("stream.json")).unwrap()
    }

    #[test]
    fn file_lines_carry_position_and_payload() {
        let dir = TempDir::new().unwrap();
        let mut p = open(&dir);
        p.append_at("alpha".to_string(), Micros(100)).unwrap();
        p.update_head_at(Micros(250)).unwrap();

        let text = fs::read_to_string(dir.path().join("stream.json")).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0], "{\"index\":0,\"us\":100}\t\"alpha\"");
        assert_eq!(lines[1], "{\"head\":250}");
    }

    #[test]
    fn reopen_recovers_entries_and_head() {
        let dir = TempDir::new().unwrap();
        {
            let mut p = open(&dir);
            for (i, us) in [100u64, 200, 300].iter().enumerate() {
                p.append_at(format!("e{i}"), Micros(*us)).unwrap();
            }
        }

        let p = open(&dir);
        assert_eq!(p.size(), 3);
        assert_eq!(p.current_head(), Micros(300));
        let replayed = p.entries(0, 3);
        assert_eq!(replayed[2].entry, "e2");
        assert_eq!(replayed[2].idx_ts, IndexTs::new(2, Micros(300)));
    }

    #[test]
    fn reopen_recovers_heartbeat_head() {
        let dir = TempDir::new().unwrap();
        {
            let mut p = open(&dir);
            p.append_at("a".to_string(), Micros(100)).unwrap();
            p.update_head_at(Micros(900)).unwrap();
        }

        let p = open(&dir);
        assert_eq!(p.size(), 1);
        assert_eq!(p.current_head(), Micros(900));
    }

    #[test]
    fn reopened_file_keeps_accepting_appends() {
        let dir = TempDir::new().unwrap();
        {
            let mut p = open(&dir);
            p.append_at("a".to_string(), Micros(100)).unwrap();
        }
        {
            let mut p = open(&dir);
            let err = p.append_at("b".to_string(), Micros(100)).unwrap_err();
            assert!(matches!(err, StreamError::InconsistentTimestamp { .. }));
            p.append_at("b".to_string(), Micros(150)).unwrap();
        }

        let p = open(&dir);
        assert_eq!(p.size(), 2);
    }

    #[test]
    fn replay_rejects_index_gap() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("stream.json");
        fs::write(
            &path,
            "{\"index\":0,\"us\":100}\t\"a\"\n{\"index\":2,\"us\":200}\t\"b\"\n",
        )
        .unwrap();

        let err = FilePersister::<String>::open(&path).unwrap_err();
        assert!(matches!(
            err,
            RecoveryError::IndexGap {
                line: 2,
                expected: 1,
                got: 2
            }
        ));
    }

    #[test]
    fn replay_rejects_timestamp_regression() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("stream.json");
        fs::write(
            &path,
            "{\"index\":0,\"us\":200}\t\"a\"\n{\"index\":1,\"us\":200}\t\"b\"\n",
        )
        .unwrap();

        let err = FilePersister::<String>::open(&path).unwrap_err();
        assert!(matches!(
            err,
            RecoveryError::TimestampRegression { line: 2, .. }
        ));
    }

    #[test]
    fn replay_rejects_garbage() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("stream.json");
        fs::write(&path, "not json\n").unwrap();

        let err = FilePersister::<String>::open(&path).unwrap_err();
        assert!(matches!(err, RecoveryError::Decode { line: 1, .. }));
    }
}
