//! The chunk-writing subscriber behind a streaming response.

use bytes::Bytes;
use serde::Serialize;
use serde_json::json;
use tokio::sync::mpsc;
use tracing::debug;

use crate::core::{IndexTs, Micros};
use crate::subscriber::{EntryResponse, Subscriber, TerminationResponse};

/// Wire envelope of one streamed record.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum JsonFlavour {
    /// `{"index":I,"us":U}\t<entry>` — position envelope, same shape as
    /// the on-disk format.
    #[default]
    Current,
    /// Bare entry JSON (`json=js`).
    Minimalistic,
    /// PascalCase envelope for .NET consumers (`json=fs`).
    NewtonsoftFSharp,
}

impl JsonFlavour {
    pub(crate) fn render<E: Serialize>(
        self,
        idx_ts: IndexTs,
        entry: &E,
    ) -> serde_json::Result<String> {
        let line = match self {
            JsonFlavour::Current => format!(
                "{}\t{}",
                serde_json::to_string(&idx_ts)?,
                serde_json::to_string(entry)?
            ),
            JsonFlavour::Minimalistic => serde_json::to_string(entry)?,
            JsonFlavour::NewtonsoftFSharp => serde_json::to_string(&json!({
                "Index": idx_ts.index,
                "TimestampUS": idx_ts.us,
                "Entry": entry,
            }))?,
        };
        Ok(line + "\n")
    }
}

/// Feeds one HTTP response body from a subscription runner.
///
/// Each entry becomes one chunk pushed through a bounded channel; the
/// async side forwards chunks into the response. A closed channel means
/// the client went away, which ends the subscription.
pub(crate) struct HttpFeed {
    chunks: mpsc::Sender<Bytes>,
    flavour: JsonFlavour,
    remaining: Option<u64>,
}

impl HttpFeed {
    pub(crate) fn new(
        chunks: mpsc::Sender<Bytes>,
        flavour: JsonFlavour,
        entry_count: Option<u64>,
    ) -> Self {
        Self {
            chunks,
            flavour,
            remaining: entry_count,
        }
    }
}

impl<E: Serialize> Subscriber<E> for HttpFeed {
    fn on_entry(&mut self, entry: &E, current: IndexTs, _last_known: IndexTs) -> EntryResponse {
        if self.remaining == Some(0) {
            return EntryResponse::Done;
        }
        let line = match self.flavour.render(current, entry) {
            Ok(line) => line,
            Err(error) => {
                debug!(%error, index = current.index, "entry encode failed; closing feed");
                return EntryResponse::Done;
            }
        };
        if self.chunks.blocking_send(Bytes::from(line)).is_err() {
            // Client disconnected.
            return EntryResponse::Done;
        }
        if let Some(remaining) = &mut self.remaining {
            *remaining -= 1;
            if *remaining == 0 {
                return EntryResponse::Done;
            }
        }
        EntryResponse::More
    }

    fn on_head(&mut self, _head: Micros) -> EntryResponse {
        // Heartbeats carry no record; the feed stays quiet.
        EntryResponse::More
    }

    fn on_terminate(&mut self) -> TerminationResponse {
        TerminationResponse::Done
    }
}
