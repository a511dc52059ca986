//! Query grammar of the pub/sub endpoint.

use std::collections::HashMap;

use crate::core::Micros;

use super::endpoint::JsonFlavour;

/// How far back a `tail` request reaches.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Tail {
    /// The last `n` entries (combined with `i` by taking the max).
    Count(u64),
    /// Only entries published after the request (`tail=-1`).
    FromCurrentEnd,
}

/// Parsed query options. Numeric fields parse leniently: garbage reads as
/// absent. The only rejected value is an unknown `json` flavour.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RequestParams {
    /// `i`: starting index.
    pub begin_idx: u64,
    /// `n`: close after this many entries.
    pub entry_count: Option<u64>,
    /// `tail`: start near the end of the log.
    pub tail: Option<Tail>,
    /// `recent`: microsecond window ending now.
    pub recent_us: Option<u64>,
    /// `since`: absolute microsecond lower bound.
    pub since_us: Option<Micros>,
    /// `nowait`: answer immediately when caught up.
    pub no_wait: bool,
    /// `sizeonly`: entry count instead of a feed.
    pub size_only: bool,
    /// `schema` / `schema_format`.
    pub schema_requested: bool,
    pub schema_format: String,
    /// `terminate`: subscription id to cancel.
    pub terminate_id: Option<String>,
    /// `json`: wire flavour of streamed records.
    pub flavour: JsonFlavour,
}

impl RequestParams {
    pub fn parse(query: &HashMap<String, String>) -> Result<Self, UnknownJsonFlavour> {
        let flavour = match query.get("json").map(String::as_str) {
            None => JsonFlavour::Current,
            Some("js") => JsonFlavour::Minimalistic,
            Some("fs") => JsonFlavour::NewtonsoftFSharp,
            Some(other) => {
                return Err(UnknownJsonFlavour {
                    requested: other.to_string(),
                });
            }
        };

        let tail = query.get("tail").and_then(|raw| {
            if raw == "-1" {
                Some(Tail::FromCurrentEnd)
            } else {
                raw.parse().ok().map(Tail::Count)
            }
        });

        Ok(Self {
            begin_idx: parse_or_zero(query.get("i")),
            entry_count: query.get("n").and_then(|raw| raw.parse().ok()),
            tail,
            recent_us: query.get("recent").and_then(|raw| raw.parse().ok()),
            since_us: query
                .get("since")
                .and_then(|raw| raw.parse().ok())
                .map(Micros),
            no_wait: query.contains_key("nowait") || query.contains_key("no_wait"),
            size_only: query.contains_key("sizeonly"),
            schema_requested: query.contains_key("schema"),
            schema_format: query.get("schema_format").cloned().unwrap_or_default(),
            terminate_id: query.get("terminate").cloned(),
            flavour,
        })
    }

    /// Starting index for a feed over a log of `size` entries, applying
    /// the precedence `tail` > `recent` > `since` > `i`. Timestamp-derived
    /// bounds resolve through `index_at_or_after`; `i` only applies when
    /// no timestamp option is set.
    pub fn resolve_begin_idx(&self, size: u64, index_at_or_after: impl Fn(Micros) -> u64) -> u64 {
        let from_timestamp = match self.tail {
            Some(Tail::FromCurrentEnd) => return size,
            Some(Tail::Count(count)) => {
                return self.begin_idx.max(size.saturating_sub(count));
            }
            None => {
                if let Some(window) = self.recent_us {
                    Some(crate::clock::now_us().saturating_sub(window))
                } else {
                    self.since_us
                }
            }
        };
        match from_timestamp {
            Some(from) => index_at_or_after(from),
            None => self.begin_idx,
        }
    }
}

/// The `json` parameter named a flavour this endpoint does not speak.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UnknownJsonFlavour {
    pub requested: String,
}

fn parse_or_zero(raw: Option<&String>) -> u64 {
    raw.and_then(|raw| raw.parse().ok()).unwrap_or(0)
}
