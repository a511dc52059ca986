//! Stream errors (publish ordering, capability misuse, shutdown) and
//! file-recovery errors.
//!
//! These are bounded and stable: each variant is a refusal state a caller
//! can act on, not a wrapped implementation detail.

use std::path::PathBuf;

use thiserror::Error;

use super::Micros;

/// Canonical error enum for stream operations.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StreamError {
    /// The stream has entered graceful shutdown; no further publishes or
    /// subscriptions are accepted.
    #[error("stream is shutting down")]
    ShuttingDown,

    /// `publish` on a stream whose publisher was moved out.
    #[error("publisher has been moved out of this stream")]
    PublisherReleased,

    /// `move_publisher_to` on a stream that already gave its publisher away.
    #[error("publisher was already released")]
    PublisherAlreadyReleased,

    /// `acquire_publisher` on a stream that still holds one.
    #[error("publisher is already owned by this stream")]
    PublisherAlreadyOwned,

    /// A supplied timestamp is not strictly past the last entry.
    #[error("timestamp {us} is not past the last entry at {last_us}")]
    InconsistentTimestamp { us: Micros, last_us: Micros },

    /// A supplied timestamp is behind the stream head.
    #[error("timestamp {us} is behind the stream head {head}")]
    HeadAlreadyPast { us: Micros, head: Micros },

    /// A head update that would move the head backwards.
    #[error("head update to {us} would regress the head at {head}")]
    HeadWouldRegress { us: Micros, head: Micros },

    /// Case projection on an entry that holds a different case.
    #[error("entry holds no value of case `{case}`")]
    NoValueOfType { case: &'static str },

    /// Consuming case extraction on an entry of an incompatible case.
    #[error("entry case is incompatible with `{case}`")]
    IncompatibleCase { case: &'static str },

    /// Case projection on an absent entry.
    #[error("entry case is uninitialized")]
    UninitializedCase,

    /// HTTP schema endpoint: unknown `schema_format` key.
    #[error("unsupported schema format `{format}`")]
    SchemaFormatNotFound { format: String },

    /// HTTP terminate endpoint: unknown subscription id.
    #[error("no http subscription with id `{id}`")]
    SubscriptionNotFound { id: String },

    /// Persistence write failure. State past the last durable record is
    /// unchanged.
    #[error("persistence io at {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Persistence encode failure for one entry.
    #[error("entry encode failed: {source}")]
    Encode {
        #[source]
        source: serde_json::Error,
    },
}

/// File persister replay failures.
///
/// Each variant names the first offending line; construction aborts and
/// the file is left untouched.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum RecoveryError {
    #[error("io error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("line {line}: malformed record: {reason}")]
    Malformed { line: usize, reason: &'static str },

    #[error("line {line}: record decode failed: {source}")]
    Decode {
        line: usize,
        #[source]
        source: serde_json::Error,
    },

    #[error("line {line}: expected index {expected}, got {got}")]
    IndexGap { line: usize, expected: u64, got: u64 },

    #[error("line {line}: timestamp {us} is not past previous {prev}")]
    TimestampRegression { line: usize, us: Micros, prev: Micros },

    #[error("line {line}: head {us} regresses recovered head {head}")]
    HeadRegression { line: usize, us: Micros, head: Micros },
}
