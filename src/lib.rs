#![forbid(unsafe_code)]

pub mod clock;
pub mod core;
pub mod http;
mod notify;
pub mod persist;
pub mod publisher;
mod runner;
pub mod schema;
pub mod scope;
pub mod stream;
pub mod subscriber;

pub use crate::core::error::{RecoveryError, StreamError};
pub type Result<T> = std::result::Result<T, StreamError>;

// Re-export the working set at crate root for convenience
pub use crate::core::{Authority, HeadAndLast, IndexTs, IndexedEntry, Micros, StreamNamespaceName};
pub use crate::persist::{FilePersister, MemoryPersister, Persister};
pub use crate::publisher::{Publisher, PublisherAcquirer};
pub use crate::schema::{SchemaDescriptor, SubscribableSchema};
pub use crate::scope::SubscriberScope;
pub use crate::stream::Stream;
pub use crate::subscriber::{
    CaseSubscriber, EntryCase, EntryResponse, Subscriber, TerminationResponse, case, case_opt,
    into_case,
};
