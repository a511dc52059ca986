//! The stream façade: one value owning the persister, the wakeup
//! machinery, the publisher slot and the HTTP subscription registry.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::debug;
use uuid::Uuid;

use crate::core::{Authority, HeadAndLast, IndexTs, IndexedEntry, Micros, StreamNamespaceName};
use crate::notify::{Notifier, TerminateSignal};
use crate::persist::{MemoryPersister, Persister};
use crate::publisher::{Publisher, PublisherAcquirer};
use crate::runner::{self, DoneCallback};
use crate::schema::SchemaDescriptor;
use crate::scope::SubscriberScope;
use crate::subscriber::{CaseSubscriber, EntryCase, Subscriber};
use crate::{Result, StreamError};

/// State shared between the stream, its publisher and every runner.
///
/// Lock order: registry lock before publish lock, never the reverse.
pub(crate) struct StreamState<P> {
    persister: Mutex<P>,
    pub(crate) notifier: Notifier,
    shutting_down: AtomicBool,
    http_subs: Mutex<HashMap<String, SubscriberScope>>,
}

impl<P: Persister> StreamState<P> {
    fn new(persister: P) -> Self {
        Self {
            persister: Mutex::new(persister),
            notifier: Notifier::new(),
            shutting_down: AtomicBool::new(false),
            http_subs: Mutex::new(HashMap::new()),
        }
    }

    pub(crate) fn lock_persister(&self) -> MutexGuard<'_, P> {
        self.persister.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn lock_http_subs(&self) -> MutexGuard<'_, HashMap<String, SubscriberScope>> {
        self.http_subs.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Raise a termination signal under the publish lock so a blocked
    /// runner cannot sleep through it.
    pub(crate) fn raise(&self, signal: &TerminateSignal) {
        let _persister = self.lock_persister();
        signal.set();
        self.notifier.notify_all();
    }

    pub(crate) fn check_open(&self) -> Result<()> {
        if self.shutting_down.load(Ordering::Acquire) {
            Err(StreamError::ShuttingDown)
        } else {
            Ok(())
        }
    }
}

struct PublisherSlot<P> {
    publisher: Option<Publisher<P>>,
    authority: Authority,
}

/// A persistent, append-only, typed event stream.
///
/// Publish with [`Stream::publish`], subscribe with [`Stream::subscribe`]
/// (each subscriber runs on its own thread, bounded by the returned
/// [`SubscriberScope`]), and serve remote consumers by mounting
/// [`crate::http::router`].
pub struct Stream<P: Persister> {
    state: Arc<StreamState<P>>,
    slot: Mutex<PublisherSlot<P>>,
    schema: SchemaDescriptor,
    namespace: StreamNamespaceName,
}

impl<E> Stream<MemoryPersister<E>>
where
    E: Clone + Send + Sync + 'static,
{
    /// An in-memory stream, the default flavour.
    pub fn in_memory() -> Self {
        Self::new(MemoryPersister::new())
    }
}

impl<P: Persister> Stream<P> {
    pub fn new(persister: P) -> Self {
        Self::with_schema(persister, SchemaDescriptor::for_entry::<P::Entry>())
    }

    pub fn with_schema(persister: P, schema: SchemaDescriptor) -> Self {
        let state = Arc::new(StreamState::new(persister));
        let publisher = Publisher::new(Arc::clone(&state));
        Self {
            state,
            slot: Mutex::new(PublisherSlot {
                publisher: Some(publisher),
                authority: Authority::Own,
            }),
            schema,
            namespace: StreamNamespaceName::default(),
        }
    }

    pub fn with_namespace(mut self, namespace: StreamNamespaceName) -> Self {
        self.namespace = namespace;
        self
    }

    // ---- publishing ----------------------------------------------------

    /// Append with an auto-assigned timestamp.
    pub fn publish(&self, entry: P::Entry) -> Result<IndexTs> {
        self.with_publisher(|publisher| publisher.publish(entry))
    }

    /// Append at a caller-supplied timestamp, which must be strictly past
    /// the last entry and at least at the head.
    pub fn publish_at(&self, entry: P::Entry, us: Micros) -> Result<IndexTs> {
        self.with_publisher(|publisher| publisher.publish_at(entry, us))
    }

    /// Advance the head without appending (heartbeat).
    pub fn update_head(&self) -> Result<Micros> {
        self.with_publisher(|publisher| publisher.update_head())
    }

    pub fn update_head_at(&self, us: Micros) -> Result<()> {
        self.with_publisher(|publisher| publisher.update_head_at(us))
    }

    fn with_publisher<T>(&self, op: impl FnOnce(&Publisher<P>) -> Result<T>) -> Result<T> {
        let slot = self.lock_slot();
        match &slot.publisher {
            Some(publisher) => op(publisher),
            None => Err(StreamError::PublisherReleased),
        }
    }

    // ---- publisher transfer --------------------------------------------

    /// Hand the unique publisher to `acquirer`; the stream's data
    /// authority becomes [`Authority::External`].
    pub fn move_publisher_to(&self, acquirer: &mut impl PublisherAcquirer<P>) -> Result<()> {
        let mut slot = self.lock_slot();
        match slot.publisher.take() {
            Some(publisher) => {
                slot.authority = Authority::External;
                acquirer.accept_publisher(publisher);
                Ok(())
            }
            None => Err(StreamError::PublisherAlreadyReleased),
        }
    }

    /// Reinstall a previously moved-out publisher.
    pub fn acquire_publisher(&self, publisher: Publisher<P>) -> Result<()> {
        let mut slot = self.lock_slot();
        if slot.publisher.is_some() {
            return Err(StreamError::PublisherAlreadyOwned);
        }
        slot.publisher = Some(publisher);
        slot.authority = Authority::Own;
        Ok(())
    }

    pub fn data_authority(&self) -> Authority {
        self.lock_slot().authority
    }

    fn lock_slot(&self) -> MutexGuard<'_, PublisherSlot<P>> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // ---- subscriptions -------------------------------------------------

    /// Start a subscriber on its own thread, delivering entries from
    /// `begin_idx` onward. Blocks (inside the runner) until the stream
    /// grows past `begin_idx` if it is still ahead of the log.
    pub fn subscribe<S>(&self, subscriber: S, begin_idx: u64) -> Result<SubscriberScope>
    where
        S: Subscriber<P::Entry> + 'static,
    {
        self.subscribe_with_done(subscriber, begin_idx, None)
    }

    /// Like [`Stream::subscribe`], forwarding only entries holding case
    /// `C` of a sum-type entry.
    pub fn subscribe_filtered<C, S>(&self, subscriber: S, begin_idx: u64) -> Result<SubscriberScope>
    where
        C: EntryCase<P::Entry> + Send + 'static,
        S: Subscriber<C> + 'static,
    {
        self.subscribe(CaseSubscriber::new(subscriber), begin_idx)
    }

    /// Like [`Stream::subscribe`], with a callback fired (under the
    /// subscription-registry lock) once the runner has delivered its last
    /// callback. The callback runs on the runner thread; joining that
    /// thread from inside it deadlocks, so defer any teardown that drops
    /// the scope.
    pub fn subscribe_with_done<S>(
        &self,
        subscriber: S,
        begin_idx: u64,
        done_cb: Option<Box<dyn FnOnce() + Send>>,
    ) -> Result<SubscriberScope>
    where
        S: Subscriber<P::Entry> + 'static,
    {
        self.state.check_open()?;
        Ok(runner::spawn(
            Arc::clone(&self.state),
            subscriber,
            begin_idx,
            done_cb,
        ))
    }

    // ---- http subscription registry ------------------------------------

    /// Register a subscriber under a fresh subscription id. The registry
    /// entry is installed before the runner can observe its own
    /// completion, so the id is always terminatable.
    pub(crate) fn register_http_subscription<S>(
        &self,
        subscriber: S,
        begin_idx: u64,
    ) -> Result<String>
    where
        S: Subscriber<P::Entry> + 'static,
    {
        self.state.check_open()?;
        let id = Uuid::new_v4().simple().to_string();

        let cleanup_state = Arc::clone(&self.state);
        let cleanup_id = id.clone();
        let done_cb: DoneCallback = Box::new(move || {
            // Runs on the runner thread, under the registry lock. Removal
            // joins that same thread, so it is detached to a cleanup
            // thread that takes the lock after the runner releases it.
            std::thread::spawn(move || {
                let mut subs = cleanup_state.lock_http_subs();
                subs.remove(&cleanup_id);
                debug!(id = %cleanup_id, "http subscription removed");
            });
        });

        let mut subs = self.state.lock_http_subs();
        let scope = runner::spawn(
            Arc::clone(&self.state),
            subscriber,
            begin_idx,
            Some(done_cb),
        );
        subs.insert(id.clone(), scope);
        debug!(id = %id, begin_idx, "http subscription registered");
        Ok(id)
    }

    /// Ask the subscription with `id` to terminate. The teardown is
    /// asynchronous; the registry entry disappears once the runner is
    /// done.
    pub fn terminate_http_subscription(&self, id: &str) -> Result<()> {
        self.state.check_open()?;
        let subs = self.state.lock_http_subs();
        match subs.get(id) {
            Some(scope) => {
                scope.async_terminate();
                Ok(())
            }
            None => Err(StreamError::SubscriptionNotFound { id: id.to_string() }),
        }
    }

    // ---- read-only views -----------------------------------------------

    pub fn size(&self) -> u64 {
        self.state.lock_persister().size()
    }

    pub fn head_and_last(&self) -> HeadAndLast {
        self.state.lock_persister().head_and_last()
    }

    pub fn current_head(&self) -> Micros {
        self.state.lock_persister().current_head()
    }

    /// Copy of the entries in `[begin_idx, end_idx)`, for tools.
    pub fn entries(&self, begin_idx: u64, end_idx: u64) -> Vec<IndexedEntry<P::Entry>> {
        self.state.lock_persister().entries(begin_idx, end_idx)
    }

    /// First index at or after `us`, clamped to the current size.
    pub fn index_at_or_after(&self, us: Micros) -> u64 {
        let persister = self.state.lock_persister();
        persister
            .index_range_by_timestamp(us, None)
            .0
            .min(persister.size())
    }

    pub fn schema(&self) -> &SchemaDescriptor {
        &self.schema
    }

    pub fn namespace(&self) -> &StreamNamespaceName {
        &self.namespace
    }

    // ---- shutdown ------------------------------------------------------

    pub fn is_shutting_down(&self) -> bool {
        self.state.check_open().is_err()
    }

    /// Enter graceful shutdown: refuse new publishes and subscriptions,
    /// terminate every HTTP subscription, and wait for the registry to
    /// drain. Idempotent.
    pub fn shutdown(&self) {
        self.state.shutting_down.store(true, Ordering::Release);
        {
            let subs = self.state.lock_http_subs();
            for scope in subs.values() {
                scope.async_terminate();
            }
        }
        loop {
            if self.state.lock_http_subs().is_empty() {
                break;
            }
            std::thread::yield_now();
        }
    }
}

impl<P: Persister> Drop for Stream<P> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl<P: Persister> std::fmt::Debug for Stream<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Stream")
            .field("authority", &self.data_authority())
            .field("namespace", &self.namespace)
            .finish_non_exhaustive()
    }
}
