//! Event fan-out to projectors.
//!
//! An event type may have any number of handlers. [`EventDispatcher::dispatch`]
//! runs all of them concurrently and independently: a failing handler is
//! logged and reported, the others still run.
//!
//! [`EventDispatcher::spawn`] attaches the dispatcher to an event bus topic.
//! Events are routed by stream id onto a fixed pool of worker tasks, so
//! events of one application are applied in sequence order while different
//! applications proceed in parallel. A worker drops any event whose sequence
//! is not greater than the last one it applied for that stream (bus
//! redeliveries). When an event arrives past a gap, the missing events are
//! read back from the event store given to [`EventDispatcher::with_event_store`]
//! and applied first.

use filplus_core::event::RecordedEvent;
use filplus_core::event_bus::{EventBus, EventBusError};
use filplus_core::event_store::EventStore;
use filplus_core::projection::{EventHandler, ProjectionError};
use filplus_core::stream::{StreamId, Version};
use futures::StreamExt;
use futures::future::join_all;
use std::collections::HashMap;
use std::hash::{DefaultHasher, Hash, Hasher};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

/// Worker tasks started by [`EventDispatcher::spawn`] unless configured.
pub const DEFAULT_WORKERS: usize = 8;

/// A handler that failed on one event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandlerFailure {
    /// [`EventHandler::name`] of the failing handler.
    pub handler: String,
    /// What went wrong.
    pub error: ProjectionError,
}

/// Outcome of dispatching one event.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchReport {
    /// Handlers that completed successfully.
    pub succeeded: usize,
    /// Handlers that failed.
    pub failures: Vec<HandlerFailure>,
}

impl DispatchReport {
    /// `true` when every handler succeeded (including when there were none).
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Registry of event handlers keyed by event type.
#[derive(Clone)]
pub struct EventDispatcher {
    handlers: HashMap<String, Vec<Arc<dyn EventHandler>>>,
    event_store: Option<Arc<dyn EventStore>>,
    workers: usize,
}

impl Default for EventDispatcher {
    fn default() -> Self {
        Self {
            handlers: HashMap::new(),
            event_store: None,
            workers: DEFAULT_WORKERS,
        }
    }
}

impl EventDispatcher {
    /// Create a dispatcher with no handlers.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fill sequence gaps from `store` before applying an event.
    ///
    /// Without a store a gap is logged and the event applied as is.
    #[must_use]
    pub fn with_event_store(mut self, store: Arc<dyn EventStore>) -> Self {
        self.event_store = Some(store);
        self
    }

    /// Number of worker tasks [`Self::spawn`] starts (at least one).
    #[must_use]
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    /// Subscribe `handler` to its [`EventHandler::event_type`].
    pub fn register(&mut self, handler: Arc<dyn EventHandler>) {
        tracing::debug!(
            handler = handler.name(),
            event_type = handler.event_type(),
            "registered event handler"
        );
        self.handlers
            .entry(handler.event_type().to_owned())
            .or_default()
            .push(handler);
    }

    /// Handlers subscribed to `event_type`.
    #[must_use]
    pub fn handlers_for(&self, event_type: &str) -> &[Arc<dyn EventHandler>] {
        self.handlers.get(event_type).map_or(&[], Vec::as_slice)
    }

    /// Run every handler of `event.event_type` on `event`.
    pub async fn dispatch(&self, event: &RecordedEvent) -> DispatchReport {
        let handlers = self.handlers_for(&event.event_type);
        metrics::counter!("events.dispatched", "event_type" => event.event_type.clone()).increment(1);

        if handlers.is_empty() {
            tracing::trace!(event_type = %event.event_type, "no handlers for event");
            return DispatchReport::default();
        }

        let results = join_all(handlers.iter().map(|handler| async move {
            (handler.name().to_owned(), handler.handle(event).await)
        }))
        .await;

        let mut report = DispatchReport::default();
        for (handler, result) in results {
            match result {
                Ok(()) => report.succeeded += 1,
                Err(error) => {
                    metrics::counter!("events.handler_failed", "event_type" => event.event_type.clone())
                        .increment(1);
                    tracing::error!(
                        handler = %handler,
                        application_id = %event.stream_id,
                        event_type = %event.event_type,
                        sequence = event.sequence.value(),
                        error = %error,
                        "event handler failed"
                    );
                    report.failures.push(HandlerFailure { handler, error });
                }
            }
        }
        report
    }

    /// Consume `topic` from `bus` in the background.
    ///
    /// The subscription is open when this returns, so every event published
    /// afterwards is delivered.
    ///
    /// # Errors
    ///
    /// Returns [`EventBusError`] if the subscription cannot be opened.
    pub async fn spawn(
        self: Arc<Self>,
        bus: Arc<dyn EventBus>,
        topic: &str,
    ) -> Result<DispatcherHandle, EventBusError> {
        let mut events = bus.subscribe(&[topic]).await?;
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let topic = topic.to_owned();
        let worker_count = self.workers;
        let (senders, workers): (Vec<_>, Vec<_>) = (0..worker_count)
            .map(|_| spawn_worker(Arc::clone(&self)))
            .unzip();

        let router = tokio::spawn(async move {
            tracing::info!(topic = %topic, workers = worker_count, "event dispatcher started");

            while !*shutdown_rx.borrow() {
                tokio::select! {
                    next = events.next() => match next {
                        Some(Ok(event)) => {
                            let sender = &senders[shard(&event.stream_id, senders.len())];
                            if sender.send(event).is_err() {
                                tracing::error!(topic = %topic, "stream worker stopped unexpectedly");
                            }
                        }
                        Some(Err(error)) => {
                            tracing::error!(topic = %topic, error = %error, "error receiving event from bus");
                        }
                        None => break,
                    },
                    changed = shutdown_rx.changed() => {
                        if changed.is_err() {
                            break;
                        }
                    }
                }
            }

            drop(senders);
            join_all(workers).await;
            tracing::info!(topic = %topic, "event dispatcher stopped");
        });

        Ok(DispatcherHandle {
            shutdown: shutdown_tx,
            router,
            workers: worker_count,
        })
    }

    /// Apply `event`, first replaying whatever the stream holds between
    /// `last_applied` and it.
    async fn apply_in_order(&self, event: &RecordedEvent, last_applied: Version) {
        if event.sequence > last_applied.next() {
            self.fill_gap(event, last_applied).await;
        }
        self.dispatch(event).await;
    }

    async fn fill_gap(&self, event: &RecordedEvent, last_applied: Version) {
        let Some(store) = &self.event_store else {
            tracing::warn!(
                application_id = %event.stream_id,
                sequence = event.sequence.value(),
                last_applied = last_applied.value(),
                "gap in stream and no event store to fill it from"
            );
            return;
        };

        match store.load_events(event.stream_id.clone(), Some(last_applied)).await {
            Ok(missing) => {
                let missing: Vec<_> = missing.into_iter().filter(|e| e.sequence < event.sequence).collect();
                tracing::info!(
                    application_id = %event.stream_id,
                    from = last_applied.next().value(),
                    events = missing.len(),
                    "filling gap in stream from event store"
                );
                for earlier in &missing {
                    self.dispatch(earlier).await;
                }
            }
            Err(error) => {
                tracing::error!(
                    application_id = %event.stream_id,
                    sequence = event.sequence.value(),
                    error = %error,
                    "cannot load missing events"
                );
            }
        }
    }
}

fn shard(stream_id: &StreamId, workers: usize) -> usize {
    let mut hasher = DefaultHasher::new();
    stream_id.hash(&mut hasher);
    let workers = u64::try_from(workers).unwrap_or(u64::MAX);
    usize::try_from(hasher.finish() % workers).unwrap_or_default()
}

fn spawn_worker(dispatcher: Arc<EventDispatcher>) -> (mpsc::UnboundedSender<RecordedEvent>, JoinHandle<()>) {
    let (sender, mut receiver) = mpsc::unbounded_channel::<RecordedEvent>();
    let worker = tokio::spawn(async move {
        let mut applied: HashMap<StreamId, Version> = HashMap::new();
        while let Some(event) = receiver.recv().await {
            let last_applied = applied.get(&event.stream_id).copied().unwrap_or(Version::INITIAL);
            if event.sequence <= last_applied {
                tracing::debug!(
                    application_id = %event.stream_id,
                    sequence = event.sequence.value(),
                    last_applied = last_applied.value(),
                    "skipping redelivered event"
                );
                continue;
            }
            dispatcher.apply_in_order(&event, last_applied).await;
            applied.insert(event.stream_id, event.sequence);
        }
    });
    (sender, worker)
}

impl std::fmt::Debug for EventDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut types: Vec<_> = self.handlers.keys().collect();
        types.sort();
        f.debug_struct("EventDispatcher")
            .field("event_types", &types)
            .field("workers", &self.workers)
            .field("fills_gaps", &self.event_store.is_some())
            .finish()
    }
}

/// Control handle of a running dispatcher.
///
/// Dropping the handle also stops the dispatcher.
#[derive(Debug)]
pub struct DispatcherHandle {
    shutdown: watch::Sender<bool>,
    router: JoinHandle<()>,
    workers: usize,
}

impl DispatcherHandle {
    /// Worker tasks serving the topic. Fixed for the dispatcher's lifetime.
    #[must_use]
    pub const fn worker_count(&self) -> usize {
        self.workers
    }

    /// Stop consuming, let workers drain what they already received, and wait.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        if let Err(error) = self.router.await {
            tracing::error!(error = %error, "event dispatcher task failed");
        }
    }
}
