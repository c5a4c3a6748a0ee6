//! In-memory event store.
//!
//! Enforces the same contract as a durable store: `(stream, sequence)` is
//! unique, appends are all-or-nothing, and a version mismatch is reported as
//! [`EventStoreError::ConcurrencyConflict`] without writing anything.

use filplus_core::event::{RecordedEvent, SerializedEvent};
use filplus_core::event_store::{EventStore, EventStoreError, ExpectedVersion};
use filplus_core::stream::{StreamId, Version};
use futures::future::BoxFuture;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// `HashMap`-backed [`EventStore`].
///
/// Clones share the same streams.
///
/// # Example
///
/// ```
/// use filplus_core::event_store::{EventStore, ExpectedVersion};
/// use filplus_core::stream::{StreamId, Version};
/// use filplus_testing::mocks::InMemoryEventStore;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let store = InMemoryEventStore::new();
/// let stream = StreamId::new("app-1");
/// let recorded = store
///     .append_events(stream.clone(), ExpectedVersion::Exact(Version::INITIAL), vec![])
///     .await?;
/// assert!(recorded.is_empty());
/// assert_eq!(store.current_version(&stream).await?, Version::INITIAL);
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Debug, Default)]
pub struct InMemoryEventStore {
    streams: Arc<RwLock<HashMap<StreamId, Vec<RecordedEvent>>>>,
}

impl InMemoryEventStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of events across all streams.
    pub async fn event_count(&self) -> usize {
        self.streams.read().await.values().map(Vec::len).sum()
    }

    /// Ids of every stream holding at least one event, sorted.
    pub async fn stream_ids(&self) -> Vec<StreamId> {
        let mut ids: Vec<_> = self.streams.read().await.keys().cloned().collect();
        ids.sort();
        ids
    }
}

impl EventStore for InMemoryEventStore {
    fn append_events(
        &self,
        stream_id: StreamId,
        expected: ExpectedVersion,
        events: Vec<SerializedEvent>,
    ) -> BoxFuture<'_, Result<Vec<RecordedEvent>, EventStoreError>> {
        Box::pin(async move {
            let mut streams = self.streams.write().await;
            let actual = streams.get(&stream_id).map_or(Version::INITIAL, |events| stream_version(events));

            match expected {
                ExpectedVersion::Exact(expected) if expected != actual => {
                    return Err(EventStoreError::ConcurrencyConflict {
                        stream_id,
                        expected,
                        actual,
                    });
                }
                _ => {}
            }

            if events.is_empty() {
                return Ok(Vec::new());
            }

            let mut sequence = actual;
            let recorded: Vec<RecordedEvent> = events
                .into_iter()
                .map(|event| {
                    sequence = sequence.next();
                    RecordedEvent::from_serialized(stream_id.clone(), sequence, event)
                })
                .collect();

            streams
                .entry(stream_id)
                .or_default()
                .extend(recorded.iter().cloned());
            Ok(recorded)
        })
    }

    fn load_events(
        &self,
        stream_id: StreamId,
        after: Option<Version>,
    ) -> BoxFuture<'_, Result<Vec<RecordedEvent>, EventStoreError>> {
        Box::pin(async move {
            let streams = self.streams.read().await;
            let after = after.unwrap_or(Version::INITIAL);
            Ok(streams
                .get(&stream_id)
                .map(|events| {
                    events
                        .iter()
                        .filter(|event| event.sequence > after)
                        .cloned()
                        .collect()
                })
                .unwrap_or_default())
        })
    }

    fn current_version<'a>(
        &'a self,
        stream_id: &'a StreamId,
    ) -> BoxFuture<'a, Result<Version, EventStoreError>> {
        Box::pin(async move {
            let streams = self.streams.read().await;
            Ok(streams
                .get(stream_id)
                .map_or(Version::INITIAL, |events| stream_version(events)))
        })
    }
}

fn stream_version(events: &[RecordedEvent]) -> Version {
    events.last().map_or(Version::INITIAL, |event| event.sequence)
}
