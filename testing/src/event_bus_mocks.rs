//! In-memory event bus.
//!
//! Every subscriber gets its own unbounded channel, so delivery order per
//! subscriber equals publish order. Publishing can be made to fail a given
//! number of times to exercise at-least-once retries, and already published
//! events can be redelivered to exercise idempotent consumers.

use filplus_core::event::RecordedEvent;
use filplus_core::event_bus::{EventBus, EventBusError, EventStream};
use futures::future::BoxFuture;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::{Mutex, mpsc};

#[derive(Debug)]
struct Subscriber {
    topics: Vec<String>,
    sender: mpsc::UnboundedSender<RecordedEvent>,
}

/// Channel-backed [`EventBus`].
///
/// Clones share subscribers and the publish log.
#[derive(Clone, Debug, Default)]
pub struct InMemoryEventBus {
    subscribers: Arc<Mutex<Vec<Subscriber>>>,
    published: Arc<Mutex<Vec<(String, RecordedEvent)>>>,
    failures_left: Arc<AtomicUsize>,
}

impl InMemoryEventBus {
    /// Create a bus with no subscribers.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `count` publishes fail with [`EventBusError::PublishFailed`].
    pub fn fail_next_publishes(&self, count: usize) {
        self.failures_left.store(count, Ordering::SeqCst);
    }

    /// Events successfully published to `topic`, in order.
    pub async fn published(&self, topic: &str) -> Vec<RecordedEvent> {
        self.published
            .lock()
            .await
            .iter()
            .filter(|(t, _)| t == topic)
            .map(|(_, event)| event.clone())
            .collect()
    }

    /// Deliver every event already published on `topic` once more.
    pub async fn redeliver_all(&self, topic: &str) {
        for event in self.published(topic).await {
            self.deliver(topic, &event).await;
        }
    }

    async fn deliver(&self, topic: &str, event: &RecordedEvent) {
        let mut subscribers = self.subscribers.lock().await;
        subscribers.retain(|subscriber| {
            if subscriber.topics.iter().any(|t| t == topic) {
                subscriber.sender.send(event.clone()).is_ok()
            } else {
                !subscriber.sender.is_closed()
            }
        });
    }
}

impl EventBus for InMemoryEventBus {
    fn publish<'a>(
        &'a self,
        topic: &'a str,
        event: &'a RecordedEvent,
    ) -> BoxFuture<'a, Result<(), EventBusError>> {
        Box::pin(async move {
            let injected = self
                .failures_left
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
                .is_ok();
            if injected {
                return Err(EventBusError::PublishFailed {
                    topic: topic.to_owned(),
                    reason: "injected failure".to_owned(),
                });
            }

            self.published
                .lock()
                .await
                .push((topic.to_owned(), event.clone()));
            self.deliver(topic, event).await;
            Ok(())
        })
    }

    fn subscribe(&self, topics: &[&str]) -> BoxFuture<'_, Result<EventStream, EventBusError>> {
        let topics: Vec<String> = topics.iter().map(|t| (*t).to_owned()).collect();
        Box::pin(async move {
            let (sender, mut receiver) = mpsc::unbounded_channel();
            self.subscribers.lock().await.push(Subscriber { topics, sender });

            let stream = async_stream::stream! {
                while let Some(event) = receiver.recv().await {
                    yield Ok(event);
                }
            };
            Ok(Box::pin(stream) as EventStream)
        })
    }
}
