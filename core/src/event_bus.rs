//! Publish/subscribe of recorded events.
//!
//! The event store is the source of truth; the repository publishes each
//! event after it has been appended. Delivery is at-least-once and ordered
//! per stream, so subscribers must tolerate redeliveries.
//!
//! ```text
//! Repository::save ──► EventStore::append ──► EventBus::publish ──► EventDispatcher ──► projectors
//! ```

use crate::event::RecordedEvent;
use futures::Stream;
use futures::future::BoxFuture;
use std::pin::Pin;
use thiserror::Error;

/// Errors that can occur during event bus operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EventBusError {
    /// Failed to publish an event to a topic
    #[error("Publish failed for topic '{topic}': {reason}")]
    PublishFailed {
        /// The topic that failed
        topic: String,
        /// The reason for failure
        reason: String,
    },

    /// Failed to subscribe to topics
    #[error("Subscription failed for topics {topics:?}: {reason}")]
    SubscriptionFailed {
        /// The topics that failed to subscribe
        topics: Vec<String>,
        /// The reason for failure
        reason: String,
    },

    /// The bus has been shut down.
    #[error("Event bus closed")]
    Closed,
}

/// Stream of events delivered to a subscriber.
pub type EventStream = Pin<Box<dyn Stream<Item = Result<RecordedEvent, EventBusError>> + Send>>;

/// Topic-based, at-least-once event transport.
///
/// # Example
///
/// ```rust,ignore
/// use futures::StreamExt;
///
/// bus.publish("application-events", &recorded).await?;
///
/// let mut events = bus.subscribe(&["application-events"]).await?;
/// while let Some(Ok(event)) = events.next().await {
///     tracing::info!(event_type = %event.event_type, "received");
/// }
/// ```
pub trait EventBus: Send + Sync {
    /// Publish a recorded event on `topic`.
    ///
    /// # Errors
    ///
    /// Returns [`EventBusError::PublishFailed`] if the transport rejects the event.
    fn publish<'a>(
        &'a self,
        topic: &'a str,
        event: &'a RecordedEvent,
    ) -> BoxFuture<'a, Result<(), EventBusError>>;

    /// Subscribe to `topics`. Only events published after the call are delivered.
    ///
    /// # Errors
    ///
    /// Returns [`EventBusError::SubscriptionFailed`] if the subscription cannot be opened.
    fn subscribe(&self, topics: &[&str]) -> BoxFuture<'_, Result<EventStream, EventBusError>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn publish_error_mentions_topic() {
        let error = EventBusError::PublishFailed {
            topic: "application-events".into(),
            reason: "broker down".into(),
        };
        let display = error.to_string();
        assert!(display.contains("application-events"));
        assert!(display.contains("broker down"));
    }
}
