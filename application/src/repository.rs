//! Loading and saving applications.
//!
//! The event store is the source of truth: an application is loaded by
//! replaying its stream and saved by appending its pending events under an
//! expected version. Events that were appended are then published to the
//! event bus for the projectors.

use crate::aggregate::Application;
use crate::error::ApplicationError;
use filplus_core::event::{RecordedEvent, SerializedEvent};
use filplus_core::event_bus::EventBus;
use filplus_core::event_store::{EventStore, ExpectedVersion};
use filplus_core::stream::StreamId;
use filplus_runtime::retry::{RetryPolicy, retry_with_backoff};
use std::sync::Arc;

/// Event-sourced storage for [`Application`].
#[derive(Clone)]
pub struct ApplicationRepository {
    store: Arc<dyn EventStore>,
    bus: Arc<dyn EventBus>,
    topic: String,
    publish_retry: RetryPolicy,
}

impl ApplicationRepository {
    /// Create a repository appending to `store` and publishing to `topic` on `bus`.
    #[must_use]
    pub fn new(store: Arc<dyn EventStore>, bus: Arc<dyn EventBus>, topic: impl Into<String>) -> Self {
        Self {
            store,
            bus,
            topic: topic.into(),
            publish_retry: RetryPolicy::default(),
        }
    }

    /// Retry policy for publishing appended events.
    #[must_use]
    pub fn with_publish_retry(mut self, policy: RetryPolicy) -> Self {
        self.publish_retry = policy;
        self
    }

    /// Topic appended events are published to.
    #[must_use]
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Replay the application's full stream.
    ///
    /// # Errors
    ///
    /// - `NotFound` when the stream has no events
    /// - `Storage` when the store fails
    /// - `Corrupted` when an event cannot be decoded
    pub async fn get_by_id(&self, id: &str) -> Result<Application, ApplicationError> {
        self.load(id)
            .await?
            .ok_or_else(|| ApplicationError::NotFound(id.to_owned()))
    }

    /// Like [`Self::get_by_id`], but absence is `Ok(None)`.
    ///
    /// # Errors
    ///
    /// `Storage` when the store fails, `Corrupted` when an event cannot be decoded.
    pub async fn load(&self, id: &str) -> Result<Option<Application>, ApplicationError> {
        let history = self.load_events(id).await?;
        if history.is_empty() {
            return Ok(None);
        }
        Application::from_history(id, &history).map(Some)
    }

    /// The application's raw stream, in sequence order.
    ///
    /// # Errors
    ///
    /// `Storage` when the store fails.
    pub async fn load_events(&self, id: &str) -> Result<Vec<RecordedEvent>, ApplicationError> {
        Ok(self.store.load_events(StreamId::new(id), None).await?)
    }

    /// Append the application's pending events and publish them.
    ///
    /// [`ExpectedVersion::Unchecked`] skips the concurrency check and is only
    /// sound on call paths with a single writer for the stream.
    ///
    /// A publish failure does not undo the append: it is logged and the
    /// remaining events of the batch are not published. The dispatcher reads
    /// them back from the store when the stream's next event arrives; until
    /// then (or a read-model rebuild) the document lags.
    ///
    /// # Errors
    ///
    /// - `ConcurrencyConflict` when the stream moved past `expected`; nothing
    ///   is appended and the pending events are kept
    /// - `Storage` when the store fails
    /// - `Corrupted` when an event cannot be encoded
    pub async fn save(
        &self,
        application: &mut Application,
        expected: ExpectedVersion,
    ) -> Result<Vec<RecordedEvent>, ApplicationError> {
        if application.uncommitted_events().is_empty() {
            return Ok(Vec::new());
        }

        let batch = application
            .uncommitted_events()
            .iter()
            .map(|pending| {
                SerializedEvent::from_event(&pending.event, None, pending.occurred_at)
                    .map_err(|e| ApplicationError::Corrupted(e.to_string()))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let stream_id = StreamId::new(application.id());
        let recorded = match self.store.append_events(stream_id, expected, batch).await {
            Ok(recorded) => recorded,
            Err(error) => {
                tracing::warn!(
                    application_id = %application.id(),
                    error = %error,
                    "failed to append application events"
                );
                return Err(error.into());
            }
        };

        application.take_uncommitted();
        if let Some(last) = recorded.last() {
            application.mark_committed(last.sequence);
        }
        tracing::info!(
            application_id = %application.id(),
            events = recorded.len(),
            version = %application.version(),
            "saved application events"
        );

        self.publish(&recorded).await;
        Ok(recorded)
    }

    async fn publish(&self, recorded: &[RecordedEvent]) {
        for event in recorded {
            let published = retry_with_backoff(&self.publish_retry, || self.bus.publish(&self.topic, event)).await;
            if let Err(error) = published {
                tracing::error!(
                    application_id = %event.stream_id,
                    event_type = %event.event_type,
                    sequence = %event.sequence,
                    error = %error,
                    "failed to publish event, read model lags until the stream moves again"
                );
                return;
            }
            tracing::debug!(
                application_id = %event.stream_id,
                event_type = %event.event_type,
                sequence = %event.sequence,
                "published event"
            );
        }
    }
}

impl std::fmt::Debug for ApplicationRepository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApplicationRepository")
            .field("topic", &self.topic)
            .field("publish_retry", &self.publish_retry)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::aggregate::KycOutcome;
    use crate::types::{AllocationRequest, ApplicantInfo, ApplicationStatus};
    use chrono::{DateTime, Utc};
    use filplus_core::stream::Version;
    use filplus_testing::{InMemoryEventBus, InMemoryEventStore};
    use std::time::Duration;

    fn at() -> DateTime<Utc> {
        DateTime::<Utc>::from_timestamp(1_735_689_600, 0).unwrap()
    }

    fn repository(store: &InMemoryEventStore, bus: &InMemoryEventBus) -> ApplicationRepository {
        ApplicationRepository::new(Arc::new(store.clone()), Arc::new(bus.clone()), "application-events")
            .with_publish_retry(
                RetryPolicy::builder()
                    .max_retries(1)
                    .initial_delay(Duration::from_millis(1))
                    .build(),
            )
    }

    fn new_application(id: &str) -> Application {
        let mut app = Application::new(id);
        app.create(1, ApplicantInfo::default(), AllocationRequest::default(), at())
            .unwrap();
        app
    }

    #[tokio::test]
    async fn missing_application_is_not_found() {
        let repo = repository(&InMemoryEventStore::new(), &InMemoryEventBus::new());
        assert_eq!(
            repo.get_by_id("nope").await,
            Err(ApplicationError::NotFound("nope".into()))
        );
        assert_eq!(repo.load("nope").await, Ok(None));
    }

    #[tokio::test]
    async fn save_appends_publishes_and_reloads() {
        let store = InMemoryEventStore::new();
        let bus = InMemoryEventBus::new();
        let repo = repository(&store, &bus);

        let mut app = new_application("app-1");
        app.record_kyc(KycOutcome::Approved, at()).unwrap();
        let recorded = repo
            .save(&mut app, ExpectedVersion::Exact(Version::INITIAL))
            .await
            .unwrap();

        assert_eq!(recorded.len(), 2);
        assert_eq!(app.version(), Version::new(2));
        assert!(app.uncommitted_events().is_empty());
        assert_eq!(bus.published("application-events").await.len(), 2);

        let loaded = repo.get_by_id("app-1").await.unwrap();
        assert_eq!(loaded.status(), ApplicationStatus::GovernanceReviewPhase);
        assert_eq!(loaded.version(), Version::new(2));
    }

    #[tokio::test]
    async fn stale_save_conflicts_and_keeps_pending_events() {
        let store = InMemoryEventStore::new();
        let bus = InMemoryEventBus::new();
        let repo = repository(&store, &bus);

        let mut first = new_application("app-1");
        repo.save(&mut first, ExpectedVersion::Exact(Version::INITIAL))
            .await
            .unwrap();

        let mut stale = new_application("app-1");
        let result = repo
            .save(&mut stale, ExpectedVersion::Exact(Version::INITIAL))
            .await;

        assert!(matches!(
            result,
            Err(ApplicationError::ConcurrencyConflict {
                expected: 0,
                actual: 1,
                ..
            })
        ));
        assert_eq!(stale.uncommitted_events().len(), 1);
        assert_eq!(store.event_count().await, 1);
    }

    #[tokio::test]
    async fn publish_failure_does_not_fail_the_save() {
        let store = InMemoryEventStore::new();
        let bus = InMemoryEventBus::new();
        let repo = repository(&store, &bus);
        bus.fail_next_publishes(10);

        let mut app = new_application("app-1");
        let recorded = repo
            .save(&mut app, ExpectedVersion::Exact(Version::INITIAL))
            .await
            .unwrap();

        assert_eq!(recorded.len(), 1);
        assert_eq!(store.event_count().await, 1);
        assert!(bus.published("application-events").await.is_empty());
    }

    #[tokio::test]
    async fn saving_nothing_is_a_no_op() {
        let store = InMemoryEventStore::new();
        let repo = repository(&store, &InMemoryEventBus::new());
        let mut app = Application::new("app-1");
        assert_eq!(repo.save(&mut app, ExpectedVersion::Unchecked).await, Ok(vec![]));
        assert_eq!(store.event_count().await, 0);
    }
}
