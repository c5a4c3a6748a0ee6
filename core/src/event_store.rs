//! Append-only event log with optimistic concurrency.
//!
//! Each aggregate owns one stream. Appending takes an [`ExpectedVersion`]:
//! with [`ExpectedVersion::Exact`] the append is rejected with
//! [`EventStoreError::ConcurrencyConflict`] unless the stream is at exactly
//! that version, and nothing is written. [`ExpectedVersion::Unchecked`] skips
//! the check and is only sound on call paths that already guarantee a single
//! writer for the stream.
//!
//! # Example
//!
//! ```no_run
//! use filplus_core::event_store::{EventStore, EventStoreError, ExpectedVersion};
//! use filplus_core::stream::{StreamId, Version};
//!
//! async fn append(store: &dyn EventStore) -> Result<(), EventStoreError> {
//!     let stream = StreamId::new("app-1");
//!     let current = store.current_version(&stream).await?;
//!     let recorded = store
//!         .append_events(stream.clone(), ExpectedVersion::Exact(current), vec![/* ... */])
//!         .await?;
//!     assert!(recorded.iter().all(|e| e.sequence > current));
//!     Ok(())
//! }
//! ```

use crate::event::{RecordedEvent, SerializedEvent};
use crate::stream::{StreamId, Version};
use futures::future::BoxFuture;
use thiserror::Error;

/// Errors that can occur during event store operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EventStoreError {
    /// The stream moved since it was loaded.
    #[error("Concurrency conflict on {stream_id}: expected version {expected}, found {actual}")]
    ConcurrencyConflict {
        /// The stream where the conflict occurred.
        stream_id: StreamId,
        /// The version the caller loaded.
        expected: Version,
        /// The version the store holds.
        actual: Version,
    },

    /// Backend failure (connection lost, constraint violation other than versioning, ...).
    #[error("Storage error: {0}")]
    Storage(String),

    /// An envelope could not be encoded or decoded.
    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Concurrency expectation attached to an append.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExpectedVersion {
    /// The stream must currently hold exactly this many events.
    Exact(Version),
    /// Append without a version check. Unsafe when several writers can
    /// target the same stream.
    Unchecked,
}

impl From<Version> for ExpectedVersion {
    fn from(version: Version) -> Self {
        Self::Exact(version)
    }
}

/// Durable, per-stream ordered log of recorded events.
///
/// Implementations must enforce uniqueness of `(stream_id, sequence)` and
/// must make an append all-or-nothing.
///
/// The trait returns [`BoxFuture`] so it can be shared as `Arc<dyn EventStore>`.
pub trait EventStore: Send + Sync {
    /// Append `events` to `stream_id`, assigning consecutive sequences.
    ///
    /// Returns the recorded events in order. An empty batch is a no-op that
    /// still performs the version check.
    ///
    /// # Errors
    ///
    /// - [`EventStoreError::ConcurrencyConflict`] if `expected` does not match
    ///   the stream's current version; no event is appended.
    /// - [`EventStoreError::Storage`] on backend failure.
    fn append_events(
        &self,
        stream_id: StreamId,
        expected: ExpectedVersion,
        events: Vec<SerializedEvent>,
    ) -> BoxFuture<'_, Result<Vec<RecordedEvent>, EventStoreError>>;

    /// Load a stream in sequence order, starting after `after` when given.
    ///
    /// A stream with no events yields an empty vector.
    ///
    /// # Errors
    ///
    /// Returns [`EventStoreError::Storage`] on backend failure.
    fn load_events(
        &self,
        stream_id: StreamId,
        after: Option<Version>,
    ) -> BoxFuture<'_, Result<Vec<RecordedEvent>, EventStoreError>>;

    /// Number of events currently in the stream.
    ///
    /// # Errors
    ///
    /// Returns [`EventStoreError::Storage`] on backend failure.
    fn current_version<'a>(
        &'a self,
        stream_id: &'a StreamId,
    ) -> BoxFuture<'a, Result<Version, EventStoreError>>;
}
