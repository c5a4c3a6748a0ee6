//! Domain events and their storage envelopes.
//!
//! Domain events are encoded with `bincode`. The envelope around them keeps
//! the routing data in plain fields (`event_type`, stream, sequence, time) so
//! stores and buses never decode payloads they do not own.
//!
//! ```text
//! Event ──to_bytes──► SerializedEvent ──EventStore::append──► RecordedEvent
//! ```
//!
//! # Example
//!
//! ```
//! use filplus_core::event::Event;
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
//! enum ReviewEvent {
//!     Approved { reviewer: String },
//! }
//!
//! impl Event for ReviewEvent {
//!     fn event_type(&self) -> &'static str {
//!         "ReviewApproved.v1"
//!     }
//! }
//!
//! let event = ReviewEvent::Approved { reviewer: "0xabc".into() };
//! let bytes = event.to_bytes().unwrap();
//! assert_eq!(ReviewEvent::from_bytes(&bytes).unwrap(), event);
//! ```

use crate::stream::{StreamId, Version};
use chrono::{DateTime, Utc};
use serde::{Serialize, de::DeserializeOwned};
use thiserror::Error;

/// Error types for event encoding.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EventError {
    /// Failed to serialize event to bytes.
    #[error("Failed to serialize event: {0}")]
    SerializationError(String),

    /// Failed to deserialize event from bytes.
    #[error("Failed to deserialize event: {0}")]
    DeserializationError(String),

    /// An envelope carried a type name this decoder does not know.
    #[error("Unknown event type: {0}")]
    UnknownEventType(String),
}

/// An immutable fact recorded in an aggregate stream.
///
/// `event_type` must be stable and versioned (`"KYCApproved.v1"`); it is
/// stored next to the payload and used to route events to handlers.
pub trait Event: Send + Sync + 'static {
    /// Versioned type name of this event.
    fn event_type(&self) -> &'static str;

    /// Encode this event with bincode.
    ///
    /// # Errors
    ///
    /// Returns [`EventError::SerializationError`] if bincode rejects the value.
    fn to_bytes(&self) -> Result<Vec<u8>, EventError>
    where
        Self: Serialize,
    {
        bincode::serialize(self).map_err(|e| EventError::SerializationError(e.to_string()))
    }

    /// Decode an event previously produced by [`Event::to_bytes`].
    ///
    /// # Errors
    ///
    /// Returns [`EventError::DeserializationError`] if the bytes are corrupted
    /// or were produced by an incompatible schema.
    fn from_bytes(bytes: &[u8]) -> Result<Self, EventError>
    where
        Self: DeserializeOwned + Sized,
    {
        bincode::deserialize(bytes).map_err(|e| EventError::DeserializationError(e.to_string()))
    }
}

/// An encoded event that has not been assigned a stream position yet.
#[derive(Clone, Debug, PartialEq)]
pub struct SerializedEvent {
    /// Versioned type name (e.g. `"ApplicationCreated.v1"`).
    pub event_type: String,
    /// Bincode payload.
    pub data: Vec<u8>,
    /// Free-form metadata (actor, correlation id, ...).
    pub metadata: Option<serde_json::Value>,
    /// When the fact happened, taken from the injected clock.
    pub occurred_at: DateTime<Utc>,
}

impl SerializedEvent {
    /// Build an envelope from its parts.
    #[must_use]
    pub const fn new(
        event_type: String,
        data: Vec<u8>,
        metadata: Option<serde_json::Value>,
        occurred_at: DateTime<Utc>,
    ) -> Self {
        Self {
            event_type,
            data,
            metadata,
            occurred_at,
        }
    }

    /// Encode a domain event into an envelope.
    ///
    /// # Errors
    ///
    /// Returns [`EventError::SerializationError`] if the payload cannot be encoded.
    pub fn from_event<E>(
        event: &E,
        metadata: Option<serde_json::Value>,
        occurred_at: DateTime<Utc>,
    ) -> Result<Self, EventError>
    where
        E: Event + Serialize,
    {
        Ok(Self {
            event_type: event.event_type().to_string(),
            data: event.to_bytes()?,
            metadata,
            occurred_at,
        })
    }
}

/// An event as persisted: envelope plus its position in the stream.
///
/// `(stream_id, sequence)` is unique across the store.
#[derive(Clone, Debug, PartialEq)]
pub struct RecordedEvent {
    /// Owning aggregate stream.
    pub stream_id: StreamId,
    /// 1-based position within the stream.
    pub sequence: Version,
    /// Versioned type name.
    pub event_type: String,
    /// Bincode payload.
    pub data: Vec<u8>,
    /// Metadata copied from the [`SerializedEvent`].
    pub metadata: Option<serde_json::Value>,
    /// When the fact happened.
    pub occurred_at: DateTime<Utc>,
}

impl RecordedEvent {
    /// Place an envelope at `sequence` in `stream_id`.
    #[must_use]
    pub fn from_serialized(stream_id: StreamId, sequence: Version, event: SerializedEvent) -> Self {
        Self {
            stream_id,
            sequence,
            event_type: event.event_type,
            data: event.data,
            metadata: event.metadata,
            occurred_at: event.occurred_at,
        }
    }

    /// Decode the payload as `E`.
    ///
    /// # Errors
    ///
    /// Returns [`EventError::DeserializationError`] if the payload does not decode as `E`.
    pub fn decode<E>(&self) -> Result<E, EventError>
    where
        E: Event + DeserializeOwned,
    {
        E::from_bytes(&self.data)
    }
}
