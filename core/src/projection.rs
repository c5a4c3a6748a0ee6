//! Event handlers that keep the read model up to date.
//!
//! Projectors are the query side of CQRS. Each one subscribes to exactly one
//! event type and applies a field-level, idempotent update to the read-model
//! document of the event's stream:
//!
//! - write post-event values, never accumulate in place
//! - append-only lists are de-duplicated by content
//! - external lookups that fail fall back to previously known values
//!
//! Replaying a stream through its projectors therefore rebuilds the document.

use crate::event::{EventError, RecordedEvent};
use futures::future::BoxFuture;

/// Error type for projection operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProjectionError {
    /// Storage backend error
    #[error("Storage error: {0}")]
    Storage(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// The event could not be applied (unexpected payload, missing document, ...).
    #[error("Event processing error: {0}")]
    EventProcessing(String),
}

impl From<EventError> for ProjectionError {
    fn from(error: EventError) -> Self {
        Self::Serialization(error.to_string())
    }
}

/// Result type for projection operations.
pub type Result<T> = std::result::Result<T, ProjectionError>;

/// A subscriber to one event type.
///
/// Dyn-compatible so the dispatcher can hold `Arc<dyn EventHandler>`.
///
/// # Example
///
/// ```ignore
/// struct KycApprovedProjector { details: Arc<dyn ApplicationDetailsRepository> }
///
/// impl EventHandler for KycApprovedProjector {
///     fn name(&self) -> &str { "kyc_approved_projector" }
///     fn event_type(&self) -> &str { "KYCApproved.v1" }
///     fn handle<'a>(&'a self, event: &'a RecordedEvent) -> BoxFuture<'a, Result<()>> {
///         Box::pin(async move { /* upsert fields */ Ok(()) })
///     }
/// }
/// ```
pub trait EventHandler: Send + Sync {
    /// Unique handler name, used in logs and dispatch reports.
    fn name(&self) -> &str;

    /// The versioned event type this handler consumes.
    fn event_type(&self) -> &str;

    /// Apply `event`. Must be idempotent.
    ///
    /// # Errors
    ///
    /// Returns [`ProjectionError`] if the payload cannot be decoded or the
    /// read-model store fails. Failures are reported by the dispatcher and
    /// do not stop other handlers.
    fn handle<'a>(&'a self, event: &'a RecordedEvent) -> BoxFuture<'a, Result<()>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_errors_become_serialization_errors() {
        let error: ProjectionError = EventError::DeserializationError("eof".into()).into();
        assert!(matches!(error, ProjectionError::Serialization(msg) if msg.contains("eof")));
    }
}
