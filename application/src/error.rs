//! Error taxonomy of the application workflow.
//!
//! Every command and query returns [`ApplicationError`]. At the caller
//! boundary it is flattened into an [`ErrorCategory`] plus message (see
//! [`crate::api::Outcome`]).

use crate::types::ApplicationStatus;
use filplus_core::event_store::EventStoreError;
use filplus_core::projection::ProjectionError;
use filplus_runtime::error::{DispatchError, RetryableError};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors produced by the application workflow.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ApplicationError {
    /// A creation command targeted an application that already has events.
    #[error("Application {0} already exists")]
    AlreadyExists(String),

    /// No events (or no read-model document) exist for the id.
    #[error("Application {0} not found")]
    NotFound(String),

    /// The operation is not legal from the current status.
    #[error("Cannot {operation} application {application_id} in status {status}")]
    InvalidTransition {
        /// Target application.
        application_id: String,
        /// Aggregate operation that was refused.
        operation: &'static str,
        /// Status the aggregate was in.
        status: ApplicationStatus,
    },

    /// The event stream moved since the aggregate was loaded.
    #[error("Concurrency conflict on application {application_id}: expected version {expected}, found {actual}")]
    ConcurrencyConflict {
        /// Target application.
        application_id: String,
        /// Version the command loaded.
        expected: u64,
        /// Version in the store.
        actual: u64,
    },

    /// No handler registered for a command or query type.
    #[error("No handler registered for {0}")]
    NoHandlerRegistered(String),

    /// An external system timed out or failed.
    #[error("Collaborator unavailable: {0}")]
    CollaboratorUnavailable(String),

    /// Malformed command input.
    #[error("Validation error: {0}")]
    ValidationError(String),

    /// The acting address does not hold the required role.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Event store or read-model backend failure.
    #[error("Storage error: {0}")]
    Storage(String),

    /// A stored event cannot be encoded or decoded. Reloading will not help.
    #[error("Corrupted event: {0}")]
    Corrupted(String),
}

/// Caller-facing error category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCategory {
    /// See [`ApplicationError::AlreadyExists`].
    AlreadyExists,
    /// See [`ApplicationError::NotFound`].
    NotFound,
    /// See [`ApplicationError::InvalidTransition`].
    InvalidTransition,
    /// See [`ApplicationError::ConcurrencyConflict`].
    ConcurrencyConflict,
    /// See [`ApplicationError::NoHandlerRegistered`].
    NoHandlerRegistered,
    /// See [`ApplicationError::CollaboratorUnavailable`].
    CollaboratorUnavailable,
    /// See [`ApplicationError::ValidationError`].
    ValidationError,
    /// See [`ApplicationError::Unauthorized`].
    Unauthorized,
    /// See [`ApplicationError::Storage`] and [`ApplicationError::Corrupted`].
    Storage,
}

impl ApplicationError {
    /// Category reported to callers.
    #[must_use]
    pub const fn category(&self) -> ErrorCategory {
        match self {
            Self::AlreadyExists(_) => ErrorCategory::AlreadyExists,
            Self::NotFound(_) => ErrorCategory::NotFound,
            Self::InvalidTransition { .. } => ErrorCategory::InvalidTransition,
            Self::ConcurrencyConflict { .. } => ErrorCategory::ConcurrencyConflict,
            Self::NoHandlerRegistered(_) => ErrorCategory::NoHandlerRegistered,
            Self::CollaboratorUnavailable(_) => ErrorCategory::CollaboratorUnavailable,
            Self::ValidationError(_) => ErrorCategory::ValidationError,
            Self::Unauthorized(_) => ErrorCategory::Unauthorized,
            Self::Storage(_) | Self::Corrupted(_) => ErrorCategory::Storage,
        }
    }

    pub(crate) fn validation(message: impl Into<String>) -> Self {
        Self::ValidationError(message.into())
    }
}

impl RetryableError for ApplicationError {
    fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::ConcurrencyConflict { .. } | Self::CollaboratorUnavailable(_) | Self::Storage(_)
        )
    }
}

impl From<DispatchError> for ApplicationError {
    fn from(error: DispatchError) -> Self {
        match error {
            DispatchError::NoHandlerRegistered(name) => Self::NoHandlerRegistered(name.to_owned()),
            DispatchError::HandlerAlreadyRegistered(name) => {
                Self::ValidationError(format!("duplicate handler registration for {name}"))
            }
        }
    }
}

impl From<EventStoreError> for ApplicationError {
    fn from(error: EventStoreError) -> Self {
        match error {
            EventStoreError::ConcurrencyConflict {
                stream_id,
                expected,
                actual,
            } => Self::ConcurrencyConflict {
                application_id: stream_id.into_inner(),
                expected: expected.value(),
                actual: actual.value(),
            },
            EventStoreError::Storage(message) => Self::Storage(message),
            EventStoreError::Serialization(message) => Self::Corrupted(message),
        }
    }
}

impl From<ProjectionError> for ApplicationError {
    fn from(error: ProjectionError) -> Self {
        Self::Storage(error.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use filplus_core::stream::{StreamId, Version};

    #[test]
    fn only_transient_errors_are_retryable() {
        let conflict = ApplicationError::ConcurrencyConflict {
            application_id: "app-1".into(),
            expected: 2,
            actual: 3,
        };
        assert!(conflict.is_retryable());
        assert!(ApplicationError::Storage("down".into()).is_retryable());
        assert!(ApplicationError::CollaboratorUnavailable("timeout".into()).is_retryable());

        assert!(!ApplicationError::validation("bad").is_retryable());
        assert!(!ApplicationError::AlreadyExists("app-1".into()).is_retryable());
        assert!(!ApplicationError::Corrupted("bad bytes".into()).is_retryable());
        assert!(
            !ApplicationError::InvalidTransition {
                application_id: "app-1".into(),
                operation: "record KYC",
                status: ApplicationStatus::Approved,
            }
            .is_retryable()
        );
    }

    #[test]
    fn store_conflicts_map_to_conflicts() {
        let error: ApplicationError = EventStoreError::ConcurrencyConflict {
            stream_id: StreamId::new("app-1"),
            expected: Version::new(2),
            actual: Version::new(3),
        }
        .into();
        assert_eq!(error.category(), ErrorCategory::ConcurrencyConflict);
        assert!(error.to_string().contains("expected version 2, found 3"));
    }

    #[test]
    fn serialization_failures_are_corruption() {
        let error: ApplicationError = EventStoreError::Serialization("truncated".into()).into();
        assert_eq!(error, ApplicationError::Corrupted("truncated".into()));
        assert_eq!(error.category(), ErrorCategory::Storage);
        assert!(!error.is_retryable());
    }

    #[test]
    fn categories_serialize_screaming_snake_case() {
        let json = serde_json::to_string(&ErrorCategory::InvalidTransition).unwrap_or_default();
        assert_eq!(json, "\"INVALID_TRANSITION\"");
    }
}
