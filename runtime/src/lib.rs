//! # Filecoin Plus Runtime
//!
//! In-process dispatch for the application workflow.
//!
//! ## Components
//!
//! - **[`CommandBus`]**: one handler per command type, single writer per
//!   aggregate, retry of retryable failures
//! - **[`QueryBus`]**: one handler per query type, reads only
//! - **[`EventDispatcher`]**: zero or more handlers per event type, run
//!   independently; [`EventDispatcher::spawn`] consumes an event bus topic
//!   with one ordered worker per aggregate
//! - **[`retry`]**: exponential backoff helpers
//!
//! ## Example
//!
//! ```ignore
//! let mut commands = CommandBus::new(RetryPolicy::default());
//! commands.register::<CreateApplication>(Arc::new(ApplicationCommandHandler::new(repo, clock, roles, collaborators)))?;
//!
//! let created = commands.dispatch(CreateApplication { /* ... */ }).await?;
//! ```

/// Retry logic with exponential backoff
pub mod retry;

/// Command dispatch with per-aggregate serialization
pub mod command_bus;

/// Query dispatch
pub mod query_bus;

/// Event fan-out to projectors
pub mod event_dispatcher;

pub use command_bus::{Command, CommandBus, CommandHandler};
pub use event_dispatcher::{DispatchReport, DispatcherHandle, EventDispatcher, HandlerFailure};
pub use query_bus::{Query, QueryBus, QueryHandler};

/// Error types shared by the buses
pub mod error {
    use thiserror::Error;

    /// Routing failures raised by the buses themselves.
    ///
    /// Handler error types embed this through `From<DispatchError>`, so a
    /// missing registration surfaces through the same `Result` as a domain error.
    #[derive(Error, Debug, Clone, PartialEq, Eq)]
    pub enum DispatchError {
        /// No handler registered for the message type.
        #[error("No handler registered for {0}")]
        NoHandlerRegistered(&'static str),

        /// A second handler was registered for a command or query type.
        #[error("A handler is already registered for {0}")]
        HandlerAlreadyRegistered(&'static str),
    }

    /// Errors that know whether the failed operation may be attempted again.
    pub trait RetryableError: std::error::Error + Send + Sync + 'static {
        /// `true` if reloading state and reapplying may succeed.
        fn is_retryable(&self) -> bool;
    }
}
