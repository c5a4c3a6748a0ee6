//! # Filecoin Plus Core
//!
//! Write-side and read-side contracts for the datacap application workflow.
//!
//! The workflow is event sourced: every change to an application is recorded as
//! an immutable event in a per-application stream, the stream is the source of
//! truth, and a denormalized read model is kept eventually consistent by
//! projectors consuming those events from an event bus.
//!
//! ## Building blocks
//!
//! - [`stream`]: `StreamId` (aggregate identity) and `Version` (event count)
//! - [`event`]: the [`event::Event`] trait and the serialized/recorded envelopes
//! - [`event_store`]: append-only log with optimistic concurrency
//! - [`event_bus`]: at-least-once publish/subscribe of recorded events
//! - [`projection`]: the [`projection::EventHandler`] contract implemented by projectors
//! - [`environment`]: injected clock
//!
//! ## Flow
//!
//! ```text
//! Command ─► Handler ─► Aggregate ─► EventStore.append ─► EventBus.publish ─► EventHandlers ─► Read model
//! ```

// Re-export commonly used types
pub use chrono::{DateTime, Utc};
pub use futures::future::BoxFuture;
pub use serde::{Deserialize, Serialize};

pub mod event;
pub mod event_bus;
pub mod event_store;
pub mod projection;
pub mod stream;

/// Environment module - injected dependencies shared by handlers.
pub mod environment {
    use chrono::{DateTime, Utc};

    /// Clock trait - abstracts time operations for testability
    ///
    /// Handlers stamp events with `clock.now()` so that replaying a test
    /// scenario with a fixed clock produces identical events.
    ///
    /// # Examples
    ///
    /// ```
    /// use filplus_core::environment::{Clock, SystemClock};
    ///
    /// let clock = SystemClock;
    /// let earlier = clock.now();
    /// assert!(clock.now() >= earlier);
    /// ```
    pub trait Clock: Send + Sync {
        /// Get the current time
        fn now(&self) -> DateTime<Utc>;
    }

    /// Wall-clock implementation of [`Clock`].
    #[derive(Debug, Clone, Copy, Default)]
    pub struct SystemClock;

    impl Clock for SystemClock {
        fn now(&self) -> DateTime<Utc> {
            Utc::now()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::environment::{Clock, SystemClock};

    #[test]
    fn system_clock_is_monotonic_enough() {
        let clock = SystemClock;
        let first = clock.now();
        let second = clock.now();
        assert!(second >= first);
    }
}
