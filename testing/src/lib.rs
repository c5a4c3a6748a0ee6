//! # Filecoin Plus Testing
//!
//! In-memory infrastructure and helpers for the application workflow.
//!
//! This crate provides:
//! - [`mocks::InMemoryEventStore`] and [`mocks::InMemoryEventBus`]
//! - [`mocks::FixedClock`] for deterministic timestamps
//! - [`helpers::eventually`] for asserting on the eventually consistent read model
//!
//! ## Example
//!
//! ```ignore
//! use filplus_testing::{InMemoryEventBus, InMemoryEventStore, test_clock};
//!
//! #[tokio::test]
//! async fn create_then_query() {
//!     let infrastructure = Infrastructure {
//!         event_store: Arc::new(InMemoryEventStore::new()),
//!         event_bus: Arc::new(InMemoryEventBus::new()),
//!         details: Arc::new(InMemoryApplicationDetailsRepository::new()),
//!         clock: Arc::new(test_clock()),
//!     };
//!     let service = ApplicationService::start(&config, infrastructure, collaborators).await?;
//! }
//! ```

use chrono::{DateTime, Utc};
use filplus_core::environment::Clock;

mod event_bus_mocks;
mod event_store_mocks;

/// Mock implementations of infrastructure traits.
pub mod mocks {
    use super::{Clock, DateTime, Utc};
    use std::sync::Mutex;

    pub use crate::event_bus_mocks::InMemoryEventBus;
    pub use crate::event_store_mocks::InMemoryEventStore;

    /// Fixed clock for deterministic tests
    ///
    /// Returns the same instant until [`FixedClock::advance`] moves it.
    ///
    /// # Example
    ///
    /// ```
    /// use filplus_testing::mocks::FixedClock;
    /// use filplus_core::environment::Clock;
    /// use chrono::{Duration, Utc};
    ///
    /// let start = Utc::now();
    /// let clock = FixedClock::new(start);
    /// assert_eq!(clock.now(), clock.now());
    ///
    /// clock.advance(Duration::seconds(5));
    /// assert_eq!(clock.now(), start + Duration::seconds(5));
    /// ```
    #[derive(Debug)]
    pub struct FixedClock {
        time: Mutex<DateTime<Utc>>,
    }

    impl FixedClock {
        /// Create a new fixed clock with the given time
        #[must_use]
        pub const fn new(time: DateTime<Utc>) -> Self {
            Self {
                time: Mutex::new(time),
            }
        }

        /// Move the clock forward.
        pub fn advance(&self, by: chrono::Duration) {
            let mut time = self.time.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
            *time += by;
        }
    }

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            *self.time.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
        }
    }

    /// Create a default fixed clock for tests (2025-01-01 00:00:00 UTC)
    #[must_use]
    pub fn test_clock() -> FixedClock {
        FixedClock::new(DateTime::<Utc>::from_timestamp(1_735_689_600, 0).unwrap_or_default())
    }
}

/// Test helpers and utilities.
pub mod helpers {
    use std::future::Future;
    use std::time::Duration;

    /// Poll `check` every few milliseconds until it returns `true` or
    /// `timeout` elapses. Returns the last result.
    ///
    /// # Example
    ///
    /// ```ignore
    /// let projected = eventually(Duration::from_secs(1), || async {
    ///     details.get_by_id("app-1").await.ok().flatten().is_some()
    /// })
    /// .await;
    /// assert!(projected);
    /// ```
    pub async fn eventually<F, Fut>(timeout: Duration, mut check: F) -> bool
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = bool>,
    {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if check().await {
                return true;
            }
            if tokio::time::Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }
}

// Re-export commonly used items
pub use helpers::eventually;
pub use mocks::{FixedClock, InMemoryEventBus, InMemoryEventStore, test_clock};
