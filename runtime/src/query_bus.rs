//! Query dispatch.
//!
//! Queries read the read model only; each query type maps to exactly one
//! handler and is never retried.

use crate::error::DispatchError;
use futures::future::BoxFuture;
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::Arc;

/// A read request.
pub trait Query: Send + Sync + 'static {
    /// Name used in logs and metric labels.
    const NAME: &'static str;

    /// Result of the query.
    type Output: Send + 'static;

    /// Error returned by the handler.
    type Error: std::error::Error + Send + Sync + From<DispatchError> + 'static;
}

/// Answers one query type.
pub trait QueryHandler<Q: Query>: Send + Sync {
    /// Answer `query`.
    ///
    /// # Errors
    ///
    /// Returns the query's error type (e.g. not found, storage failure).
    fn handle(&self, query: Q) -> BoxFuture<'_, Result<Q::Output, Q::Error>>;
}

/// Routes queries to their handlers.
#[derive(Default)]
pub struct QueryBus {
    handlers: HashMap<TypeId, Box<dyn Any + Send + Sync>>,
}

impl QueryBus {
    /// Create an empty bus.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the handler for `Q`.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::HandlerAlreadyRegistered`] if `Q` already has a handler.
    pub fn register<Q: Query>(
        &mut self,
        handler: Arc<dyn QueryHandler<Q>>,
    ) -> Result<(), DispatchError> {
        let key = TypeId::of::<Q>();
        if self.handlers.contains_key(&key) {
            return Err(DispatchError::HandlerAlreadyRegistered(Q::NAME));
        }
        self.handlers.insert(key, Box::new(handler));
        Ok(())
    }

    /// Dispatch `query` to its handler.
    ///
    /// # Errors
    ///
    /// Returns `NoHandlerRegistered` (converted into `Q::Error`) if `Q` has no
    /// handler, or the handler's own error.
    pub async fn dispatch<Q: Query>(&self, query: Q) -> Result<Q::Output, Q::Error> {
        let handler = self
            .handlers
            .get(&TypeId::of::<Q>())
            .and_then(|boxed| boxed.downcast_ref::<Arc<dyn QueryHandler<Q>>>())
            .map(Arc::clone)
            .ok_or(DispatchError::NoHandlerRegistered(Q::NAME))?;

        metrics::counter!("queries.dispatched", "query" => Q::NAME).increment(1);
        tracing::debug!(query = Q::NAME, "dispatching query");

        handler.handle(query).await
    }
}

impl std::fmt::Debug for QueryBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryBus")
            .field("handlers", &self.handlers.len())
            .finish()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use thiserror::Error;

    #[derive(Debug, Error, PartialEq)]
    enum LookupError {
        #[error("not found")]
        NotFound,
        #[error(transparent)]
        Dispatch(#[from] DispatchError),
    }

    struct Echo(String);

    impl Query for Echo {
        const NAME: &'static str = "Echo";
        type Output = String;
        type Error = LookupError;
    }

    struct EchoHandler;

    impl QueryHandler<Echo> for EchoHandler {
        fn handle(&self, query: Echo) -> BoxFuture<'_, Result<String, LookupError>> {
            Box::pin(async move {
                if query.0.is_empty() {
                    Err(LookupError::NotFound)
                } else {
                    Ok(query.0.to_uppercase())
                }
            })
        }
    }

    #[tokio::test]
    async fn routes_to_registered_handler() {
        let mut bus = QueryBus::new();
        bus.register::<Echo>(Arc::new(EchoHandler)).unwrap();

        assert_eq!(bus.dispatch(Echo("app".into())).await, Ok("APP".to_string()));
        assert_eq!(bus.dispatch(Echo(String::new())).await, Err(LookupError::NotFound));
    }

    #[tokio::test]
    async fn missing_handler_is_reported() {
        let bus = QueryBus::new();
        assert_eq!(
            bus.dispatch(Echo("x".into())).await,
            Err(LookupError::Dispatch(DispatchError::NoHandlerRegistered("Echo")))
        );
    }
}
