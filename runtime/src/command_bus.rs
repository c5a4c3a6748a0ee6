//! Command dispatch.
//!
//! Every command type has exactly one handler. Commands that name an
//! aggregate run one at a time per aggregate ID, so two commands against the
//! same application never interleave inside this process. A handler that
//! still loses an optimistic-concurrency race (another process wrote first)
//! returns a retryable error; the bus then runs the handler again, which
//! reloads the aggregate and reapplies the command.

use crate::error::{DispatchError, RetryableError};
use crate::retry::{RetryPolicy, retry_with_predicate};
use futures::future::BoxFuture;
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

/// A request to change state.
pub trait Command: Clone + Send + Sync + 'static {
    /// Name used in logs and metric labels.
    const NAME: &'static str;

    /// Value returned on success.
    type Output: Send + 'static;

    /// Error returned by the handler.
    type Error: RetryableError + From<DispatchError>;

    /// The aggregate this command writes to, if it is already known.
    ///
    /// Commands returning `Some` are serialized per ID.
    fn aggregate_id(&self) -> Option<&str> {
        None
    }
}

/// Executes one command type.
///
/// A handler loads the aggregate, applies exactly one aggregate operation and
/// persists the result. It may be invoked again for the same command after a
/// retryable failure.
pub trait CommandHandler<C: Command>: Send + Sync {
    /// Execute `command`.
    ///
    /// # Errors
    ///
    /// Returns the command's error type on validation, transition or storage failure.
    fn handle(&self, command: C) -> BoxFuture<'_, Result<C::Output, C::Error>>;
}

type HandlerMap = HashMap<TypeId, Box<dyn Any + Send + Sync>>;
type AggregateLocks = HashMap<String, Arc<Mutex<()>>>;

/// Routes commands to their handlers.
pub struct CommandBus {
    handlers: HandlerMap,
    locks: Mutex<AggregateLocks>,
    retry: RetryPolicy,
}

impl CommandBus {
    /// Create an empty bus retrying retryable failures with `retry`.
    #[must_use]
    pub fn new(retry: RetryPolicy) -> Self {
        Self {
            handlers: HashMap::new(),
            locks: Mutex::new(HashMap::new()),
            retry,
        }
    }

    /// Register the handler for `C`.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::HandlerAlreadyRegistered`] if `C` already has a handler.
    pub fn register<C: Command>(
        &mut self,
        handler: Arc<dyn CommandHandler<C>>,
    ) -> Result<(), DispatchError> {
        let key = TypeId::of::<C>();
        if self.handlers.contains_key(&key) {
            return Err(DispatchError::HandlerAlreadyRegistered(C::NAME));
        }
        self.handlers.insert(key, Box::new(handler));
        tracing::debug!(command = C::NAME, "registered command handler");
        Ok(())
    }

    /// `true` if `C` has a handler.
    #[must_use]
    pub fn is_registered<C: Command>(&self) -> bool {
        self.handlers.contains_key(&TypeId::of::<C>())
    }

    fn handler<C: Command>(&self) -> Option<Arc<dyn CommandHandler<C>>> {
        self.handlers
            .get(&TypeId::of::<C>())
            .and_then(|boxed| boxed.downcast_ref::<Arc<dyn CommandHandler<C>>>())
            .map(Arc::clone)
    }

    /// Dispatch `command` to its handler.
    ///
    /// Runs under the aggregate's lock when [`Command::aggregate_id`] is
    /// `Some`, and retries errors whose [`RetryableError::is_retryable`] is true.
    ///
    /// # Errors
    ///
    /// - `NoHandlerRegistered` (converted into `C::Error`) if `C` has no handler
    /// - the handler's error once it is not retryable or retries are exhausted
    pub async fn dispatch<C: Command>(&self, command: C) -> Result<C::Output, C::Error> {
        let Some(handler) = self.handler::<C>() else {
            tracing::warn!(command = C::NAME, "no handler registered");
            metrics::counter!("commands.failed", "command" => C::NAME).increment(1);
            return Err(DispatchError::NoHandlerRegistered(C::NAME).into());
        };

        metrics::counter!("commands.dispatched", "command" => C::NAME).increment(1);

        let aggregate_id = command.aggregate_id().map(str::to_owned);
        let lock = match &aggregate_id {
            Some(id) => Some(self.lock_for(id).await),
            None => None,
        };
        let guard = match &lock {
            Some(lock) => Some(lock.lock().await),
            None => None,
        };

        tracing::debug!(command = C::NAME, aggregate_id = ?aggregate_id, "dispatching command");

        let mut attempt = 0_usize;
        let result = retry_with_predicate(
            &self.retry,
            || {
                if attempt > 0 {
                    metrics::counter!("commands.retried", "command" => C::NAME).increment(1);
                }
                attempt += 1;
                let handler = Arc::clone(&handler);
                let command = command.clone();
                async move { handler.handle(command).await }
            },
            <C::Error as RetryableError>::is_retryable,
        )
        .await;

        drop(guard);
        drop(lock);
        if let Some(id) = &aggregate_id {
            self.release_lock(id).await;
        }

        if let Err(error) = &result {
            metrics::counter!("commands.failed", "command" => C::NAME).increment(1);
            tracing::info!(
                command = C::NAME,
                aggregate_id = ?aggregate_id,
                error = %error,
                "command failed"
            );
        }

        result
    }

    async fn lock_for(&self, aggregate_id: &str) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().await;
        Arc::clone(
            locks
                .entry(aggregate_id.to_owned())
                .or_insert_with(|| Arc::new(Mutex::new(()))),
        )
    }

    async fn release_lock(&self, aggregate_id: &str) {
        let mut locks = self.locks.lock().await;
        let idle = locks
            .get(aggregate_id)
            .is_some_and(|lock| Arc::strong_count(lock) == 1);
        if idle {
            locks.remove(aggregate_id);
        }
    }
}

impl std::fmt::Debug for CommandBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandBus")
            .field("handlers", &self.handlers.len())
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}
