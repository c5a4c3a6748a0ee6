//! Wiring: infrastructure, buses, projectors and the running service.
//!
//! ```rust,ignore
//! let config = AppConfig::from_env();
//! let service = ApplicationService::start(&config, Infrastructure::in_memory(), Collaborators::disabled()).await?;
//!
//! let outcome = service.handle_request(Request::parse(line)?).await;
//!
//! service.shutdown().await;
//! ```

use crate::api::{CommandRequest, Outcome, QueryRequest, Request};
use crate::collaborators::Collaborators;
use crate::command_handlers::ApplicationCommandHandler;
use crate::commands::{
    CreateApplication, EditApplication, RefreshAllocatorMultisig, RequestDatacapRefresh, RevokeKyc,
    StartRkhApproval, SubmitGovernanceReviewResult, SubmitKycResult, UpdateDatacapAllocation,
    UpdateMetaAllocatorApprovals, UpdateRkhApprovals,
};
use crate::config::AppConfig;
use crate::error::ApplicationError;
use crate::projectors::ApplicationDetailsProjector;
use crate::queries::{ApplicationQueryHandler, GetApplicationById, GetApplications};
use crate::read_model::{ApplicationDetailsRepository, InMemoryApplicationDetailsRepository};
use crate::repository::ApplicationRepository;
use crate::role::RoleResolver;
use filplus_core::environment::{Clock, SystemClock};
use filplus_core::event_bus::EventBus;
use filplus_core::event_store::EventStore;
use filplus_runtime::error::DispatchError;
use filplus_runtime::event_dispatcher::{DispatcherHandle, EventDispatcher};
use filplus_runtime::{Command, CommandBus, Query, QueryBus};
use filplus_testing::{InMemoryEventBus, InMemoryEventStore};
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;

/// Storage and transport the service runs on.
#[derive(Clone)]
pub struct Infrastructure {
    /// Write side.
    pub event_store: Arc<dyn EventStore>,
    /// Publishes committed events to projectors.
    pub event_bus: Arc<dyn EventBus>,
    /// Read side.
    pub details: Arc<dyn ApplicationDetailsRepository>,
    /// Timestamp source.
    pub clock: Arc<dyn Clock>,
}

impl Infrastructure {
    /// Everything in memory, wall-clock time.
    #[must_use]
    pub fn in_memory() -> Self {
        Self {
            event_store: Arc::new(InMemoryEventStore::new()),
            event_bus: Arc::new(InMemoryEventBus::new()),
            details: Arc::new(InMemoryApplicationDetailsRepository::new()),
            clock: Arc::new(SystemClock),
        }
    }

    /// Replace the clock.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }
}

impl std::fmt::Debug for Infrastructure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Infrastructure").finish_non_exhaustive()
    }
}

/// The running application workflow.
pub struct ApplicationService {
    commands: CommandBus,
    queries: QueryBus,
    repository: ApplicationRepository,
    details: Arc<dyn ApplicationDetailsRepository>,
    dispatcher: Arc<EventDispatcher>,
    handle: DispatcherHandle,
}

impl ApplicationService {
    /// Register every handler and projector and start consuming events.
    ///
    /// # Errors
    ///
    /// Returns [`ApplicationError::Storage`] if the event topic cannot be
    /// subscribed.
    pub async fn start(
        config: &AppConfig,
        infrastructure: Infrastructure,
        collaborators: Collaborators,
    ) -> Result<Self, ApplicationError> {
        let Infrastructure {
            event_store,
            event_bus,
            details,
            clock,
        } = infrastructure;

        let repository = ApplicationRepository::new(
            Arc::clone(&event_store),
            Arc::clone(&event_bus),
            config.events_topic.clone(),
        );
        let blockchain = Arc::clone(&collaborators.blockchain);
        let handler = Arc::new(
            ApplicationCommandHandler::new(
                repository.clone(),
                clock,
                RoleResolver::new(config.roles.clone()),
                collaborators,
            )
            .with_collaborator_timeout(config.collaborator_timeout())
            .with_default_rkh_threshold(config.rkh_approval_threshold),
        );

        let mut commands = CommandBus::new(config.command_retry_policy());
        register_commands(&mut commands, &handler)?;

        let mut queries = QueryBus::new();
        let query_handler = Arc::new(ApplicationQueryHandler::new(Arc::clone(&details)));
        queries.register::<GetApplicationById>(Arc::clone(&query_handler) as _)?;
        queries.register::<GetApplications>(query_handler)?;

        let mut dispatcher = EventDispatcher::new()
            .with_event_store(event_store)
            .with_workers(config.projection_workers);
        for projector in ApplicationDetailsProjector::all(&details, &blockchain, config.collaborator_timeout()) {
            dispatcher.register(projector);
        }
        let dispatcher = Arc::new(dispatcher);
        let handle = Arc::clone(&dispatcher)
            .spawn(event_bus, &config.events_topic)
            .await
            .map_err(|error| ApplicationError::Storage(format!("cannot subscribe to {}: {error}", config.events_topic)))?;

        tracing::info!(topic = %config.events_topic, "application service started");
        Ok(Self {
            commands,
            queries,
            repository,
            details,
            dispatcher,
            handle,
        })
    }

    /// Dispatch a command.
    ///
    /// # Errors
    ///
    /// Returns the command's [`ApplicationError`].
    pub async fn execute<C>(&self, command: C) -> Result<C::Output, ApplicationError>
    where
        C: Command<Error = ApplicationError>,
    {
        self.commands.dispatch(command).await
    }

    /// Dispatch a query.
    ///
    /// # Errors
    ///
    /// Returns the query's [`ApplicationError`].
    pub async fn ask<Q>(&self, query: Q) -> Result<Q::Output, ApplicationError>
    where
        Q: Query<Error = ApplicationError>,
    {
        self.queries.dispatch(query).await
    }

    /// Run a parsed request.
    pub async fn handle_request(&self, request: Request) -> Outcome<Value> {
        match request {
            Request::Command(command) => self.submit(command).await,
            Request::Query(query) => self.query(query).await,
        }
    }

    /// Run a command request.
    pub async fn submit(&self, request: CommandRequest) -> Outcome<Value> {
        let result = match request {
            CommandRequest::CreateApplication(c) => encode(self.execute(c).await),
            CommandRequest::EditApplication(c) => encode(self.execute(c).await),
            CommandRequest::SubmitKycResult(c) => encode(self.execute(c).await),
            CommandRequest::RevokeKyc(c) => encode(self.execute(c).await),
            CommandRequest::SubmitGovernanceReviewResult(c) => encode(self.execute(c).await),
            CommandRequest::StartRkhApproval(c) => encode(self.execute(c).await),
            CommandRequest::UpdateRkhApprovals(c) => encode(self.execute(c).await),
            CommandRequest::UpdateMetaAllocatorApprovals(c) => encode(self.execute(c).await),
            CommandRequest::UpdateDatacapAllocation(c) => encode(self.execute(c).await),
            CommandRequest::RequestDatacapRefresh(c) => encode(self.execute(c).await),
            CommandRequest::RefreshAllocatorMultisig(c) => encode(self.execute(c).await),
        };
        result.into()
    }

    /// Run a query request.
    pub async fn query(&self, request: QueryRequest) -> Outcome<Value> {
        let result = match request {
            QueryRequest::GetApplicationById(q) => encode(self.ask(q).await),
            QueryRequest::GetApplications(q) => encode(self.ask(q).await),
        };
        result.into()
    }

    /// Drop the read-model document of `application_id` and rebuild it from
    /// the event store. Returns the number of events replayed.
    ///
    /// # Errors
    ///
    /// Returns [`ApplicationError::NotFound`] if the application has no
    /// events, or [`ApplicationError::Storage`] if a projector fails.
    pub async fn rebuild_read_model(&self, application_id: &str) -> Result<usize, ApplicationError> {
        let events = self.repository.load_events(application_id).await?;
        if events.is_empty() {
            return Err(ApplicationError::NotFound(application_id.to_owned()));
        }
        self.details.remove(application_id).await?;
        for event in &events {
            let report = self.dispatcher.dispatch(event).await;
            if let Some(failure) = report.failures.into_iter().next() {
                return Err(ApplicationError::Storage(format!(
                    "rebuild of {application_id} failed at sequence {} in {}: {}",
                    event.sequence.value(),
                    failure.handler,
                    failure.error
                )));
            }
        }
        tracing::info!(application_id = %application_id, events = events.len(), "read model rebuilt");
        Ok(events.len())
    }

    /// Write-side repository.
    #[must_use]
    pub const fn repository(&self) -> &ApplicationRepository {
        &self.repository
    }

    /// Read-side repository.
    #[must_use]
    pub fn details(&self) -> &Arc<dyn ApplicationDetailsRepository> {
        &self.details
    }

    /// Stop consuming events once the ones already received are projected.
    pub async fn shutdown(self) {
        self.handle.shutdown().await;
        tracing::info!("application service stopped");
    }
}

impl std::fmt::Debug for ApplicationService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApplicationService")
            .field("commands", &self.commands)
            .field("queries", &self.queries)
            .field("dispatcher", &self.dispatcher)
            .finish_non_exhaustive()
    }
}

fn register_commands(bus: &mut CommandBus, handler: &Arc<ApplicationCommandHandler>) -> Result<(), DispatchError> {
    bus.register::<CreateApplication>(Arc::clone(handler) as _)?;
    bus.register::<EditApplication>(Arc::clone(handler) as _)?;
    bus.register::<SubmitKycResult>(Arc::clone(handler) as _)?;
    bus.register::<RevokeKyc>(Arc::clone(handler) as _)?;
    bus.register::<SubmitGovernanceReviewResult>(Arc::clone(handler) as _)?;
    bus.register::<StartRkhApproval>(Arc::clone(handler) as _)?;
    bus.register::<UpdateRkhApprovals>(Arc::clone(handler) as _)?;
    bus.register::<UpdateMetaAllocatorApprovals>(Arc::clone(handler) as _)?;
    bus.register::<UpdateDatacapAllocation>(Arc::clone(handler) as _)?;
    bus.register::<RequestDatacapRefresh>(Arc::clone(handler) as _)?;
    bus.register::<RefreshAllocatorMultisig>(Arc::clone(handler) as _)?;
    Ok(())
}

fn encode<T: Serialize>(result: Result<T, ApplicationError>) -> Result<Value, ApplicationError> {
    result.and_then(|data| {
        serde_json::to_value(data).map_err(|error| ApplicationError::Storage(format!("cannot encode response: {error}")))
    })
}
