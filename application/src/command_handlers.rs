//! Command handlers.
//!
//! Each handler loads the application, maps the command onto one aggregate
//! operation and saves under the version it loaded. Blockchain and
//! pull-request lookups only enrich the application: when they fail the
//! failure is logged and the transition is saved without the enrichment.

use crate::aggregate::Application;
use crate::collaborators::{Collaborators, resolve_multisig, with_timeout};
use crate::commands::{
    ApplicationCreated, CommandAck, CreateApplication, EditApplication, MetaAllocatorUpdate,
    RefreshAllocatorMultisig, RequestDatacapRefresh, RevokeKyc, RkhProposalStatus,
    StartRkhApproval, SubmitGovernanceReviewResult, SubmitKycResult, UpdateDatacapAllocation,
    UpdateMetaAllocatorApprovals, UpdateRkhApprovals,
};
use crate::error::ApplicationError;
use crate::repository::ApplicationRepository;
use crate::role::{Role, RoleResolver};
use chrono::{DateTime, Utc};
use filplus_core::environment::Clock;
use filplus_core::event_store::ExpectedVersion;
use filplus_core::stream::Version;
use filplus_runtime::{Command, CommandHandler};
use futures::future::BoxFuture;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// Handles every application command.
///
/// One instance is registered on the command bus once per command type.
#[derive(Clone)]
pub struct ApplicationCommandHandler {
    repository: ApplicationRepository,
    clock: Arc<dyn Clock>,
    roles: RoleResolver,
    collaborators: Collaborators,
    collaborator_timeout: Duration,
    default_rkh_threshold: u32,
}

impl ApplicationCommandHandler {
    /// Create a handler.
    #[must_use]
    pub fn new(
        repository: ApplicationRepository,
        clock: Arc<dyn Clock>,
        roles: RoleResolver,
        collaborators: Collaborators,
    ) -> Self {
        Self {
            repository,
            clock,
            roles,
            collaborators,
            collaborator_timeout: Duration::from_secs(10),
            default_rkh_threshold: 2,
        }
    }

    /// Bound on collaborator calls.
    #[must_use]
    pub const fn with_collaborator_timeout(mut self, timeout: Duration) -> Self {
        self.collaborator_timeout = timeout;
        self
    }

    /// Threshold used when RKH approval starts without one.
    #[must_use]
    pub const fn with_default_rkh_threshold(mut self, threshold: u32) -> Self {
        self.default_rkh_threshold = threshold;
        self
    }

    /// Load, apply `operation`, save under the loaded version.
    async fn update<C, F>(&self, application_id: &str, operation: F) -> Result<CommandAck, ApplicationError>
    where
        C: Command,
        F: FnOnce(&mut Application, DateTime<Utc>) -> Result<(), ApplicationError>,
    {
        let mut application = self.repository.get_by_id(application_id).await?;
        let expected = ExpectedVersion::Exact(application.version());
        operation(&mut application, self.clock.now())?;
        self.persist::<C>(&mut application, expected).await
    }

    async fn persist<C: Command>(
        &self,
        application: &mut Application,
        expected: ExpectedVersion,
    ) -> Result<CommandAck, ApplicationError> {
        let recorded = self.repository.save(application, expected).await?;
        if recorded.is_empty() {
            tracing::debug!(
                command = C::NAME,
                application_id = %application.id(),
                "command changed nothing"
            );
        } else {
            for event in &recorded {
                metrics::counter!("applications.events_recorded", "event_type" => event.event_type.clone())
                    .increment(1);
            }
            tracing::info!(
                command = C::NAME,
                application_id = %application.id(),
                status = %application.status(),
                events = recorded.len(),
                "command handled"
            );
        }
        Ok(CommandAck {
            application_id: application.id().to_owned(),
            version: application.version().value(),
            events_recorded: recorded.len(),
        })
    }

    /// Resolve and record the multisig for `address`, logging failures.
    async fn enrich_multisig(&self, application: &mut Application, address: &str, at: DateTime<Utc>) -> bool {
        match resolve_multisig(self.collaborators.blockchain.as_ref(), address, self.collaborator_timeout).await {
            Ok(multisig) => match application.set_allocator_multisig(multisig, at) {
                Ok(()) => true,
                Err(error) => {
                    tracing::warn!(
                        application_id = %application.id(),
                        error = %error,
                        "resolved multisig rejected"
                    );
                    false
                }
            },
            Err(error) => {
                metrics::counter!("applications.enrichment_failed", "collaborator" => "blockchain").increment(1);
                tracing::warn!(
                    application_id = %application.id(),
                    address = %address,
                    error = %error,
                    "multisig lookup failed, continuing without it"
                );
                false
            }
        }
    }

    async fn enrich_pull_request(&self, application: &mut Application, at: DateTime<Utc>) {
        let snapshot = application.snapshot();
        let created = with_timeout(
            "create_pull_request",
            self.collaborator_timeout,
            self.collaborators.pull_requests.create_pull_request(&snapshot),
        )
        .await;
        match created {
            Ok(pull_request) => {
                if let Err(error) = application.set_pull_request(pull_request, at) {
                    tracing::warn!(application_id = %application.id(), error = %error, "pull request not recorded");
                }
            }
            Err(error) => {
                metrics::counter!("applications.enrichment_failed", "collaborator" => "pull_requests").increment(1);
                tracing::warn!(
                    application_id = %application.id(),
                    error = %error,
                    "pull request creation failed, continuing without it"
                );
            }
        }
    }
}

impl std::fmt::Debug for ApplicationCommandHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApplicationCommandHandler")
            .field("repository", &self.repository)
            .field("collaborator_timeout", &self.collaborator_timeout)
            .field("default_rkh_threshold", &self.default_rkh_threshold)
            .finish_non_exhaustive()
    }
}

fn require_id(application_id: &str) -> Result<(), ApplicationError> {
    if application_id.trim().is_empty() {
        Err(ApplicationError::validation("application id is required"))
    } else {
        Ok(())
    }
}

// ============================================================================
// Handlers
// ============================================================================

impl CommandHandler<CreateApplication> for ApplicationCommandHandler {
    fn handle(&self, command: CreateApplication) -> BoxFuture<'_, Result<ApplicationCreated, ApplicationError>> {
        Box::pin(async move {
            require_id(&command.application_id)?;
            let id = command.application_id;
            let mut application = self
                .repository
                .load(&id)
                .await?
                .unwrap_or_else(|| Application::new(id.as_str()));

            let at = self.clock.now();
            if let Err(error) = application.create(command.application_number, command.applicant, command.allocation, at) {
                tracing::info!(application_id = %id, error = %error, "application not created");
                return Err(error);
            }

            if let Some(address) = application.applicant().on_chain_address.clone() {
                self.enrich_multisig(&mut application, &address, at).await;
            }
            self.enrich_pull_request(&mut application, at).await;

            self.persist::<CreateApplication>(&mut application, ExpectedVersion::Exact(Version::INITIAL))
                .await?;
            Ok(ApplicationCreated {
                application_id: id,
                guid: Uuid::new_v4(),
            })
        })
    }
}

impl CommandHandler<EditApplication> for ApplicationCommandHandler {
    fn handle(&self, command: EditApplication) -> BoxFuture<'_, Result<CommandAck, ApplicationError>> {
        Box::pin(async move {
            let EditApplication {
                application_id,
                applicant,
                allocation,
            } = command;
            self.update::<EditApplication, _>(&application_id, |app, at| app.edit(applicant, allocation, at))
                .await
        })
    }
}

impl CommandHandler<SubmitKycResult> for ApplicationCommandHandler {
    fn handle(&self, command: SubmitKycResult) -> BoxFuture<'_, Result<CommandAck, ApplicationError>> {
        Box::pin(async move {
            let SubmitKycResult { application_id, outcome } = command;
            self.update::<SubmitKycResult, _>(&application_id, |app, at| app.record_kyc(outcome, at))
                .await
        })
    }
}

impl CommandHandler<RevokeKyc> for ApplicationCommandHandler {
    fn handle(&self, command: RevokeKyc) -> BoxFuture<'_, Result<CommandAck, ApplicationError>> {
        Box::pin(async move {
            let RevokeKyc { application_id, reason } = command;
            self.update::<RevokeKyc, _>(&application_id, |app, at| app.revoke_kyc(reason, at))
                .await
        })
    }
}

impl CommandHandler<SubmitGovernanceReviewResult> for ApplicationCommandHandler {
    fn handle(&self, command: SubmitGovernanceReviewResult) -> BoxFuture<'_, Result<CommandAck, ApplicationError>> {
        Box::pin(async move {
            let SubmitGovernanceReviewResult {
                application_id,
                reviewer_address,
                decision,
                mut instructions,
            } = command;

            let role = self.roles.role_of(&reviewer_address);
            if role != Role::GovernanceTeam {
                metrics::counter!("applications.unauthorized_reviews").increment(1);
                tracing::warn!(
                    application_id = %application_id,
                    reviewer = %reviewer_address,
                    role = %role,
                    "governance review from non-governance address"
                );
                return Err(ApplicationError::Unauthorized(format!(
                    "{reviewer_address} is not a governance team member"
                )));
            }

            self.update::<SubmitGovernanceReviewResult, _>(&application_id, |app, at| {
                for instruction in &mut instructions {
                    instruction.start_timestamp.get_or_insert(at);
                }
                app.record_governance_review(&reviewer_address, decision, instructions, at)
            })
            .await
        })
    }
}

impl CommandHandler<StartRkhApproval> for ApplicationCommandHandler {
    fn handle(&self, command: StartRkhApproval) -> BoxFuture<'_, Result<CommandAck, ApplicationError>> {
        Box::pin(async move {
            let threshold = command.approval_threshold.unwrap_or(self.default_rkh_threshold);
            self.update::<StartRkhApproval, _>(&command.application_id, |app, at| {
                app.start_rkh_approval(threshold, at)
            })
            .await
        })
    }
}

impl CommandHandler<UpdateRkhApprovals> for ApplicationCommandHandler {
    fn handle(&self, command: UpdateRkhApprovals) -> BoxFuture<'_, Result<CommandAck, ApplicationError>> {
        Box::pin(async move {
            let UpdateRkhApprovals {
                application_id,
                status,
                message_id,
                approvals,
                approval_threshold,
            } = command;
            let default_threshold = self.default_rkh_threshold;
            self.update::<UpdateRkhApprovals, _>(&application_id, |app, at| match status {
                RkhProposalStatus::Pending => {
                    let threshold = approval_threshold
                        .or_else(|| app.rkh_phase().map(|phase| phase.approval_threshold))
                        .unwrap_or(default_threshold);
                    app.update_rkh_approvals(message_id, approvals, threshold, at)
                }
                RkhProposalStatus::Approved => app.complete_rkh_approval(at),
            })
            .await
        })
    }
}

impl CommandHandler<UpdateMetaAllocatorApprovals> for ApplicationCommandHandler {
    fn handle(&self, command: UpdateMetaAllocatorApprovals) -> BoxFuture<'_, Result<CommandAck, ApplicationError>> {
        Box::pin(async move {
            let UpdateMetaAllocatorApprovals { application_id, update } = command;
            self.update::<UpdateMetaAllocatorApprovals, _>(&application_id, |app, at| match update {
                MetaAllocatorUpdate::Started => app.start_meta_allocator_approval(at),
                MetaAllocatorUpdate::Approved { block_number, tx_hash } => {
                    app.complete_meta_allocator_approval(block_number, &tx_hash, at)
                }
            })
            .await
        })
    }
}

impl CommandHandler<UpdateDatacapAllocation> for ApplicationCommandHandler {
    fn handle(&self, command: UpdateDatacapAllocation) -> BoxFuture<'_, Result<CommandAck, ApplicationError>> {
        Box::pin(async move {
            self.update::<UpdateDatacapAllocation, _>(&command.application_id, |app, at| {
                app.record_datacap_allocation(command.datacap_amount, at)
            })
            .await
        })
    }
}

impl CommandHandler<RequestDatacapRefresh> for ApplicationCommandHandler {
    fn handle(&self, command: RequestDatacapRefresh) -> BoxFuture<'_, Result<CommandAck, ApplicationError>> {
        Box::pin(async move {
            self.update::<RequestDatacapRefresh, _>(&command.application_id, |app, at| {
                app.request_datacap_refresh(command.method, command.amount, at)
            })
            .await
        })
    }
}

impl CommandHandler<RefreshAllocatorMultisig> for ApplicationCommandHandler {
    fn handle(&self, command: RefreshAllocatorMultisig) -> BoxFuture<'_, Result<CommandAck, ApplicationError>> {
        Box::pin(async move {
            let mut application = self.repository.get_by_id(&command.application_id).await?;
            let expected = ExpectedVersion::Exact(application.version());
            let Some(address) = application.applicant().on_chain_address.clone() else {
                return Err(ApplicationError::validation("application has no on-chain address"));
            };

            let resolved = resolve_multisig(self.collaborators.blockchain.as_ref(), &address, self.collaborator_timeout).await;
            let multisig = match resolved {
                Ok(multisig) => multisig,
                Err(error) => {
                    tracing::warn!(
                        application_id = %command.application_id,
                        address = %address,
                        error = %error,
                        "multisig refresh failed, keeping known data"
                    );
                    return Ok(CommandAck {
                        application_id: command.application_id,
                        version: application.version().value(),
                        events_recorded: 0,
                    });
                }
            };

            application.set_allocator_multisig(multisig, self.clock.now())?;
            self.persist::<RefreshAllocatorMultisig>(&mut application, expected).await
        })
    }
}
