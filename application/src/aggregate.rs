//! The Application aggregate.
//!
//! State is the fold of the application's events from an empty value. Every
//! operation validates the current status, then records exactly one event
//! (or none, when the reported fact is already reflected in state). Nothing
//! else mutates the aggregate.
//!
//! ```text
//! KYC_PHASE ──kyc ok──▶ GOVERNANCE_REVIEW_PHASE ──approve──▶ RKH_APPROVAL_PHASE ──┐
//!    ▲   │                 │        │                    └──▶ META_APPROVAL_PHASE ──┤
//!    │   └─kyc fail─┐      │        └─reject─┐                                      ▼
//!    └──revoke──────┼──────┘                 ▼           DC_ALLOCATED ◀── APPROVED
//!                   └────────────────────▶ REJECTED
//!
//! refresh: RKH / META / APPROVED / DC_ALLOCATED / REJECTED ──▶ GOVERNANCE_REVIEW_PHASE
//! ```

use crate::collaborators::ApplicationSnapshot;
use crate::error::ApplicationError;
use crate::events::ApplicationEvent;
use crate::github::normalize_github_handles;
use crate::types::{
    AllocationRequest, AllocatorMethod, AllocatorMultisig, ApplicantInfo, ApplicationInstruction,
    ApplicationStatus, InstructionStatus, MetaAllocatorTx, PullRequestInfo, RkhPhase,
    current_instruction, current_instruction_index,
};
use chrono::{DateTime, Utc};
use filplus_core::event::RecordedEvent;
use filplus_core::stream::Version;
use serde::{Deserialize, Serialize};

// ============================================================================
// Operation inputs
// ============================================================================

/// Result reported by the KYC provider.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum KycOutcome {
    /// Identity verified.
    Approved,
    /// Verification failed.
    Rejected {
        /// Provider-supplied reason.
        #[serde(default)]
        reason: Option<String>,
    },
}

/// Governance team decision.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReviewDecision {
    /// Move on to on-chain approval.
    Approved,
    /// Stop the cycle.
    Rejected {
        /// Why.
        #[serde(default)]
        reason: Option<String>,
    },
}

/// A recorded event that has not been persisted yet.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PendingEvent {
    /// The event.
    pub event: ApplicationEvent,
    /// When the operation that produced it ran.
    pub occurred_at: DateTime<Utc>,
}

// ============================================================================
// Aggregate
// ============================================================================

/// One datacap application, rebuilt from its event log.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Application {
    id: String,
    number: u64,
    status: ApplicationStatus,
    applicant: ApplicantInfo,
    allocation: AllocationRequest,
    allocator_multisig: Option<AllocatorMultisig>,
    pull_request: Option<PullRequestInfo>,
    rkh_phase: Option<RkhPhase>,
    meta_allocator_started: bool,
    meta_allocator_tx: Option<MetaAllocatorTx>,
    instructions: Vec<ApplicationInstruction>,
    version: Version,
    uncommitted: Vec<PendingEvent>,
}

impl Application {
    /// An application with no history.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            number: 0,
            status: ApplicationStatus::default(),
            applicant: ApplicantInfo::default(),
            allocation: AllocationRequest::default(),
            allocator_multisig: None,
            pull_request: None,
            rkh_phase: None,
            meta_allocator_started: false,
            meta_allocator_tx: None,
            instructions: Vec::new(),
            version: Version::INITIAL,
            uncommitted: Vec::new(),
        }
    }

    /// Rebuild from persisted events, in sequence order.
    ///
    /// # Errors
    ///
    /// [`ApplicationError::Corrupted`] if an event cannot be decoded.
    pub fn from_history(id: impl Into<String>, history: &[RecordedEvent]) -> Result<Self, ApplicationError> {
        let mut application = Self::new(id);
        for recorded in history {
            let event: ApplicationEvent = recorded.decode().map_err(|e| {
                ApplicationError::Corrupted(format!(
                    "cannot decode {} #{} of {}: {e}",
                    recorded.event_type, recorded.sequence, recorded.stream_id
                ))
            })?;
            application.apply(&event);
            application.version = recorded.sequence;
        }
        Ok(application)
    }

    /// Fold `events` from empty state. The version counts the events.
    #[must_use]
    pub fn replay<'a>(id: impl Into<String>, events: impl IntoIterator<Item = &'a ApplicationEvent>) -> Self {
        let mut application = Self::new(id);
        for event in events {
            application.apply(event);
            application.version = application.version.next();
        }
        application
    }

    // ------------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------------

    /// Application id.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Application number.
    #[must_use]
    pub const fn number(&self) -> u64 {
        self.number
    }

    /// Current status.
    #[must_use]
    pub const fn status(&self) -> ApplicationStatus {
        self.status
    }

    /// Applicant details.
    #[must_use]
    pub const fn applicant(&self) -> &ApplicantInfo {
        &self.applicant
    }

    /// Allocation terms.
    #[must_use]
    pub const fn allocation(&self) -> &AllocationRequest {
        &self.allocation
    }

    /// Resolved multisig.
    #[must_use]
    pub const fn allocator_multisig(&self) -> Option<&AllocatorMultisig> {
        self.allocator_multisig.as_ref()
    }

    /// Tracking pull request.
    #[must_use]
    pub const fn pull_request(&self) -> Option<&PullRequestInfo> {
        self.pull_request.as_ref()
    }

    /// RKH progress; `Some` only in `RKH_APPROVAL_PHASE`.
    #[must_use]
    pub const fn rkh_phase(&self) -> Option<&RkhPhase> {
        self.rkh_phase.as_ref()
    }

    /// Last Meta-Allocator transaction.
    #[must_use]
    pub const fn meta_allocator_tx(&self) -> Option<&MetaAllocatorTx> {
        self.meta_allocator_tx.as_ref()
    }

    /// Allocation tranches, in append order.
    #[must_use]
    pub fn instructions(&self) -> &[ApplicationInstruction] {
        &self.instructions
    }

    /// Number of persisted events this state was built from.
    #[must_use]
    pub const fn version(&self) -> Version {
        self.version
    }

    /// `true` once a creation event exists, persisted or not.
    #[must_use]
    pub fn exists(&self) -> bool {
        !self.version.is_initial() || !self.uncommitted.is_empty()
    }

    /// Events recorded since the last save.
    #[must_use]
    pub fn uncommitted_events(&self) -> &[PendingEvent] {
        &self.uncommitted
    }

    /// Hand the pending events to the repository.
    pub fn take_uncommitted(&mut self) -> Vec<PendingEvent> {
        std::mem::take(&mut self.uncommitted)
    }

    /// Record that events up to `version` are persisted.
    pub const fn mark_committed(&mut self, version: Version) {
        self.version = version;
    }

    /// Data handed to the pull-request service.
    #[must_use]
    pub fn snapshot(&self) -> ApplicationSnapshot {
        ApplicationSnapshot {
            application_id: self.id.clone(),
            application_number: self.number,
            status: self.status,
            applicant: self.applicant.clone(),
            allocation: self.allocation.clone(),
            allocator_multisig: self.allocator_multisig.clone(),
            datacap_amount: current_instruction(&self.instructions).map(|i| i.datacap_amount),
        }
    }

    fn current_method(&self) -> Option<AllocatorMethod> {
        current_instruction(&self.instructions).map(|i| i.method)
    }

    /// `true` when the current cycle already passed approval via `method`.
    fn approved_via(&self, method: AllocatorMethod) -> bool {
        matches!(
            self.status,
            ApplicationStatus::Approved | ApplicationStatus::DcAllocated
        ) && self.current_method() == Some(method)
    }

    // ------------------------------------------------------------------------
    // Operations
    // ------------------------------------------------------------------------

    /// Submit the application.
    ///
    /// # Errors
    ///
    /// - `AlreadyExists` if the application has events
    /// - `ValidationError` if the application number is zero
    pub fn create(
        &mut self,
        application_number: u64,
        mut applicant: ApplicantInfo,
        allocation: AllocationRequest,
        at: DateTime<Utc>,
    ) -> Result<(), ApplicationError> {
        if self.exists() {
            return Err(ApplicationError::AlreadyExists(self.id.clone()));
        }
        if application_number == 0 {
            return Err(ApplicationError::validation("application number must be positive"));
        }
        normalize_applicant(&mut applicant);
        self.record(
            ApplicationEvent::ApplicationCreated {
                application_id: self.id.clone(),
                application_number,
                applicant,
                allocation,
            },
            at,
        );
        Ok(())
    }

    /// Change applicant or allocation details.
    ///
    /// # Errors
    ///
    /// `InvalidTransition` unless the application is in KYC, governance
    /// review or one of the approval phases.
    pub fn edit(
        &mut self,
        mut applicant: ApplicantInfo,
        allocation: AllocationRequest,
        at: DateTime<Utc>,
    ) -> Result<(), ApplicationError> {
        self.ensure_status(
            "edit",
            &[
                ApplicationStatus::KycPhase,
                ApplicationStatus::GovernanceReviewPhase,
                ApplicationStatus::RkhApprovalPhase,
                ApplicationStatus::MetaApprovalPhase,
            ],
        )?;
        normalize_applicant(&mut applicant);
        if applicant == self.applicant && allocation == self.allocation {
            tracing::debug!(application_id = %self.id, "edit changes nothing");
            return Ok(());
        }
        self.record(ApplicationEvent::ApplicationEdited { applicant, allocation }, at);
        Ok(())
    }

    /// Store resolved multisig data.
    ///
    /// # Errors
    ///
    /// `ValidationError` when the data is incomplete or names a different
    /// address than the one already recorded.
    pub fn set_allocator_multisig(
        &mut self,
        multisig: AllocatorMultisig,
        at: DateTime<Utc>,
    ) -> Result<(), ApplicationError> {
        self.ensure_exists()?;
        if multisig.address.trim().is_empty() || multisig.actor_id.trim().is_empty() {
            return Err(ApplicationError::validation("multisig address and actor id are required"));
        }
        match &self.allocator_multisig {
            Some(current) if *current == multisig => {
                tracing::debug!(application_id = %self.id, "multisig unchanged");
                return Ok(());
            }
            Some(current) if current.address != multisig.address => {
                return Err(ApplicationError::validation(format!(
                    "multisig already resolved to {}, cannot reassign to {}",
                    current.address, multisig.address
                )));
            }
            _ => {}
        }
        self.record(ApplicationEvent::AllocatorMultisigUpdated { multisig }, at);
        Ok(())
    }

    /// Store the tracking pull request.
    ///
    /// # Errors
    ///
    /// `NotFound` if the application was never created.
    pub fn set_pull_request(&mut self, pull_request: PullRequestInfo, at: DateTime<Utc>) -> Result<(), ApplicationError> {
        self.ensure_exists()?;
        if self.pull_request.as_ref() == Some(&pull_request) {
            return Ok(());
        }
        self.record(ApplicationEvent::ApplicationPullRequestUpdated { pull_request }, at);
        Ok(())
    }

    /// Apply the KYC provider's result.
    ///
    /// # Errors
    ///
    /// `InvalidTransition` outside `KYC_PHASE`.
    pub fn record_kyc(&mut self, outcome: KycOutcome, at: DateTime<Utc>) -> Result<(), ApplicationError> {
        self.ensure_status("record KYC result", &[ApplicationStatus::KycPhase])?;
        let event = match outcome {
            KycOutcome::Approved => ApplicationEvent::KycApproved,
            KycOutcome::Rejected { reason } => ApplicationEvent::KycRejected { reason },
        };
        self.record(event, at);
        Ok(())
    }

    /// Withdraw a KYC approval.
    ///
    /// # Errors
    ///
    /// `InvalidTransition` outside `GOVERNANCE_REVIEW_PHASE`.
    pub fn revoke_kyc(&mut self, reason: Option<String>, at: DateTime<Utc>) -> Result<(), ApplicationError> {
        self.ensure_status("revoke KYC", &[ApplicationStatus::GovernanceReviewPhase])?;
        self.record(ApplicationEvent::KycRevoked { reason }, at);
        Ok(())
    }

    /// Apply the governance team's decision.
    ///
    /// An approval replaces the instruction list with `instructions` (or
    /// keeps the current list when `instructions` is empty) and routes on the
    /// current instruction's method. A rejection denies the current tranche.
    ///
    /// # Errors
    ///
    /// - `InvalidTransition` outside `GOVERNANCE_REVIEW_PHASE`
    /// - `ValidationError` when an approval leaves no instruction or a zero amount
    pub fn record_governance_review(
        &mut self,
        reviewer: &str,
        decision: ReviewDecision,
        instructions: Vec<ApplicationInstruction>,
        at: DateTime<Utc>,
    ) -> Result<(), ApplicationError> {
        self.ensure_status(
            "record governance review",
            &[ApplicationStatus::GovernanceReviewPhase],
        )?;
        let mut instructions = if instructions.is_empty() {
            self.instructions.clone()
        } else {
            instructions
        };
        let reviewer = reviewer.to_owned();

        let event = match decision {
            ReviewDecision::Approved => {
                if instructions.is_empty() {
                    return Err(ApplicationError::validation(
                        "governance approval requires at least one allocation instruction",
                    ));
                }
                if instructions.iter().any(|i| i.datacap_amount == 0) {
                    return Err(ApplicationError::validation("datacap amount must be positive"));
                }
                ApplicationEvent::GovernanceReviewApproved { reviewer, instructions }
            }
            ReviewDecision::Rejected { reason } => {
                if let Some(index) = current_instruction_index(&instructions) {
                    instructions[index].status = InstructionStatus::Denied;
                    instructions[index].end_timestamp = Some(at);
                }
                ApplicationEvent::GovernanceReviewRejected {
                    reviewer,
                    reason,
                    instructions,
                }
            }
        };
        self.record(event, at);
        Ok(())
    }

    /// Begin collecting RKH signatures.
    ///
    /// # Errors
    ///
    /// - `InvalidTransition` outside `RKH_APPROVAL_PHASE`, or when already
    ///   started with another threshold
    /// - `ValidationError` for a zero threshold
    pub fn start_rkh_approval(&mut self, approval_threshold: u32, at: DateTime<Utc>) -> Result<(), ApplicationError> {
        self.ensure_status("start RKH approval", &[ApplicationStatus::RkhApprovalPhase])?;
        if approval_threshold == 0 {
            return Err(ApplicationError::validation("approval threshold must be positive"));
        }
        match &self.rkh_phase {
            Some(phase) if phase.approval_threshold == approval_threshold => {
                tracing::debug!(application_id = %self.id, "RKH approval already started");
                Ok(())
            }
            Some(_) => Err(self.invalid("restart RKH approval with a different threshold")),
            None => {
                self.record(ApplicationEvent::RkhApprovalStarted { approval_threshold }, at);
                Ok(())
            }
        }
    }

    /// Record the signatures seen on the RKH proposal.
    ///
    /// Reports that arrive after the RKH approval completed are ignored.
    ///
    /// # Errors
    ///
    /// - `InvalidTransition` outside `RKH_APPROVAL_PHASE`
    /// - `ValidationError` for a zero threshold
    pub fn update_rkh_approvals(
        &mut self,
        message_id: u64,
        approvals: Vec<String>,
        approval_threshold: u32,
        at: DateTime<Utc>,
    ) -> Result<(), ApplicationError> {
        self.ensure_exists()?;
        if self.approved_via(AllocatorMethod::Rkh) {
            tracing::debug!(application_id = %self.id, "stale RKH approvals update ignored");
            return Ok(());
        }
        self.ensure_status("update RKH approvals", &[ApplicationStatus::RkhApprovalPhase])?;
        if approval_threshold == 0 {
            return Err(ApplicationError::validation("approval threshold must be positive"));
        }

        let mut unique: Vec<String> = Vec::with_capacity(approvals.len());
        for signer in approvals {
            let signer = signer.trim().to_owned();
            if !signer.is_empty() && !unique.contains(&signer) {
                unique.push(signer);
            }
        }

        let unchanged = self.rkh_phase.as_ref().is_some_and(|phase| {
            phase.approvals == unique
                && phase.approval_threshold == approval_threshold
                && phase.approval_message_id == Some(message_id)
        });
        if unchanged {
            tracing::debug!(application_id = %self.id, "RKH approvals unchanged");
            return Ok(());
        }

        self.record(
            ApplicationEvent::RkhApprovalsUpdated {
                message_id,
                approvals: unique,
                approval_threshold,
            },
            at,
        );
        Ok(())
    }

    /// The RKH proposal executed on chain.
    ///
    /// # Errors
    ///
    /// `InvalidTransition` outside `RKH_APPROVAL_PHASE`.
    pub fn complete_rkh_approval(&mut self, at: DateTime<Utc>) -> Result<(), ApplicationError> {
        self.ensure_exists()?;
        if self.approved_via(AllocatorMethod::Rkh) {
            tracing::debug!(application_id = %self.id, "RKH approval already completed");
            return Ok(());
        }
        self.ensure_status("complete RKH approval", &[ApplicationStatus::RkhApprovalPhase])?;
        self.record(
            ApplicationEvent::RkhApprovalCompleted {
                instructions: self.instructions.clone(),
            },
            at,
        );
        Ok(())
    }

    /// The Meta-Allocator transaction was submitted.
    ///
    /// # Errors
    ///
    /// `InvalidTransition` outside `META_APPROVAL_PHASE`.
    pub fn start_meta_allocator_approval(&mut self, at: DateTime<Utc>) -> Result<(), ApplicationError> {
        self.ensure_exists()?;
        if self.approved_via(AllocatorMethod::Meta) {
            return Ok(());
        }
        self.ensure_status(
            "start Meta-Allocator approval",
            &[ApplicationStatus::MetaApprovalPhase],
        )?;
        if self.meta_allocator_started {
            tracing::debug!(application_id = %self.id, "Meta-Allocator approval already started");
            return Ok(());
        }
        self.record(ApplicationEvent::MetaAllocatorApprovalStarted, at);
        Ok(())
    }

    /// The Meta-Allocator transaction landed on chain.
    ///
    /// # Errors
    ///
    /// - `InvalidTransition` outside `META_APPROVAL_PHASE`
    /// - `ValidationError` for a blank transaction hash
    pub fn complete_meta_allocator_approval(
        &mut self,
        block_number: u64,
        tx_hash: &str,
        at: DateTime<Utc>,
    ) -> Result<(), ApplicationError> {
        self.ensure_exists()?;
        if self.approved_via(AllocatorMethod::Meta) {
            tracing::debug!(application_id = %self.id, "Meta-Allocator approval already completed");
            return Ok(());
        }
        self.ensure_status(
            "complete Meta-Allocator approval",
            &[ApplicationStatus::MetaApprovalPhase],
        )?;
        let tx_hash = tx_hash.trim();
        if tx_hash.is_empty() {
            return Err(ApplicationError::validation("transaction hash is required"));
        }
        self.record(
            ApplicationEvent::MetaAllocatorApprovalCompleted {
                block_number,
                tx_hash: tx_hash.to_owned(),
                instructions: self.instructions.clone(),
            },
            at,
        );
        Ok(())
    }

    /// Datacap for the current tranche was granted.
    ///
    /// # Errors
    ///
    /// - `InvalidTransition` outside `APPROVED`
    /// - `ValidationError` for a zero amount or a missing instruction
    pub fn record_datacap_allocation(&mut self, datacap_amount: u64, at: DateTime<Utc>) -> Result<(), ApplicationError> {
        self.ensure_exists()?;
        if datacap_amount == 0 {
            return Err(ApplicationError::validation("datacap amount must be positive"));
        }
        if self.status == ApplicationStatus::DcAllocated
            && current_instruction(&self.instructions).is_some_and(|i| {
                i.status == InstructionStatus::Granted && i.datacap_amount == datacap_amount
            })
        {
            tracing::debug!(application_id = %self.id, "datacap allocation already recorded");
            return Ok(());
        }
        self.ensure_status("record datacap allocation", &[ApplicationStatus::Approved])?;

        let mut instructions = self.instructions.clone();
        let Some(index) = current_instruction_index(&instructions) else {
            return Err(ApplicationError::validation("no allocation instruction to grant"));
        };
        let current = &mut instructions[index];
        current.status = InstructionStatus::Granted;
        current.datacap_amount = datacap_amount;
        current.allocated_timestamp = Some(at);
        current.end_timestamp = Some(at);

        self.record(
            ApplicationEvent::DatacapAllocationUpdated {
                datacap_amount,
                instructions,
            },
            at,
        );
        Ok(())
    }

    /// Ask for another tranche, reopening governance review.
    ///
    /// # Errors
    ///
    /// - `InvalidTransition` from `KYC_PHASE` or `GOVERNANCE_REVIEW_PHASE`
    /// - `ValidationError` for a zero amount
    pub fn request_datacap_refresh(
        &mut self,
        method: AllocatorMethod,
        amount: u64,
        requested_at: DateTime<Utc>,
    ) -> Result<(), ApplicationError> {
        self.ensure_status(
            "request datacap refresh",
            &[
                ApplicationStatus::RkhApprovalPhase,
                ApplicationStatus::MetaApprovalPhase,
                ApplicationStatus::Approved,
                ApplicationStatus::DcAllocated,
                ApplicationStatus::Rejected,
            ],
        )?;
        if amount == 0 {
            return Err(ApplicationError::validation("datacap amount must be positive"));
        }
        let mut instructions = self.instructions.clone();
        instructions.push(ApplicationInstruction::pending(method, amount, requested_at));
        self.record(
            ApplicationEvent::DatacapRefreshRequested {
                method,
                amount,
                requested_at,
                instructions,
            },
            requested_at,
        );
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Event application
    // ------------------------------------------------------------------------

    fn record(&mut self, event: ApplicationEvent, occurred_at: DateTime<Utc>) {
        self.apply(&event);
        self.uncommitted.push(PendingEvent { event, occurred_at });
    }

    fn apply(&mut self, event: &ApplicationEvent) {
        match event {
            ApplicationEvent::ApplicationCreated {
                application_id,
                application_number,
                applicant,
                allocation,
            } => {
                application_id.clone_into(&mut self.id);
                self.number = *application_number;
                self.applicant = applicant.clone();
                self.allocation = allocation.clone();
                self.status = ApplicationStatus::KycPhase;
            }
            ApplicationEvent::ApplicationEdited { applicant, allocation } => {
                self.applicant = applicant.clone();
                self.allocation = allocation.clone();
            }
            ApplicationEvent::AllocatorMultisigUpdated { multisig } => {
                self.allocator_multisig = Some(multisig.clone());
            }
            ApplicationEvent::ApplicationPullRequestUpdated { pull_request } => {
                self.pull_request = Some(pull_request.clone());
            }
            ApplicationEvent::KycApproved => {
                self.status = ApplicationStatus::GovernanceReviewPhase;
            }
            ApplicationEvent::KycRejected { .. } => {
                self.status = ApplicationStatus::Rejected;
            }
            ApplicationEvent::KycRevoked { .. } => {
                self.status = ApplicationStatus::KycPhase;
            }
            ApplicationEvent::GovernanceReviewApproved { instructions, .. } => {
                self.instructions.clone_from(instructions);
                self.status = match self.current_method() {
                    Some(AllocatorMethod::Meta) => ApplicationStatus::MetaApprovalPhase,
                    _ => ApplicationStatus::RkhApprovalPhase,
                };
            }
            ApplicationEvent::GovernanceReviewRejected { instructions, .. } => {
                self.instructions.clone_from(instructions);
                self.status = ApplicationStatus::Rejected;
            }
            ApplicationEvent::RkhApprovalStarted { approval_threshold } => {
                self.rkh_phase = Some(RkhPhase {
                    approvals: Vec::new(),
                    approval_threshold: *approval_threshold,
                    approval_message_id: None,
                });
            }
            ApplicationEvent::RkhApprovalsUpdated {
                message_id,
                approvals,
                approval_threshold,
            } => {
                self.rkh_phase = Some(RkhPhase {
                    approvals: approvals.clone(),
                    approval_threshold: *approval_threshold,
                    approval_message_id: Some(*message_id),
                });
            }
            ApplicationEvent::RkhApprovalCompleted { instructions } => {
                self.instructions.clone_from(instructions);
                self.rkh_phase = None;
                self.status = ApplicationStatus::Approved;
            }
            ApplicationEvent::MetaAllocatorApprovalStarted => {
                self.meta_allocator_started = true;
            }
            ApplicationEvent::MetaAllocatorApprovalCompleted {
                block_number,
                tx_hash,
                instructions,
            } => {
                self.meta_allocator_tx = Some(MetaAllocatorTx {
                    block_number: *block_number,
                    tx_hash: tx_hash.clone(),
                });
                self.instructions.clone_from(instructions);
                self.status = ApplicationStatus::Approved;
            }
            ApplicationEvent::DatacapAllocationUpdated { instructions, .. } => {
                self.instructions.clone_from(instructions);
                self.status = ApplicationStatus::DcAllocated;
            }
            ApplicationEvent::DatacapRefreshRequested { instructions, .. } => {
                self.instructions.clone_from(instructions);
                self.rkh_phase = None;
                self.meta_allocator_started = false;
                self.status = ApplicationStatus::GovernanceReviewPhase;
            }
        }
    }

    // ------------------------------------------------------------------------
    // Guards
    // ------------------------------------------------------------------------

    fn ensure_exists(&self) -> Result<(), ApplicationError> {
        if self.exists() {
            Ok(())
        } else {
            Err(ApplicationError::NotFound(self.id.clone()))
        }
    }

    fn ensure_status(
        &self,
        operation: &'static str,
        allowed: &[ApplicationStatus],
    ) -> Result<(), ApplicationError> {
        self.ensure_exists()?;
        if allowed.contains(&self.status) {
            Ok(())
        } else {
            Err(self.invalid(operation))
        }
    }

    fn invalid(&self, operation: &'static str) -> ApplicationError {
        ApplicationError::InvalidTransition {
            application_id: self.id.clone(),
            operation,
            status: self.status,
        }
    }
}

fn normalize_applicant(applicant: &mut ApplicantInfo) {
    applicant.github_handle = applicant
        .github_handle
        .trim()
        .trim_start_matches('@')
        .to_lowercase();
    applicant.other_github_handles = normalize_github_handles(&applicant.other_github_handles.join(","));
}
