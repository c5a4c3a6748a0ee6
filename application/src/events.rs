//! Domain events of the application aggregate.
//!
//! Events are bincode-encoded, so payloads stay externally tagged and use
//! concrete types only. Changing a payload means adding a new `.v2` type.

use crate::types::{
    AllocationRequest, AllocatorMethod, AllocatorMultisig, ApplicantInfo, ApplicationInstruction,
    PullRequestInfo,
};
use chrono::{DateTime, Utc};
use filplus_core::event::Event;
use serde::{Deserialize, Serialize};

/// Versioned event type names.
pub mod event_types {
    /// [`super::ApplicationEvent::ApplicationCreated`]
    pub const APPLICATION_CREATED: &str = "ApplicationCreated.v1";
    /// [`super::ApplicationEvent::ApplicationEdited`]
    pub const APPLICATION_EDITED: &str = "ApplicationEdited.v1";
    /// [`super::ApplicationEvent::AllocatorMultisigUpdated`]
    pub const ALLOCATOR_MULTISIG_UPDATED: &str = "AllocatorMultisigUpdated.v1";
    /// [`super::ApplicationEvent::ApplicationPullRequestUpdated`]
    pub const APPLICATION_PULL_REQUEST_UPDATED: &str = "ApplicationPullRequestUpdated.v1";
    /// [`super::ApplicationEvent::KycApproved`]
    pub const KYC_APPROVED: &str = "KYCApproved.v1";
    /// [`super::ApplicationEvent::KycRejected`]
    pub const KYC_REJECTED: &str = "KYCRejected.v1";
    /// [`super::ApplicationEvent::KycRevoked`]
    pub const KYC_REVOKED: &str = "KYCRevoked.v1";
    /// [`super::ApplicationEvent::GovernanceReviewApproved`]
    pub const GOVERNANCE_REVIEW_APPROVED: &str = "GovernanceReviewApproved.v1";
    /// [`super::ApplicationEvent::GovernanceReviewRejected`]
    pub const GOVERNANCE_REVIEW_REJECTED: &str = "GovernanceReviewRejected.v1";
    /// [`super::ApplicationEvent::RkhApprovalStarted`]
    pub const RKH_APPROVAL_STARTED: &str = "RKHApprovalStarted.v1";
    /// [`super::ApplicationEvent::RkhApprovalsUpdated`]
    pub const RKH_APPROVALS_UPDATED: &str = "RKHApprovalsUpdated.v1";
    /// [`super::ApplicationEvent::RkhApprovalCompleted`]
    pub const RKH_APPROVAL_COMPLETED: &str = "RKHApprovalCompleted.v1";
    /// [`super::ApplicationEvent::MetaAllocatorApprovalStarted`]
    pub const META_ALLOCATOR_APPROVAL_STARTED: &str = "MetaAllocatorApprovalStarted.v1";
    /// [`super::ApplicationEvent::MetaAllocatorApprovalCompleted`]
    pub const META_ALLOCATOR_APPROVAL_COMPLETED: &str = "MetaAllocatorApprovalCompleted.v1";
    /// [`super::ApplicationEvent::DatacapAllocationUpdated`]
    pub const DATACAP_ALLOCATION_UPDATED: &str = "DatacapAllocationUpdated.v1";
    /// [`super::ApplicationEvent::DatacapRefreshRequested`]
    pub const DATACAP_REFRESH_REQUESTED: &str = "DatacapRefreshRequested.v1";

    /// Every event type, in declaration order.
    pub const ALL: [&str; 16] = [
        APPLICATION_CREATED,
        APPLICATION_EDITED,
        ALLOCATOR_MULTISIG_UPDATED,
        APPLICATION_PULL_REQUEST_UPDATED,
        KYC_APPROVED,
        KYC_REJECTED,
        KYC_REVOKED,
        GOVERNANCE_REVIEW_APPROVED,
        GOVERNANCE_REVIEW_REJECTED,
        RKH_APPROVAL_STARTED,
        RKH_APPROVALS_UPDATED,
        RKH_APPROVAL_COMPLETED,
        META_ALLOCATOR_APPROVAL_STARTED,
        META_ALLOCATOR_APPROVAL_COMPLETED,
        DATACAP_ALLOCATION_UPDATED,
        DATACAP_REFRESH_REQUESTED,
    ];
}

/// Everything that can happen to an application.
///
/// Events that end an approval step carry the full post-event instruction
/// list so projectors can write it as-is.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ApplicationEvent {
    /// The application was submitted. Status becomes `KYC_PHASE`.
    ApplicationCreated {
        /// Application id (stream id).
        application_id: String,
        /// Human-facing application number.
        application_number: u64,
        /// Applicant, handles already normalized.
        applicant: ApplicantInfo,
        /// Requested allocation terms.
        allocation: AllocationRequest,
    },

    /// Applicant or allocation details changed.
    ApplicationEdited {
        /// New applicant details.
        applicant: ApplicantInfo,
        /// New allocation terms.
        allocation: AllocationRequest,
    },

    /// On-chain multisig data resolved or refreshed.
    AllocatorMultisigUpdated {
        /// Resolved multisig.
        multisig: AllocatorMultisig,
    },

    /// The tracking pull request was created or changed.
    ApplicationPullRequestUpdated {
        /// Pull request data.
        pull_request: PullRequestInfo,
    },

    /// KYC passed. `KYC_PHASE` → `GOVERNANCE_REVIEW_PHASE`.
    KycApproved,

    /// KYC failed. `KYC_PHASE` → `REJECTED`.
    KycRejected {
        /// Provider-supplied reason.
        reason: Option<String>,
    },

    /// KYC withdrawn. `GOVERNANCE_REVIEW_PHASE` → `KYC_PHASE`.
    KycRevoked {
        /// Why it was withdrawn.
        reason: Option<String>,
    },

    /// Governance approved; the current instruction decides the next phase.
    GovernanceReviewApproved {
        /// Reviewer address.
        reviewer: String,
        /// Instruction list after approval.
        instructions: Vec<ApplicationInstruction>,
    },

    /// Governance rejected. Status becomes `REJECTED`.
    GovernanceReviewRejected {
        /// Reviewer address.
        reviewer: String,
        /// Why.
        reason: Option<String>,
        /// Instruction list with the current tranche denied.
        instructions: Vec<ApplicationInstruction>,
    },

    /// RKH signature collection began.
    RkhApprovalStarted {
        /// Signatures required.
        approval_threshold: u32,
    },

    /// New RKH signatures observed on the multisig proposal.
    RkhApprovalsUpdated {
        /// Proposal message id.
        message_id: u64,
        /// Signers so far.
        approvals: Vec<String>,
        /// Signatures required.
        approval_threshold: u32,
    },

    /// The RKH proposal executed. Status becomes `APPROVED`.
    RkhApprovalCompleted {
        /// Instruction list, unchanged.
        instructions: Vec<ApplicationInstruction>,
    },

    /// The Meta-Allocator transaction was submitted.
    MetaAllocatorApprovalStarted,

    /// The Meta-Allocator transaction landed. Status becomes `APPROVED`.
    MetaAllocatorApprovalCompleted {
        /// Block that included the transaction.
        block_number: u64,
        /// Transaction hash.
        tx_hash: String,
        /// Instruction list, unchanged.
        instructions: Vec<ApplicationInstruction>,
    },

    /// Datacap was granted. `APPROVED` → `DC_ALLOCATED`.
    DatacapAllocationUpdated {
        /// Amount granted.
        datacap_amount: u64,
        /// Instruction list with the current tranche granted.
        instructions: Vec<ApplicationInstruction>,
    },

    /// The applicant asked for another tranche. Status becomes
    /// `GOVERNANCE_REVIEW_PHASE` and a pending instruction is appended.
    DatacapRefreshRequested {
        /// Approval path for the new tranche.
        method: AllocatorMethod,
        /// Requested amount.
        amount: u64,
        /// When it was requested.
        requested_at: DateTime<Utc>,
        /// Instruction list with the new tranche appended.
        instructions: Vec<ApplicationInstruction>,
    },
}

impl Event for ApplicationEvent {
    fn event_type(&self) -> &'static str {
        use event_types as t;
        match self {
            Self::ApplicationCreated { .. } => t::APPLICATION_CREATED,
            Self::ApplicationEdited { .. } => t::APPLICATION_EDITED,
            Self::AllocatorMultisigUpdated { .. } => t::ALLOCATOR_MULTISIG_UPDATED,
            Self::ApplicationPullRequestUpdated { .. } => t::APPLICATION_PULL_REQUEST_UPDATED,
            Self::KycApproved => t::KYC_APPROVED,
            Self::KycRejected { .. } => t::KYC_REJECTED,
            Self::KycRevoked { .. } => t::KYC_REVOKED,
            Self::GovernanceReviewApproved { .. } => t::GOVERNANCE_REVIEW_APPROVED,
            Self::GovernanceReviewRejected { .. } => t::GOVERNANCE_REVIEW_REJECTED,
            Self::RkhApprovalStarted { .. } => t::RKH_APPROVAL_STARTED,
            Self::RkhApprovalsUpdated { .. } => t::RKH_APPROVALS_UPDATED,
            Self::RkhApprovalCompleted { .. } => t::RKH_APPROVAL_COMPLETED,
            Self::MetaAllocatorApprovalStarted => t::META_ALLOCATOR_APPROVAL_STARTED,
            Self::MetaAllocatorApprovalCompleted { .. } => t::META_ALLOCATOR_APPROVAL_COMPLETED,
            Self::DatacapAllocationUpdated { .. } => t::DATACAP_ALLOCATION_UPDATED,
            Self::DatacapRefreshRequested { .. } => t::DATACAP_REFRESH_REQUESTED,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::types::InstructionStatus;
    use std::collections::HashSet;

    #[test]
    fn type_names_are_unique_and_versioned() {
        let unique: HashSet<_> = event_types::ALL.iter().collect();
        assert_eq!(unique.len(), event_types::ALL.len());
        assert!(event_types::ALL.iter().all(|name| name.ends_with(".v1")));
    }

    #[test]
    fn payload_with_timestamps_survives_bincode() {
        let at = DateTime::<Utc>::from_timestamp(1_700_000_000, 0).unwrap();
        let event = ApplicationEvent::GovernanceReviewApproved {
            reviewer: "f1gov".into(),
            instructions: vec![ApplicationInstruction {
                method: AllocatorMethod::Rkh,
                start_timestamp: Some(at),
                end_timestamp: None,
                allocated_timestamp: None,
                status: InstructionStatus::Pending,
                datacap_amount: 100,
            }],
        };
        let bytes = event.to_bytes().unwrap();
        assert_eq!(ApplicationEvent::from_bytes(&bytes).unwrap(), event);
        assert_eq!(event.event_type(), "GovernanceReviewApproved.v1");
    }
}
