//! Commands accepted by the workflow.
//!
//! Every command names the application it writes to, so the command bus
//! runs commands for one application one at a time.

use crate::aggregate::{KycOutcome, ReviewDecision};
use crate::error::ApplicationError;
use crate::types::{AllocationRequest, AllocatorMethod, ApplicantInfo, ApplicationInstruction};
use filplus_runtime::Command;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ============================================================================
// Outputs
// ============================================================================

/// Returned by [`CreateApplication`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplicationCreated {
    /// Application id.
    pub application_id: String,
    /// Fresh id of this submission.
    pub guid: Uuid,
}

/// Returned by every other command.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandAck {
    /// Application id.
    pub application_id: String,
    /// Stream version after the command.
    pub version: u64,
    /// Events the command appended; zero for an idempotent repeat.
    pub events_recorded: usize,
}

// ============================================================================
// Commands
// ============================================================================

/// Submit a new application.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateApplication {
    /// Application id.
    pub application_id: String,
    /// Human-facing number.
    pub application_number: u64,
    /// Applicant details.
    pub applicant: ApplicantInfo,
    /// Allocation terms.
    #[serde(default)]
    pub allocation: AllocationRequest,
}

/// Change applicant or allocation details.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EditApplication {
    /// Application id.
    pub application_id: String,
    /// New applicant details.
    pub applicant: ApplicantInfo,
    /// New allocation terms.
    #[serde(default)]
    pub allocation: AllocationRequest,
}

/// KYC provider callback.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmitKycResult {
    /// Application id.
    pub application_id: String,
    /// Provider result.
    pub outcome: KycOutcome,
}

/// Withdraw a KYC approval.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevokeKyc {
    /// Application id.
    pub application_id: String,
    /// Why.
    #[serde(default)]
    pub reason: Option<String>,
}

/// Governance team decision.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmitGovernanceReviewResult {
    /// Application id.
    pub application_id: String,
    /// Address of the reviewer; must belong to the governance team.
    pub reviewer_address: String,
    /// Decision.
    pub decision: ReviewDecision,
    /// New instruction list; empty keeps the current one.
    #[serde(default)]
    pub instructions: Vec<ApplicationInstruction>,
}

/// Begin collecting RKH signatures.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StartRkhApproval {
    /// Application id.
    pub application_id: String,
    /// Signatures required; the configured default when absent.
    #[serde(default)]
    pub approval_threshold: Option<u32>,
}

/// State of the RKH multisig proposal.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RkhProposalStatus {
    /// Still collecting signatures.
    Pending,
    /// Executed on chain.
    Approved,
}

/// Report from the multisig watcher.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateRkhApprovals {
    /// Application id.
    pub application_id: String,
    /// Proposal state.
    pub status: RkhProposalStatus,
    /// Proposal message id.
    pub message_id: u64,
    /// Signers so far.
    #[serde(default)]
    pub approvals: Vec<String>,
    /// Signatures required; falls back to the running phase, then to the
    /// configured default.
    #[serde(default)]
    pub approval_threshold: Option<u32>,
}

/// State of the Meta-Allocator transaction.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MetaAllocatorUpdate {
    /// Transaction submitted.
    Started,
    /// Transaction included in a block.
    Approved {
        /// Block number.
        block_number: u64,
        /// Transaction hash.
        tx_hash: String,
    },
}

/// Report from the Meta-Allocator watcher.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateMetaAllocatorApprovals {
    /// Application id.
    pub application_id: String,
    /// Transaction state.
    pub update: MetaAllocatorUpdate,
}

/// Datacap was granted on chain.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateDatacapAllocation {
    /// Application id.
    pub application_id: String,
    /// Amount granted.
    pub datacap_amount: u64,
}

/// Ask for another tranche.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestDatacapRefresh {
    /// Application id.
    pub application_id: String,
    /// Approval path of the new tranche.
    pub method: AllocatorMethod,
    /// Requested amount.
    pub amount: u64,
}

/// Re-read the allocator multisig from chain.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefreshAllocatorMultisig {
    /// Application id.
    pub application_id: String,
}

macro_rules! application_command {
    ($command:ident => $output:ty) => {
        impl Command for $command {
            const NAME: &'static str = stringify!($command);
            type Output = $output;
            type Error = ApplicationError;

            fn aggregate_id(&self) -> Option<&str> {
                Some(&self.application_id)
            }
        }
    };
}

application_command!(CreateApplication => ApplicationCreated);
application_command!(EditApplication => CommandAck);
application_command!(SubmitKycResult => CommandAck);
application_command!(RevokeKyc => CommandAck);
application_command!(SubmitGovernanceReviewResult => CommandAck);
application_command!(StartRkhApproval => CommandAck);
application_command!(UpdateRkhApprovals => CommandAck);
application_command!(UpdateMetaAllocatorApprovals => CommandAck);
application_command!(UpdateDatacapAllocation => CommandAck);
application_command!(RequestDatacapRefresh => CommandAck);
application_command!(RefreshAllocatorMultisig => CommandAck);

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn commands_are_keyed_by_application() {
        let command = RevokeKyc {
            application_id: "app-1".into(),
            reason: None,
        };
        assert_eq!(command.aggregate_id(), Some("app-1"));
        assert_eq!(RevokeKyc::NAME, "RevokeKyc");
    }

    #[test]
    fn governance_review_parses_from_json() {
        let command: SubmitGovernanceReviewResult = serde_json::from_str(
            r#"{
                "application_id": "app-1",
                "reviewer_address": "f1gov",
                "decision": {"status": "APPROVED"},
                "instructions": [{"method": "RKH", "datacap_amount": 100}]
            }"#,
        )
        .unwrap();
        assert_eq!(command.decision, ReviewDecision::Approved);
        assert_eq!(command.instructions[0].method, AllocatorMethod::Rkh);
        assert!(command.instructions[0].start_timestamp.is_none());
    }

    #[test]
    fn meta_update_is_tagged_by_status() {
        let update: MetaAllocatorUpdate =
            serde_json::from_str(r#"{"status": "APPROVED", "block_number": 7, "tx_hash": "0xabc"}"#).unwrap();
        assert_eq!(
            update,
            MetaAllocatorUpdate::Approved {
                block_number: 7,
                tx_hash: "0xabc".into()
            }
        );
    }
}
