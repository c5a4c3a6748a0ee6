//! Value types shared by the aggregate, events and read model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// Status
// ============================================================================

/// Lifecycle status of an application.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ApplicationStatus {
    /// Waiting for the KYC provider (initial status).
    #[default]
    KycPhase,
    /// Waiting for the governance team.
    GovernanceReviewPhase,
    /// Waiting for Root-Key-Holder multisig signatures.
    RkhApprovalPhase,
    /// Waiting for the Meta-Allocator contract.
    MetaApprovalPhase,
    /// Approved on chain, datacap not yet granted.
    Approved,
    /// Datacap granted.
    DcAllocated,
    /// Rejected by KYC or governance.
    Rejected,
}

impl ApplicationStatus {
    /// Canonical upper-case name (`"KYC_PHASE"`, ...).
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::KycPhase => "KYC_PHASE",
            Self::GovernanceReviewPhase => "GOVERNANCE_REVIEW_PHASE",
            Self::RkhApprovalPhase => "RKH_APPROVAL_PHASE",
            Self::MetaApprovalPhase => "META_APPROVAL_PHASE",
            Self::Approved => "APPROVED",
            Self::DcAllocated => "DC_ALLOCATED",
            Self::Rejected => "REJECTED",
        }
    }
}

impl fmt::Display for ApplicationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Allocation instructions
// ============================================================================

/// On-chain path used to grant an allocation tranche.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AllocatorMethod {
    /// Root-Key-Holder multisig.
    #[serde(rename = "RKH")]
    Rkh,
    /// Meta-Allocator contract.
    #[serde(rename = "META")]
    Meta,
}

/// Outcome of one allocation tranche.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InstructionStatus {
    /// Not decided yet.
    #[default]
    Pending,
    /// Datacap granted.
    Granted,
    /// Refused by governance.
    Denied,
}

/// One allocation tranche.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplicationInstruction {
    /// Approval path.
    pub method: AllocatorMethod,
    /// When the tranche was requested.
    #[serde(default)]
    pub start_timestamp: Option<DateTime<Utc>>,
    /// When the tranche was decided.
    #[serde(default)]
    pub end_timestamp: Option<DateTime<Utc>>,
    /// When datacap was granted.
    #[serde(default)]
    pub allocated_timestamp: Option<DateTime<Utc>>,
    /// Tranche status.
    #[serde(default)]
    pub status: InstructionStatus,
    /// Requested (then granted) datacap.
    pub datacap_amount: u64,
}

impl ApplicationInstruction {
    /// A freshly requested tranche.
    #[must_use]
    pub const fn pending(method: AllocatorMethod, datacap_amount: u64, requested_at: DateTime<Utc>) -> Self {
        Self {
            method,
            start_timestamp: Some(requested_at),
            end_timestamp: None,
            allocated_timestamp: None,
            status: InstructionStatus::Pending,
            datacap_amount,
        }
    }
}

/// Position of the instruction that drives routing and the current datacap amount.
///
/// The last appended entry wins. Every caller goes through this function (or
/// [`current_instruction`]) so the ordering policy lives in one place.
#[must_use]
pub fn current_instruction_index(instructions: &[ApplicationInstruction]) -> Option<usize> {
    instructions.len().checked_sub(1)
}

/// The instruction that drives routing and the current datacap amount.
#[must_use]
pub fn current_instruction(instructions: &[ApplicationInstruction]) -> Option<&ApplicationInstruction> {
    current_instruction_index(instructions).and_then(|index| instructions.get(index))
}

// ============================================================================
// Applicant
// ============================================================================

/// Who is applying.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApplicantInfo {
    /// Applicant name.
    pub name: String,
    /// Applicant contact address.
    pub address: String,
    /// Organization name.
    pub organization_name: String,
    /// Organization postal addresses.
    pub organization_addresses: String,
    /// Primary GitHub handle.
    pub github_handle: String,
    /// Additional GitHub handles, normalized.
    pub other_github_handles: Vec<String>,
    /// Filecoin address that will receive datacap (the allocator multisig).
    pub on_chain_address: Option<String>,
}

/// What the applicant asks for.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AllocationRequest {
    /// Requested tranche schedule.
    pub tranche_schedule: String,
    /// Audit approach.
    pub audit: String,
    /// Distribution requirements.
    pub distribution_required: String,
    /// Required storage providers.
    pub required_storage_providers: String,
    /// Required replicas.
    pub required_replicas: String,
    /// Datacap allocation limits.
    pub datacap_allocation_limits: String,
    /// Bookkeeping repository.
    pub bookkeeping_repo: String,
}

// ============================================================================
// Enrichment and approval state
// ============================================================================

/// Allocator multisig resolved on chain.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllocatorMultisig {
    /// Actor id (`f0...`).
    pub actor_id: String,
    /// Robust address.
    pub address: String,
    /// Signatures required.
    pub threshold: u32,
    /// Signer addresses.
    pub signers: Vec<String>,
}

/// Pull request tracking the application.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullRequestInfo {
    /// PR number.
    pub number: u64,
    /// PR URL.
    pub url: String,
    /// Id of the bot comment kept up to date on the PR.
    pub comment_id: u64,
}

/// Root-Key-Holder approval progress.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RkhPhase {
    /// Signers who approved so far.
    pub approvals: Vec<String>,
    /// Signatures required.
    pub approval_threshold: u32,
    /// Multisig proposal message id, once proposed.
    pub approval_message_id: Option<u64>,
}

/// Meta-Allocator approval transaction.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetaAllocatorTx {
    /// Block that included the transaction.
    pub block_number: u64,
    /// Transaction hash.
    pub tx_hash: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at() -> DateTime<Utc> {
        DateTime::<Utc>::from_timestamp(1_700_000_000, 0).unwrap_or_default()
    }

    #[test]
    fn last_instruction_wins() {
        let instructions = vec![
            ApplicationInstruction::pending(AllocatorMethod::Meta, 50, at()),
            ApplicationInstruction::pending(AllocatorMethod::Rkh, 100, at()),
        ];
        let current = current_instruction(&instructions);
        assert_eq!(current.map(|i| i.method), Some(AllocatorMethod::Rkh));
        assert_eq!(current.map(|i| i.datacap_amount), Some(100));
        assert!(current_instruction(&[]).is_none());
    }

    #[test]
    fn status_names_match_serialized_form() {
        for status in [
            ApplicationStatus::KycPhase,
            ApplicationStatus::GovernanceReviewPhase,
            ApplicationStatus::RkhApprovalPhase,
            ApplicationStatus::MetaApprovalPhase,
            ApplicationStatus::Approved,
            ApplicationStatus::DcAllocated,
            ApplicationStatus::Rejected,
        ] {
            let json = serde_json::to_string(&status).unwrap_or_default();
            assert_eq!(json, format!("\"{status}\""));
        }
    }

    #[test]
    fn methods_serialize_as_short_names() {
        assert_eq!(serde_json::to_string(&AllocatorMethod::Rkh).unwrap_or_default(), "\"RKH\"");
        assert_eq!(serde_json::to_string(&AllocatorMethod::Meta).unwrap_or_default(), "\"META\"");
    }
}
