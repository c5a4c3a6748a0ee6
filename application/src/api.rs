//! Caller boundary: JSON requests in, [`Outcome`] envelopes out.
//!
//! A request is either `{"command": {"type": "<CommandName>", ...}}` or
//! `{"query": {"type": "<QueryName>", ...}}`. The remaining fields are the
//! fields of the named command or query.

use crate::commands::{
    CreateApplication, EditApplication, RefreshAllocatorMultisig, RequestDatacapRefresh, RevokeKyc,
    StartRkhApproval, SubmitGovernanceReviewResult, SubmitKycResult, UpdateDatacapAllocation,
    UpdateMetaAllocatorApprovals, UpdateRkhApprovals,
};
use crate::error::{ApplicationError, ErrorCategory};
use crate::queries::{GetApplicationById, GetApplications};
use serde::{Deserialize, Serialize};

/// Failure part of an [`Outcome`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutcomeError {
    /// Error category.
    pub category: ErrorCategory,
    /// Human-readable message.
    pub message: String,
}

impl From<&ApplicationError> for OutcomeError {
    fn from(error: &ApplicationError) -> Self {
        Self {
            category: error.category(),
            message: error.to_string(),
        }
    }
}

/// Uniform result envelope returned to callers.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Outcome<T> {
    /// `true` when `data` is set.
    pub success: bool,
    /// Payload on success.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    /// Error on failure.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<OutcomeError>,
}

impl<T> Outcome<T> {
    /// Successful outcome.
    pub const fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    /// Failed outcome.
    #[must_use]
    pub fn failed(error: &ApplicationError) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error.into()),
        }
    }
}

impl<T> From<Result<T, ApplicationError>> for Outcome<T> {
    fn from(result: Result<T, ApplicationError>) -> Self {
        match result {
            Ok(data) => Self::ok(data),
            Err(error) => Self::failed(&error),
        }
    }
}

/// Any command, tagged by name.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
#[allow(missing_docs)]
pub enum CommandRequest {
    CreateApplication(CreateApplication),
    EditApplication(EditApplication),
    SubmitKycResult(SubmitKycResult),
    RevokeKyc(RevokeKyc),
    SubmitGovernanceReviewResult(SubmitGovernanceReviewResult),
    StartRkhApproval(StartRkhApproval),
    UpdateRkhApprovals(UpdateRkhApprovals),
    UpdateMetaAllocatorApprovals(UpdateMetaAllocatorApprovals),
    UpdateDatacapAllocation(UpdateDatacapAllocation),
    RequestDatacapRefresh(RequestDatacapRefresh),
    RefreshAllocatorMultisig(RefreshAllocatorMultisig),
}

/// Any query, tagged by name.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
#[allow(missing_docs)]
pub enum QueryRequest {
    GetApplicationById(GetApplicationById),
    GetApplications(GetApplications),
}

/// One line of input.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Request {
    /// State change.
    Command(CommandRequest),
    /// Read.
    Query(QueryRequest),
}

impl Request {
    /// Parse one JSON request.
    ///
    /// # Errors
    ///
    /// Returns [`ApplicationError::ValidationError`] for malformed JSON or an
    /// unknown command or query.
    pub fn parse(raw: &str) -> Result<Self, ApplicationError> {
        serde_json::from_str(raw).map_err(|error| ApplicationError::validation(format!("invalid request: {error}")))
    }
}
