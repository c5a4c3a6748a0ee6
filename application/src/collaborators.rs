//! Contracts of the external systems the workflow talks to.
//!
//! All blockchain and code-hosting interaction is enrichment: a failure here
//! is logged and absorbed by the caller, never a reason to drop a state
//! transition. Every call is bounded by [`with_timeout`].

use crate::error::ApplicationError;
use crate::types::{
    AllocationRequest, AllocatorMultisig, ApplicantInfo, ApplicationStatus, PullRequestInfo,
};
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Failures reported by collaborators.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CollaboratorError {
    /// The address does not exist on chain.
    #[error("Not found: {0}")]
    NotFound(String),

    /// A chain lookup failed.
    #[error("Lookup failed: {0}")]
    Lookup(String),

    /// The pull request could not be created.
    #[error("Pull request creation failed: {0}")]
    Creation(String),

    /// The call did not finish in time.
    #[error("{operation} timed out after {timeout:?}")]
    Timeout {
        /// Operation name.
        operation: &'static str,
        /// Bound that elapsed.
        timeout: Duration,
    },

    /// No backend is configured for this collaborator.
    #[error("{0} is not configured")]
    Disabled(&'static str),
}

impl From<CollaboratorError> for ApplicationError {
    fn from(error: CollaboratorError) -> Self {
        Self::CollaboratorUnavailable(error.to_string())
    }
}

/// Signer set and threshold of an on-chain multisig.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MultisigInfo {
    /// Signer addresses.
    pub signers: Vec<String>,
    /// Signatures required.
    pub approval_threshold: u32,
}

/// Application data handed to the pull-request service.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplicationSnapshot {
    /// Application id.
    pub application_id: String,
    /// Application number.
    pub application_number: u64,
    /// Current status.
    pub status: ApplicationStatus,
    /// Applicant details.
    pub applicant: ApplicantInfo,
    /// Allocation terms.
    pub allocation: AllocationRequest,
    /// Multisig, when resolved.
    pub allocator_multisig: Option<AllocatorMultisig>,
    /// Amount of the current tranche.
    pub datacap_amount: Option<u64>,
}

/// Read access to the Filecoin chain.
pub trait BlockchainClient: Send + Sync {
    /// Resolve a robust address to its actor id.
    ///
    /// # Errors
    ///
    /// [`CollaboratorError::NotFound`] when the address has no actor.
    fn resolve_actor_id<'a>(&'a self, address: &'a str) -> BoxFuture<'a, Result<String, CollaboratorError>>;

    /// Fetch signers and threshold of a multisig.
    ///
    /// # Errors
    ///
    /// [`CollaboratorError::Lookup`] when the actor is not a readable multisig.
    fn get_multisig_info<'a>(
        &'a self,
        address: &'a str,
    ) -> BoxFuture<'a, Result<MultisigInfo, CollaboratorError>>;
}

/// Code-hosting integration that tracks each application in a pull request.
pub trait PullRequestService: Send + Sync {
    /// Open the tracking pull request.
    ///
    /// # Errors
    ///
    /// [`CollaboratorError::Creation`] when the service refuses.
    fn create_pull_request<'a>(
        &'a self,
        snapshot: &'a ApplicationSnapshot,
    ) -> BoxFuture<'a, Result<PullRequestInfo, CollaboratorError>>;
}

/// Run `call`, failing with [`CollaboratorError::Timeout`] after `timeout`.
///
/// # Errors
///
/// The call's own error, or `Timeout` when it did not finish in time.
pub async fn with_timeout<T, F>(
    operation: &'static str,
    timeout: Duration,
    call: F,
) -> Result<T, CollaboratorError>
where
    F: Future<Output = Result<T, CollaboratorError>>,
{
    tokio::time::timeout(timeout, call)
        .await
        .unwrap_or(Err(CollaboratorError::Timeout { operation, timeout }))
}

/// Resolve actor id and multisig details for `address`.
///
/// # Errors
///
/// The first failing lookup.
pub async fn resolve_multisig(
    client: &dyn BlockchainClient,
    address: &str,
    timeout: Duration,
) -> Result<AllocatorMultisig, CollaboratorError> {
    let actor_id = with_timeout("resolve_actor_id", timeout, client.resolve_actor_id(address)).await?;
    let info = with_timeout("get_multisig_info", timeout, client.get_multisig_info(address)).await?;
    Ok(AllocatorMultisig {
        actor_id,
        address: address.to_owned(),
        threshold: info.approval_threshold,
        signers: info.signers,
    })
}

/// The external systems, injected at startup.
#[derive(Clone)]
pub struct Collaborators {
    /// Chain access.
    pub blockchain: Arc<dyn BlockchainClient>,
    /// Pull-request service.
    pub pull_requests: Arc<dyn PullRequestService>,
}

impl Collaborators {
    /// Collaborators that always report [`CollaboratorError::Disabled`].
    #[must_use]
    pub fn disabled() -> Self {
        Self {
            blockchain: Arc::new(DisabledBlockchainClient),
            pull_requests: Arc::new(DisabledPullRequestService),
        }
    }
}

impl std::fmt::Debug for Collaborators {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collaborators").finish_non_exhaustive()
    }
}

/// Blockchain client used when no node is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct DisabledBlockchainClient;

impl BlockchainClient for DisabledBlockchainClient {
    fn resolve_actor_id<'a>(&'a self, _address: &'a str) -> BoxFuture<'a, Result<String, CollaboratorError>> {
        Box::pin(async { Err(CollaboratorError::Disabled("blockchain client")) })
    }

    fn get_multisig_info<'a>(
        &'a self,
        _address: &'a str,
    ) -> BoxFuture<'a, Result<MultisigInfo, CollaboratorError>> {
        Box::pin(async { Err(CollaboratorError::Disabled("blockchain client")) })
    }
}

/// Pull-request service used when no code host is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct DisabledPullRequestService;

impl PullRequestService for DisabledPullRequestService {
    fn create_pull_request<'a>(
        &'a self,
        _snapshot: &'a ApplicationSnapshot,
    ) -> BoxFuture<'a, Result<PullRequestInfo, CollaboratorError>> {
        Box::pin(async { Err(CollaboratorError::Disabled("pull request service")) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCategory;

    struct SlowClient;

    impl BlockchainClient for SlowClient {
        fn resolve_actor_id<'a>(&'a self, _address: &'a str) -> BoxFuture<'a, Result<String, CollaboratorError>> {
            Box::pin(async {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok("f01000".to_owned())
            })
        }

        fn get_multisig_info<'a>(
            &'a self,
            _address: &'a str,
        ) -> BoxFuture<'a, Result<MultisigInfo, CollaboratorError>> {
            Box::pin(async {
                Ok(MultisigInfo {
                    signers: vec![],
                    approval_threshold: 1,
                })
            })
        }
    }

    #[tokio::test(start_paused = true)]
    async fn slow_lookups_time_out() {
        let result = resolve_multisig(&SlowClient, "f2abc", Duration::from_millis(100)).await;
        assert_eq!(
            result,
            Err(CollaboratorError::Timeout {
                operation: "resolve_actor_id",
                timeout: Duration::from_millis(100),
            })
        );
    }

    #[tokio::test]
    async fn disabled_collaborators_are_unavailable() {
        let collaborators = Collaborators::disabled();
        let error = collaborators
            .blockchain
            .resolve_actor_id("f2abc")
            .await
            .err()
            .map(ApplicationError::from);
        assert_eq!(
            error.map(|e| e.category()),
            Some(ErrorCategory::CollaboratorUnavailable)
        );
    }
}
