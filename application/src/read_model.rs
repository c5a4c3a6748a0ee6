//! The application-details read model.
//!
//! One denormalized document per application, written only by projectors
//! and read only by query handlers. It is never authoritative: dropping a
//! document and replaying the stream rebuilds it.

use crate::types::{
    AllocationRequest, ApplicationInstruction, ApplicationStatus, MetaAllocatorTx, PullRequestInfo,
    RkhPhase,
};
use chrono::{DateTime, Utc};
use filplus_core::projection::{ProjectionError, Result};
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Signer set shown in the read model.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MultisigDetails {
    /// Signatures required.
    pub threshold: u32,
    /// Signer addresses.
    pub signers: Vec<String>,
}

/// Query-side view of one application.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplicationDetails {
    /// Application id.
    pub id: String,
    /// Application number.
    pub number: u64,
    /// Applicant name.
    pub name: String,
    /// Organization name.
    pub organization: String,
    /// Applicant address.
    pub address: String,
    /// Primary GitHub handle.
    pub github: String,
    /// Additional GitHub handles.
    pub other_github_handles: Vec<String>,
    /// Address that will receive datacap.
    pub on_chain_address: Option<String>,
    /// Allocation terms.
    pub allocation: AllocationRequest,
    /// Current status.
    pub status: ApplicationStatus,
    /// Amount of the current tranche.
    pub datacap: Option<u64>,
    /// Allocation tranches.
    pub application_instructions: Vec<ApplicationInstruction>,
    /// Multisig actor id.
    pub actor_id: Option<String>,
    /// Multisig robust address.
    pub multisig_address: Option<String>,
    /// Multisig signers and threshold.
    pub multisig: Option<MultisigDetails>,
    /// RKH progress.
    pub rkh_phase: Option<RkhPhase>,
    /// Tracking pull request.
    pub pull_request: Option<PullRequestInfo>,
    /// Last Meta-Allocator transaction.
    pub meta_allocator: Option<MetaAllocatorTx>,
    /// `occurred_at` of the last projected event.
    pub updated_at: DateTime<Utc>,
}

/// Field-level patch applied by a projector.
///
/// `None` leaves a field untouched; for optional fields `Some(None)` clears it.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
#[allow(clippy::option_option)]
pub struct ApplicationDetailsUpdate {
    /// Target document.
    pub id: String,
    /// See [`ApplicationDetails::number`].
    pub number: Option<u64>,
    /// See [`ApplicationDetails::name`].
    pub name: Option<String>,
    /// See [`ApplicationDetails::organization`].
    pub organization: Option<String>,
    /// See [`ApplicationDetails::address`].
    pub address: Option<String>,
    /// See [`ApplicationDetails::github`].
    pub github: Option<String>,
    /// See [`ApplicationDetails::other_github_handles`].
    pub other_github_handles: Option<Vec<String>>,
    /// See [`ApplicationDetails::on_chain_address`].
    pub on_chain_address: Option<Option<String>>,
    /// See [`ApplicationDetails::allocation`].
    pub allocation: Option<AllocationRequest>,
    /// See [`ApplicationDetails::status`].
    pub status: Option<ApplicationStatus>,
    /// See [`ApplicationDetails::datacap`].
    pub datacap: Option<Option<u64>>,
    /// See [`ApplicationDetails::application_instructions`].
    pub application_instructions: Option<Vec<ApplicationInstruction>>,
    /// See [`ApplicationDetails::actor_id`].
    pub actor_id: Option<Option<String>>,
    /// See [`ApplicationDetails::multisig_address`].
    pub multisig_address: Option<Option<String>>,
    /// See [`ApplicationDetails::multisig`].
    pub multisig: Option<Option<MultisigDetails>>,
    /// See [`ApplicationDetails::rkh_phase`].
    pub rkh_phase: Option<Option<RkhPhase>>,
    /// See [`ApplicationDetails::pull_request`].
    pub pull_request: Option<Option<PullRequestInfo>>,
    /// See [`ApplicationDetails::meta_allocator`].
    pub meta_allocator: Option<Option<MetaAllocatorTx>>,
    /// Always written.
    pub updated_at: DateTime<Utc>,
}

impl ApplicationDetailsUpdate {
    /// A patch that only touches `updated_at`.
    #[must_use]
    pub fn new(id: impl Into<String>, updated_at: DateTime<Utc>) -> Self {
        Self {
            id: id.into(),
            updated_at,
            ..Self::default()
        }
    }

    /// Write the patched fields into `document`.
    pub fn apply_to(self, document: &mut ApplicationDetails) {
        fn set<T>(field: &mut T, value: Option<T>) {
            if let Some(value) = value {
                *field = value;
            }
        }

        document.id = self.id;
        set(&mut document.number, self.number);
        set(&mut document.name, self.name);
        set(&mut document.organization, self.organization);
        set(&mut document.address, self.address);
        set(&mut document.github, self.github);
        set(&mut document.other_github_handles, self.other_github_handles);
        set(&mut document.on_chain_address, self.on_chain_address);
        set(&mut document.allocation, self.allocation);
        set(&mut document.status, self.status);
        set(&mut document.datacap, self.datacap);
        set(&mut document.application_instructions, self.application_instructions);
        set(&mut document.actor_id, self.actor_id);
        set(&mut document.multisig_address, self.multisig_address);
        set(&mut document.multisig, self.multisig);
        set(&mut document.rkh_phase, self.rkh_phase);
        set(&mut document.pull_request, self.pull_request);
        set(&mut document.meta_allocator, self.meta_allocator);
        document.updated_at = self.updated_at;
    }
}

/// Filter for [`ApplicationDetailsRepository::find`].
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplicationFilter {
    /// Accepted statuses; empty accepts all.
    #[serde(default)]
    pub statuses: Vec<ApplicationStatus>,
    /// Case-insensitive text matched against name, organization, id,
    /// address and GitHub handles.
    #[serde(default)]
    pub search: Option<String>,
}

impl ApplicationFilter {
    /// `true` if `details` passes the filter.
    #[must_use]
    pub fn matches(&self, details: &ApplicationDetails) -> bool {
        if !self.statuses.is_empty() && !self.statuses.contains(&details.status) {
            return false;
        }
        let Some(search) = self.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) else {
            return true;
        };
        let needle = search.to_lowercase();
        [
            details.name.as_str(),
            details.organization.as_str(),
            details.id.as_str(),
            details.address.as_str(),
            details.github.as_str(),
        ]
        .into_iter()
        .chain(details.other_github_handles.iter().map(String::as_str))
        .any(|field| field.to_lowercase().contains(&needle))
    }
}

/// One page of results.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page<T> {
    /// Items on this page.
    pub items: Vec<T>,
    /// Matches across all pages.
    pub total: usize,
    /// 1-based page number.
    pub page: usize,
    /// Page size.
    pub limit: usize,
}

/// Storage of [`ApplicationDetails`] documents.
pub trait ApplicationDetailsRepository: Send + Sync {
    /// Apply `update` to its document, creating it when missing.
    ///
    /// # Errors
    ///
    /// [`ProjectionError::Storage`] on backend failure.
    fn upsert(&self, update: ApplicationDetailsUpdate) -> BoxFuture<'_, Result<ApplicationDetails>>;

    /// Fetch one document.
    ///
    /// # Errors
    ///
    /// [`ProjectionError::Storage`] on backend failure.
    fn get_by_id<'a>(&'a self, id: &'a str) -> BoxFuture<'a, Result<Option<ApplicationDetails>>>;

    /// Matching documents ordered by number then id, paginated (`page` is 1-based).
    ///
    /// # Errors
    ///
    /// [`ProjectionError::Storage`] on backend failure.
    fn find(&self, filter: ApplicationFilter, page: usize, limit: usize)
    -> BoxFuture<'_, Result<Page<ApplicationDetails>>>;

    /// Drop a document. Returns whether it existed.
    ///
    /// # Errors
    ///
    /// [`ProjectionError::Storage`] on backend failure.
    fn remove<'a>(&'a self, id: &'a str) -> BoxFuture<'a, Result<bool>>;
}

/// HashMap-backed [`ApplicationDetailsRepository`].
#[derive(Clone, Debug, Default)]
pub struct InMemoryApplicationDetailsRepository {
    documents: Arc<RwLock<HashMap<String, ApplicationDetails>>>,
}

impl InMemoryApplicationDetailsRepository {
    /// Create an empty repository.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored documents.
    #[must_use]
    pub fn len(&self) -> usize {
        self.read().len()
    }

    /// `true` when no document is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, ApplicationDetails>> {
        self.documents.read().unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, ApplicationDetails>> {
        self.documents.write().unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

impl ApplicationDetailsRepository for InMemoryApplicationDetailsRepository {
    fn upsert(&self, update: ApplicationDetailsUpdate) -> BoxFuture<'_, Result<ApplicationDetails>> {
        Box::pin(async move {
            if update.id.is_empty() {
                return Err(ProjectionError::Storage("document id is required".into()));
            }
            let mut documents = self.write();
            let document = documents.entry(update.id.clone()).or_default();
            update.apply_to(document);
            Ok(document.clone())
        })
    }

    fn get_by_id<'a>(&'a self, id: &'a str) -> BoxFuture<'a, Result<Option<ApplicationDetails>>> {
        Box::pin(async move { Ok(self.read().get(id).cloned()) })
    }

    fn find(
        &self,
        filter: ApplicationFilter,
        page: usize,
        limit: usize,
    ) -> BoxFuture<'_, Result<Page<ApplicationDetails>>> {
        Box::pin(async move {
            let mut matching: Vec<ApplicationDetails> = self
                .read()
                .values()
                .filter(|details| filter.matches(details))
                .cloned()
                .collect();
            matching.sort_by(|a, b| a.number.cmp(&b.number).then_with(|| a.id.cmp(&b.id)));

            let total = matching.len();
            let items = matching
                .into_iter()
                .skip(page.saturating_sub(1).saturating_mul(limit))
                .take(limit)
                .collect();
            Ok(Page {
                items,
                total,
                page,
                limit,
            })
        })
    }

    fn remove<'a>(&'a self, id: &'a str) -> BoxFuture<'a, Result<bool>> {
        Box::pin(async move { Ok(self.write().remove(id).is_some()) })
    }
}
