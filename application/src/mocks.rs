//! Scriptable collaborator doubles.
//!
//! Both mocks can fail a number of upcoming calls and delay every call, to
//! exercise the timeout and enrichment-is-optional paths.

use crate::collaborators::{
    ApplicationSnapshot, BlockchainClient, CollaboratorError, MultisigInfo, PullRequestService,
};
use crate::types::PullRequestInfo;
use futures::future::BoxFuture;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
}

fn take_failure(failures: &AtomicUsize) -> bool {
    failures
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

/// In-memory chain with registered multisigs.
#[derive(Debug, Default)]
pub struct MockBlockchainClient {
    multisigs: Mutex<HashMap<String, (String, MultisigInfo)>>,
    failures_left: AtomicUsize,
    delay: Mutex<Option<Duration>>,
    calls: AtomicUsize,
}

impl MockBlockchainClient {
    /// Chain with no multisigs.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) the multisig at `address`.
    pub fn add_multisig(&self, address: &str, actor_id: &str, signers: &[&str], threshold: u32) {
        lock(&self.multisigs).insert(
            address.to_lowercase(),
            (
                actor_id.to_owned(),
                MultisigInfo {
                    signers: signers.iter().map(|s| (*s).to_owned()).collect(),
                    approval_threshold: threshold,
                },
            ),
        );
    }

    /// Fail the next `n` calls with [`CollaboratorError::Lookup`].
    pub fn fail_next(&self, n: usize) {
        self.failures_left.store(n, Ordering::SeqCst);
    }

    /// Delay every call by `delay`.
    pub fn set_delay(&self, delay: Duration) {
        *lock(&self.delay) = Some(delay);
    }

    /// Calls received so far.
    #[must_use]
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    async fn lookup(&self, address: &str) -> Result<(String, MultisigInfo), CollaboratorError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let delay = *lock(&self.delay);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if take_failure(&self.failures_left) {
            return Err(CollaboratorError::Lookup(format!("injected failure for {address}")));
        }
        lock(&self.multisigs)
            .get(&address.to_lowercase())
            .cloned()
            .ok_or_else(|| CollaboratorError::NotFound(address.to_owned()))
    }
}

impl BlockchainClient for MockBlockchainClient {
    fn resolve_actor_id<'a>(&'a self, address: &'a str) -> BoxFuture<'a, Result<String, CollaboratorError>> {
        Box::pin(async move { self.lookup(address).await.map(|(actor_id, _)| actor_id) })
    }

    fn get_multisig_info<'a>(
        &'a self,
        address: &'a str,
    ) -> BoxFuture<'a, Result<MultisigInfo, CollaboratorError>> {
        Box::pin(async move { self.lookup(address).await.map(|(_, info)| info) })
    }
}

/// Pull-request service that numbers PRs from 1.
#[derive(Debug, Default)]
pub struct MockPullRequestService {
    created: Mutex<Vec<ApplicationSnapshot>>,
    next_number: AtomicU64,
    failures_left: AtomicUsize,
    delay: Mutex<Option<Duration>>,
}

impl MockPullRequestService {
    /// Service with no PRs.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next `n` calls with [`CollaboratorError::Creation`].
    pub fn fail_next(&self, n: usize) {
        self.failures_left.store(n, Ordering::SeqCst);
    }

    /// Delay every call by `delay`.
    pub fn set_delay(&self, delay: Duration) {
        *lock(&self.delay) = Some(delay);
    }

    /// Snapshots of the PRs created so far.
    #[must_use]
    pub fn created(&self) -> Vec<ApplicationSnapshot> {
        lock(&self.created).clone()
    }
}

impl PullRequestService for MockPullRequestService {
    fn create_pull_request<'a>(
        &'a self,
        snapshot: &'a ApplicationSnapshot,
    ) -> BoxFuture<'a, Result<PullRequestInfo, CollaboratorError>> {
        Box::pin(async move {
            let delay = *lock(&self.delay);
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            if take_failure(&self.failures_left) {
                return Err(CollaboratorError::Creation(format!(
                    "injected failure for {}",
                    snapshot.application_id
                )));
            }
            lock(&self.created).push(snapshot.clone());
            let number = self.next_number.fetch_add(1, Ordering::SeqCst) + 1;
            Ok(PullRequestInfo {
                number,
                url: format!("https://github.com/filplus/applications/pull/{number}"),
                comment_id: number * 1000,
            })
        })
    }
}
