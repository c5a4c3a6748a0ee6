//! End-to-end workflow through the command bus, event bus and read model.

#![allow(clippy::unwrap_used)] // Tests can unwrap
#![allow(clippy::expect_used)] // Tests can expect

use filplus_application::aggregate::{KycOutcome, ReviewDecision};
use filplus_application::commands::{
    CreateApplication, MetaAllocatorUpdate, RequestDatacapRefresh, RkhProposalStatus, SubmitGovernanceReviewResult,
    SubmitKycResult, UpdateDatacapAllocation, UpdateMetaAllocatorApprovals, UpdateRkhApprovals,
};
use filplus_application::mocks::{MockBlockchainClient, MockPullRequestService};
use filplus_application::queries::{GetApplicationById, GetApplications};
use filplus_application::read_model::{ApplicationDetails, ApplicationFilter};
use filplus_application::role::RoleConfig;
use filplus_application::types::{
    AllocatorMethod, ApplicantInfo, ApplicationInstruction, InstructionStatus,
};
use filplus_application::{
    AppConfig, ApplicationError, ApplicationService, ApplicationStatus, Collaborators, Infrastructure,
};
use filplus_core::event_store::ExpectedVersion;
use filplus_core::stream::Version;
use filplus_testing::{InMemoryEventBus, InMemoryEventStore, eventually, test_clock};
use std::sync::Arc;
use std::time::Duration;

const GOVERNANCE: &str = "f1governance";
const WAIT: Duration = Duration::from_secs(2);

struct Harness {
    service: ApplicationService,
    bus: Arc<InMemoryEventBus>,
    store: Arc<InMemoryEventStore>,
    blockchain: Arc<MockBlockchainClient>,
    pull_requests: Arc<MockPullRequestService>,
    config: AppConfig,
}

async fn harness() -> Harness {
    let store = Arc::new(InMemoryEventStore::new());
    let bus = Arc::new(InMemoryEventBus::new());
    let blockchain = Arc::new(MockBlockchainClient::new());
    blockchain.add_multisig("f2allocator", "f01234", &["f1abc", "f1def"], 2);
    let pull_requests = Arc::new(MockPullRequestService::new());

    let config = AppConfig {
        roles: RoleConfig::new(&[GOVERNANCE], &["f1abc", "f1def"], &["f1meta"]),
        command_retry_initial_delay_ms: 1,
        collaborator_timeout_ms: 500,
        ..AppConfig::default()
    };
    let infrastructure = Infrastructure {
        event_store: store.clone(),
        event_bus: bus.clone(),
        details: Arc::new(filplus_application::read_model::InMemoryApplicationDetailsRepository::new()),
        clock: Arc::new(test_clock()),
    };
    let collaborators = Collaborators {
        blockchain: blockchain.clone(),
        pull_requests: pull_requests.clone(),
    };
    let service = ApplicationService::start(&config, infrastructure, collaborators)
        .await
        .unwrap();
    Harness {
        service,
        bus,
        store,
        blockchain,
        pull_requests,
        config,
    }
}

fn create(id: &str, number: u64) -> CreateApplication {
    CreateApplication {
        application_id: id.to_string(),
        application_number: number,
        applicant: ApplicantInfo {
            name: "Ada".to_string(),
            organization_name: "Storage Co".to_string(),
            github_handle: "AdaStores".to_string(),
            other_github_handles: vec!["@Helper, other".to_string()],
            on_chain_address: Some("f2allocator".to_string()),
            ..ApplicantInfo::default()
        },
        allocation: Default::default(),
    }
}

fn approve(id: &str, method: AllocatorMethod, amount: u64) -> SubmitGovernanceReviewResult {
    SubmitGovernanceReviewResult {
        application_id: id.to_string(),
        reviewer_address: GOVERNANCE.to_string(),
        decision: ReviewDecision::Approved,
        instructions: vec![ApplicationInstruction {
            method,
            start_timestamp: None,
            end_timestamp: None,
            allocated_timestamp: None,
            status: InstructionStatus::Pending,
            datacap_amount: amount,
        }],
    }
}

fn kyc_approved(id: &str) -> SubmitKycResult {
    SubmitKycResult {
        application_id: id.to_string(),
        outcome: KycOutcome::Approved,
    }
}

async fn projected(service: &ApplicationService, id: &str, check: impl Fn(&ApplicationDetails) -> bool) -> ApplicationDetails {
    let details = service.details().clone();
    let check = &check;
    let reached = eventually(WAIT, move || {
        let details = details.clone();
        async move { details.get_by_id(id).await.ok().flatten().is_some_and(|d| check(&d)) }
    })
    .await;
    assert!(reached, "read model for {id} never reached the expected state");
    service.details().get_by_id(id).await.unwrap().unwrap()
}

#[tokio::test]
async fn test_governance_approval_moves_to_rkh_and_projects_datacap() {
    let h = harness().await;
    h.service.execute(create("app-1", 1)).await.unwrap();
    h.service.execute(kyc_approved("app-1")).await.unwrap();
    let ack = h.service.execute(approve("app-1", AllocatorMethod::Rkh, 100)).await.unwrap();
    assert_eq!(ack.events_recorded, 1);

    let application = h.service.repository().get_by_id("app-1").await.unwrap();
    assert_eq!(application.status(), ApplicationStatus::RkhApprovalPhase);

    let details = projected(&h.service, "app-1", |d| d.status == ApplicationStatus::RkhApprovalPhase).await;
    assert_eq!(details.datacap, Some(100));
    assert_eq!(details.github, "adastores");
    assert_eq!(details.other_github_handles, vec!["helper".to_string(), "other".to_string()]);
    assert_eq!(details.actor_id.as_deref(), Some("f01234"));
    assert_eq!(details.pull_request.map(|pr| pr.number), Some(1));
    assert_eq!(h.pull_requests.created().len(), 1);

    h.service.shutdown().await;
}

#[tokio::test]
async fn test_stale_save_conflicts() {
    let h = harness().await;
    h.service.execute(create("app-1", 1)).await.unwrap();
    // created, multisig resolved, pull request opened
    assert_eq!(h.store.event_count().await, 3);

    let mut application = h.service.repository().get_by_id("app-1").await.unwrap();
    application
        .record_kyc(KycOutcome::Approved, filplus_core::Utc::now())
        .unwrap();
    let result = h
        .service
        .repository()
        .save(&mut application, ExpectedVersion::Exact(Version::new(2)))
        .await;

    assert_eq!(
        result,
        Err(ApplicationError::ConcurrencyConflict {
            application_id: "app-1".to_string(),
            expected: 2,
            actual: 3,
        })
    );
    assert_eq!(application.uncommitted_events().len(), 1);
    assert_eq!(h.store.event_count().await, 3);
}

#[tokio::test]
async fn test_rkh_signatures_then_execution_approves() {
    let h = harness().await;
    h.service.execute(create("app-1", 1)).await.unwrap();
    h.service.execute(kyc_approved("app-1")).await.unwrap();
    h.service.execute(approve("app-1", AllocatorMethod::Rkh, 100)).await.unwrap();

    let update = |status| UpdateRkhApprovals {
        application_id: "app-1".to_string(),
        status,
        message_id: 42,
        approvals: vec!["f1abc".to_string(), "f1def".to_string()],
        approval_threshold: Some(2),
    };
    h.service.execute(update(RkhProposalStatus::Pending)).await.unwrap();
    let phase = projected(&h.service, "app-1", |d| d.rkh_phase.is_some()).await.rkh_phase.unwrap();
    assert_eq!(phase.approvals, vec!["f1abc".to_string(), "f1def".to_string()]);
    assert_eq!(phase.approval_message_id, Some(42));

    h.service.execute(update(RkhProposalStatus::Approved)).await.unwrap();
    let application = h.service.repository().get_by_id("app-1").await.unwrap();
    assert_eq!(application.status(), ApplicationStatus::Approved);
    assert_eq!(application.instructions().len(), 1);
    assert_eq!(application.instructions()[0].datacap_amount, 100);

    // The watcher may report the executed proposal again.
    let repeat = h.service.execute(update(RkhProposalStatus::Approved)).await.unwrap();
    assert_eq!(repeat.events_recorded, 0);
    let stale = h.service.execute(update(RkhProposalStatus::Pending)).await.unwrap();
    assert_eq!(stale.events_recorded, 0);

    let details = projected(&h.service, "app-1", |d| d.status == ApplicationStatus::Approved).await;
    assert_eq!(details.datacap, Some(100));
}

#[tokio::test]
async fn test_meta_allocator_path_to_allocation_and_refresh() {
    let h = harness().await;
    h.service.execute(create("app-1", 1)).await.unwrap();
    h.service.execute(kyc_approved("app-1")).await.unwrap();
    h.service.execute(approve("app-1", AllocatorMethod::Meta, 50)).await.unwrap();

    let meta = |update| UpdateMetaAllocatorApprovals {
        application_id: "app-1".to_string(),
        update,
    };
    h.service.execute(meta(MetaAllocatorUpdate::Started)).await.unwrap();
    h.service
        .execute(meta(MetaAllocatorUpdate::Approved {
            block_number: 9,
            tx_hash: "0xabc".to_string(),
        }))
        .await
        .unwrap();
    h.service
        .execute(UpdateDatacapAllocation {
            application_id: "app-1".to_string(),
            datacap_amount: 50,
        })
        .await
        .unwrap();

    let allocated = projected(&h.service, "app-1", |d| d.status == ApplicationStatus::DcAllocated).await;
    assert_eq!(allocated.meta_allocator.map(|tx| tx.block_number), Some(9));
    assert_eq!(
        allocated.application_instructions[0].status,
        InstructionStatus::Granted
    );

    h.service
        .execute(RequestDatacapRefresh {
            application_id: "app-1".to_string(),
            method: AllocatorMethod::Rkh,
            amount: 200,
        })
        .await
        .unwrap();
    let refreshed = projected(&h.service, "app-1", |d| d.status == ApplicationStatus::GovernanceReviewPhase).await;
    assert_eq!(refreshed.application_instructions.len(), 2);
    assert_eq!(refreshed.datacap, Some(200));
}

#[tokio::test]
async fn test_duplicate_create_is_rejected() {
    let h = harness().await;
    h.service.execute(create("app-1", 1)).await.unwrap();
    let again = h.service.execute(create("app-1", 1)).await;
    assert_eq!(again, Err(ApplicationError::AlreadyExists("app-1".to_string())));
    assert_eq!(h.store.event_count().await, 3);
}

#[tokio::test]
async fn test_non_governance_reviewer_is_unauthorized() {
    let h = harness().await;
    h.service.execute(create("app-1", 1)).await.unwrap();
    h.service.execute(kyc_approved("app-1")).await.unwrap();

    let mut review = approve("app-1", AllocatorMethod::Rkh, 100);
    review.reviewer_address = "f1abc".to_string();
    let result = h.service.execute(review).await;
    assert!(matches!(result, Err(ApplicationError::Unauthorized(_))));
}

#[tokio::test]
async fn test_enrichment_failures_do_not_block_creation() {
    let h = harness().await;
    h.blockchain.fail_next(1);
    h.pull_requests.fail_next(1);

    h.service.execute(create("app-1", 1)).await.unwrap();
    assert_eq!(h.store.event_count().await, 1);

    let details = projected(&h.service, "app-1", |_| true).await;
    assert_eq!(details.status, ApplicationStatus::KycPhase);
    assert_eq!(details.pull_request, None);
}

#[tokio::test]
async fn test_redelivered_events_leave_read_model_unchanged() {
    let h = harness().await;
    h.service.execute(create("app-1", 1)).await.unwrap();
    h.service.execute(kyc_approved("app-1")).await.unwrap();
    let before = projected(&h.service, "app-1", |d| d.status == ApplicationStatus::GovernanceReviewPhase).await;

    h.bus.redeliver_all(&h.config.events_topic).await;
    tokio::time::sleep(Duration::from_millis(50)).await;

    let after = h.service.details().get_by_id("app-1").await.unwrap().unwrap();
    assert_eq!(before, after);
}

#[tokio::test]
async fn test_rebuild_restores_the_document() {
    let h = harness().await;
    h.service.execute(create("app-1", 1)).await.unwrap();
    h.service.execute(kyc_approved("app-1")).await.unwrap();
    h.service.execute(approve("app-1", AllocatorMethod::Rkh, 100)).await.unwrap();
    let before = projected(&h.service, "app-1", |d| d.status == ApplicationStatus::RkhApprovalPhase).await;

    let replayed = h.service.rebuild_read_model("app-1").await.unwrap();
    assert_eq!(replayed, 5);
    let after = h.service.details().get_by_id("app-1").await.unwrap().unwrap();
    assert_eq!(before, after);

    assert_eq!(
        h.service.rebuild_read_model("app-unknown").await,
        Err(ApplicationError::NotFound("app-unknown".to_string()))
    );
}

#[tokio::test]
async fn test_identical_refreshes_stay_distinct_in_the_read_model() {
    let h = harness().await;
    let refresh = || RequestDatacapRefresh {
        application_id: "app-1".to_string(),
        method: AllocatorMethod::Rkh,
        amount: 200,
    };
    let reapprove = SubmitGovernanceReviewResult {
        instructions: Vec::new(),
        ..approve("app-1", AllocatorMethod::Rkh, 100)
    };
    h.service.execute(create("app-1", 1)).await.unwrap();
    h.service.execute(kyc_approved("app-1")).await.unwrap();
    h.service.execute(approve("app-1", AllocatorMethod::Rkh, 100)).await.unwrap();
    h.service.execute(refresh()).await.unwrap();
    h.service.execute(reapprove).await.unwrap();
    h.service.execute(refresh()).await.unwrap();

    let application = h.service.repository().get_by_id("app-1").await.unwrap();
    assert_eq!(application.instructions().len(), 3);
    assert_eq!(application.instructions()[1], application.instructions()[2]);

    let document = projected(&h.service, "app-1", |d| {
        d.status == ApplicationStatus::GovernanceReviewPhase && d.application_instructions.len() == 3
    })
    .await;
    assert_eq!(document.application_instructions, application.instructions());

    h.service.rebuild_read_model("app-1").await.unwrap();
    let rebuilt = h.service.details().get_by_id("app-1").await.unwrap().unwrap();
    assert_eq!(rebuilt.application_instructions, application.instructions());
}

#[tokio::test]
async fn test_unpublished_events_are_recovered_from_the_store() {
    let h = harness().await;
    h.bus.fail_next_publishes(100);
    h.service.execute(create("app-q", 7)).await.unwrap();
    assert!(h.bus.published(&h.config.events_topic).await.is_empty());

    h.bus.fail_next_publishes(0);
    h.service.execute(kyc_approved("app-q")).await.unwrap();

    let details = projected(&h.service, "app-q", |d| d.status == ApplicationStatus::GovernanceReviewPhase).await;
    assert_eq!(details.number, 7);
    assert_eq!(details.name, "Ada");
    assert_eq!(details.github, "adastores");
    assert!(details.pull_request.is_some());
}

#[tokio::test]
async fn test_queries_read_the_projection() {
    let h = harness().await;
    for (id, number) in [("app-1", 1), ("app-2", 2), ("app-3", 3)] {
        h.service.execute(create(id, number)).await.unwrap();
    }
    h.service.execute(kyc_approved("app-2")).await.unwrap();
    projected(&h.service, "app-2", |d| d.status == ApplicationStatus::GovernanceReviewPhase).await;
    projected(&h.service, "app-3", |_| true).await;

    let one = h
        .service
        .ask(GetApplicationById {
            application_id: "app-2".to_string(),
        })
        .await
        .unwrap();
    assert_eq!(one.number, 2);

    let kyc = h
        .service
        .ask(GetApplications {
            filter: ApplicationFilter {
                statuses: vec![ApplicationStatus::KycPhase],
                search: None,
            },
            page: 1,
            limit: 1,
        })
        .await
        .unwrap();
    assert_eq!(kyc.total, 2);
    assert_eq!(kyc.items.len(), 1);
    assert_eq!(kyc.items[0].id, "app-1");
}
