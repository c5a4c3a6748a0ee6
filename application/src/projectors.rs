//! Projectors keeping [`ApplicationDetails`](crate::read_model::ApplicationDetails) up to date.
//!
//! One [`ApplicationDetailsProjector`] is registered per event type. Each
//! writes the post-event values of the fields its event touches, so applying
//! an event twice leaves the document unchanged.

use crate::collaborators::{BlockchainClient, with_timeout};
use crate::events::{ApplicationEvent, event_types};
use crate::read_model::{ApplicationDetailsRepository, ApplicationDetailsUpdate, MultisigDetails};
use crate::types::{
    AllocatorMethod, AllocatorMultisig, ApplicationInstruction, ApplicationStatus, MetaAllocatorTx,
    RkhPhase, current_instruction,
};
use filplus_core::event::RecordedEvent;
use filplus_core::projection::{EventHandler, Result};
use futures::future::BoxFuture;
use std::sync::Arc;
use std::time::Duration;

/// Projects one event type into the application-details read model.
pub struct ApplicationDetailsProjector {
    name: String,
    event_type: &'static str,
    details: Arc<dyn ApplicationDetailsRepository>,
    blockchain: Arc<dyn BlockchainClient>,
    lookup_timeout: Duration,
}

impl ApplicationDetailsProjector {
    /// Projector for `event_type`.
    #[must_use]
    pub fn new(
        event_type: &'static str,
        details: Arc<dyn ApplicationDetailsRepository>,
        blockchain: Arc<dyn BlockchainClient>,
        lookup_timeout: Duration,
    ) -> Self {
        Self {
            name: format!("application_details:{event_type}"),
            event_type,
            details,
            blockchain,
            lookup_timeout,
        }
    }

    /// One projector per application event type.
    #[must_use]
    pub fn all(
        details: &Arc<dyn ApplicationDetailsRepository>,
        blockchain: &Arc<dyn BlockchainClient>,
        lookup_timeout: Duration,
    ) -> Vec<Arc<dyn EventHandler>> {
        event_types::ALL
            .into_iter()
            .map(|event_type| {
                Arc::new(Self::new(
                    event_type,
                    Arc::clone(details),
                    Arc::clone(blockchain),
                    lookup_timeout,
                )) as Arc<dyn EventHandler>
            })
            .collect()
    }

    async fn project(&self, recorded: &RecordedEvent, event: ApplicationEvent) -> Result<ApplicationDetailsUpdate> {
        let mut update = ApplicationDetailsUpdate::new(recorded.stream_id.as_str(), recorded.occurred_at);
        match event {
            ApplicationEvent::ApplicationCreated {
                application_number,
                applicant,
                allocation,
                ..
            } => {
                update.number = Some(application_number);
                update.status = Some(ApplicationStatus::KycPhase);
                update.name = Some(applicant.name);
                update.organization = Some(applicant.organization_name);
                update.address = Some(applicant.address);
                update.github = Some(applicant.github_handle);
                update.other_github_handles = Some(applicant.other_github_handles);
                update.on_chain_address = Some(applicant.on_chain_address);
                update.allocation = Some(allocation);
            }
            ApplicationEvent::ApplicationEdited { applicant, allocation } => {
                update.name = Some(applicant.name);
                update.organization = Some(applicant.organization_name);
                update.address = Some(applicant.address);
                update.github = Some(applicant.github_handle);
                update.other_github_handles = Some(applicant.other_github_handles);
                update.on_chain_address = Some(applicant.on_chain_address);
                update.allocation = Some(allocation);
            }
            ApplicationEvent::AllocatorMultisigUpdated { multisig } => {
                let signers = self.current_signers(recorded, multisig).await;
                update.actor_id = Some(Some(signers.actor_id));
                update.multisig_address = Some(Some(signers.address));
                update.multisig = Some(Some(MultisigDetails {
                    threshold: signers.threshold,
                    signers: signers.signers,
                }));
            }
            ApplicationEvent::ApplicationPullRequestUpdated { pull_request } => {
                update.pull_request = Some(Some(pull_request));
            }
            ApplicationEvent::KycApproved => {
                update.status = Some(ApplicationStatus::GovernanceReviewPhase);
            }
            ApplicationEvent::KycRejected { .. } => {
                update.status = Some(ApplicationStatus::Rejected);
            }
            ApplicationEvent::KycRevoked { .. } => {
                update.status = Some(ApplicationStatus::KycPhase);
            }
            ApplicationEvent::GovernanceReviewApproved { instructions, .. } => {
                update.status = Some(match current_instruction(&instructions).map(|i| i.method) {
                    Some(AllocatorMethod::Meta) => ApplicationStatus::MetaApprovalPhase,
                    _ => ApplicationStatus::RkhApprovalPhase,
                });
                set_instructions(&mut update, instructions);
            }
            ApplicationEvent::GovernanceReviewRejected { instructions, .. } => {
                update.status = Some(ApplicationStatus::Rejected);
                set_instructions(&mut update, instructions);
            }
            ApplicationEvent::RkhApprovalStarted { approval_threshold } => {
                update.rkh_phase = Some(Some(RkhPhase {
                    approvals: Vec::new(),
                    approval_threshold,
                    approval_message_id: None,
                }));
            }
            ApplicationEvent::RkhApprovalsUpdated {
                message_id,
                approvals,
                approval_threshold,
            } => {
                update.rkh_phase = Some(Some(RkhPhase {
                    approvals,
                    approval_threshold,
                    approval_message_id: Some(message_id),
                }));
            }
            ApplicationEvent::RkhApprovalCompleted { instructions } => {
                update.status = Some(ApplicationStatus::Approved);
                update.rkh_phase = Some(None);
                set_instructions(&mut update, instructions);
            }
            ApplicationEvent::MetaAllocatorApprovalStarted => {
                update.status = Some(ApplicationStatus::MetaApprovalPhase);
            }
            ApplicationEvent::MetaAllocatorApprovalCompleted {
                block_number,
                tx_hash,
                instructions,
            } => {
                update.status = Some(ApplicationStatus::Approved);
                update.meta_allocator = Some(Some(MetaAllocatorTx { block_number, tx_hash }));
                set_instructions(&mut update, instructions);
            }
            ApplicationEvent::DatacapAllocationUpdated { instructions, .. } => {
                update.status = Some(ApplicationStatus::DcAllocated);
                set_instructions(&mut update, instructions);
            }
            ApplicationEvent::DatacapRefreshRequested { instructions, .. } => {
                update.status = Some(ApplicationStatus::GovernanceReviewPhase);
                update.rkh_phase = Some(None);
                set_instructions(&mut update, instructions);
            }
        }
        Ok(update)
    }

    /// Signers as currently on chain, or as recorded when the lookup fails.
    async fn current_signers(&self, recorded: &RecordedEvent, mut multisig: AllocatorMultisig) -> AllocatorMultisig {
        let lookup = with_timeout(
            "get_multisig_info",
            self.lookup_timeout,
            self.blockchain.get_multisig_info(&multisig.address),
        )
        .await;
        match lookup {
            Ok(info) => {
                multisig.signers = info.signers;
                multisig.threshold = info.approval_threshold;
            }
            Err(error) => {
                tracing::warn!(
                    application_id = %recorded.stream_id,
                    sequence = recorded.sequence.value(),
                    error = %error,
                    "multisig lookup failed, projecting recorded signers"
                );
            }
        }
        multisig
    }
}

/// Instructions plus the datacap amount they imply.
fn set_instructions(update: &mut ApplicationDetailsUpdate, instructions: Vec<ApplicationInstruction>) {
    update.datacap = Some(current_instruction(&instructions).map(|i| i.datacap_amount));
    update.application_instructions = Some(instructions);
}

impl EventHandler for ApplicationDetailsProjector {
    fn name(&self) -> &str {
        &self.name
    }

    fn event_type(&self) -> &str {
        self.event_type
    }

    fn handle<'a>(&'a self, event: &'a RecordedEvent) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let decoded: ApplicationEvent = event.decode()?;
            let update = self.project(event, decoded).await?;
            self.details.upsert(update).await?;
            tracing::debug!(
                application_id = %event.stream_id,
                event_type = %event.event_type,
                sequence = event.sequence.value(),
                "projected event"
            );
            Ok(())
        })
    }
}

impl std::fmt::Debug for ApplicationDetailsProjector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApplicationDetailsProjector")
            .field("name", &self.name)
            .field("lookup_timeout", &self.lookup_timeout)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::mocks::MockBlockchainClient;
    use crate::read_model::InMemoryApplicationDetailsRepository;
    use crate::types::{AllocationRequest, ApplicantInfo};
    use chrono::{DateTime, Utc};
    use filplus_core::event::SerializedEvent;
    use filplus_core::projection::ProjectionError;
    use filplus_core::stream::{StreamId, Version};

    fn at(seconds: i64) -> DateTime<Utc> {
        DateTime::<Utc>::from_timestamp(1_735_689_600 + seconds, 0).unwrap()
    }

    fn recorded(sequence: u64, event: &ApplicationEvent) -> RecordedEvent {
        RecordedEvent::from_serialized(
            StreamId::new("app-1"),
            Version::new(sequence),
            SerializedEvent::from_event(event, None, at(i64::try_from(sequence).unwrap())).unwrap(),
        )
    }

    struct Fixture {
        details: Arc<InMemoryApplicationDetailsRepository>,
        blockchain: Arc<MockBlockchainClient>,
        projectors: Vec<Arc<dyn EventHandler>>,
    }

    impl Fixture {
        fn new() -> Self {
            let details = Arc::new(InMemoryApplicationDetailsRepository::new());
            let blockchain = Arc::new(MockBlockchainClient::new());
            let repo: Arc<dyn ApplicationDetailsRepository> = details.clone();
            let chain: Arc<dyn BlockchainClient> = blockchain.clone();
            let projectors = ApplicationDetailsProjector::all(&repo, &chain, Duration::from_millis(50));
            Self {
                details,
                blockchain,
                projectors,
            }
        }

        async fn project(&self, event: &RecordedEvent) {
            for projector in self.projectors.iter().filter(|p| p.event_type() == event.event_type) {
                projector.handle(event).await.unwrap();
            }
        }
    }

    fn created() -> ApplicationEvent {
        ApplicationEvent::ApplicationCreated {
            application_id: "app-1".into(),
            application_number: 3,
            applicant: ApplicantInfo {
                name: "Alice".into(),
                ..ApplicantInfo::default()
            },
            allocation: AllocationRequest::default(),
        }
    }

    #[test]
    fn one_projector_per_event_type() {
        let fixture = Fixture::new();
        assert_eq!(fixture.projectors.len(), event_types::ALL.len());
    }

    #[tokio::test]
    async fn governance_approval_sets_status_and_datacap() {
        let fixture = Fixture::new();
        fixture.project(&recorded(1, &created())).await;
        fixture
            .project(&recorded(
                2,
                &ApplicationEvent::GovernanceReviewApproved {
                    reviewer: "f1gov".into(),
                    instructions: vec![ApplicationInstruction::pending(AllocatorMethod::Rkh, 100, at(0))],
                },
            ))
            .await;

        let document = fixture.details.get_by_id("app-1").await.unwrap().unwrap();
        assert_eq!(document.status, ApplicationStatus::RkhApprovalPhase);
        assert_eq!(document.datacap, Some(100));
        assert_eq!(document.number, 3);
        assert_eq!(document.updated_at, at(2));
    }

    #[tokio::test]
    async fn refresh_writes_the_recorded_instruction_list() {
        let fixture = Fixture::new();
        fixture.project(&recorded(1, &created())).await;
        let tranche = ApplicationInstruction::pending(AllocatorMethod::Meta, 50, at(2));
        let refresh = |sequence, instructions| {
            recorded(
                sequence,
                &ApplicationEvent::DatacapRefreshRequested {
                    method: AllocatorMethod::Meta,
                    amount: 50,
                    requested_at: at(2),
                    instructions,
                },
            )
        };

        let first = refresh(2, vec![tranche.clone()]);
        fixture.project(&first).await;
        let once = fixture.details.get_by_id("app-1").await.unwrap();
        fixture.project(&first).await;
        assert_eq!(fixture.details.get_by_id("app-1").await.unwrap(), once);

        fixture
            .project(&refresh(3, vec![tranche.clone(), tranche.clone()]))
            .await;
        let document = fixture.details.get_by_id("app-1").await.unwrap().unwrap();
        assert_eq!(document.application_instructions, vec![tranche.clone(), tranche]);
        assert_eq!(document.status, ApplicationStatus::GovernanceReviewPhase);
    }

    #[tokio::test]
    async fn multisig_projection_prefers_chain_and_falls_back() {
        let fixture = Fixture::new();
        let event = recorded(
            1,
            &ApplicationEvent::AllocatorMultisigUpdated {
                multisig: AllocatorMultisig {
                    actor_id: "f01000".into(),
                    address: "f2ms".into(),
                    threshold: 1,
                    signers: vec!["f1old".into()],
                },
            },
        );

        fixture.project(&event).await;
        let fallback = fixture.details.get_by_id("app-1").await.unwrap().unwrap();
        assert_eq!(fallback.multisig.map(|m| m.signers), Some(vec!["f1old".to_owned()]));

        fixture.blockchain.add_multisig("f2ms", "f01000", &["f1new", "f1other"], 2);
        fixture.project(&event).await;
        let fresh = fixture.details.get_by_id("app-1").await.unwrap().unwrap();
        assert_eq!(
            fresh.multisig,
            Some(MultisigDetails {
                threshold: 2,
                signers: vec!["f1new".into(), "f1other".into()],
            })
        );
        assert_eq!(fresh.actor_id.as_deref(), Some("f01000"));
    }

    #[tokio::test]
    async fn undecodable_payload_is_an_error() {
        let fixture = Fixture::new();
        let broken = RecordedEvent::from_serialized(
            StreamId::new("app-1"),
            Version::new(1),
            SerializedEvent::new(event_types::KYC_APPROVED.into(), vec![0xFF; 3], None, at(0)),
        );
        let projector = fixture
            .projectors
            .iter()
            .find(|p| p.event_type() == event_types::KYC_APPROVED)
            .unwrap();
        assert!(matches!(
            projector.handle(&broken).await,
            Err(ProjectionError::Serialization(_))
        ));
    }
}
