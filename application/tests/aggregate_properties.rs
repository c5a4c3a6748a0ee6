//! Property tests for the application aggregate.

#![allow(clippy::unwrap_used)] // Tests can unwrap
#![allow(clippy::expect_used)] // Tests can expect

use chrono::{DateTime, Duration, Utc};
use filplus_application::aggregate::{Application, KycOutcome, ReviewDecision};
use filplus_application::events::ApplicationEvent;
use filplus_application::types::{
    AllocationRequest, AllocatorMethod, ApplicantInfo, ApplicationInstruction, ApplicationStatus,
};
use filplus_core::stream::Version;
use proptest::prelude::*;

#[derive(Clone, Debug)]
enum Op {
    Create,
    KycApprove,
    KycReject,
    RevokeKyc,
    Review { approve: bool, method: AllocatorMethod, amount: u64 },
    StartRkh(u32),
    RkhApprovals(Vec<String>),
    CompleteRkh,
    StartMeta,
    CompleteMeta(u64),
    Allocate(u64),
    Refresh { method: AllocatorMethod, amount: u64 },
}

fn method() -> impl Strategy<Value = AllocatorMethod> {
    prop_oneof![Just(AllocatorMethod::Rkh), Just(AllocatorMethod::Meta)]
}

fn intake_op() -> impl Strategy<Value = Op> {
    prop_oneof![
        Just(Op::Create),
        Just(Op::KycApprove),
        Just(Op::KycReject),
        Just(Op::RevokeKyc),
        (any::<bool>(), method(), 1_u64..500).prop_map(|(approve, method, amount)| Op::Review {
            approve,
            method,
            amount
        }),
    ]
}

fn approval_op() -> impl Strategy<Value = Op> {
    prop_oneof![
        (0_u32..4).prop_map(Op::StartRkh),
        prop::collection::vec(prop_oneof![Just("f1a".to_string()), Just("f1b".to_string())], 0..3)
            .prop_map(Op::RkhApprovals),
        Just(Op::CompleteRkh),
        Just(Op::StartMeta),
        (0_u64..100).prop_map(Op::CompleteMeta),
        (0_u64..500).prop_map(Op::Allocate),
        (method(), 0_u64..500).prop_map(|(method, amount)| Op::Refresh { method, amount }),
    ]
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![intake_op(), approval_op()]
}

fn at(step: usize) -> DateTime<Utc> {
    DateTime::<Utc>::from_timestamp(1_735_689_600, 0).unwrap() + Duration::seconds(i64::try_from(step).unwrap())
}

/// Apply `op`; refused operations leave the aggregate untouched.
fn run(app: &mut Application, op: &Op, when: DateTime<Utc>) {
    let _ = match op.clone() {
        Op::Create => app.create(
            1,
            ApplicantInfo {
                name: "Ada".to_string(),
                ..ApplicantInfo::default()
            },
            AllocationRequest::default(),
            when,
        ),
        Op::KycApprove => app.record_kyc(KycOutcome::Approved, when),
        Op::KycReject => app.record_kyc(KycOutcome::Rejected { reason: None }, when),
        Op::RevokeKyc => app.revoke_kyc(None, when),
        Op::Review { approve, method, amount } => {
            let decision = if approve {
                ReviewDecision::Approved
            } else {
                ReviewDecision::Rejected { reason: None }
            };
            app.record_governance_review(
                "f1gov",
                decision,
                vec![ApplicationInstruction::pending(method, amount, when)],
                when,
            )
        }
        Op::StartRkh(threshold) => app.start_rkh_approval(threshold, when),
        Op::RkhApprovals(approvals) => app.update_rkh_approvals(1, approvals, 2, when),
        Op::CompleteRkh => app.complete_rkh_approval(when),
        Op::StartMeta => app.start_meta_allocator_approval(when),
        Op::CompleteMeta(block) => app.complete_meta_allocator_approval(block, "0xfeed", when),
        Op::Allocate(amount) => app.record_datacap_allocation(amount, when),
        Op::Refresh { method, amount } => app.request_datacap_refresh(method, amount, when),
    };
}

fn history(ops: &[Op]) -> (Application, Vec<ApplicationEvent>) {
    let mut app = Application::new("app-1");
    for (step, op) in ops.iter().enumerate() {
        run(&mut app, op, at(step));
    }
    let events: Vec<ApplicationEvent> = app.take_uncommitted().into_iter().map(|p| p.event).collect();
    app.mark_committed(Version::new(events.len() as u64));
    (app, events)
}

proptest! {
    #[test]
    fn replay_rebuilds_the_same_state(ops in prop::collection::vec(op(), 0..40)) {
        let (live, events) = history(&ops);
        let replayed = Application::replay("app-1", &events);
        prop_assert_eq!(replayed, live);
    }

    #[test]
    fn approval_phases_are_entered_only_through_governance_approval(ops in prop::collection::vec(op(), 0..40)) {
        let (_, events) = history(&ops);
        let mut previous = ApplicationStatus::KycPhase;
        for (count, event) in events.iter().enumerate() {
            let status = Application::replay("app-1", &events[..=count]).status();
            let entered_approval = matches!(
                status,
                ApplicationStatus::RkhApprovalPhase | ApplicationStatus::MetaApprovalPhase
            ) && status != previous;
            if entered_approval {
                prop_assert!(
                    matches!(event, ApplicationEvent::GovernanceReviewApproved { .. }),
                    "{status} entered through {event:?}"
                );
            }
            previous = status;
        }
    }

    #[test]
    fn granted_datacap_is_never_zero(ops in prop::collection::vec(op(), 0..40)) {
        let (live, _) = history(&ops);
        prop_assert!(live.instructions().iter().all(|i| i.datacap_amount > 0));
    }
}
