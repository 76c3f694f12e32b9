//! Escrow and settlement integration tests: funding idempotency, retry
//! exhaustion, end-to-end payout, and restart recovery.

use std::collections::BTreeMap;
use std::sync::Arc;

use vmk_circuits::{CampaignRequirement, CircuitRegistry};
use vmk_core::{Amount, AttributeKind, CampaignId, LedgerHandle, OfferId, RejectionReason, Timestamp};
use vmk_escrow::{
    AttemptOutcome, DirEscrowStore, DirTaskStore, EscrowGateway, EscrowStatus, EscrowStore,
    LedgerConfirmation, LedgerRequestKind, MemoryEscrowStore, MemoryTaskStore, MockLedger,
    MockOutcome, RetryPolicy, SettlementTask, TaskStore,
};
use vmk_offer::oracle::{DecisionOracle, FixedDecisionOracle};
use vmk_offer::{
    FundingDirective, MemoryOfferStore, OfferPolicy, OfferState, OfferStateMachine, OfferStore,
    OfferSubmission, SettlementDirective,
};
use vmk_verifier::mock::{dummy_parameters, range_package, MockPairingBackend};
use vmk_verifier::ProofVerifier;

fn ts(s: &str) -> Timestamp {
    Timestamp::parse(s).unwrap()
}

fn age() -> AttributeKind {
    AttributeKind::new("age").unwrap()
}

fn build_machine(store: Arc<dyn OfferStore>) -> Arc<OfferStateMachine> {
    let mut verifier = ProofVerifier::new(
        CircuitRegistry::builtin(),
        Arc::new(MockPairingBackend::accepting()),
    );
    verifier.register_parameters(dummy_parameters("attr_range"));
    Arc::new(OfferStateMachine::new(
        store,
        Arc::new(verifier),
        OfferPolicy::default(),
    ))
}

/// Drive an offer to `Accepted` with a quoted price of 1,000,000 units.
async fn accept_offer(machine: &OfferStateMachine, id: &str) -> OfferId {
    let now = ts("2026-01-15T12:00:00Z");
    let mut requirements = BTreeMap::new();
    requirements.insert(age(), CampaignRequirement::NumericRange { min: 40, max: 60 });
    let mut proofs = BTreeMap::new();
    proofs.insert(age(), range_package(40, 60, true));
    let offer = machine
        .submit_offer(
            OfferSubmission {
                offer_id: OfferId::new(id).unwrap(),
                campaign_id: CampaignId::new(),
                amount: Amount::from_units(1_200_000),
                destination: "payout-wallet".to_string(),
                requirements,
                proofs,
            },
            now,
        )
        .await
        .unwrap();
    assert_eq!(offer.state, OfferState::Verified);
    let oracle = FixedDecisionOracle::accept_at(Amount::from_units(1_000_000));
    let context = machine.decision_context(&offer.offer_id).await.unwrap();
    let decision = oracle.decide(&context).unwrap();
    machine
        .record_decision(&offer.offer_id, decision, now)
        .await
        .unwrap();
    offer.offer_id
}

struct Harness {
    machine: Arc<OfferStateMachine>,
    ledger: Arc<MockLedger>,
    escrow: Arc<MemoryEscrowStore>,
    tasks: Arc<MemoryTaskStore>,
    gateway: EscrowGateway,
}

fn harness() -> Harness {
    let machine = build_machine(Arc::new(MemoryOfferStore::new()));
    let ledger = Arc::new(MockLedger::new());
    let escrow = Arc::new(MemoryEscrowStore::new());
    let tasks = Arc::new(MemoryTaskStore::new());
    let gateway = EscrowGateway::new(
        Arc::clone(&machine),
        Arc::clone(&ledger) as Arc<dyn vmk_escrow::LedgerClient>,
        Arc::clone(&escrow) as Arc<dyn EscrowStore>,
        Arc::clone(&tasks) as Arc<dyn TaskStore>,
        RetryPolicy::default(),
    );
    Harness {
        machine,
        ledger,
        escrow,
        tasks,
        gateway,
    }
}

#[tokio::test]
async fn fund_then_settle_end_to_end() {
    let h = harness();
    let offer_id = accept_offer(&h.machine, "c-1").await;
    let now = ts("2026-01-15T12:10:00Z");

    h.gateway.request_funding(&offer_id, now).await.unwrap();
    let offer = h.machine.offer(&offer_id).await.unwrap();
    assert_eq!(offer.state, OfferState::Funded);
    assert!(offer.funding_reference.is_some());

    let record = h.escrow.get(&offer_id).unwrap().unwrap();
    assert_eq!(record.status, EscrowStatus::Confirmed);
    assert_eq!(record.amount, Amount::from_units(1_000_000));

    // Fund request carried the quoted price, not the submitted amount.
    let requests = h.ledger.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].amount, Amount::from_units(1_000_000));
    assert_eq!(requests[0].destination, "payout-wallet");

    h.gateway.request_settlement(&offer_id, now).await.unwrap();
    let offer = h.machine.offer(&offer_id).await.unwrap();
    assert_eq!(offer.state, OfferState::Settled);
    assert!(offer.settlement_reference.is_some());

    // Both tasks are gone once confirmed.
    assert!(h.tasks.all().unwrap().is_empty());
}

#[tokio::test]
async fn duplicate_funding_request_submits_once() {
    let h = harness();
    let offer_id = accept_offer(&h.machine, "dup-1").await;
    let now = ts("2026-01-15T12:10:00Z");

    h.gateway.request_funding(&offer_id, now).await.unwrap();
    h.gateway.request_funding(&offer_id, now).await.unwrap();

    assert_eq!(h.ledger.request_count(&offer_id, LedgerRequestKind::Fund), 1);
    assert_eq!(h.escrow.list().unwrap().len(), 1);
}

#[tokio::test]
async fn concurrent_funding_requests_submit_once() {
    let h = harness();
    let gateway = Arc::new(h.gateway);
    let offer_id = accept_offer(&h.machine, "race-1").await;
    let now = ts("2026-01-15T12:10:00Z");

    let a = {
        let gateway = Arc::clone(&gateway);
        let offer_id = offer_id.clone();
        tokio::spawn(async move { gateway.request_funding(&offer_id, now).await })
    };
    let b = {
        let gateway = Arc::clone(&gateway);
        let offer_id = offer_id.clone();
        tokio::spawn(async move { gateway.request_funding(&offer_id, now).await })
    };
    a.await.unwrap().unwrap();
    b.await.unwrap().unwrap();

    assert_eq!(h.ledger.request_count(&offer_id, LedgerRequestKind::Fund), 1);
    assert_eq!(h.escrow.list().unwrap().len(), 1);
    assert_eq!(
        h.machine.offer(&offer_id).await.unwrap().state,
        OfferState::Funded
    );
}

#[tokio::test]
async fn funding_request_recovers_after_crash_before_task_write() {
    let h = harness();
    let offer_id = accept_offer(&h.machine, "crash-1").await;
    let now = ts("2026-01-15T12:10:00Z");

    // Crash simulation: the machine durably records FundingRequested,
    // then the process dies before the gateway writes record and task.
    let directive = h.machine.begin_funding(&offer_id, now).await.unwrap();
    assert!(matches!(directive, FundingDirective::Initiate(_)));
    assert!(h.tasks.all().unwrap().is_empty());
    assert_eq!(h.ledger.request_count(&offer_id, LedgerRequestKind::Fund), 0);

    // The retried request sees the taskless in-flight offer and rebuilds
    // the escrow record and fund task instead of treating it as done.
    h.gateway.request_funding(&offer_id, now).await.unwrap();

    assert_eq!(h.ledger.request_count(&offer_id, LedgerRequestKind::Fund), 1);
    let record = h.escrow.get(&offer_id).unwrap().unwrap();
    assert_eq!(record.status, EscrowStatus::Confirmed);
    assert_eq!(record.amount, Amount::from_units(1_000_000));
    assert_eq!(
        h.machine.offer(&offer_id).await.unwrap().state,
        OfferState::Funded
    );
}

#[tokio::test]
async fn settlement_request_recovers_after_crash_before_task_write() {
    let h = harness();
    let offer_id = accept_offer(&h.machine, "crash-2").await;
    let now = ts("2026-01-15T12:10:00Z");
    h.gateway.request_funding(&offer_id, now).await.unwrap();

    let directive = h.machine.begin_settlement(&offer_id, now).await.unwrap();
    assert!(matches!(directive, SettlementDirective::Initiate(_)));
    assert!(h.tasks.all().unwrap().is_empty());

    h.gateway.request_settlement(&offer_id, now).await.unwrap();

    assert_eq!(
        h.ledger.request_count(&offer_id, LedgerRequestKind::Settle),
        1
    );
    assert_eq!(
        h.machine.offer(&offer_id).await.unwrap().state,
        OfferState::Settled
    );
}

#[tokio::test]
async fn duplicate_request_leaves_pending_retry_alone() {
    let h = harness();
    let offer_id = accept_offer(&h.machine, "pend-1").await;
    let now = ts("2026-01-15T12:10:00Z");
    h.ledger.script(
        offer_id.clone(),
        LedgerRequestKind::Fund,
        [MockOutcome::Timeout],
    );
    h.gateway.request_funding(&offer_id, now).await.unwrap();

    // A rescheduled task exists; a duplicate request must not reset or
    // resubmit it.
    h.gateway.request_funding(&offer_id, now).await.unwrap();

    assert_eq!(h.ledger.request_count(&offer_id, LedgerRequestKind::Fund), 1);
    let task = h
        .tasks
        .get(&offer_id, LedgerRequestKind::Fund)
        .unwrap()
        .unwrap();
    assert_eq!(task.attempt_count, 1);
}

#[tokio::test]
async fn timeout_reschedules_with_backoff() {
    let h = harness();
    let offer_id = accept_offer(&h.machine, "to-1").await;
    let now = ts("2026-01-15T12:10:00Z");
    h.ledger.script(
        offer_id.clone(),
        LedgerRequestKind::Fund,
        [MockOutcome::Timeout],
    );

    h.gateway.request_funding(&offer_id, now).await.unwrap();

    // Offer is in flight, not failed: a timeout means outcome unknown.
    let offer = h.machine.offer(&offer_id).await.unwrap();
    assert_eq!(offer.state, OfferState::FundingRequested);
    let task = h
        .tasks
        .get(&offer_id, LedgerRequestKind::Fund)
        .unwrap()
        .unwrap();
    assert_eq!(task.attempt_count, 1);
    assert_eq!(task.next_retry_at, ts("2026-01-15T12:10:05Z"));
    assert_eq!(task.last_error.as_deref(), Some("ledger timeout"));

    // Before the retry time nothing is due; at it, the retry confirms.
    assert!(h.gateway.run_due(ts("2026-01-15T12:10:04Z")).await.unwrap().is_empty());
    let outcomes = h.gateway.run_due(ts("2026-01-15T12:10:05Z")).await.unwrap();
    assert_eq!(outcomes, vec![(offer_id.clone(), AttemptOutcome::Confirmed)]);
    assert_eq!(
        h.machine.offer(&offer_id).await.unwrap().state,
        OfferState::Funded
    );
}

#[tokio::test]
async fn retry_exhaustion_fails_funding_permanently() {
    let h = harness();
    let offer_id = accept_offer(&h.machine, "d-1").await;
    let now = ts("2026-01-15T12:10:00Z");
    h.ledger.script(
        offer_id.clone(),
        LedgerRequestKind::Fund,
        [MockOutcome::Timeout, MockOutcome::Timeout, MockOutcome::Timeout],
    );

    h.gateway.request_funding(&offer_id, now).await.unwrap();
    h.gateway.run_due(ts("2026-01-15T12:10:05Z")).await.unwrap();
    let outcomes = h.gateway.run_due(ts("2026-01-15T12:10:15Z")).await.unwrap();
    assert_eq!(outcomes, vec![(offer_id.clone(), AttemptOutcome::Exhausted)]);

    // Exactly max_attempts submissions reached the ledger.
    assert_eq!(h.ledger.request_count(&offer_id, LedgerRequestKind::Fund), 3);

    let offer = h.machine.offer(&offer_id).await.unwrap();
    assert_eq!(offer.state, OfferState::FundingFailed);
    // Exhaustion surfaces as RetryExhausted, never the transient timeout.
    assert_eq!(
        offer.failure.as_ref().unwrap().reason,
        Some(RejectionReason::RetryExhausted)
    );
    assert_eq!(
        h.escrow.get(&offer_id).unwrap().unwrap().status,
        EscrowStatus::Failed
    );
    assert!(h.tasks.all().unwrap().is_empty());
}

#[tokio::test]
async fn ledger_rejection_fails_funding_immediately() {
    let h = harness();
    let offer_id = accept_offer(&h.machine, "rej-1").await;
    let now = ts("2026-01-15T12:10:00Z");
    h.ledger.script(
        offer_id.clone(),
        LedgerRequestKind::Fund,
        [MockOutcome::Reject("campaign budget frozen".to_string())],
    );

    h.gateway.request_funding(&offer_id, now).await.unwrap();

    let offer = h.machine.offer(&offer_id).await.unwrap();
    assert_eq!(offer.state, OfferState::FundingFailed);
    let failure = offer.failure.as_ref().unwrap();
    assert_eq!(failure.reason, Some(RejectionReason::FundingRejected));
    assert_eq!(failure.detail, "campaign budget frozen");
    // No retry for a permanent rejection.
    assert_eq!(h.ledger.request_count(&offer_id, LedgerRequestKind::Fund), 1);
    assert!(h.tasks.all().unwrap().is_empty());
}

#[tokio::test]
async fn push_confirmation_is_idempotent() {
    let h = harness();
    let offer_id = accept_offer(&h.machine, "push-1").await;
    let now = ts("2026-01-15T12:10:00Z");
    h.ledger.script(
        offer_id.clone(),
        LedgerRequestKind::Fund,
        [MockOutcome::Timeout],
    );
    h.gateway.request_funding(&offer_id, now).await.unwrap();

    // The timed-out transaction actually landed; the ledger pushes the
    // confirmation before any retry runs.
    let confirmation = LedgerConfirmation {
        offer_id: offer_id.clone(),
        kind: LedgerRequestKind::Fund,
        handle: LedgerHandle("pushed-tx".to_string()),
    };
    assert!(h
        .gateway
        .apply_confirmation(confirmation.clone(), now)
        .await
        .unwrap());
    assert!(!h.gateway.apply_confirmation(confirmation, now).await.unwrap());

    let offer = h.machine.offer(&offer_id).await.unwrap();
    assert_eq!(offer.state, OfferState::Funded);
    assert_eq!(
        offer.funding_reference,
        Some(LedgerHandle("pushed-tx".into()))
    );
    // The pending retry task was cancelled by the confirmation.
    assert!(h.tasks.all().unwrap().is_empty());
    // A later retry tick finds nothing to do.
    assert!(h.gateway.run_due(ts("2026-01-15T12:11:00Z")).await.unwrap().is_empty());
}

#[tokio::test]
async fn late_confirmation_corrects_expired_offer() {
    let h = harness();
    let now = ts("2026-01-15T12:00:00Z");
    let mut requirements = BTreeMap::new();
    requirements.insert(age(), CampaignRequirement::NumericRange { min: 40, max: 60 });
    let offer = h
        .machine
        .submit_offer(
            OfferSubmission {
                offer_id: OfferId::new("late-1").unwrap(),
                campaign_id: CampaignId::new(),
                amount: Amount::from_units(100),
                destination: "dest".to_string(),
                requirements,
                proofs: BTreeMap::new(),
            },
            now,
        )
        .await
        .unwrap();
    h.machine.expire_due(ts("2026-01-15T13:00:00Z")).await.unwrap();
    assert_eq!(
        h.machine.offer(&offer.offer_id).await.unwrap().state,
        OfferState::Expired
    );

    let advanced = h
        .gateway
        .apply_confirmation(
            LedgerConfirmation {
                offer_id: offer.offer_id.clone(),
                kind: LedgerRequestKind::Fund,
                handle: LedgerHandle("late-tx".to_string()),
            },
            ts("2026-01-15T13:05:00Z"),
        )
        .await
        .unwrap();
    assert!(advanced);
    assert_eq!(
        h.machine.offer(&offer.offer_id).await.unwrap().state,
        OfferState::Funded
    );
}

#[tokio::test]
async fn restart_recovery_resumes_pending_task() {
    let offer_dir = tempfile::tempdir().unwrap();
    let escrow_dir = tempfile::tempdir().unwrap();
    let task_dir = tempfile::tempdir().unwrap();
    let now = ts("2026-01-15T12:10:00Z");

    let offer_id = {
        let machine = build_machine(Arc::new(
            vmk_offer::DirOfferStore::open(offer_dir.path()).unwrap(),
        ));
        let ledger = Arc::new(MockLedger::new());
        let gateway = EscrowGateway::new(
            Arc::clone(&machine),
            Arc::clone(&ledger) as Arc<dyn vmk_escrow::LedgerClient>,
            Arc::new(DirEscrowStore::open(escrow_dir.path()).unwrap()),
            Arc::new(DirTaskStore::open(task_dir.path()).unwrap()),
            RetryPolicy::default(),
        );
        let offer_id = accept_offer(&machine, "restart-1").await;
        ledger.script(
            offer_id.clone(),
            LedgerRequestKind::Fund,
            [MockOutcome::Timeout],
        );
        gateway.request_funding(&offer_id, now).await.unwrap();
        offer_id
        // Process "dies" here with a rescheduled fund task on disk.
    };

    // New process: reopen the same directories and tick the queue.
    let machine = build_machine(Arc::new(
        vmk_offer::DirOfferStore::open(offer_dir.path()).unwrap(),
    ));
    let escrow = Arc::new(DirEscrowStore::open(escrow_dir.path()).unwrap());
    let ledger = Arc::new(MockLedger::new());
    let gateway = EscrowGateway::new(
        Arc::clone(&machine),
        Arc::clone(&ledger) as Arc<dyn vmk_escrow::LedgerClient>,
        Arc::clone(&escrow) as Arc<dyn EscrowStore>,
        Arc::new(DirTaskStore::open(task_dir.path()).unwrap()),
        RetryPolicy::default(),
    );

    assert_eq!(
        machine.offer(&offer_id).await.unwrap().state,
        OfferState::FundingRequested
    );
    let outcomes = gateway.run_due(ts("2026-01-15T12:10:05Z")).await.unwrap();
    assert_eq!(outcomes, vec![(offer_id.clone(), AttemptOutcome::Confirmed)]);
    assert_eq!(
        machine.offer(&offer_id).await.unwrap().state,
        OfferState::Funded
    );
    assert_eq!(
        escrow.get(&offer_id).unwrap().unwrap().status,
        EscrowStatus::Confirmed
    );
}

#[tokio::test]
async fn sweep_continues_past_a_failing_task() {
    let h = harness();
    let offer_id = accept_offer(&h.machine, "sweep-1").await;
    let now = ts("2026-01-15T12:10:00Z");
    h.ledger.script(
        offer_id.clone(),
        LedgerRequestKind::Fund,
        [MockOutcome::Timeout],
    );
    h.gateway.request_funding(&offer_id, now).await.unwrap();

    // A stray task with no backing offer: the ledger confirms it but the
    // confirmation cannot be applied, so its attempt errors.
    let ghost = SettlementTask::new(
        OfferId::new("ghost-1").unwrap(),
        LedgerRequestKind::Fund,
        Amount::from_units(1),
        "nowhere".to_string(),
        now,
    );
    h.tasks.upsert(&ghost).unwrap();

    // The sweep skips the failing task and still drives the real one.
    let outcomes = h.gateway.run_due(ts("2026-01-15T12:10:05Z")).await.unwrap();
    assert_eq!(outcomes, vec![(offer_id.clone(), AttemptOutcome::Confirmed)]);
    assert_eq!(
        h.machine.offer(&offer_id).await.unwrap().state,
        OfferState::Funded
    );
    // The stray task stays in the store for a later tick.
    let remaining = h.tasks.all().unwrap();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].offer_id, ghost.offer_id);
}
