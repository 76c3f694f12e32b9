//! # Escrow Gateway
//!
//! `EscrowGateway` drives accepted offers through funding and payout:
//! it turns the state machine's single-shot funding/settlement
//! directives into durable escrow records and retry tasks, submits them
//! to the ledger, and feeds the outcomes back into the offer.
//!
//! ## Security Invariant
//!
//! Double-funding is prevented by two independent guards in sequence:
//! the machine's `FundingRequested` transition fires at most once per
//! offer, and [`EscrowStore::create_if_absent`] refuses a second record
//! even if the first guard is somehow bypassed. A crash between the
//! durable transition and the task write leaves recovery re-entering
//! here: the requested-but-taskless offer is detected and its record
//! and task are rebuilt from the offer itself.
//!
//! A ledger timeout never terminates an offer by itself — only the
//! exhaustion of the bounded retry budget does, and then as
//! `RetryExhausted`, never as the transient `FundingTimeout`.

use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, info, warn};

use vmk_core::{Amount, LedgerHandle, OfferId, RejectionReason, Timestamp, TimestampError};
use vmk_offer::{
    FundingDirective, MachineError, OfferState, OfferStateMachine, SettlementDirective,
};

use crate::ledger::{LedgerClient, LedgerError, LedgerRequest, LedgerRequestKind};
use crate::queue::{RetryPolicy, SettlementTask, TaskStore, TaskStoreError};
use crate::record::{EscrowRecord, EscrowStatus, EscrowStore, EscrowStoreError};

/// Errors from gateway operations.
#[derive(Error, Debug)]
pub enum GatewayError {
    /// The offer state machine refused the operation.
    #[error(transparent)]
    Machine(#[from] MachineError),

    /// Escrow-record storage failed.
    #[error(transparent)]
    Escrow(#[from] EscrowStoreError),

    /// Task storage failed.
    #[error(transparent)]
    Tasks(#[from] TaskStoreError),

    /// Retry scheduling overflowed the time range.
    #[error(transparent)]
    Time(#[from] TimestampError),
}

/// Result of one ledger submission attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptOutcome {
    /// The ledger confirmed; the offer advanced and the task is done.
    Confirmed,
    /// The ledger permanently rejected; the offer failed and the task
    /// is done.
    Rejected,
    /// The ledger timed out; the task was rescheduled with backoff.
    Rescheduled,
    /// The retry budget is spent; the offer failed with
    /// `RetryExhausted` and the task is done.
    Exhausted,
}

/// A push-style confirmation from the ledger (callback path), as
/// opposed to the receipt returned by a polled submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerConfirmation {
    /// The offer the confirmation belongs to.
    pub offer_id: OfferId,
    /// Which transaction was confirmed.
    pub kind: LedgerRequestKind,
    /// Handle of the confirmed transaction.
    pub handle: LedgerHandle,
}

/// The escrow and settlement driver.
pub struct EscrowGateway {
    machine: Arc<OfferStateMachine>,
    ledger: Arc<dyn LedgerClient>,
    escrow: Arc<dyn EscrowStore>,
    tasks: Arc<dyn TaskStore>,
    retry: RetryPolicy,
}

impl EscrowGateway {
    /// Create a gateway over the given machine, ledger and stores.
    pub fn new(
        machine: Arc<OfferStateMachine>,
        ledger: Arc<dyn LedgerClient>,
        escrow: Arc<dyn EscrowStore>,
        tasks: Arc<dyn TaskStore>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            machine,
            ledger,
            escrow,
            tasks,
            retry,
        }
    }

    /// Request escrow funding for an accepted offer.
    ///
    /// Idempotent: the first call transitions the offer, creates the
    /// escrow record and fund task, and attempts the submission; any
    /// later call (concurrent, duplicate, or post-restart) observes
    /// `AlreadyInFlight` and does nothing. Retries of a timed-out
    /// submission are driven by [`run_due`](Self::run_due), not by
    /// calling this again.
    pub async fn request_funding(&self, offer_id: &OfferId, now: Timestamp) -> Result<(), GatewayError> {
        match self.machine.begin_funding(offer_id, now).await? {
            FundingDirective::Initiate(order) => {
                self.launch(
                    order.offer_id,
                    LedgerRequestKind::Fund,
                    order.amount,
                    order.destination,
                    now,
                )
                .await?;
            }
            FundingDirective::AlreadyInFlight(OfferState::FundingRequested) => {
                self.recover_if_taskless(offer_id, LedgerRequestKind::Fund, now)
                    .await?;
            }
            FundingDirective::AlreadyInFlight(state) => {
                debug!(offer = %offer_id, %state, "funding already in flight");
            }
        }
        Ok(())
    }

    /// Request settlement for a funded offer. Same idempotency shape as
    /// [`request_funding`](Self::request_funding).
    pub async fn request_settlement(
        &self,
        offer_id: &OfferId,
        now: Timestamp,
    ) -> Result<(), GatewayError> {
        match self.machine.begin_settlement(offer_id, now).await? {
            SettlementDirective::Initiate(order) => {
                self.launch(
                    order.offer_id,
                    LedgerRequestKind::Settle,
                    order.amount,
                    order.destination,
                    now,
                )
                .await?;
            }
            SettlementDirective::AlreadyInFlight(OfferState::SettlementRequested) => {
                self.recover_if_taskless(offer_id, LedgerRequestKind::Settle, now)
                    .await?;
            }
            SettlementDirective::AlreadyInFlight(state) => {
                debug!(offer = %offer_id, %state, "settlement already in flight");
            }
        }
        Ok(())
    }

    /// Create the escrow record (for funding), persist the task, and
    /// make the first submission.
    async fn launch(
        &self,
        offer_id: OfferId,
        kind: LedgerRequestKind,
        amount: Amount,
        destination: String,
        now: Timestamp,
    ) -> Result<(), GatewayError> {
        if kind == LedgerRequestKind::Fund {
            let record = EscrowRecord::pending(offer_id.clone(), amount, now);
            if !self.escrow.create_if_absent(&record)? {
                debug!(offer = %offer_id, "escrow record already exists");
            }
        }
        let task = SettlementTask::new(offer_id, kind, amount, destination, now);
        // Persist before submitting so a crash mid-flight leaves a due
        // task for recovery to pick up.
        self.tasks.upsert(&task)?;
        self.attempt(task, now).await?;
        Ok(())
    }

    /// An offer stuck in `FundingRequested`/`SettlementRequested` with no
    /// pending task means a crash landed between the durable transition
    /// and the task write. Rebuild the record and task from the offer and
    /// resubmit; with a task present this is the ordinary in-flight no-op.
    async fn recover_if_taskless(
        &self,
        offer_id: &OfferId,
        kind: LedgerRequestKind,
        now: Timestamp,
    ) -> Result<(), GatewayError> {
        if self.tasks.get(offer_id, kind)?.is_some() {
            debug!(offer = %offer_id, %kind, "request already in flight");
            return Ok(());
        }
        let offer = self.machine.offer(offer_id).await?;
        warn!(offer = %offer_id, %kind, "requested offer has no pending task, rebuilding");
        let amount = offer.price_quoted.unwrap_or(offer.amount);
        self.launch(offer.offer_id, kind, amount, offer.destination, now)
            .await
    }

    /// Submit one task to the ledger and apply the outcome.
    pub async fn attempt(
        &self,
        mut task: SettlementTask,
        now: Timestamp,
    ) -> Result<AttemptOutcome, GatewayError> {
        task.attempt_count += 1;
        let request = LedgerRequest {
            offer_id: task.offer_id.clone(),
            kind: task.kind,
            amount: task.amount,
            destination: task.destination.clone(),
        };
        info!(
            offer = %task.offer_id,
            kind = %task.kind,
            attempt = task.attempt_count,
            "submitting ledger request"
        );
        match self.ledger.submit(&request).await {
            Ok(receipt) => {
                self.apply_receipt(&task, receipt.handle, now).await?;
                self.tasks.remove(&task.offer_id, task.kind)?;
                Ok(AttemptOutcome::Confirmed)
            }
            Err(LedgerError::Rejected(message)) => {
                warn!(offer = %task.offer_id, kind = %task.kind, %message, "ledger rejected");
                self.apply_permanent_failure(&task, RejectionReason::FundingRejected, &message, now)
                    .await?;
                self.tasks.remove(&task.offer_id, task.kind)?;
                Ok(AttemptOutcome::Rejected)
            }
            Err(LedgerError::Timeout) => {
                if task.is_exhausted(&self.retry) {
                    let detail = format!(
                        "no ledger confirmation after {} attempts",
                        task.attempt_count
                    );
                    warn!(offer = %task.offer_id, kind = %task.kind, "retry budget exhausted");
                    self.apply_permanent_failure(
                        &task,
                        RejectionReason::RetryExhausted,
                        &detail,
                        now,
                    )
                    .await?;
                    self.tasks.remove(&task.offer_id, task.kind)?;
                    Ok(AttemptOutcome::Exhausted)
                } else {
                    task.reschedule(&self.retry, "ledger timeout", now)?;
                    debug!(
                        offer = %task.offer_id,
                        kind = %task.kind,
                        next_retry = %task.next_retry_at,
                        "ledger timed out, rescheduled"
                    );
                    self.tasks.upsert(&task)?;
                    Ok(AttemptOutcome::Rescheduled)
                }
            }
        }
    }

    /// Drive every task whose retry time has arrived.
    ///
    /// This is the scheduler tick; restart recovery is nothing more
    /// than reopening the durable stores and calling this. A task whose
    /// attempt errors is logged and skipped; its entry stays in the
    /// store for a later tick.
    pub async fn run_due(
        &self,
        now: Timestamp,
    ) -> Result<Vec<(OfferId, AttemptOutcome)>, GatewayError> {
        let mut outcomes = Vec::new();
        for task in self.tasks.due(now)? {
            let offer_id = task.offer_id.clone();
            let kind = task.kind;
            // One failing task must not starve the rest of the sweep.
            match self.attempt(task, now).await {
                Ok(outcome) => outcomes.push((offer_id, outcome)),
                Err(e) => {
                    warn!(offer = %offer_id, %kind, error = %e, "task attempt failed, skipping");
                }
            }
        }
        Ok(outcomes)
    }

    /// Apply a push-style ledger confirmation.
    ///
    /// Idempotent; also handles the late-confirmation case where the
    /// offer expired while the funding transaction was in flight.
    /// Returns `true` if the offer advanced.
    pub async fn apply_confirmation(
        &self,
        confirmation: LedgerConfirmation,
        now: Timestamp,
    ) -> Result<bool, GatewayError> {
        let advanced = match confirmation.kind {
            LedgerRequestKind::Fund => {
                self.confirm_escrow_record(&confirmation.offer_id, &confirmation.handle, now)?;
                self.machine
                    .on_funding_confirmed(&confirmation.offer_id, confirmation.handle, now)
                    .await?
            }
            LedgerRequestKind::Settle => {
                self.machine
                    .on_settlement_confirmed(&confirmation.offer_id, confirmation.handle, now)
                    .await?
            }
        };
        self.tasks.remove(&confirmation.offer_id, confirmation.kind)?;
        Ok(advanced)
    }

    async fn apply_receipt(
        &self,
        task: &SettlementTask,
        handle: LedgerHandle,
        now: Timestamp,
    ) -> Result<(), GatewayError> {
        match task.kind {
            LedgerRequestKind::Fund => {
                self.confirm_escrow_record(&task.offer_id, &handle, now)?;
                self.machine
                    .on_funding_confirmed(&task.offer_id, handle, now)
                    .await?;
            }
            LedgerRequestKind::Settle => {
                self.machine
                    .on_settlement_confirmed(&task.offer_id, handle, now)
                    .await?;
            }
        }
        Ok(())
    }

    async fn apply_permanent_failure(
        &self,
        task: &SettlementTask,
        reason: RejectionReason,
        detail: &str,
        now: Timestamp,
    ) -> Result<(), GatewayError> {
        match task.kind {
            LedgerRequestKind::Fund => {
                if let Some(mut record) = self.escrow.get(&task.offer_id)? {
                    record.status = EscrowStatus::Failed;
                    record.updated_at = now;
                    self.escrow.update(&record)?;
                }
                self.machine
                    .fail_funding(&task.offer_id, reason, detail, now)
                    .await?;
            }
            LedgerRequestKind::Settle => {
                self.machine
                    .fail_settlement(&task.offer_id, reason, detail, now)
                    .await?;
            }
        }
        Ok(())
    }

    fn confirm_escrow_record(
        &self,
        offer_id: &OfferId,
        handle: &LedgerHandle,
        now: Timestamp,
    ) -> Result<(), GatewayError> {
        if let Some(mut record) = self.escrow.get(offer_id)? {
            if record.status != EscrowStatus::Confirmed {
                record.status = EscrowStatus::Confirmed;
                record.ledger_handle = Some(handle.clone());
                record.updated_at = now;
                self.escrow.update(&record)?;
            }
        }
        Ok(())
    }
}
