//! # Offer State Machine Front Door
//!
//! `OfferStateMachine` is the concurrent entry point for every offer
//! operation: proof intake, the acceptance decision, funding and
//! settlement transitions, and expiry sweeps. Each operation acquires
//! the offer's exclusive lock, loads the offer from the durable store,
//! mutates it through the entity's transition methods, and saves it
//! before releasing the lock.
//!
//! ## Security Invariant
//!
//! A proof package is verified *before* it is recorded, so a failed
//! verification can never advance the offer — it moves it to `Rejected`
//! instead. `begin_funding` and `begin_settlement` return an
//! [`Initiate`](FundingDirective::Initiate) directive exactly once per
//! offer; every subsequent call observes the already-transitioned state
//! and reports [`AlreadyInFlight`](FundingDirective::AlreadyInFlight).
//! That single-shot transition under the offer lock is what makes the
//! escrow layer's funding request idempotent.

use std::collections::BTreeMap;
use std::sync::Arc;

use thiserror::Error;
use tracing::{info, warn};

use vmk_core::{
    Amount, AttributeKind, CampaignId, LedgerHandle, OfferId, RejectionReason, Timestamp,
};
use vmk_circuits::CampaignRequirement;
use vmk_verifier::{ProofPackage, ProofVerifier};

use crate::locks::OfferLocks;
use crate::offer::{Offer, OfferError, OfferState};
use crate::oracle::{Decision, OfferContext};
use crate::store::{OfferStore, StoreError};

// ─── Policy and submission ───────────────────────────────────────────

/// Tunable offer policy.
#[derive(Debug, Clone, Copy)]
pub struct OfferPolicy {
    /// Seconds an offer has to reach `Accepted` before it expires.
    pub accept_window_secs: u64,
}

impl Default for OfferPolicy {
    fn default() -> Self {
        Self {
            accept_window_secs: 3600,
        }
    }
}

/// A complete offer submission: the offer terms plus any proof packages
/// supplied up front.
#[derive(Debug, Clone)]
pub struct OfferSubmission {
    /// Caller-chosen stable offer id (the idempotency key).
    pub offer_id: OfferId,
    /// The campaign this offer responds to.
    pub campaign_id: CampaignId,
    /// The amount the submitter proposes.
    pub amount: Amount,
    /// Ledger destination for the payout.
    pub destination: String,
    /// The campaign's requirements, one per attribute kind.
    pub requirements: BTreeMap<AttributeKind, CampaignRequirement>,
    /// Proof packages supplied with the submission, keyed by kind.
    pub proofs: BTreeMap<AttributeKind, ProofPackage>,
}

// ─── Directives ──────────────────────────────────────────────────────

/// Instruction to the escrow layer after a funding transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FundingDirective {
    /// The offer just moved to `FundingRequested`; the caller owns
    /// issuing this order to the ledger.
    Initiate(FundingOrder),
    /// Funding was already requested or completed; do nothing.
    AlreadyInFlight(OfferState),
}

/// The funding order handed to the escrow layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FundingOrder {
    /// The offer to fund.
    pub offer_id: OfferId,
    /// Amount to escrow: the quoted price, falling back to the
    /// submitted amount when no quote was recorded.
    pub amount: Amount,
    /// Ledger destination for the eventual payout.
    pub destination: String,
}

/// Instruction to the escrow layer after a settlement transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SettlementDirective {
    /// The offer just moved to `SettlementRequested`.
    Initiate(SettlementOrder),
    /// Settlement was already requested or completed; do nothing.
    AlreadyInFlight(OfferState),
}

/// The settlement order handed to the escrow layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SettlementOrder {
    /// The offer to settle.
    pub offer_id: OfferId,
    /// Amount to release from escrow.
    pub amount: Amount,
    /// Ledger destination for the payout.
    pub destination: String,
}

// ─── Errors ──────────────────────────────────────────────────────────

/// Errors from state-machine operations.
#[derive(Error, Debug)]
pub enum MachineError {
    /// No offer with this id exists.
    #[error("offer not found: {0}")]
    NotFound(OfferId),

    /// A proof package failed verification; the offer is now `Rejected`.
    #[error("proof rejected ({reason}): {detail}")]
    ProofRejected {
        /// Taxonomy reason for the rejection.
        reason: RejectionReason,
        /// Gate-specific detail.
        detail: String,
    },

    /// A decision was requested before every required attribute kind had
    /// a verified proof. The offer is left untouched; the missing kinds
    /// can still be proven.
    #[error("required attribute kinds still unproven: {missing}")]
    MissingRequiredProof {
        /// Comma-separated list of the unproven kinds.
        missing: String,
    },

    /// An offer transition was invalid.
    #[error(transparent)]
    Offer(#[from] OfferError),

    /// The durable store failed.
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl MachineError {
    /// The taxonomy reason for this error, when it maps onto one.
    /// Internal errors (store, invalid transitions) carry none.
    pub fn reason(&self) -> Option<RejectionReason> {
        match self {
            Self::ProofRejected { reason, .. } => Some(*reason),
            Self::MissingRequiredProof { .. } => Some(RejectionReason::MissingRequiredProof),
            Self::Offer(OfferError::StaleSubmission { .. }) => {
                Some(RejectionReason::StaleSubmission)
            }
            _ => None,
        }
    }
}

// ─── State machine ───────────────────────────────────────────────────

/// The concurrent offer state machine.
pub struct OfferStateMachine {
    store: Arc<dyn OfferStore>,
    verifier: Arc<ProofVerifier>,
    locks: OfferLocks,
    policy: OfferPolicy,
}

impl OfferStateMachine {
    /// Create a state machine over the given store and verifier.
    pub fn new(
        store: Arc<dyn OfferStore>,
        verifier: Arc<ProofVerifier>,
        policy: OfferPolicy,
    ) -> Self {
        Self {
            store,
            verifier,
            locks: OfferLocks::new(),
            policy,
        }
    }

    /// Submit a new offer, verifying any proofs supplied with it.
    ///
    /// Idempotent on offer id: resubmitting an existing id returns the
    /// stored offer unchanged. If a supplied proof fails verification
    /// the offer is persisted as `Rejected` and the rejection returned.
    pub async fn submit_offer(
        &self,
        submission: OfferSubmission,
        now: Timestamp,
    ) -> Result<Offer, MachineError> {
        let _guard = self.locks.acquire(&submission.offer_id).await;
        if let Some(existing) = self.store.load(&submission.offer_id)? {
            info!(offer = %existing.offer_id, state = %existing.state, "duplicate submission, returning stored offer");
            return Ok(existing);
        }
        let mut offer = Offer::new(
            submission.offer_id,
            submission.campaign_id,
            submission.amount,
            submission.destination,
            submission.requirements,
            now,
            self.policy.accept_window_secs,
        )?;
        info!(offer = %offer.offer_id, campaign = %offer.campaign_id, "offer created");
        for (kind, package) in submission.proofs {
            self.apply_proof(&mut offer, kind, package, now)?;
        }
        if offer.state == OfferState::ProofsSubmitted && offer.is_fully_proven() {
            offer.mark_verified(now)?;
        }
        self.store.save(&offer)?;
        Ok(offer)
    }

    /// Submit (or supersede) one proof package for an existing offer.
    ///
    /// Returns the offer's state after the submission. A failed
    /// verification moves the offer to `Rejected` and surfaces as
    /// [`MachineError::ProofRejected`].
    pub async fn submit_proof(
        &self,
        offer_id: &OfferId,
        kind: AttributeKind,
        package: ProofPackage,
        now: Timestamp,
    ) -> Result<OfferState, MachineError> {
        let _guard = self.locks.acquire(offer_id).await;
        let mut offer = self.load_required(offer_id)?;
        self.apply_proof(&mut offer, kind, package, now)?;
        if offer.state == OfferState::ProofsSubmitted && offer.is_fully_proven() {
            offer.mark_verified(now)?;
        }
        self.store.save(&offer)?;
        Ok(offer.state)
    }

    /// The redacted oracle view of an offer, for callers consulting the
    /// decision oracle.
    pub async fn decision_context(
        &self,
        offer_id: &OfferId,
    ) -> Result<OfferContext, MachineError> {
        let _guard = self.locks.acquire(offer_id).await;
        let offer = self.load_required(offer_id)?;
        Ok(OfferContext::from_offer(&offer))
    }

    /// Record the external oracle's accept/price decision.
    ///
    /// Valid only from `Verified`; a partially-proven offer surfaces
    /// [`MachineError::MissingRequiredProof`] and is left untouched.
    /// The offer passes through
    /// `DecisionPending` to `Accepted` (recording the quoted price and
    /// freezing the proofs) or `Rejected`, all within one locked
    /// section, so the consultation state is visible in the transition
    /// log but never left dangling.
    pub async fn record_decision(
        &self,
        offer_id: &OfferId,
        decision: Decision,
        now: Timestamp,
    ) -> Result<OfferState, MachineError> {
        let _guard = self.locks.acquire(offer_id).await;
        let mut offer = self.load_required(offer_id)?;
        if offer.state.accepts_proofs() && !offer.is_fully_proven() {
            let missing: Vec<String> = offer
                .requirements
                .keys()
                .filter(|kind| !offer.proofs.contains_key(*kind))
                .map(|kind| kind.to_string())
                .collect();
            return Err(MachineError::MissingRequiredProof {
                missing: missing.join(", "),
            });
        }
        offer.begin_decision(now)?;
        if decision.accept {
            offer.accept(decision.price, now)?;
        } else {
            offer.reject(None, "declined by decision oracle", now)?;
        }
        self.store.save(&offer)?;
        Ok(offer.state)
    }

    /// Transition an accepted offer to `FundingRequested`.
    ///
    /// Exactly one caller per offer receives
    /// [`FundingDirective::Initiate`]; all later callers receive
    /// [`FundingDirective::AlreadyInFlight`].
    pub async fn begin_funding(
        &self,
        offer_id: &OfferId,
        now: Timestamp,
    ) -> Result<FundingDirective, MachineError> {
        let _guard = self.locks.acquire(offer_id).await;
        let mut offer = self.load_required(offer_id)?;
        match offer.begin_funding(now) {
            Ok(()) => {
                self.store.save(&offer)?;
                Ok(FundingDirective::Initiate(FundingOrder {
                    offer_id: offer.offer_id.clone(),
                    amount: offer.price_quoted.unwrap_or(offer.amount),
                    destination: offer.destination.clone(),
                }))
            }
            Err(OfferError::AlreadyRequested { .. }) => {
                Ok(FundingDirective::AlreadyInFlight(offer.state))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Transition a funded offer to `SettlementRequested`.
    pub async fn begin_settlement(
        &self,
        offer_id: &OfferId,
        now: Timestamp,
    ) -> Result<SettlementDirective, MachineError> {
        let _guard = self.locks.acquire(offer_id).await;
        let mut offer = self.load_required(offer_id)?;
        match offer.begin_settlement(now) {
            Ok(()) => {
                self.store.save(&offer)?;
                Ok(SettlementDirective::Initiate(SettlementOrder {
                    offer_id: offer.offer_id.clone(),
                    amount: offer.price_quoted.unwrap_or(offer.amount),
                    destination: offer.destination.clone(),
                }))
            }
            Err(OfferError::AlreadyRequested { .. }) => {
                Ok(SettlementDirective::AlreadyInFlight(offer.state))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Apply a ledger funding confirmation. Returns `false` for a
    /// duplicate confirmation.
    pub async fn on_funding_confirmed(
        &self,
        offer_id: &OfferId,
        handle: LedgerHandle,
        now: Timestamp,
    ) -> Result<bool, MachineError> {
        let _guard = self.locks.acquire(offer_id).await;
        let mut offer = self.load_required(offer_id)?;
        let advanced = offer.funding_confirmed(handle, now)?;
        if advanced {
            self.store.save(&offer)?;
        }
        Ok(advanced)
    }

    /// Apply a ledger settlement confirmation. Returns `false` for a
    /// duplicate confirmation.
    pub async fn on_settlement_confirmed(
        &self,
        offer_id: &OfferId,
        handle: LedgerHandle,
        now: Timestamp,
    ) -> Result<bool, MachineError> {
        let _guard = self.locks.acquire(offer_id).await;
        let mut offer = self.load_required(offer_id)?;
        let advanced = offer.settlement_confirmed(handle, now)?;
        if advanced {
            self.store.save(&offer)?;
        }
        Ok(advanced)
    }

    /// Record a permanent funding failure. Returns `false` if the offer
    /// already advanced past funding.
    pub async fn fail_funding(
        &self,
        offer_id: &OfferId,
        reason: RejectionReason,
        detail: &str,
        now: Timestamp,
    ) -> Result<bool, MachineError> {
        let _guard = self.locks.acquire(offer_id).await;
        let mut offer = self.load_required(offer_id)?;
        let failed = offer.fail_funding(reason, detail, now)?;
        if failed {
            warn!(offer = %offer.offer_id, %reason, detail, "funding failed");
            self.store.save(&offer)?;
        }
        Ok(failed)
    }

    /// Record a permanent settlement failure. Returns `false` if the
    /// offer already settled.
    pub async fn fail_settlement(
        &self,
        offer_id: &OfferId,
        reason: RejectionReason,
        detail: &str,
        now: Timestamp,
    ) -> Result<bool, MachineError> {
        let _guard = self.locks.acquire(offer_id).await;
        let mut offer = self.load_required(offer_id)?;
        let failed = offer.fail_settlement(reason, detail, now)?;
        if failed {
            warn!(offer = %offer.offer_id, %reason, detail, "settlement failed");
            self.store.save(&offer)?;
        }
        Ok(failed)
    }

    /// Expire every offer whose accept window has elapsed at `now`.
    ///
    /// Returns the ids of the offers expired by this sweep.
    pub async fn expire_due(&self, now: Timestamp) -> Result<Vec<OfferId>, MachineError> {
        let mut expired = Vec::new();
        for offer_id in self.store.ids()? {
            let _guard = self.locks.acquire(&offer_id).await;
            let Some(mut offer) = self.store.load(&offer_id)? else {
                continue;
            };
            if offer.is_expiry_due(now) && offer.expire(now)? {
                self.store.save(&offer)?;
                expired.push(offer_id);
            }
        }
        Ok(expired)
    }

    /// Fetch the current state of an offer.
    pub async fn offer(&self, offer_id: &OfferId) -> Result<Offer, MachineError> {
        let _guard = self.locks.acquire(offer_id).await;
        self.load_required(offer_id)
    }

    fn load_required(&self, offer_id: &OfferId) -> Result<Offer, MachineError> {
        self.store
            .load(offer_id)?
            .ok_or_else(|| MachineError::NotFound(offer_id.clone()))
    }

    /// Verify a package, then record it. Verification runs first so the
    /// offer never advances on an invalid proof; a failure persists the
    /// offer as `Rejected`.
    fn apply_proof(
        &self,
        offer: &mut Offer,
        kind: AttributeKind,
        package: ProofPackage,
        now: Timestamp,
    ) -> Result<(), MachineError> {
        // Staleness is checked before verification so a late package,
        // valid or not, can never disturb an accepted or terminal offer.
        if !offer.state.accepts_proofs() {
            if offer.state.is_terminal() {
                return Err(OfferError::TerminalState {
                    state: offer.state.to_string(),
                }
                .into());
            }
            return Err(OfferError::StaleSubmission {
                state: offer.state.to_string(),
            }
            .into());
        }
        let requirement = offer
            .requirements
            .get(&kind)
            .cloned()
            .ok_or_else(|| OfferError::UnknownAttribute { kind: kind.clone() })?;
        if let Err(rejection) = self.verifier.verify(&package, &requirement) {
            let reason = rejection.reason();
            let detail = rejection.to_string();
            offer.reject(Some(reason), &detail, now)?;
            self.store.save(offer)?;
            return Err(MachineError::ProofRejected { reason, detail });
        }
        offer.record_proof(kind, package, now)?;
        Ok(())
    }
}
