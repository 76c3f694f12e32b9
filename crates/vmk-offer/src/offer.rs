//! # Offer Entity and State Machine
//!
//! Models the lifecycle of a single offer.
//!
//! ## States
//!
//! ```text
//! Created ──▶ ProofsSubmitted ──▶ Verified ──▶ DecisionPending ──▶ Accepted
//!    │               │                │               │                │
//!    │               └──▶ Rejected ◀──┴───────────────┘                ▼
//!    │                    (terminal)                          FundingRequested
//!    └──────▶ Expired ◀── (any pre-accepted state,                │      │
//!                │         time-boxed)                            │      └──▶ FundingFailed
//!                │                                                ▼           (terminal)
//!                └─────(late funding confirmation)──────────▶  Funded
//!                                                                 │
//!                                                                 ▼
//!                                                       SettlementRequested
//!                                                            │        │
//!                                                            ▼        └──▶ SettlementFailed
//!                                                         Settled          (terminal)
//!                                                        (terminal)
//! ```
//!
//! ## Security Invariant
//!
//! Transitions are monotonic — an offer never moves backward, and a
//! transition attempted from a non-adjacent state is rejected. Duplicate
//! or out-of-order confirmations are idempotent no-ops. The one deliberate
//! exception to terminality: a funding confirmation that arrives after the
//! offer expired still advances it to `Funded`, because real money moved
//! and discarding that would strand it.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use vmk_circuits::CampaignRequirement;
use vmk_core::{
    Amount, AttributeKind, CampaignId, LedgerHandle, OfferId, RejectionReason, Timestamp,
    TimestampError,
};
use vmk_verifier::ProofPackage;

// ─── Offer State ─────────────────────────────────────────────────────

/// The lifecycle state of an offer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OfferState {
    /// Offer created; no proof packages recorded yet.
    Created,
    /// At least one proof package recorded; required kinds still missing.
    ProofsSubmitted,
    /// Every required attribute kind has a verified proof.
    Verified,
    /// The external decision oracle is being consulted.
    DecisionPending,
    /// The oracle accepted; price agreed, proofs frozen.
    Accepted,
    /// A funding request has been issued to the settlement ledger.
    FundingRequested,
    /// The ledger confirmed escrow funding.
    Funded,
    /// A settlement request has been issued to the ledger.
    SettlementRequested,
    /// The ledger confirmed settlement (terminal).
    Settled,
    /// A proof failed verification or the oracle declined (terminal).
    Rejected,
    /// Funding failed permanently (terminal).
    FundingFailed,
    /// Settlement failed permanently (terminal).
    SettlementFailed,
    /// The offer did not reach acceptance within its window (terminal,
    /// except for a late funding confirmation).
    Expired,
}

impl OfferState {
    /// Whether this state is terminal.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Settled
                | Self::Rejected
                | Self::FundingFailed
                | Self::SettlementFailed
                | Self::Expired
        )
    }

    /// Whether proofs may still be submitted or superseded in this state.
    pub fn accepts_proofs(&self) -> bool {
        matches!(self, Self::Created | Self::ProofsSubmitted | Self::Verified)
    }

    /// Whether the offer has reached (or passed) acceptance.
    pub fn is_accepted_or_later(&self) -> bool {
        matches!(
            self,
            Self::Accepted
                | Self::FundingRequested
                | Self::Funded
                | Self::SettlementRequested
                | Self::Settled
                | Self::FundingFailed
                | Self::SettlementFailed
        )
    }
}

impl std::fmt::Display for OfferState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Created => "CREATED",
            Self::ProofsSubmitted => "PROOFS_SUBMITTED",
            Self::Verified => "VERIFIED",
            Self::DecisionPending => "DECISION_PENDING",
            Self::Accepted => "ACCEPTED",
            Self::FundingRequested => "FUNDING_REQUESTED",
            Self::Funded => "FUNDED",
            Self::SettlementRequested => "SETTLEMENT_REQUESTED",
            Self::Settled => "SETTLED",
            Self::Rejected => "REJECTED",
            Self::FundingFailed => "FUNDING_FAILED",
            Self::SettlementFailed => "SETTLEMENT_FAILED",
            Self::Expired => "EXPIRED",
        };
        f.write_str(s)
    }
}

// ─── Errors ──────────────────────────────────────────────────────────

/// Errors from offer state transitions.
#[derive(Error, Debug)]
pub enum OfferError {
    /// Attempted transition is not valid from the current state.
    #[error("invalid offer transition: {from} -> {to}")]
    InvalidTransition {
        /// Current state.
        from: String,
        /// Attempted target state.
        to: String,
    },

    /// The offer is in a terminal state.
    #[error("offer is in terminal state {state}")]
    TerminalState {
        /// The terminal state.
        state: String,
    },

    /// A proof arrived for an offer already past acceptance.
    #[error("proof submission is stale: offer is {state}")]
    StaleSubmission {
        /// The state that froze the proofs.
        state: String,
    },

    /// Funding or settlement was already requested; the caller's intent
    /// is satisfied, not in error — treated as an idempotent no-op.
    #[error("request already in flight: offer is {state}")]
    AlreadyRequested {
        /// The state showing the earlier request.
        state: String,
    },

    /// A proof was submitted for an attribute kind the campaign does not
    /// require.
    #[error("campaign has no requirement for attribute kind {kind}")]
    UnknownAttribute {
        /// The unexpected kind.
        kind: AttributeKind,
    },

    /// Timestamp arithmetic failed while computing the expiry window.
    #[error(transparent)]
    Time(#[from] TimestampError),
}

// ─── Transition log ──────────────────────────────────────────────────

/// Record of one offer state transition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransitionRecord {
    /// State before the transition.
    pub from_state: OfferState,
    /// State after the transition.
    pub to_state: OfferState,
    /// When the transition occurred.
    pub timestamp: Timestamp,
    /// Short operator-readable note.
    pub note: String,
}

/// The recorded cause of a terminal failure or rejection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OfferFailure {
    /// Taxonomy reason, when the failure maps onto one (an oracle
    /// decline, for instance, does not).
    pub reason: Option<RejectionReason>,
    /// Human-readable detail. Never empty for a terminal state.
    pub detail: String,
}

// ─── Offer ───────────────────────────────────────────────────────────

/// An offer: a set of verified proofs tied to a price, progressing
/// through funding and settlement.
///
/// Archived (kept in the store), never deleted, on reaching a terminal
/// state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Offer {
    /// Stable idempotency key; escrow records are keyed by it.
    pub offer_id: OfferId,
    /// The campaign this offer responds to.
    pub campaign_id: CampaignId,
    /// The amount the submitter proposed.
    pub amount: Amount,
    /// Ledger destination for the payout.
    pub destination: String,
    /// Snapshot of the campaign's requirements at submission time.
    pub requirements: BTreeMap<AttributeKind, CampaignRequirement>,
    /// Verified proof packages, one per required attribute kind. A
    /// package is only recorded here after passing verification.
    pub proofs: BTreeMap<AttributeKind, ProofPackage>,
    /// Current lifecycle state.
    pub state: OfferState,
    /// Price quoted by the decision oracle, once accepted.
    pub price_quoted: Option<Amount>,
    /// Ledger handle of the confirmed funding transaction.
    pub funding_reference: Option<LedgerHandle>,
    /// Ledger handle of the confirmed settlement transaction.
    pub settlement_reference: Option<LedgerHandle>,
    /// Cause of the terminal failure, if any.
    pub failure: Option<OfferFailure>,
    /// When the offer was created.
    pub created_at: Timestamp,
    /// When the offer last transitioned.
    pub updated_at: Timestamp,
    /// Deadline for reaching `Accepted`.
    pub expires_at: Timestamp,
    /// Ordered log of all state transitions.
    pub transitions: Vec<TransitionRecord>,
}

impl Offer {
    /// Create a new offer in the `Created` state.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        offer_id: OfferId,
        campaign_id: CampaignId,
        amount: Amount,
        destination: String,
        requirements: BTreeMap<AttributeKind, CampaignRequirement>,
        now: Timestamp,
        accept_window_secs: u64,
    ) -> Result<Self, OfferError> {
        let expires_at = now.checked_add_secs(accept_window_secs)?;
        Ok(Self {
            offer_id,
            campaign_id,
            amount,
            destination,
            requirements,
            proofs: BTreeMap::new(),
            state: OfferState::Created,
            price_quoted: None,
            funding_reference: None,
            settlement_reference: None,
            failure: None,
            created_at: now,
            updated_at: now,
            expires_at,
            transitions: Vec::new(),
        })
    }

    /// Record a verified proof package for a required attribute kind.
    ///
    /// The caller (the state machine) verifies the package first; only
    /// packages that passed the verification gates reach this method.
    /// A later package supersedes an earlier one for the same kind while
    /// proofs are still open; after acceptance the submission is stale.
    pub fn record_proof(
        &mut self,
        kind: AttributeKind,
        package: ProofPackage,
        now: Timestamp,
    ) -> Result<(), OfferError> {
        if !self.requirements.contains_key(&kind) {
            return Err(OfferError::UnknownAttribute { kind });
        }
        if self.state.is_accepted_or_later() || self.state == OfferState::DecisionPending {
            return Err(OfferError::StaleSubmission {
                state: self.state.to_string(),
            });
        }
        if !self.state.accepts_proofs() {
            return Err(OfferError::TerminalState {
                state: self.state.to_string(),
            });
        }
        let superseded = self.proofs.insert(kind.clone(), package).is_some();
        self.updated_at = now;
        if self.state == OfferState::Created {
            self.do_transition(
                OfferState::ProofsSubmitted,
                now,
                &format!("first proof recorded for {kind}"),
            );
        } else if superseded {
            // No state change; the supersession is still worth a log line.
            tracing::debug!(offer = %self.offer_id, %kind, "proof superseded");
        }
        Ok(())
    }

    /// Whether every required attribute kind has a verified proof.
    pub fn is_fully_proven(&self) -> bool {
        self.requirements
            .keys()
            .all(|kind| self.proofs.contains_key(kind))
    }

    /// Mark the offer verified (all required kinds proven).
    pub fn mark_verified(&mut self, now: Timestamp) -> Result<(), OfferError> {
        self.require_state(OfferState::ProofsSubmitted, OfferState::Verified)?;
        self.do_transition(OfferState::Verified, now, "all required proofs verified");
        Ok(())
    }

    /// Begin consulting the decision oracle.
    pub fn begin_decision(&mut self, now: Timestamp) -> Result<(), OfferError> {
        self.require_state(OfferState::Verified, OfferState::DecisionPending)?;
        self.do_transition(OfferState::DecisionPending, now, "decision requested");
        Ok(())
    }

    /// Accept the offer at the quoted price; proofs are frozen from here.
    pub fn accept(&mut self, price: Amount, now: Timestamp) -> Result<(), OfferError> {
        self.require_state(OfferState::DecisionPending, OfferState::Accepted)?;
        self.price_quoted = Some(price);
        self.do_transition(OfferState::Accepted, now, &format!("accepted at {price}"));
        Ok(())
    }

    /// Reject the offer (failed proof or oracle decline).
    pub fn reject(
        &mut self,
        reason: Option<RejectionReason>,
        detail: &str,
        now: Timestamp,
    ) -> Result<(), OfferError> {
        if self.state.is_terminal() {
            return Err(OfferError::TerminalState {
                state: self.state.to_string(),
            });
        }
        if self.state.is_accepted_or_later() {
            return Err(OfferError::InvalidTransition {
                from: self.state.to_string(),
                to: OfferState::Rejected.to_string(),
            });
        }
        self.failure = Some(OfferFailure {
            reason,
            detail: detail.to_string(),
        });
        self.do_transition(OfferState::Rejected, now, detail);
        Ok(())
    }

    /// Move to `FundingRequested`.
    ///
    /// Errors with [`OfferError::AlreadyRequested`] if funding was already
    /// requested or completed — the caller treats that as a no-op, which
    /// is what makes `requestFunding` idempotent.
    pub fn begin_funding(&mut self, now: Timestamp) -> Result<(), OfferError> {
        match self.state {
            OfferState::Accepted => {
                self.do_transition(OfferState::FundingRequested, now, "funding requested");
                Ok(())
            }
            OfferState::FundingRequested
            | OfferState::Funded
            | OfferState::SettlementRequested
            | OfferState::Settled => Err(OfferError::AlreadyRequested {
                state: self.state.to_string(),
            }),
            _ => Err(self.invalid_to(OfferState::FundingRequested)),
        }
    }

    /// Apply a funding confirmation from the ledger.
    ///
    /// Returns `true` if the offer advanced, `false` if the confirmation
    /// was a duplicate. An expired offer is corrected to `Funded` — money
    /// moved, so the state must reflect it.
    pub fn funding_confirmed(
        &mut self,
        handle: LedgerHandle,
        now: Timestamp,
    ) -> Result<bool, OfferError> {
        match self.state {
            OfferState::FundingRequested | OfferState::Expired => {
                self.funding_reference = Some(handle);
                self.do_transition(OfferState::Funded, now, "funding confirmed");
                Ok(true)
            }
            OfferState::Funded | OfferState::SettlementRequested | OfferState::Settled => Ok(false),
            _ => Err(self.invalid_to(OfferState::Funded)),
        }
    }

    /// Move to `SettlementRequested`.
    pub fn begin_settlement(&mut self, now: Timestamp) -> Result<(), OfferError> {
        match self.state {
            OfferState::Funded => {
                self.do_transition(OfferState::SettlementRequested, now, "settlement requested");
                Ok(())
            }
            OfferState::SettlementRequested | OfferState::Settled => {
                Err(OfferError::AlreadyRequested {
                    state: self.state.to_string(),
                })
            }
            _ => Err(self.invalid_to(OfferState::SettlementRequested)),
        }
    }

    /// Apply a settlement confirmation from the ledger.
    pub fn settlement_confirmed(
        &mut self,
        handle: LedgerHandle,
        now: Timestamp,
    ) -> Result<bool, OfferError> {
        match self.state {
            OfferState::SettlementRequested => {
                self.settlement_reference = Some(handle);
                self.do_transition(OfferState::Settled, now, "settlement confirmed");
                Ok(true)
            }
            OfferState::Settled => Ok(false),
            _ => Err(self.invalid_to(OfferState::Settled)),
        }
    }

    /// Mark funding permanently failed.
    ///
    /// Returns `false` (no-op) if the offer already advanced past funding
    /// or already failed — a late failure report never un-funds an offer.
    pub fn fail_funding(
        &mut self,
        reason: RejectionReason,
        detail: &str,
        now: Timestamp,
    ) -> Result<bool, OfferError> {
        match self.state {
            OfferState::FundingRequested => {
                self.failure = Some(OfferFailure {
                    reason: Some(reason),
                    detail: detail.to_string(),
                });
                self.do_transition(OfferState::FundingFailed, now, detail);
                Ok(true)
            }
            OfferState::Funded
            | OfferState::SettlementRequested
            | OfferState::Settled
            | OfferState::FundingFailed
            | OfferState::Expired => Ok(false),
            _ => Err(self.invalid_to(OfferState::FundingFailed)),
        }
    }

    /// Mark settlement permanently failed.
    pub fn fail_settlement(
        &mut self,
        reason: RejectionReason,
        detail: &str,
        now: Timestamp,
    ) -> Result<bool, OfferError> {
        match self.state {
            OfferState::SettlementRequested => {
                self.failure = Some(OfferFailure {
                    reason: Some(reason),
                    detail: detail.to_string(),
                });
                self.do_transition(OfferState::SettlementFailed, now, detail);
                Ok(true)
            }
            OfferState::Settled | OfferState::SettlementFailed => Ok(false),
            _ => Err(self.invalid_to(OfferState::SettlementFailed)),
        }
    }

    /// Expire the offer if it has not reached acceptance.
    ///
    /// Returns `true` if expired now, `false` if the offer is past
    /// acceptance (expiry no longer applies) or already terminal.
    pub fn expire(&mut self, now: Timestamp) -> Result<bool, OfferError> {
        if self.state.is_terminal() || self.state.is_accepted_or_later() {
            return Ok(false);
        }
        self.failure = Some(OfferFailure {
            reason: None,
            detail: format!("offer not accepted before {}", self.expires_at),
        });
        self.do_transition(OfferState::Expired, now, "accept window elapsed");
        Ok(true)
    }

    /// Whether the accept window has elapsed at `now`.
    pub fn is_expiry_due(&self, now: Timestamp) -> bool {
        now >= self.expires_at && !self.state.is_accepted_or_later() && !self.state.is_terminal()
    }

    /// Validate that the offer is in the expected state.
    fn require_state(&self, expected: OfferState, target: OfferState) -> Result<(), OfferError> {
        if self.state.is_terminal() {
            return Err(OfferError::TerminalState {
                state: self.state.to_string(),
            });
        }
        if self.state != expected {
            return Err(OfferError::InvalidTransition {
                from: self.state.to_string(),
                to: target.to_string(),
            });
        }
        Ok(())
    }

    fn invalid_to(&self, target: OfferState) -> OfferError {
        if self.state.is_terminal() {
            OfferError::TerminalState {
                state: self.state.to_string(),
            }
        } else {
            OfferError::InvalidTransition {
                from: self.state.to_string(),
                to: target.to_string(),
            }
        }
    }

    /// Record a state transition.
    fn do_transition(&mut self, to: OfferState, now: Timestamp, note: &str) {
        tracing::info!(offer = %self.offer_id, from = %self.state, to = %to, "offer transition");
        self.transitions.push(TransitionRecord {
            from_state: self.state,
            to_state: to,
            timestamp: now,
            note: note.to_string(),
        });
        self.state = to;
        self.updated_at = now;
    }
}

// ─── Tests ───────────────────────────────────────────────────────────
