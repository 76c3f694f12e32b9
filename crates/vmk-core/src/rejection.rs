//! # Rejection Taxonomy
//!
//! The closed set of user-visible reasons an offer (or one of its proofs,
//! or its funding) can fail. Every terminal offer state carries one of
//! these plus a human-readable detail string; internal errors are mapped
//! onto this taxonomy at the boundary and never leak raw.
//!
//! Proof-validation reasons are permanent — the same package is never
//! retried. Only [`RejectionReason::FundingTimeout`] is transient; it is
//! absorbed by the settlement queue and surfaces to the caller solely as
//! [`RejectionReason::RetryExhausted`] once the retry budget is spent.

use serde::{Deserialize, Serialize};

/// User-visible cause of a rejection or terminal failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RejectionReason {
    /// The proof names a circuit this deployment does not support.
    UnknownCircuit,
    /// The proof's public-signal vector has the wrong shape for its circuit.
    SignalShapeMismatch,
    /// The proof's public signals do not encode this campaign's requirement.
    SignalMismatch,
    /// The external verification primitive rejected the proof.
    CryptographicallyInvalid,
    /// The proof is valid but proves the predicate is false.
    PredicateFalse,
    /// A required attribute kind has no verified proof.
    MissingRequiredProof,
    /// A proof arrived for an offer already past acceptance.
    StaleSubmission,
    /// The settlement ledger permanently rejected the transaction.
    FundingRejected,
    /// The settlement ledger did not confirm within the timeout (transient).
    FundingTimeout,
    /// The bounded retry budget was exhausted without a confirmation.
    RetryExhausted,
}

impl RejectionReason {
    /// Whether this reason is transient (eligible for retry).
    ///
    /// Everything except a ledger timeout is permanent: cryptographic and
    /// shape failures indicate a malformed or adversarial submission, and
    /// ledger rejections indicate a transaction the ledger will never accept.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::FundingTimeout)
    }

    /// The stable wire identifier for this reason.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::UnknownCircuit => "UNKNOWN_CIRCUIT",
            Self::SignalShapeMismatch => "SIGNAL_SHAPE_MISMATCH",
            Self::SignalMismatch => "SIGNAL_MISMATCH",
            Self::CryptographicallyInvalid => "CRYPTOGRAPHICALLY_INVALID",
            Self::PredicateFalse => "PREDICATE_FALSE",
            Self::MissingRequiredProof => "MISSING_REQUIRED_PROOF",
            Self::StaleSubmission => "STALE_SUBMISSION",
            Self::FundingRejected => "FUNDING_REJECTED",
            Self::FundingTimeout => "FUNDING_TIMEOUT",
            Self::RetryExhausted => "RETRY_EXHAUSTED",
        }
    }
}

impl std::fmt::Display for RejectionReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
