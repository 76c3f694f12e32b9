//! # Settlement Ledger Seam
//!
//! The external settlement ledger — the system that actually moves
//! money — sits behind the [`LedgerClient`] trait. This core submits
//! typed requests and interprets three outcomes: confirmed, permanently
//! rejected, or timed out.
//!
//! ## Security Invariant
//!
//! A [`LedgerError::Timeout`] means *outcome unknown*, never "failed":
//! the transaction may have landed. Timeouts are therefore the only
//! retriable outcome, and the ledger is assumed to deduplicate by
//! `(offer_id, kind)` so a retried request cannot double-move funds.
//! Our side guards the same invariant independently via the unique
//! escrow record per offer.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use vmk_core::{Amount, LedgerHandle, OfferId};

/// The kind of ledger transaction being requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LedgerRequestKind {
    /// Lock the offer amount in escrow.
    Fund,
    /// Release escrowed funds to the payout destination.
    Settle,
}

impl std::fmt::Display for LedgerRequestKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Fund => "fund",
            Self::Settle => "settle",
        })
    }
}

/// A transaction request submitted to the settlement ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerRequest {
    /// The offer this transaction belongs to (the dedup key, with kind).
    pub offer_id: OfferId,
    /// Fund or settle.
    pub kind: LedgerRequestKind,
    /// The amount to move.
    pub amount: Amount,
    /// The payout destination.
    pub destination: String,
}

/// The ledger's acknowledgement of a confirmed transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerReceipt {
    /// Opaque handle to the confirmed ledger transaction.
    pub handle: LedgerHandle,
}

/// Errors from a ledger submission.
#[derive(Error, Debug)]
pub enum LedgerError {
    /// The ledger permanently rejected the transaction (insufficient
    /// budget, frozen destination). Never retried.
    #[error("ledger rejected the transaction: {0}")]
    Rejected(String),

    /// No confirmation arrived within the client's deadline. The
    /// outcome is unknown; the request is retriable.
    #[error("ledger did not confirm within the deadline")]
    Timeout,
}

/// Client for the external settlement ledger.
#[async_trait]
pub trait LedgerClient: Send + Sync {
    /// Submit a transaction and wait for its outcome.
    async fn submit(&self, request: &LedgerRequest) -> Result<LedgerReceipt, LedgerError>;
}
