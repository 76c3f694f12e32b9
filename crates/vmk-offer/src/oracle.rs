//! # Decision Oracle Seam
//!
//! The accept/decline decision for a verified offer is made outside the
//! core (a campaign budget engine, a human reviewer, a pricing model).
//! This module is the capability seam: the core hands the oracle a
//! redacted view of the offer and consumes only the typed decision.
//!
//! ## Security Invariant
//!
//! The oracle sees which attribute kinds were proven, never the proof
//! packages or public signals. A decision cannot be applied to an offer
//! that is not in `DecisionPending`.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use vmk_core::{Amount, AttributeKind, CampaignId, OfferId};

use crate::offer::Offer;

/// The oracle's verdict on a verified offer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Decision {
    /// Whether the offer is accepted.
    pub accept: bool,
    /// The price quoted for an accepted offer. Ignored on decline.
    pub price: Amount,
}

/// The redacted view of an offer presented to the oracle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OfferContext {
    /// The offer under decision.
    pub offer_id: OfferId,
    /// The campaign it responds to.
    pub campaign_id: CampaignId,
    /// The amount the submitter proposed.
    pub amount: Amount,
    /// Attribute kinds with a verified proof, in sorted order.
    pub verified_attributes: Vec<AttributeKind>,
}

impl OfferContext {
    /// Build the oracle's view from a verified offer.
    pub fn from_offer(offer: &Offer) -> Self {
        Self {
            offer_id: offer.offer_id.clone(),
            campaign_id: offer.campaign_id,
            amount: offer.amount,
            verified_attributes: offer.proofs.keys().cloned().collect(),
        }
    }
}

/// Error reaching the decision oracle.
#[derive(Error, Debug)]
pub enum OracleError {
    /// The oracle could not produce a decision; the offer stays in
    /// `DecisionPending` and the caller may retry.
    #[error("decision oracle unavailable: {0}")]
    Unavailable(String),
}

/// The external accept/price decision.
pub trait DecisionOracle: Send + Sync {
    /// Decide whether to accept the offer and at what price.
    fn decide(&self, context: &OfferContext) -> Result<Decision, OracleError>;
}

/// An oracle with a fixed verdict, for tests and single-tenant setups
/// with a static pricing rule.
#[derive(Debug, Clone)]
pub struct FixedDecisionOracle {
    decision: Decision,
}

impl FixedDecisionOracle {
    /// An oracle that accepts every offer at the given price.
    pub fn accept_at(price: Amount) -> Self {
        Self {
            decision: Decision {
                accept: true,
                price,
            },
        }
    }

    /// An oracle that declines every offer.
    pub fn decline() -> Self {
        Self {
            decision: Decision {
                accept: false,
                price: Amount::ZERO,
            },
        }
    }
}

impl DecisionOracle for FixedDecisionOracle {
    fn decide(&self, _context: &OfferContext) -> Result<Decision, OracleError> {
        Ok(self.decision)
    }
}
