//! # vmk-offer — Offer Lifecycle State Machine
//!
//! Owns the lifecycle of an offer from first proof submission through
//! settlement: proof intake and verification, the external acceptance
//! decision, and the funding/settlement confirmations reported by the
//! escrow layer.
//!
//! ## Architecture
//!
//! - **Offer** (`offer.rs`): the central mutable entity and its monotonic
//!   state machine. Transitions are adjacency-checked methods; every
//!   transition is recorded in an ordered log. Nothing outside this
//!   module writes an offer field directly.
//!
//! - **Machine** (`machine.rs`): `OfferStateMachine` — the concurrent
//!   front door. Every operation holds the offer's exclusive lock around
//!   a load-mutate-save cycle against the durable store.
//!
//! - **Oracle** (`oracle.rs`): the capability seam for the external
//!   accept/price decision. The core consumes only the typed output.
//!
//! - **Store** (`store.rs`): `OfferStore` with in-memory and
//!   directory-backed implementations; offers survive process restart.
//!
//! - **Locks** (`locks.rs`): per-offer mutual exclusion. Transitions for
//!   one offer are serialized; different offers never block each other.
//!
//! ## Security Invariant
//!
//! An offer never transitions backward, is never funded with a missing
//! or failed proof for a required attribute, and freezes its proofs the
//! moment it is accepted — no substitution after the price is agreed.

pub mod locks;
pub mod machine;
pub mod offer;
pub mod oracle;
pub mod store;

pub use machine::{
    FundingDirective, FundingOrder, MachineError, OfferPolicy, OfferStateMachine, OfferSubmission,
    SettlementDirective, SettlementOrder,
};
pub use offer::{Offer, OfferError, OfferFailure, OfferState, TransitionRecord};
pub use oracle::{Decision, DecisionOracle, FixedDecisionOracle, OfferContext, OracleError};
pub use store::{DirOfferStore, MemoryOfferStore, OfferStore, StoreError};
