//! # vmk-core — Foundational Types for the Veilmark Offer Core
//!
//! This crate is the bedrock of the Veilmark offer core. It defines the
//! domain primitives shared by every other crate in the workspace; it
//! depends on nothing internal.
//!
//! ## Key Design Principles
//!
//! 1. **Newtype wrappers for domain primitives.** `OfferId`, `CampaignId`,
//!    `LedgerHandle`, `AttributeKind` — all newtypes with validated
//!    constructors. No bare strings for identifiers.
//!
//! 2. **Integer money.** `Amount` is an unsigned integer count of funding
//!    units with checked arithmetic. No floats anywhere near money.
//!
//! 3. **UTC-only timestamps.** The `Timestamp` type enforces UTC with Z
//!    suffix and seconds precision.
//!
//! 4. **Single rejection taxonomy.** `RejectionReason` is the one closed
//!    enum of user-visible failure causes. Callers never see a raw internal
//!    error; every terminal offer state carries one of these.
//!
//! ## Crate Policy
//!
//! - No dependencies on other `vmk-*` crates (this is the leaf of the DAG).
//! - No `unsafe` code.
//! - No `panic!()` or `.unwrap()` outside tests.

pub mod amount;
pub mod identity;
pub mod rejection;
pub mod temporal;

// Re-export primary types for ergonomic imports.
pub use amount::Amount;
pub use identity::{AttributeKind, CampaignId, IdentityError, LedgerHandle, OfferId};
pub use rejection::RejectionReason;
pub use temporal::{Timestamp, TimestampError};
