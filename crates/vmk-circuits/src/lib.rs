//! # vmk-circuits — Predicate Circuit Metadata and Field Encoding
//!
//! Static metadata for the supported zero-knowledge predicate circuits,
//! plus the canonical scheme for turning arbitrary strings into elements
//! of the proof system's scalar field.
//!
//! ## Architecture
//!
//! - **Field** (`field.rs`): `FieldElement`, an integer modulo the BN254
//!   scalar-field prime, with the decimal-string wire form used by public
//!   signals, and `hash_to_field()` — the deterministic one-way mapping
//!   from categorical attribute strings to field elements.
//!
//! - **Registry** (`registry.rs`): `CircuitRegistry`, the closed set of
//!   supported circuit kinds (numeric range, set membership) with their
//!   public-signal layouts. Pure lookup, loaded at startup.
//!
//! - **Requirement** (`requirement.rs`): `CampaignRequirement` and the
//!   computation of the *expected* public signals a conforming proof must
//!   present for a given campaign.
//!
//! ## Security Invariant
//!
//! `hash_to_field()` is deterministic and stable across callers and
//! releases — the verifier compares a prover's hashed categorical claim
//! against the campaign's hashed allow-list element-for-element, so any
//! drift in this mapping breaks every set-membership campaign at once.
//!
//! ## Crate Policy
//!
//! - No internal dependencies (leaf crate alongside `vmk-core`).
//! - No `unsafe` code, no `panic!()`/`unwrap()` outside tests.

pub mod field;
pub mod registry;
pub mod requirement;

pub use field::{hash_to_field, FieldElement, FieldError};
pub use registry::{CircuitKind, CircuitRegistry, CircuitSpec, RegistryError, SignalSlot, SlotRole};
pub use requirement::{CampaignRequirement, RequirementError};
