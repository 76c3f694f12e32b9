//! # vmk-verifier — Proof Verification Against Campaign Requirements
//!
//! Validates proof packages produced by the external proving toolchain
//! against a campaign's stated requirement, and invokes the external
//! pairing primitive for the cryptographic check.
//!
//! ## Architecture
//!
//! - **Package** (`package.rs`): the proof-submission wire format
//!   (`circuitName`, opaque `pi_a`/`pi_b`/`pi_c` points, `publicSignals`
//!   as decimal strings). Immutable once received; never mutated, only
//!   validated.
//!
//! - **Backend** (`backend.rs`): the `PairingBackend` trait — the seam to
//!   the external elliptic-curve verification primitive. This core never
//!   implements pairing arithmetic; it forwards verification parameters,
//!   public signals, and the proof blob, and consumes a boolean verdict.
//!
//! - **Mock** (`mock.rs`): a scripted backend plus proof-package builders
//!   for tests. Provides no cryptographic guarantees.
//!
//! - **Verifier** (`verifier.rs`): `ProofVerifier` — the five ordered
//!   gates from circuit resolution through the predicate-output check.
//!
//! ## Security Invariant
//!
//! Verification is a pure, fail-fast validation step. A rejection is
//! permanent for that specific package — nothing here is retried — and
//! every rejection maps onto the closed `RejectionReason` taxonomy before
//! reaching a caller.

pub mod backend;
pub mod mock;
pub mod package;
pub mod verifier;

pub use backend::{BackendError, PairingBackend, VerifyingParameters};
pub use mock::MockPairingBackend;
pub use package::{ProofPackage, ProofPoints};
pub use verifier::{ProofVerifier, VerifyRejection};
