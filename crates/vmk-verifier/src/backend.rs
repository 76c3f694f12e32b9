//! # Pairing Backend Seam
//!
//! The interface to the external elliptic-curve verification primitive.
//! Implementations receive the campaign's published verification
//! parameters, the full public-signal vector, and the opaque proof blob,
//! and return a boolean verdict.
//!
//! ## Security Invariant
//!
//! The backend call is CPU-bound, bounded in duration, and free of
//! external I/O — it is treated as synchronous. `Send + Sync` is required
//! for concurrent verification across offers.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use vmk_circuits::FieldElement;

use crate::package::ProofPoints;

/// Error from the pairing backend.
///
/// Any backend error makes the proof unverifiable and is treated as a
/// cryptographic rejection — never retried, never trusted.
#[derive(Error, Debug)]
pub enum BackendError {
    /// The verification parameters are malformed for this backend.
    #[error("malformed verification parameters: {0}")]
    MalformedParameters(String),

    /// The proof blob is malformed for this backend.
    #[error("malformed proof: {0}")]
    MalformedProof(String),

    /// The backend failed internally.
    #[error("verification backend failure: {0}")]
    Internal(String),
}

/// Campaign-published verification parameters for one circuit.
///
/// Opaque to this core; the JSON payload is whatever the trusted-setup
/// tooling exported, forwarded to the backend unmodified.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerifyingParameters {
    /// The circuit these parameters verify.
    pub circuit_name: String,
    /// The backend-specific parameter blob.
    pub params: serde_json::Value,
}

impl VerifyingParameters {
    /// Wrap a parameter blob for a circuit.
    pub fn new(circuit_name: impl Into<String>, params: serde_json::Value) -> Self {
        Self {
            circuit_name: circuit_name.into(),
            params,
        }
    }
}

/// The external cryptographic verification primitive.
///
/// `Ok(true)` means the proof is cryptographically valid for the given
/// parameters and public signals; `Ok(false)` means it is not. A valid
/// proof can still prove a false predicate — the caller checks the
/// designated output signal separately.
pub trait PairingBackend: Send + Sync {
    /// Verify a proof against verification parameters and public signals.
    fn verify(
        &self,
        params: &VerifyingParameters,
        public_signals: &[FieldElement],
        proof: &ProofPoints,
    ) -> Result<bool, BackendError>;
}
