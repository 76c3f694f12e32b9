//! # Mock Pairing Backend and Package Builders
//!
//! A scripted stand-in for the external verification primitive, plus
//! helpers that build well-formed proof packages for the builtin
//! circuits. Used by this crate's tests and by the offer/escrow crates'
//! lifecycle tests.
//!
//! ## Security Notice
//!
//! This backend performs NO cryptography. It returns a configured
//! verdict and records what it was asked to verify. It exists so the
//! gate ordering and state-machine logic can be tested without a real
//! pairing library.

use std::sync::Mutex;

use vmk_circuits::{hash_to_field, FieldElement};

use crate::backend::{BackendError, PairingBackend, VerifyingParameters};
use crate::package::{ProofPackage, ProofPoints};

/// One recorded backend invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedCall {
    /// Circuit name from the verification parameters.
    pub circuit_name: String,
    /// Number of public signals forwarded.
    pub signal_count: usize,
}

/// A pairing backend with a fixed scripted verdict.
#[derive(Debug)]
pub struct MockPairingBackend {
    verdict: bool,
    calls: Mutex<Vec<RecordedCall>>,
}

impl MockPairingBackend {
    /// A backend that accepts every proof.
    pub fn accepting() -> Self {
        Self {
            verdict: true,
            calls: Mutex::new(Vec::new()),
        }
    }

    /// A backend that rejects every proof as cryptographically invalid.
    pub fn rejecting() -> Self {
        Self {
            verdict: false,
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Number of verification calls made so far.
    pub fn call_count(&self) -> usize {
        self.calls.lock().map(|c| c.len()).unwrap_or(0)
    }

    /// Snapshot of the recorded calls.
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }
}

impl PairingBackend for MockPairingBackend {
    fn verify(
        &self,
        params: &VerifyingParameters,
        public_signals: &[FieldElement],
        _proof: &ProofPoints,
    ) -> Result<bool, BackendError> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(RecordedCall {
                circuit_name: params.circuit_name.clone(),
                signal_count: public_signals.len(),
            });
        }
        Ok(self.verdict)
    }
}

/// Placeholder proof points in the shape the proving toolchain emits.
pub fn dummy_points() -> ProofPoints {
    ProofPoints {
        pi_a: vec!["1".to_string(), "2".to_string(), "1".to_string()],
        pi_b: vec![
            vec!["3".to_string(), "4".to_string()],
            vec!["5".to_string(), "6".to_string()],
            vec!["1".to_string(), "0".to_string()],
        ],
        pi_c: vec!["7".to_string(), "8".to_string(), "1".to_string()],
        protocol: Some("groth16".to_string()),
        curve: Some("bn128".to_string()),
    }
}

/// Build a range-circuit package: signals `[out, min, max]`.
///
/// `in_range` controls the predicate output slot (`1` = the private
/// value is inside the range).
pub fn range_package(min: u64, max: u64, in_range: bool) -> ProofPackage {
    ProofPackage {
        circuit_name: vmk_circuits::registry::RANGE_CIRCUIT.to_string(),
        proof: dummy_points(),
        public_signals: vec![
            if in_range { "1" } else { "0" }.to_string(),
            min.to_string(),
            max.to_string(),
        ],
    }
}

/// Build a set-circuit package: signals `[out, hash(allowed[0]), ...]`,
/// zero-padded to `capacity`.
///
/// # Panics
///
/// Panics if an allowed value cannot be hashed (test helper only).
pub fn set_package(allowed: &[&str], capacity: usize, is_member: bool) -> ProofPackage {
    let mut signals = vec![if is_member { "1" } else { "0" }.to_string()];
    for value in allowed {
        signals.push(
            hash_to_field(value)
                .expect("test allow-list value must hash")
                .to_decimal(),
        );
    }
    while signals.len() < capacity + 1 {
        signals.push("0".to_string());
    }
    ProofPackage {
        circuit_name: vmk_circuits::registry::SET_CIRCUIT.to_string(),
        proof: dummy_points(),
        public_signals: signals,
    }
}

/// Verification parameters accepted by the mock backend.
pub fn dummy_parameters(circuit_name: &str) -> VerifyingParameters {
    VerifyingParameters::new(
        circuit_name,
        serde_json::json!({ "protocol": "groth16", "curve": "bn128" }),
    )
}
