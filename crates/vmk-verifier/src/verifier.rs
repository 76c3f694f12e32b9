//! # Proof Verifier
//!
//! Validates a proof package against a campaign requirement through five
//! ordered gates, each a hard fail-fast check:
//!
//! 1. Resolve the circuit in the registry (and its verification
//!    parameters).
//! 2. Check the public-signal vector has the circuit's declared shape.
//! 3. Compare the campaign's expected signals element-wise against the
//!    package's public-input slots.
//! 4. Invoke the external pairing primitive.
//! 5. Check the designated validity output equals the true sentinel `1`.
//!
//! ## Security Invariant
//!
//! Gate 3 runs before the pairing check: it is what stops an attacker
//! from presenting a cryptographically valid proof of a *different*
//! statement (another range, another allow-list) as satisfying this
//! campaign. Gate 5 stops a valid proof of a *false* predicate from
//! counting as satisfaction.
//!
//! Verification has no side effects beyond logging, and a rejection is
//! permanent for that package — resubmission means a new package.

use std::collections::HashMap;
use std::sync::Arc;

use thiserror::Error;
use tracing::debug;

use vmk_circuits::{
    CampaignRequirement, CircuitRegistry, FieldElement, FieldError, RequirementError, SlotRole,
};
use vmk_core::RejectionReason;

use crate::backend::{BackendError, PairingBackend, VerifyingParameters};
use crate::package::ProofPackage;

/// A permanent rejection of one proof package.
#[derive(Error, Debug)]
pub enum VerifyRejection {
    /// The named circuit is not registered (or has no verification
    /// parameters in this deployment).
    #[error("unknown circuit {0:?}")]
    UnknownCircuit(String),

    /// Signal count differs from the circuit's declared layout.
    #[error("public signal count {actual} does not match circuit layout {expected}")]
    SignalShapeMismatch {
        /// Slots the circuit declares.
        expected: usize,
        /// Signals the package presented.
        actual: usize,
    },

    /// A public signal is not a canonical field-element decimal string.
    #[error("public signal {slot:?} is malformed: {source}")]
    MalformedSignal {
        /// The slot whose signal failed to parse.
        slot: String,
        /// The parse failure.
        source: FieldError,
    },

    /// The campaign requirement cannot be expressed for this circuit.
    #[error("requirement does not fit circuit: {0}")]
    RequirementMismatch(#[from] RequirementError),

    /// A public-input signal differs from the campaign's expected value.
    #[error("public signal {slot:?} does not encode the campaign requirement")]
    SignalMismatch {
        /// The first slot that differed.
        slot: String,
    },

    /// The pairing backend failed to process the proof.
    #[error("verification backend rejected the submission: {0}")]
    Backend(#[from] BackendError),

    /// The pairing primitive returned false.
    #[error("proof is cryptographically invalid")]
    CryptographicallyInvalid,

    /// The proof is valid but proves the predicate is false.
    #[error("proof is valid but the predicate is false")]
    PredicateFalse,
}

impl VerifyRejection {
    /// Map onto the user-visible rejection taxonomy.
    pub fn reason(&self) -> RejectionReason {
        match self {
            Self::UnknownCircuit(_) => RejectionReason::UnknownCircuit,
            Self::SignalShapeMismatch { .. } | Self::MalformedSignal { .. } => {
                RejectionReason::SignalShapeMismatch
            }
            Self::RequirementMismatch(_) | Self::SignalMismatch { .. } => {
                RejectionReason::SignalMismatch
            }
            Self::Backend(_) | Self::CryptographicallyInvalid => {
                RejectionReason::CryptographicallyInvalid
            }
            Self::PredicateFalse => RejectionReason::PredicateFalse,
        }
    }
}

/// Verifies proof packages against campaign requirements.
///
/// Holds the circuit registry, the pairing backend, and the verification
/// parameters published for each supported circuit. Pure: shared freely
/// across offers, no per-call state.
pub struct ProofVerifier {
    registry: CircuitRegistry,
    backend: Arc<dyn PairingBackend>,
    parameters: HashMap<String, VerifyingParameters>,
}

impl ProofVerifier {
    /// Create a verifier over a registry and backend, with no parameters
    /// registered yet.
    pub fn new(registry: CircuitRegistry, backend: Arc<dyn PairingBackend>) -> Self {
        Self {
            registry,
            backend,
            parameters: HashMap::new(),
        }
    }

    /// Register verification parameters for a circuit, replacing any
    /// previous set.
    pub fn register_parameters(&mut self, params: VerifyingParameters) {
        self.parameters.insert(params.circuit_name.clone(), params);
    }

    /// Validate a proof package against a campaign requirement.
    ///
    /// Runs the five gates in order and stops at the first failure. No
    /// side effects beyond logging; never retried.
    pub fn verify(
        &self,
        package: &ProofPackage,
        requirement: &CampaignRequirement,
    ) -> Result<(), VerifyRejection> {
        // Gate 1: circuit resolution. A circuit without registered
        // verification parameters is unusable and reported identically.
        let spec = self
            .registry
            .lookup(&package.circuit_name)
            .map_err(|_| VerifyRejection::UnknownCircuit(package.circuit_name.clone()))?;
        let params = self
            .parameters
            .get(&package.circuit_name)
            .ok_or_else(|| VerifyRejection::UnknownCircuit(package.circuit_name.clone()))?;

        // Gate 2: signal shape, before any field parsing or crypto.
        if package.public_signals.len() != spec.signal_count() {
            debug!(
                circuit = %package.circuit_name,
                expected = spec.signal_count(),
                actual = package.public_signals.len(),
                "rejecting proof: signal shape mismatch"
            );
            return Err(VerifyRejection::SignalShapeMismatch {
                expected: spec.signal_count(),
                actual: package.public_signals.len(),
            });
        }

        let mut signals = Vec::with_capacity(package.public_signals.len());
        for (slot, raw) in spec.signal_slots.iter().zip(&package.public_signals) {
            let element =
                FieldElement::parse_decimal(raw).map_err(|source| {
                    VerifyRejection::MalformedSignal {
                        slot: slot.name.clone(),
                        source,
                    }
                })?;
            signals.push(element);
        }

        // Gate 3: the package's public inputs must encode *this*
        // campaign's requirement, not some other true statement.
        let expected = requirement.expected_signals(spec)?;
        let mut expected_iter = expected.iter();
        for (slot, presented) in spec.signal_slots.iter().zip(&signals) {
            if slot.role != SlotRole::PublicInput {
                continue;
            }
            // expected_signals() yields exactly one element per input slot.
            let Some(expected_element) = expected_iter.next() else {
                return Err(VerifyRejection::SignalShapeMismatch {
                    expected: spec.signal_count(),
                    actual: package.public_signals.len(),
                });
            };
            if presented != expected_element {
                debug!(
                    circuit = %package.circuit_name,
                    slot = %slot.name,
                    "rejecting proof: public signal does not match campaign requirement"
                );
                return Err(VerifyRejection::SignalMismatch {
                    slot: slot.name.clone(),
                });
            }
        }

        // Gate 4: the external pairing primitive.
        let valid = self.backend.verify(params, &signals, &package.proof)?;
        if !valid {
            debug!(circuit = %package.circuit_name, "rejecting proof: pairing check failed");
            return Err(VerifyRejection::CryptographicallyInvalid);
        }

        // Gate 5: a valid proof may still prove the predicate false.
        let output = &signals[spec.output_slot];
        if *output != FieldElement::ONE {
            debug!(
                circuit = %package.circuit_name,
                output = %output,
                "rejecting proof: predicate output is not the true sentinel"
            );
            return Err(VerifyRejection::PredicateFalse);
        }

        debug!(circuit = %package.circuit_name, "proof verified");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{dummy_parameters, range_package, set_package, MockPairingBackend};
    use vmk_circuits::registry::{RANGE_CIRCUIT, SET_CIRCUIT, SET_CIRCUIT_CAPACITY};

    fn verifier_with(backend: Arc<MockPairingBackend>) -> ProofVerifier {
        let mut verifier = ProofVerifier::new(CircuitRegistry::builtin(), backend);
        verifier.register_parameters(dummy_parameters(RANGE_CIRCUIT));
        verifier.register_parameters(dummy_parameters(SET_CIRCUIT));
        verifier
    }

    fn range_requirement(min: u64, max: u64) -> CampaignRequirement {
        CampaignRequirement::NumericRange { min, max }
    }

    // Scenario: valid range proof for the campaign's own bounds.
    #[test]
    fn test_valid_range_proof_accepted() {
        let backend = Arc::new(MockPairingBackend::accepting());
        let verifier = verifier_with(backend.clone());
        let package = range_package(40, 60, true);
        verifier
            .verify(&package, &range_requirement(40, 60))
            .unwrap();
        assert_eq!(backend.call_count(), 1);
    }

    #[test]
    fn test_unknown_circuit_rejected_before_anything_else() {
        let backend = Arc::new(MockPairingBackend::accepting());
        let verifier = verifier_with(backend.clone());
        let mut package = range_package(40, 60, true);
        package.circuit_name = "attr_bloom".to_string();
        let rejection = verifier
            .verify(&package, &range_requirement(40, 60))
            .unwrap_err();
        assert!(matches!(rejection, VerifyRejection::UnknownCircuit(_)));
        assert_eq!(rejection.reason(), RejectionReason::UnknownCircuit);
        assert_eq!(backend.call_count(), 0);
    }

    #[test]
    fn test_missing_parameters_reported_as_unknown_circuit() {
        let backend = Arc::new(MockPairingBackend::accepting());
        // No parameters registered at all.
        let verifier = ProofVerifier::new(CircuitRegistry::builtin(), backend);
        let package = range_package(40, 60, true);
        let rejection = verifier
            .verify(&package, &range_requirement(40, 60))
            .unwrap_err();
        assert_eq!(rejection.reason(), RejectionReason::UnknownCircuit);
    }

    #[test]
    fn test_signal_shape_mismatch_rejected() {
        let backend = Arc::new(MockPairingBackend::accepting());
        let verifier = verifier_with(backend.clone());
        let mut package = range_package(40, 60, true);
        package.public_signals.pop();
        let rejection = verifier
            .verify(&package, &range_requirement(40, 60))
            .unwrap_err();
        assert!(matches!(
            rejection,
            VerifyRejection::SignalShapeMismatch {
                expected: 3,
                actual: 2
            }
        ));
        assert_eq!(backend.call_count(), 0);
    }

    #[test]
    fn test_malformed_signal_rejected() {
        let backend = Arc::new(MockPairingBackend::accepting());
        let verifier = verifier_with(backend);
        let mut package = range_package(40, 60, true);
        package.public_signals[1] = "forty".to_string();
        let rejection = verifier
            .verify(&package, &range_requirement(40, 60))
            .unwrap_err();
        assert!(matches!(rejection, VerifyRejection::MalformedSignal { .. }));
        assert_eq!(rejection.reason(), RejectionReason::SignalShapeMismatch);
    }

    // Scenario: proof of the right shape but for different bounds.
    #[test]
    fn test_mismatched_range_rejected_before_crypto() {
        let backend = Arc::new(MockPairingBackend::accepting());
        let verifier = verifier_with(backend.clone());
        let package = range_package(40, 60, true);
        let rejection = verifier
            .verify(&package, &range_requirement(20, 30))
            .unwrap_err();
        assert!(matches!(
            rejection,
            VerifyRejection::SignalMismatch { ref slot } if slot == "min"
        ));
        assert_eq!(rejection.reason(), RejectionReason::SignalMismatch);
        assert_eq!(backend.call_count(), 0);
    }

    // Proving membership in allow-list A against a campaign requiring B.
    #[test]
    fn test_substituted_allow_list_rejected() {
        let backend = Arc::new(MockPairingBackend::accepting());
        let verifier = verifier_with(backend.clone());
        let package = set_package(&["US", "CA"], SET_CIRCUIT_CAPACITY, true);
        let requirement = CampaignRequirement::CategoricalSet {
            allowed: vec!["US".to_string(), "DE".to_string()],
        };
        let rejection = verifier.verify(&package, &requirement).unwrap_err();
        assert_eq!(rejection.reason(), RejectionReason::SignalMismatch);
        assert_eq!(backend.call_count(), 0);
    }

    #[test]
    fn test_matching_allow_list_accepted() {
        let backend = Arc::new(MockPairingBackend::accepting());
        let verifier = verifier_with(backend);
        let package = set_package(&["US", "DE"], SET_CIRCUIT_CAPACITY, true);
        let requirement = CampaignRequirement::CategoricalSet {
            allowed: vec!["US".to_string(), "DE".to_string()],
        };
        verifier.verify(&package, &requirement).unwrap();
    }

    #[test]
    fn test_cryptographically_invalid_rejected() {
        let backend = Arc::new(MockPairingBackend::rejecting());
        let verifier = verifier_with(backend.clone());
        let package = range_package(40, 60, true);
        let rejection = verifier
            .verify(&package, &range_requirement(40, 60))
            .unwrap_err();
        assert!(matches!(
            rejection,
            VerifyRejection::CryptographicallyInvalid
        ));
        assert_eq!(backend.call_count(), 1);
    }

    // A valid proof of a false predicate must not satisfy the campaign.
    #[test]
    fn test_predicate_false_rejected_after_crypto() {
        let backend = Arc::new(MockPairingBackend::accepting());
        let verifier = verifier_with(backend.clone());
        let package = range_package(40, 60, false);
        let rejection = verifier
            .verify(&package, &range_requirement(40, 60))
            .unwrap_err();
        assert!(matches!(rejection, VerifyRejection::PredicateFalse));
        assert_eq!(rejection.reason(), RejectionReason::PredicateFalse);
        assert_eq!(backend.call_count(), 1);
    }

    #[test]
    fn test_requirement_kind_mismatch_maps_to_signal_mismatch() {
        let backend = Arc::new(MockPairingBackend::accepting());
        let verifier = verifier_with(backend);
        let package = range_package(40, 60, true);
        let requirement = CampaignRequirement::CategoricalSet {
            allowed: vec!["US".to_string()],
        };
        let rejection = verifier.verify(&package, &requirement).unwrap_err();
        assert!(matches!(rejection, VerifyRejection::RequirementMismatch(_)));
        assert_eq!(rejection.reason(), RejectionReason::SignalMismatch);
    }
}
