//! # Campaign Requirements and Expected Public Signals
//!
//! A campaign requirement is the public predicate a proof must satisfy:
//! a numeric range over an attribute, or membership in a categorical
//! allow-list. The requirement is owned by campaign metadata upstream;
//! this core treats it as a read-only input from which it computes the
//! *expected* public-input signals a conforming proof must present.
//!
//! ## Security Invariant
//!
//! The expected-signal computation is what prevents an attacker from
//! proving a true-but-irrelevant statement. A proof of membership in set
//! `A` presented against a campaign requiring set `B` is rejected by
//! element-wise comparison before the expensive pairing check runs.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::field::{hash_to_field, FieldElement, FieldError};
use crate::registry::{CircuitKind, CircuitSpec};

/// Error computing expected signals for a requirement.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum RequirementError {
    /// The requirement's attribute kind does not match the circuit kind.
    #[error("requirement kind {requirement} does not fit circuit kind {circuit}")]
    KindMismatch {
        /// The requirement's kind.
        requirement: CircuitKind,
        /// The circuit's declared kind.
        circuit: CircuitKind,
    },

    /// A range requirement with `min > max` can never be satisfied.
    #[error("empty range: min {min} > max {max}")]
    EmptyRange {
        /// Lower bound.
        min: u64,
        /// Upper bound.
        max: u64,
    },

    /// The allow-list is empty.
    #[error("allowed-value list is empty")]
    EmptySet,

    /// The allow-list exceeds the circuit's set capacity.
    #[error("allowed-value list has {actual} entries, circuit capacity is {capacity}")]
    SetTooLarge {
        /// Entries in the allow-list.
        actual: usize,
        /// The circuit's maximum set cardinality.
        capacity: usize,
    },

    /// Hashing an allowed value failed.
    #[error("cannot hash allowed value: {0}")]
    Hash(#[from] FieldError),
}

/// The public predicate a campaign requires a proof to satisfy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CampaignRequirement {
    /// The attribute value must lie in `[min, max]`, inclusive.
    NumericRange {
        /// Lower bound, inclusive.
        min: u64,
        /// Upper bound, inclusive.
        max: u64,
    },
    /// The attribute value must be one of the allowed strings.
    CategoricalSet {
        /// The allow-list, in campaign-declared order.
        allowed: Vec<String>,
    },
}

impl CampaignRequirement {
    /// The circuit kind this requirement is proven by.
    pub fn circuit_kind(&self) -> CircuitKind {
        match self {
            Self::NumericRange { .. } => CircuitKind::Range,
            Self::CategoricalSet { .. } => CircuitKind::SetMembership,
        }
    }

    /// Compute the expected public-input signals for this requirement
    /// under the given circuit.
    ///
    /// Range: `[min, max]`. Set: the hashed allow-list in declared order,
    /// zero-padded to the circuit's set capacity — `0` is the reserved
    /// padding sentinel that `hash_to_field()` guarantees never to emit.
    ///
    /// The returned vector covers the circuit's `PublicInput` slots only;
    /// output slots are produced by the proof, not expected in advance.
    pub fn expected_signals(
        &self,
        spec: &CircuitSpec,
    ) -> Result<Vec<FieldElement>, RequirementError> {
        if self.circuit_kind() != spec.kind {
            return Err(RequirementError::KindMismatch {
                requirement: self.circuit_kind(),
                circuit: spec.kind,
            });
        }
        match self {
            Self::NumericRange { min, max } => {
                if min > max {
                    return Err(RequirementError::EmptyRange {
                        min: *min,
                        max: *max,
                    });
                }
                Ok(vec![
                    FieldElement::from_u64(*min),
                    FieldElement::from_u64(*max),
                ])
            }
            Self::CategoricalSet { allowed } => {
                if allowed.is_empty() {
                    return Err(RequirementError::EmptySet);
                }
                let capacity = spec.max_set_size.unwrap_or(allowed.len());
                if allowed.len() > capacity {
                    return Err(RequirementError::SetTooLarge {
                        actual: allowed.len(),
                        capacity,
                    });
                }
                let mut signals = Vec::with_capacity(capacity);
                for value in allowed {
                    signals.push(hash_to_field(value)?);
                }
                signals.resize(capacity, FieldElement::ZERO);
                Ok(signals)
            }
        }
    }
}
