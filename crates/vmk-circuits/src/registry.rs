//! # Circuit Registry
//!
//! Static metadata for each supported predicate circuit: name, kind,
//! public-signal layout, and maximum set cardinality. Loaded once at
//! startup; lookups are pure and side-effect free.
//!
//! Circuit kinds form a closed enum. Adding a circuit kind means adding
//! a variant and its expected-signal computation, not open-ended dynamic
//! dispatch — every consumer is forced to handle the new kind by an
//! exhaustive `match`.
//!
//! ## Signal Layout
//!
//! The prover toolchain emits circuit outputs before public inputs, so
//! slot 0 of every builtin circuit is the predicate's validity output
//! (`1` = predicate holds). The registry records which slot that is; the
//! verifier consults it rather than hard-coding an index.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Name of the builtin numeric range circuit.
pub const RANGE_CIRCUIT: &str = "attr_range";

/// Name of the builtin set-membership circuit.
pub const SET_CIRCUIT: &str = "attr_set";

/// Set capacity of the builtin set-membership circuit.
pub const SET_CIRCUIT_CAPACITY: usize = 16;

/// Error resolving a circuit name.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum RegistryError {
    /// No circuit with this name is registered.
    #[error("unknown circuit {0:?}")]
    UnknownCircuit(String),
}

/// The kind of predicate a circuit proves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CircuitKind {
    /// Proves a private value lies within a public `[min, max]` range.
    Range,
    /// Proves a private value's hash is a member of a public hashed set.
    SetMembership,
}

impl std::fmt::Display for CircuitKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Range => "RANGE",
            Self::SetMembership => "SET_MEMBERSHIP",
        };
        f.write_str(s)
    }
}

/// The role of a single public-signal slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SlotRole {
    /// A circuit output (produced by the proof; not compared against the
    /// campaign requirement).
    Output,
    /// A public input (must match the campaign's expected signals exactly).
    PublicInput,
}

/// One named slot in a circuit's public-signal vector.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignalSlot {
    /// Slot name as declared by the circuit (e.g. `min`, `set[3]`).
    pub name: String,
    /// Whether the slot is an output or a public input.
    pub role: SlotRole,
}

impl SignalSlot {
    fn output(name: &str) -> Self {
        Self {
            name: name.to_string(),
            role: SlotRole::Output,
        }
    }

    fn input(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            role: SlotRole::PublicInput,
        }
    }
}

/// Immutable metadata for one supported predicate circuit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CircuitSpec {
    /// Circuit name as referenced by proof packages.
    pub name: String,
    /// The predicate kind this circuit proves.
    pub kind: CircuitKind,
    /// Ordered public-signal layout (outputs and public inputs).
    pub signal_slots: Vec<SignalSlot>,
    /// Capacity of the hashed allow-list, for set-membership circuits.
    pub max_set_size: Option<usize>,
    /// Index of the designated validity output within the signal vector.
    pub output_slot: usize,
}

impl CircuitSpec {
    /// Total number of public signals a conforming proof must present.
    pub fn signal_count(&self) -> usize {
        self.signal_slots.len()
    }
}

/// The set of predicate circuits this deployment supports.
#[derive(Debug, Clone)]
pub struct CircuitRegistry {
    circuits: Vec<CircuitSpec>,
}

impl CircuitRegistry {
    /// Registry of the builtin circuits: `attr_range` and `attr_set`.
    pub fn builtin() -> Self {
        let range = CircuitSpec {
            name: RANGE_CIRCUIT.to_string(),
            kind: CircuitKind::Range,
            signal_slots: vec![
                SignalSlot::output("in_range"),
                SignalSlot::input("min"),
                SignalSlot::input("max"),
            ],
            max_set_size: None,
            output_slot: 0,
        };

        let mut set_slots = vec![SignalSlot::output("is_member")];
        for i in 0..SET_CIRCUIT_CAPACITY {
            set_slots.push(SignalSlot::input(format!("set[{i}]")));
        }
        let set = CircuitSpec {
            name: SET_CIRCUIT.to_string(),
            kind: CircuitKind::SetMembership,
            signal_slots: set_slots,
            max_set_size: Some(SET_CIRCUIT_CAPACITY),
            output_slot: 0,
        };

        Self {
            circuits: vec![range, set],
        }
    }

    /// Resolve a circuit by name.
    pub fn lookup(&self, name: &str) -> Result<&CircuitSpec, RegistryError> {
        self.circuits
            .iter()
            .find(|c| c.name == name)
            .ok_or_else(|| RegistryError::UnknownCircuit(name.to_string()))
    }

    /// All registered circuit names.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.circuits.iter().map(|c| c.name.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_range_circuit() {
        let registry = CircuitRegistry::builtin();
        let spec = registry.lookup(RANGE_CIRCUIT).unwrap();
        assert_eq!(spec.kind, CircuitKind::Range);
        assert_eq!(spec.signal_count(), 3);
        assert_eq!(spec.output_slot, 0);
        assert_eq!(spec.signal_slots[0].role, SlotRole::Output);
        assert_eq!(spec.signal_slots[1].name, "min");
        assert_eq!(spec.signal_slots[2].name, "max");
        assert_eq!(spec.max_set_size, None);
    }

    #[test]
    fn test_lookup_set_circuit() {
        let registry = CircuitRegistry::builtin();
        let spec = registry.lookup(SET_CIRCUIT).unwrap();
        assert_eq!(spec.kind, CircuitKind::SetMembership);
        assert_eq!(spec.signal_count(), 1 + SET_CIRCUIT_CAPACITY);
        assert_eq!(spec.max_set_size, Some(SET_CIRCUIT_CAPACITY));
        assert_eq!(spec.signal_slots[1].name, "set[0]");
        assert_eq!(
            spec.signal_slots[SET_CIRCUIT_CAPACITY].name,
            format!("set[{}]", SET_CIRCUIT_CAPACITY - 1)
        );
    }

    #[test]
    fn test_lookup_unknown_circuit() {
        let registry = CircuitRegistry::builtin();
        assert_eq!(
            registry.lookup("attr_bloom"),
            Err(RegistryError::UnknownCircuit("attr_bloom".to_string()))
        );
    }

    #[test]
    fn test_names_lists_builtins() {
        let registry = CircuitRegistry::builtin();
        let names: Vec<&str> = registry.names().collect();
        assert_eq!(names, vec![RANGE_CIRCUIT, SET_CIRCUIT]);
    }
}
