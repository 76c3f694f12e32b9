//! # Proof Package Wire Format
//!
//! The proof-submission payload emitted by the attribute holder's proving
//! toolchain: a circuit name, an opaque Groth16-style proof blob, and the
//! ordered public signals as decimal strings.
//!
//! The proof blob is forwarded to the pairing backend verbatim — this
//! core never inspects curve points. Only the circuit name and the public
//! signals are interpreted here.

use serde::{Deserialize, Serialize};

/// Opaque proof points as emitted by the proving toolchain.
///
/// Forwarded to the pairing backend unmodified. The nested-array shapes
/// are whatever the toolchain produced; validating them is the backend's
/// job, not ours.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProofPoints {
    /// First proof point (G1, affine coordinates as decimal strings).
    pub pi_a: Vec<String>,
    /// Second proof point (G2, coordinate pairs as decimal strings).
    pub pi_b: Vec<Vec<String>>,
    /// Third proof point (G1, affine coordinates as decimal strings).
    pub pi_c: Vec<String>,
    /// Proof protocol tag (e.g. `groth16`), if the toolchain emitted one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub protocol: Option<String>,
    /// Curve tag (e.g. `bn128`), if the toolchain emitted one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub curve: Option<String>,
}

/// A complete proof submission for one attribute requirement.
///
/// Immutable once received. The core validates it and either accepts or
/// permanently rejects it; a corrected proof arrives as a new package.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProofPackage {
    /// Name of the circuit this proof was generated for.
    pub circuit_name: String,
    /// The opaque proof blob.
    pub proof: ProofPoints,
    /// Ordered public signals as decimal-string field elements.
    pub public_signals: Vec<String>,
}
