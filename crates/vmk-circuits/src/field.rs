//! # Field Elements and the String-to-Field Hashing Scheme
//!
//! Public signals of the predicate circuits are integers modulo the BN254
//! scalar-field prime, transported as decimal strings. This module defines
//! `FieldElement` — a 256-bit value held as four little-endian `u64` limbs
//! with the reduced-mod-p invariant — and `hash_to_field()`, the canonical
//! mapping from an arbitrary attribute string to a field element:
//!
//! ```text
//! hash_to_field(s) = be_uint(SHA-256(utf8(s))) mod p
//! ```
//!
//! ## Security Invariant
//!
//! Determinism is load-bearing: the same string must hash to the same
//! element on every caller, forever. The verifier's element-wise comparison
//! of a campaign's hashed allow-list against a proof's public signals is
//! only sound because both sides compute this exact mapping.
//!
//! The value `0` is reserved as the padding sentinel for set-membership
//! circuits. No non-empty string is *expected* to hash to `0` (a SHA-256
//! digest reducing to exactly `0` mod p); this is an assumption, not a
//! theorem, so `hash_to_field()` guards it explicitly and fails loudly
//! rather than silently emitting the sentinel.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};
use thiserror::Error;

/// The BN254 scalar-field prime, little-endian `u64` limbs.
///
/// p = 21888242871839275222246405745257275088548364400416034343698204186575808495617
const MODULUS: [u64; 4] = [
    0x43E1_F593_F000_0001,
    0x2833_E848_79B9_7091,
    0xB850_45B6_8181_585D,
    0x3064_4E72_E131_A029,
];

/// Maximum number of decimal digits a value below 2^256 can have.
const MAX_DECIMAL_DIGITS: usize = 78;

/// Error constructing a field element.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum FieldError {
    /// The decimal string was empty.
    #[error("field element decimal string is empty")]
    EmptyDecimal,

    /// The decimal string contained a non-digit character.
    #[error("field element decimal string contains non-digit {0:?}")]
    InvalidDigit(char),

    /// The decimal string encodes a value of 2^256 or more.
    #[error("field element decimal string overflows 256 bits")]
    Overflow,

    /// The value is not reduced: it is >= the field modulus.
    ///
    /// Public signals must arrive in canonical reduced form; a
    /// non-canonical encoding of an otherwise-equal value is rejected
    /// rather than reduced, so each element has exactly one wire form.
    #[error("field element {0} is not below the field modulus")]
    NotInField(String),

    /// `hash_to_field()` was called with an empty string.
    #[error("cannot hash an empty string to a field element")]
    EmptyInput,

    /// The digest reduced to 0, colliding with the set-circuit padding
    /// sentinel. Believed unreachable for SHA-256; guarded regardless.
    #[error("string hashes to the reserved padding sentinel 0")]
    PaddingCollision,
}

/// An integer modulo the BN254 scalar-field prime.
///
/// Invariant: always reduced (`< p`). Constructed only through the
/// reducing/validating constructors below.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FieldElement {
    /// Little-endian limbs, least significant first.
    limbs: [u64; 4],
}

impl FieldElement {
    /// The additive identity; reserved as the set-circuit padding sentinel.
    pub const ZERO: Self = Self { limbs: [0; 4] };

    /// The multiplicative identity; the circuits' true-sentinel output.
    pub const ONE: Self = Self { limbs: [1, 0, 0, 0] };

    /// Embed a `u64` into the field.
    pub const fn from_u64(value: u64) -> Self {
        Self {
            limbs: [value, 0, 0, 0],
        }
    }

    /// Interpret 32 big-endian bytes as an unsigned integer and reduce
    /// modulo the field prime.
    pub fn from_be_bytes(bytes: [u8; 32]) -> Self {
        let mut limbs = [0u64; 4];
        for (i, limb) in limbs.iter_mut().enumerate() {
            let offset = 32 - (i + 1) * 8;
            let mut chunk = [0u8; 8];
            chunk.copy_from_slice(&bytes[offset..offset + 8]);
            *limb = u64::from_be_bytes(chunk);
        }
        // A 256-bit value is at most ~5.2 p, so a short subtraction loop
        // fully reduces it.
        while geq(&limbs, &MODULUS) {
            sub_in_place(&mut limbs, &MODULUS);
        }
        Self { limbs }
    }

    /// Parse the decimal-string wire form of a public signal.
    ///
    /// Rejects empty strings, non-digits, values of 2^256 or more, and
    /// values that are not reduced modulo the field prime.
    pub fn parse_decimal(s: &str) -> Result<Self, FieldError> {
        if s.is_empty() {
            return Err(FieldError::EmptyDecimal);
        }
        if s.len() > MAX_DECIMAL_DIGITS {
            return Err(FieldError::Overflow);
        }
        let mut limbs = [0u64; 4];
        for c in s.chars() {
            let digit = c.to_digit(10).ok_or(FieldError::InvalidDigit(c))? as u64;
            mul_small_in_place(&mut limbs, 10)?;
            add_small_in_place(&mut limbs, digit)?;
        }
        if geq(&limbs, &MODULUS) {
            return Err(FieldError::NotInField(s.to_string()));
        }
        Ok(Self { limbs })
    }

    /// Render as the decimal-string wire form (no leading zeros).
    pub fn to_decimal(&self) -> String {
        if self.is_zero() {
            return "0".to_string();
        }
        let mut limbs = self.limbs;
        let mut digits = Vec::new();
        while limbs != [0u64; 4] {
            digits.push(divmod_small_in_place(&mut limbs, 10));
        }
        digits
            .iter()
            .rev()
            .map(|d| char::from(b'0' + *d as u8))
            .collect()
    }

    /// Whether this is the zero element (the padding sentinel).
    pub fn is_zero(&self) -> bool {
        self.limbs == [0u64; 4]
    }
}

impl std::fmt::Display for FieldElement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_decimal())
    }
}

impl Serialize for FieldElement {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_decimal())
    }
}

impl<'de> Deserialize<'de> for FieldElement {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::parse_decimal(&s).map_err(serde::de::Error::custom)
    }
}

/// Hash an arbitrary string to a field element.
///
/// SHA-256 of the UTF-8 bytes, interpreted as a big-endian unsigned
/// integer, reduced modulo the field prime. Deterministic across callers
/// and releases. Collisions are accepted at the residual probability of
/// the digest function; no handling is attempted.
///
/// # Errors
///
/// - [`FieldError::EmptyInput`] for the empty string — the empty string is
///   not a meaningful attribute value, and excluding it keeps the padding
///   sentinel's unreachability claim scoped to non-empty inputs.
/// - [`FieldError::PaddingCollision`] if the digest reduces to exactly 0.
pub fn hash_to_field(value: &str) -> Result<FieldElement, FieldError> {
    if value.is_empty() {
        return Err(FieldError::EmptyInput);
    }
    let digest = Sha256::digest(value.as_bytes());
    let mut bytes = [0u8; 32];
    bytes.copy_from_slice(&digest);
    let element = FieldElement::from_be_bytes(bytes);
    if element.is_zero() {
        return Err(FieldError::PaddingCollision);
    }
    Ok(element)
}

// ─── Limb arithmetic ─────────────────────────────────────────────────

/// Whether `a >= b`, comparing from the most significant limb.
fn geq(a: &[u64; 4], b: &[u64; 4]) -> bool {
    for i in (0..4).rev() {
        if a[i] != b[i] {
            return a[i] > b[i];
        }
    }
    true
}

/// `a -= b`, assuming `a >= b`.
fn sub_in_place(a: &mut [u64; 4], b: &[u64; 4]) {
    let mut borrow = 0u64;
    for i in 0..4 {
        let (d1, b1) = a[i].overflowing_sub(b[i]);
        let (d2, b2) = d1.overflowing_sub(borrow);
        a[i] = d2;
        borrow = u64::from(b1) + u64::from(b2);
    }
}

/// `a *= m`; errors if the product needs a fifth limb.
fn mul_small_in_place(a: &mut [u64; 4], m: u64) -> Result<(), FieldError> {
    let mut carry = 0u128;
    for limb in a.iter_mut() {
        let product = u128::from(*limb) * u128::from(m) + carry;
        *limb = product as u64;
        carry = product >> 64;
    }
    if carry != 0 {
        return Err(FieldError::Overflow);
    }
    Ok(())
}

/// `a += v`; errors if the sum needs a fifth limb.
fn add_small_in_place(a: &mut [u64; 4], v: u64) -> Result<(), FieldError> {
    let mut carry = v;
    for limb in a.iter_mut() {
        let (sum, overflow) = limb.overflowing_add(carry);
        *limb = sum;
        carry = u64::from(overflow);
        if carry == 0 {
            return Ok(());
        }
    }
    if carry != 0 {
        return Err(FieldError::Overflow);
    }
    Ok(())
}

/// `a /= d`, returning the remainder.
fn divmod_small_in_place(a: &mut [u64; 4], d: u64) -> u64 {
    let mut rem = 0u128;
    for i in (0..4).rev() {
        let cur = (rem << 64) | u128::from(a[i]);
        a[i] = (cur / u128::from(d)) as u64;
        rem = cur % u128::from(d);
    }
    rem as u64
}
