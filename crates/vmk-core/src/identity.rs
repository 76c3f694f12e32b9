//! # Domain Identity Newtypes
//!
//! Newtype wrappers for all domain identifiers in the offer core. These
//! prevent accidental identifier confusion — you cannot pass a
//! `CampaignId` where an `OfferId` is expected.
//!
//! ## Security Invariant
//!
//! `OfferId` doubles as the idempotency key for funding: escrow records
//! are keyed by it, and duplicate funding is prevented by its uniqueness.
//! The constructor therefore restricts the character set so the id is
//! safe to use verbatim as a storage key and file name.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Maximum accepted length of a caller-supplied offer identifier.
pub const MAX_OFFER_ID_LEN: usize = 128;

/// Error constructing a domain identifier.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum IdentityError {
    /// The identifier was empty after trimming.
    #[error("identifier must not be empty")]
    Empty,

    /// The identifier contained a character outside `[A-Za-z0-9._-]`.
    #[error("identifier contains invalid character {0:?}")]
    InvalidCharacter(char),

    /// The identifier exceeded the maximum length.
    #[error("identifier exceeds {MAX_OFFER_ID_LEN} characters")]
    TooLong,
}

/// Unique identifier for an offer.
///
/// Caller-supplied or generated; stable across retries — this is the
/// idempotency key that prevents double-funding. Restricted to
/// `[A-Za-z0-9._-]` so it can serve directly as a storage key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OfferId(String);

impl OfferId {
    /// Create an offer identifier from a caller-supplied string.
    pub fn new(id: impl Into<String>) -> Result<Self, IdentityError> {
        let id = id.into();
        let trimmed = id.trim();
        if trimmed.is_empty() {
            return Err(IdentityError::Empty);
        }
        if trimmed.len() > MAX_OFFER_ID_LEN {
            return Err(IdentityError::TooLong);
        }
        if let Some(c) = trimmed
            .chars()
            .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-')))
        {
            return Err(IdentityError::InvalidCharacter(c));
        }
        Ok(Self(trimmed.to_string()))
    }

    /// Generate a fresh random offer identifier.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Access the identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Unique identifier for an advertising campaign.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CampaignId(pub Uuid);

impl CampaignId {
    /// Generate a new random campaign identifier.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Access the inner UUID.
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for CampaignId {
    fn default() -> Self {
        Self::new()
    }
}

/// Opaque handle to a transaction on the external settlement ledger.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LedgerHandle(pub String);

impl LedgerHandle {
    /// Access the handle as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// The kind of private attribute a campaign requirement targets
/// (e.g. `age`, `income`, `country`, `interest`).
///
/// Normalized to lowercase so map lookups are case-insensitive at the
/// boundary and exact everywhere else.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AttributeKind(String);

impl AttributeKind {
    /// Create an attribute kind key from a caller-supplied string.
    pub fn new(kind: impl Into<String>) -> Result<Self, IdentityError> {
        let kind = kind.into();
        let trimmed = kind.trim().to_ascii_lowercase();
        if trimmed.is_empty() {
            return Err(IdentityError::Empty);
        }
        Ok(Self(trimmed))
    }

    /// Access the kind as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for OfferId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "offer:{}", self.0)
    }
}

impl std::fmt::Display for CampaignId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "campaign:{}", self.0)
    }
}

impl std::fmt::Display for LedgerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ledger:{}", self.0)
    }
}

impl std::fmt::Display for AttributeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_offer_id_accepts_simple_keys() {
        let id = OfferId::new("offer-2024_001.a").unwrap();
        assert_eq!(id.as_str(), "offer-2024_001.a");
    }

    #[test]
    fn test_offer_id_trims_whitespace() {
        let id = OfferId::new("  abc  ").unwrap();
        assert_eq!(id.as_str(), "abc");
    }

    #[test]
    fn test_offer_id_rejects_empty() {
        assert_eq!(OfferId::new("   "), Err(IdentityError::Empty));
    }

    #[test]
    fn test_offer_id_rejects_path_characters() {
        assert_eq!(
            OfferId::new("../escape"),
            Err(IdentityError::InvalidCharacter('/'))
        );
    }

    #[test]
    fn test_offer_id_rejects_overlong() {
        let long = "a".repeat(MAX_OFFER_ID_LEN + 1);
        assert_eq!(OfferId::new(long), Err(IdentityError::TooLong));
    }

    #[test]
    fn test_generated_offer_ids_are_unique() {
        assert_ne!(OfferId::generate(), OfferId::generate());
    }

    #[test]
    fn test_attribute_kind_normalizes_case() {
        let kind = AttributeKind::new("Age").unwrap();
        assert_eq!(kind.as_str(), "age");
        assert_eq!(kind, AttributeKind::new("AGE").unwrap());
    }

    #[test]
    fn test_display_namespacing() {
        let id = OfferId::new("x1").unwrap();
        assert_eq!(id.to_string(), "offer:x1");
        let handle = LedgerHandle("tx-9".to_string());
        assert_eq!(handle.to_string(), "ledger:tx-9");
    }

    #[test]
    fn test_offer_id_serde_roundtrip() {
        let id = OfferId::new("abc-123").unwrap();
        let json = serde_json::to_string(&id).unwrap();
        let parsed: OfferId = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, id);
    }
}
