//! # Escrow Records
//!
//! One durable [`EscrowRecord`] per offer, created exactly once when
//! funding is first requested. The record is the system's own guard
//! against double-funding: [`EscrowStore::create_if_absent`] has
//! unique-key semantics on offer id, so a second funding attempt — from
//! a concurrent caller or after a restart — observes the existing record
//! instead of creating a duplicate.

use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use vmk_core::{Amount, LedgerHandle, OfferId, Timestamp};

/// Status of the escrowed funds for an offer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EscrowStatus {
    /// Funding requested; no ledger confirmation yet.
    Pending,
    /// The ledger confirmed the funds are locked.
    Confirmed,
    /// Funding failed permanently; no funds are locked.
    Failed,
}

/// The durable escrow record for one offer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EscrowRecord {
    /// The offer these funds belong to (unique key).
    pub offer_id: OfferId,
    /// Amount locked (or to be locked).
    pub amount: Amount,
    /// Current status.
    pub status: EscrowStatus,
    /// Handle of the confirmed funding transaction, once known.
    pub ledger_handle: Option<LedgerHandle>,
    /// When the record was created.
    pub created_at: Timestamp,
    /// When the record last changed.
    pub updated_at: Timestamp,
}

impl EscrowRecord {
    /// A fresh pending record.
    pub fn pending(offer_id: OfferId, amount: Amount, now: Timestamp) -> Self {
        Self {
            offer_id,
            amount,
            status: EscrowStatus::Pending,
            ledger_handle: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Errors from escrow-record storage.
#[derive(Error, Debug)]
pub enum EscrowStoreError {
    /// Underlying filesystem failure.
    #[error("escrow store I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A record document failed to serialize or parse.
    #[error("escrow record corrupt or unserializable: {0}")]
    Corrupt(#[from] serde_json::Error),
}

/// Durable escrow-record storage keyed by offer id.
pub trait EscrowStore: Send + Sync {
    /// Insert the record only if no record exists for its offer id.
    /// Returns `true` if inserted, `false` if a record already existed.
    fn create_if_absent(&self, record: &EscrowRecord) -> Result<bool, EscrowStoreError>;

    /// Load the record for this offer, if present.
    fn get(&self, offer_id: &OfferId) -> Result<Option<EscrowRecord>, EscrowStoreError>;

    /// Replace an existing record.
    fn update(&self, record: &EscrowRecord) -> Result<(), EscrowStoreError>;

    /// All records, in unspecified order.
    fn list(&self) -> Result<Vec<EscrowRecord>, EscrowStoreError>;
}

// ─── In-memory store ─────────────────────────────────────────────────

/// Non-durable escrow store for tests.
#[derive(Debug, Default)]
pub struct MemoryEscrowStore {
    records: RwLock<HashMap<OfferId, EscrowRecord>>,
}

impl MemoryEscrowStore {
    /// Create an empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }
}

impl EscrowStore for MemoryEscrowStore {
    fn create_if_absent(&self, record: &EscrowRecord) -> Result<bool, EscrowStoreError> {
        let mut records = match self.records.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if records.contains_key(&record.offer_id) {
            return Ok(false);
        }
        records.insert(record.offer_id.clone(), record.clone());
        Ok(true)
    }

    fn get(&self, offer_id: &OfferId) -> Result<Option<EscrowRecord>, EscrowStoreError> {
        let records = match self.records.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        Ok(records.get(offer_id).cloned())
    }

    fn update(&self, record: &EscrowRecord) -> Result<(), EscrowStoreError> {
        let mut records = match self.records.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        records.insert(record.offer_id.clone(), record.clone());
        Ok(())
    }

    fn list(&self) -> Result<Vec<EscrowRecord>, EscrowStoreError> {
        let records = match self.records.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        Ok(records.values().cloned().collect())
    }
}

// ─── Directory-backed store ──────────────────────────────────────────

/// Directory-backed store: one `{offer_id}.json` document per record.
///
/// `create_if_absent` uses `create_new` so the uniqueness check and the
/// file creation are a single filesystem operation.
#[derive(Debug)]
pub struct DirEscrowStore {
    root: PathBuf,
}

impl DirEscrowStore {
    /// Open (creating if necessary) a store rooted at `root`.
    pub fn open(root: impl AsRef<Path>) -> Result<Self, EscrowStoreError> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    fn path_for(&self, offer_id: &OfferId) -> PathBuf {
        self.root.join(format!("{}.json", offer_id.as_str()))
    }

    fn write_record(path: &Path, record: &EscrowRecord) -> Result<(), EscrowStoreError> {
        let tmp = path.with_extension("json.tmp");
        let json = serde_json::to_vec_pretty(record)?;
        {
            let mut file = fs::File::create(&tmp)?;
            file.write_all(&json)?;
            file.sync_all()?;
        }
        fs::rename(&tmp, path)?;
        Ok(())
    }
}

impl EscrowStore for DirEscrowStore {
    fn create_if_absent(&self, record: &EscrowRecord) -> Result<bool, EscrowStoreError> {
        let path = self.path_for(&record.offer_id);
        let json = serde_json::to_vec_pretty(record)?;
        let mut file = match fs::OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => return Ok(false),
            Err(e) => return Err(e.into()),
        };
        file.write_all(&json)?;
        file.sync_all()?;
        Ok(true)
    }

    fn get(&self, offer_id: &OfferId) -> Result<Option<EscrowRecord>, EscrowStoreError> {
        let path = self.path_for(offer_id);
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        Ok(Some(serde_json::from_slice(&bytes)?))
    }

    fn update(&self, record: &EscrowRecord) -> Result<(), EscrowStoreError> {
        Self::write_record(&self.path_for(&record.offer_id), record)
    }

    fn list(&self) -> Result<Vec<EscrowRecord>, EscrowStoreError> {
        let mut records = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            if !name.ends_with(".json") {
                continue;
            }
            let bytes = fs::read(entry.path())?;
            records.push(serde_json::from_slice(&bytes)?);
        }
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: &str) -> EscrowRecord {
        EscrowRecord::pending(
            OfferId::new(id).unwrap(),
            Amount::from_units(1000),
            Timestamp::parse("2026-01-15T12:00:00Z").unwrap(),
        )
    }

    #[test]
    fn test_memory_create_if_absent_is_unique() {
        let store = MemoryEscrowStore::new();
        assert!(store.create_if_absent(&record("e-1")).unwrap());
        assert!(!store.create_if_absent(&record("e-1")).unwrap());
        assert_eq!(store.list().unwrap().len(), 1);
    }

    #[test]
    fn test_dir_create_if_absent_is_unique() {
        let dir = tempfile::tempdir().unwrap();
        let store = DirEscrowStore::open(dir.path()).unwrap();
        assert!(store.create_if_absent(&record("e-2")).unwrap());
        assert!(!store.create_if_absent(&record("e-2")).unwrap());
    }

    #[test]
    fn test_dir_update_and_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let id = OfferId::new("e-3").unwrap();
        {
            let store = DirEscrowStore::open(dir.path()).unwrap();
            let mut rec = record("e-3");
            store.create_if_absent(&rec).unwrap();
            rec.status = EscrowStatus::Confirmed;
            rec.ledger_handle = Some(LedgerHandle("tx-1".to_string()));
            store.update(&rec).unwrap();
        }
        let store = DirEscrowStore::open(dir.path()).unwrap();
        let loaded = store.get(&id).unwrap().unwrap();
        assert_eq!(loaded.status, EscrowStatus::Confirmed);
        assert_eq!(loaded.ledger_handle, Some(LedgerHandle("tx-1".into())));
    }
}
