//! # Offer Storage
//!
//! Durable storage for offers: one JSON document per offer, addressed by
//! offer id. Two implementations — an in-memory map for tests and a
//! directory-backed store whose contents survive process restart.
//!
//! ## Security Invariant
//!
//! Writes in the directory store go to a temporary file first and are
//! renamed into place, so a crash mid-write never leaves a truncated
//! offer document. Offer ids are constrained to a filesystem-safe
//! character set at construction, so an id can never escape the root
//! directory.

use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use thiserror::Error;

use vmk_core::OfferId;

use crate::offer::Offer;

/// Errors from offer storage.
#[derive(Error, Debug)]
pub enum StoreError {
    /// Underlying filesystem failure.
    #[error("offer store I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// An offer document failed to serialize or parse.
    #[error("offer document corrupt or unserializable: {0}")]
    Corrupt(#[from] serde_json::Error),
}

/// Durable offer storage keyed by offer id.
pub trait OfferStore: Send + Sync {
    /// Load the offer with this id, if present.
    fn load(&self, offer_id: &OfferId) -> Result<Option<Offer>, StoreError>;

    /// Persist the offer, replacing any previous version.
    fn save(&self, offer: &Offer) -> Result<(), StoreError>;

    /// All offer ids currently in the store, in unspecified order.
    fn ids(&self) -> Result<Vec<OfferId>, StoreError>;
}

// ─── In-memory store ─────────────────────────────────────────────────

/// Non-durable store for tests and ephemeral deployments.
#[derive(Debug, Default)]
pub struct MemoryOfferStore {
    offers: RwLock<HashMap<OfferId, Offer>>,
}

impl MemoryOfferStore {
    /// Create an empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }
}

impl OfferStore for MemoryOfferStore {
    fn load(&self, offer_id: &OfferId) -> Result<Option<Offer>, StoreError> {
        let offers = match self.offers.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        Ok(offers.get(offer_id).cloned())
    }

    fn save(&self, offer: &Offer) -> Result<(), StoreError> {
        let mut offers = match self.offers.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        offers.insert(offer.offer_id.clone(), offer.clone());
        Ok(())
    }

    fn ids(&self) -> Result<Vec<OfferId>, StoreError> {
        let offers = match self.offers.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        Ok(offers.keys().cloned().collect())
    }
}

// ─── Directory-backed store ──────────────────────────────────────────

/// Directory-backed store: one `{offer_id}.json` document per offer.
#[derive(Debug)]
pub struct DirOfferStore {
    root: PathBuf,
}

impl DirOfferStore {
    /// Open (creating if necessary) a store rooted at `root`.
    pub fn open(root: impl AsRef<Path>) -> Result<Self, StoreError> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    fn path_for(&self, offer_id: &OfferId) -> PathBuf {
        self.root.join(format!("{}.json", offer_id.as_str()))
    }
}

impl OfferStore for DirOfferStore {
    fn load(&self, offer_id: &OfferId) -> Result<Option<Offer>, StoreError> {
        let path = self.path_for(offer_id);
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        Ok(Some(serde_json::from_slice(&bytes)?))
    }

    fn save(&self, offer: &Offer) -> Result<(), StoreError> {
        let path = self.path_for(&offer.offer_id);
        let tmp = path.with_extension("json.tmp");
        let json = serde_json::to_vec_pretty(offer)?;
        {
            let mut file = fs::File::create(&tmp)?;
            file.write_all(&json)?;
            file.sync_all()?;
        }
        fs::rename(&tmp, &path)?;
        Ok(())
    }

    fn ids(&self) -> Result<Vec<OfferId>, StoreError> {
        let mut ids = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            let Some(stem) = name.strip_suffix(".json") else {
                continue;
            };
            // Stray files that are not valid offer ids are skipped.
            if let Ok(id) = OfferId::new(stem) {
                ids.push(id);
            }
        }
        Ok(ids)
    }
}
