//! # Settlement Task Queue
//!
//! Durable retry bookkeeping for ledger submissions. Each in-flight
//! funding or settlement request is one [`SettlementTask`] keyed by
//! `(offer_id, kind)`; a task survives restart, so a process that dies
//! between a ledger timeout and the retry resumes where it left off.
//! [`RetryPolicy`] bounds the attempts and spaces them with capped
//! exponential backoff.

use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use vmk_core::{Amount, OfferId, Timestamp, TimestampError};

use crate::ledger::LedgerRequestKind;

/// Retry policy for ledger submissions.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total submission attempts before the request fails permanently.
    pub max_attempts: u32,
    /// Delay before the first retry, in seconds.
    pub base_delay_secs: u64,
    /// Upper bound on any single delay, in seconds.
    pub max_delay_secs: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_secs: 5,
            max_delay_secs: 300,
        }
    }
}

impl RetryPolicy {
    /// Delay before the retry following attempt number `attempt`
    /// (1-based): `base * 2^(attempt-1)`, capped.
    pub fn delay_for(&self, attempt: u32) -> u64 {
        let doublings = attempt.saturating_sub(1).min(32);
        self.base_delay_secs
            .saturating_mul(1u64 << doublings)
            .min(self.max_delay_secs)
    }
}

/// One pending ledger submission, durable across restarts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettlementTask {
    /// The offer being funded or settled.
    pub offer_id: OfferId,
    /// Fund or settle.
    pub kind: LedgerRequestKind,
    /// Amount to move (copied from the directive so the request can be
    /// rebuilt after a restart).
    pub amount: Amount,
    /// Payout destination.
    pub destination: String,
    /// Submissions made so far.
    pub attempt_count: u32,
    /// Earliest time the next submission may run.
    pub next_retry_at: Timestamp,
    /// Message from the most recent failed attempt.
    pub last_error: Option<String>,
    /// When the task was enqueued.
    pub created_at: Timestamp,
}

impl SettlementTask {
    /// A fresh task, due immediately.
    pub fn new(
        offer_id: OfferId,
        kind: LedgerRequestKind,
        amount: Amount,
        destination: String,
        now: Timestamp,
    ) -> Self {
        Self {
            offer_id,
            kind,
            amount,
            destination,
            attempt_count: 0,
            next_retry_at: now,
            last_error: None,
            created_at: now,
        }
    }

    /// Record a timed-out attempt and schedule the next one.
    pub fn reschedule(
        &mut self,
        policy: &RetryPolicy,
        error: &str,
        now: Timestamp,
    ) -> Result<(), TimestampError> {
        self.last_error = Some(error.to_string());
        self.next_retry_at = now.checked_add_secs(policy.delay_for(self.attempt_count))?;
        Ok(())
    }

    /// Whether the retry budget is spent.
    pub fn is_exhausted(&self, policy: &RetryPolicy) -> bool {
        self.attempt_count >= policy.max_attempts
    }
}

/// Errors from task storage.
#[derive(Error, Debug)]
pub enum TaskStoreError {
    /// Underlying filesystem failure.
    #[error("task store I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A task document failed to serialize or parse.
    #[error("settlement task corrupt or unserializable: {0}")]
    Corrupt(#[from] serde_json::Error),
}

/// Durable storage for settlement tasks, keyed by `(offer_id, kind)`.
pub trait TaskStore: Send + Sync {
    /// Insert or replace the task for its `(offer_id, kind)`.
    fn upsert(&self, task: &SettlementTask) -> Result<(), TaskStoreError>;

    /// Remove the task for this key, if present.
    fn remove(&self, offer_id: &OfferId, kind: LedgerRequestKind) -> Result<(), TaskStoreError>;

    /// Load the task for this key, if present.
    fn get(
        &self,
        offer_id: &OfferId,
        kind: LedgerRequestKind,
    ) -> Result<Option<SettlementTask>, TaskStoreError>;

    /// Tasks whose `next_retry_at` is at or before `now`.
    fn due(&self, now: Timestamp) -> Result<Vec<SettlementTask>, TaskStoreError>;

    /// All tasks, in unspecified order.
    fn all(&self) -> Result<Vec<SettlementTask>, TaskStoreError>;
}

// ─── In-memory store ─────────────────────────────────────────────────

/// Non-durable task store for tests.
#[derive(Debug, Default)]
pub struct MemoryTaskStore {
    tasks: RwLock<HashMap<(OfferId, LedgerRequestKind), SettlementTask>>,
}

impl MemoryTaskStore {
    /// Create an empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }
}

impl TaskStore for MemoryTaskStore {
    fn upsert(&self, task: &SettlementTask) -> Result<(), TaskStoreError> {
        let mut tasks = match self.tasks.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        tasks.insert((task.offer_id.clone(), task.kind), task.clone());
        Ok(())
    }

    fn remove(&self, offer_id: &OfferId, kind: LedgerRequestKind) -> Result<(), TaskStoreError> {
        let mut tasks = match self.tasks.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        tasks.remove(&(offer_id.clone(), kind));
        Ok(())
    }

    fn get(
        &self,
        offer_id: &OfferId,
        kind: LedgerRequestKind,
    ) -> Result<Option<SettlementTask>, TaskStoreError> {
        let tasks = match self.tasks.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        Ok(tasks.get(&(offer_id.clone(), kind)).cloned())
    }

    fn due(&self, now: Timestamp) -> Result<Vec<SettlementTask>, TaskStoreError> {
        Ok(self
            .all()?
            .into_iter()
            .filter(|t| t.next_retry_at <= now)
            .collect())
    }

    fn all(&self) -> Result<Vec<SettlementTask>, TaskStoreError> {
        let tasks = match self.tasks.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        Ok(tasks.values().cloned().collect())
    }
}

// ─── Directory-backed store ──────────────────────────────────────────

/// Directory-backed store: one `{offer_id}.{kind}.json` per task.
#[derive(Debug)]
pub struct DirTaskStore {
    root: PathBuf,
}

impl DirTaskStore {
    /// Open (creating if necessary) a store rooted at `root`.
    pub fn open(root: impl AsRef<Path>) -> Result<Self, TaskStoreError> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    fn path_for(&self, offer_id: &OfferId, kind: LedgerRequestKind) -> PathBuf {
        self.root.join(format!("{}.{kind}.json", offer_id.as_str()))
    }
}

impl TaskStore for DirTaskStore {
    fn upsert(&self, task: &SettlementTask) -> Result<(), TaskStoreError> {
        let path = self.path_for(&task.offer_id, task.kind);
        let tmp = path.with_extension("json.tmp");
        let json = serde_json::to_vec_pretty(task)?;
        {
            let mut file = fs::File::create(&tmp)?;
            file.write_all(&json)?;
            file.sync_all()?;
        }
        fs::rename(&tmp, &path)?;
        Ok(())
    }

    fn remove(&self, offer_id: &OfferId, kind: LedgerRequestKind) -> Result<(), TaskStoreError> {
        match fs::remove_file(self.path_for(offer_id, kind)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn get(
        &self,
        offer_id: &OfferId,
        kind: LedgerRequestKind,
    ) -> Result<Option<SettlementTask>, TaskStoreError> {
        let bytes = match fs::read(self.path_for(offer_id, kind)) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        Ok(Some(serde_json::from_slice(&bytes)?))
    }

    fn due(&self, now: Timestamp) -> Result<Vec<SettlementTask>, TaskStoreError> {
        Ok(self
            .all()?
            .into_iter()
            .filter(|t| t.next_retry_at <= now)
            .collect())
    }

    fn all(&self) -> Result<Vec<SettlementTask>, TaskStoreError> {
        let mut tasks = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            if !name.ends_with(".json") {
                continue;
            }
            let bytes = fs::read(entry.path())?;
            tasks.push(serde_json::from_slice(&bytes)?);
        }
        Ok(tasks)
    }
}
