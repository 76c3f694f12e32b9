//! # vmk-escrow — Escrow and Settlement
//!
//! The money-movement half of the offer core. An accepted offer is
//! funded into escrow on the external settlement ledger, then released
//! to the payout destination once settlement is requested; both legs
//! are asynchronous, retried on timeout with capped backoff, and
//! survive process restart through durable records and tasks.
//!
//! ## Architecture
//!
//! - **Ledger seam** (`ledger.rs`): the `LedgerClient` trait and its
//!   typed request/receipt/error surface. The only place money moves.
//!
//! - **Escrow records** (`record.rs`): one unique record per offer,
//!   created with `create_if_absent` semantics — the durable guard
//!   against double-funding.
//!
//! - **Settlement queue** (`queue.rs`): durable per-`(offer, kind)`
//!   retry tasks with a bounded, exponentially backed-off budget.
//!
//! - **Gateway** (`gateway.rs`): orchestrates directive → record →
//!   task → ledger submission → offer confirmation/failure.
//!
//! - **Mock ledger** (`mock.rs`): scripted outcomes for tests.
//!
//! ## Security Invariant
//!
//! At most one funding transaction per offer ever reaches the ledger
//! as a *new* request; retries reuse the same `(offer_id, kind)` key
//! the ledger deduplicates on. A timeout is never treated as failure —
//! only a ledger rejection or retry exhaustion terminates an offer.

pub mod gateway;
pub mod ledger;
pub mod mock;
pub mod queue;
pub mod record;

pub use gateway::{AttemptOutcome, EscrowGateway, GatewayError, LedgerConfirmation};
pub use ledger::{LedgerClient, LedgerError, LedgerReceipt, LedgerRequest, LedgerRequestKind};
pub use mock::{MockLedger, MockOutcome};
pub use queue::{
    DirTaskStore, MemoryTaskStore, RetryPolicy, SettlementTask, TaskStore, TaskStoreError,
};
pub use record::{
    DirEscrowStore, EscrowRecord, EscrowStatus, EscrowStore, EscrowStoreError, MemoryEscrowStore,
};
