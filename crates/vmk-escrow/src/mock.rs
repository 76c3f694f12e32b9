//! # Scripted Mock Ledger
//!
//! A [`LedgerClient`] whose outcomes are scripted per `(offer_id, kind)`
//! and consumed in order, with a log of every submitted request. Used by
//! the settlement tests to exercise confirmation, permanent rejection,
//! and timeout-then-recover sequences. Performs no I/O.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;

use vmk_core::{LedgerHandle, OfferId};

use crate::ledger::{LedgerClient, LedgerError, LedgerReceipt, LedgerRequest, LedgerRequestKind};

/// One scripted outcome for a submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockOutcome {
    /// Confirm with a generated handle.
    Confirm,
    /// Permanently reject with this message.
    Reject(String),
    /// Time out (outcome unknown).
    Timeout,
}

#[derive(Debug, Default)]
struct MockState {
    script: HashMap<(OfferId, LedgerRequestKind), VecDeque<MockOutcome>>,
    requests: Vec<LedgerRequest>,
    next_handle: u64,
}

/// A ledger client with scripted outcomes. Unscripted submissions
/// confirm immediately.
#[derive(Debug, Default)]
pub struct MockLedger {
    state: Mutex<MockState>,
}

impl MockLedger {
    /// A mock ledger that confirms everything.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue outcomes for submissions of this `(offer, kind)`, consumed
    /// in order. Once the queue is empty, submissions confirm.
    pub fn script(
        &self,
        offer_id: OfferId,
        kind: LedgerRequestKind,
        outcomes: impl IntoIterator<Item = MockOutcome>,
    ) {
        let mut state = match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        state
            .script
            .entry((offer_id, kind))
            .or_default()
            .extend(outcomes);
    }

    /// Every request submitted so far, in order.
    pub fn requests(&self) -> Vec<LedgerRequest> {
        match self.state.lock() {
            Ok(guard) => guard.requests.clone(),
            Err(poisoned) => poisoned.into_inner().requests.clone(),
        }
    }

    /// Number of submissions for this `(offer, kind)`.
    pub fn request_count(&self, offer_id: &OfferId, kind: LedgerRequestKind) -> usize {
        self.requests()
            .iter()
            .filter(|r| &r.offer_id == offer_id && r.kind == kind)
            .count()
    }
}

#[async_trait]
impl LedgerClient for MockLedger {
    async fn submit(&self, request: &LedgerRequest) -> Result<LedgerReceipt, LedgerError> {
        let mut state = match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        state.requests.push(request.clone());
        let scripted = state
            .script
            .get_mut(&(request.offer_id.clone(), request.kind))
            .and_then(VecDeque::pop_front);
        match scripted {
            Some(MockOutcome::Confirm) | None => {
                state.next_handle += 1;
                Ok(LedgerReceipt {
                    handle: LedgerHandle(format!("mock-tx-{}", state.next_handle)),
                })
            }
            Some(MockOutcome::Reject(message)) => Err(LedgerError::Rejected(message)),
            Some(MockOutcome::Timeout) => Err(LedgerError::Timeout),
        }
    }
}
