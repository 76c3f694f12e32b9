//! # Per-Offer Locks
//!
//! A keyed lock registry: one async mutex per offer id, created on first
//! use. Every state-machine operation holds the offer's lock across its
//! load-mutate-save cycle, so transitions for one offer are strictly
//! serialized while unrelated offers proceed in parallel.

use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex};

use tokio::sync::{Mutex, OwnedMutexGuard};

use vmk_core::OfferId;

/// Registry of per-offer async mutexes.
#[derive(Debug, Default)]
pub struct OfferLocks {
    inner: StdMutex<HashMap<OfferId, Arc<Mutex<()>>>>,
}

impl OfferLocks {
    /// Create an empty lock registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire the exclusive lock for an offer, creating it on first use.
    ///
    /// The registry map is only held long enough to clone the `Arc`; the
    /// (possibly long) wait for the offer lock happens outside it.
    pub async fn acquire(&self, offer_id: &OfferId) -> OwnedMutexGuard<()> {
        let lock = {
            let mut map = match self.inner.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            Arc::clone(
                map.entry(offer_id.clone())
                    .or_insert_with(|| Arc::new(Mutex::new(()))),
            )
        };
        lock.lock_owned().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn test_same_offer_is_serialized() {
        let locks = Arc::new(OfferLocks::new());
        let id = OfferId::new("lock-1").unwrap();
        let concurrent = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let locks = Arc::clone(&locks);
            let id = id.clone();
            let concurrent = Arc::clone(&concurrent);
            let peak = Arc::clone(&peak);
            handles.push(tokio::spawn(async move {
                let _guard = locks.acquire(&id).await;
                let now = concurrent.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::task::yield_now().await;
                concurrent.fetch_sub(1, Ordering::SeqCst);
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
        assert_eq!(peak.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_different_offers_do_not_block() {
        let locks = OfferLocks::new();
        let a = OfferId::new("lock-a").unwrap();
        let b = OfferId::new("lock-b").unwrap();
        let _guard_a = locks.acquire(&a).await;
        // Acquiring a different offer's lock must not deadlock.
        let _guard_b = locks.acquire(&b).await;
    }
}
