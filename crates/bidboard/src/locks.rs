//! Per-lot mutual exclusion. At most one bid submission (including its whole
//! cascade) or finalization runs for a given lot at a time; different lots
//! proceed fully in parallel.

use {
    dashmap::DashMap,
    model::LotId,
    std::{sync::Arc, time::Duration},
    thiserror::Error,
    tokio::sync::{Mutex, OwnedMutexGuard},
};

#[derive(Clone, Copy, Debug, Eq, Error, PartialEq)]
#[error("timed out waiting for the lot's exclusive section")]
pub struct AcquireTimeout;

#[derive(Clone)]
pub struct LotLocks {
    // Entries are never removed. The registry is bounded by the number of
    // distinct lots bid on during the process lifetime.
    locks: Arc<DashMap<LotId, Arc<Mutex<()>>>>,
    timeout: Duration,
}

impl LotLocks {
    pub fn new(timeout: Duration) -> Self {
        Self {
            locks: Arc::new(DashMap::new()),
            timeout,
        }
    }

    /// Waits for the lot's exclusive section for at most the configured
    /// timeout. Bounding the wait keeps worst case latency under bid storms
    /// manageable; callers surface the timeout as a retryable `Busy`.
    pub async fn acquire(&self, lot: LotId) -> Result<OwnedMutexGuard<()>, AcquireTimeout> {
        let lock = Arc::clone(self.locks.entry(lot).or_default().value());
        tokio::time::timeout(self.timeout, lock.lock_owned())
            .await
            .map_err(|_| AcquireTimeout)
    }
}

#[cfg(test)]
mod tests {
    use {super::*, std::time::Duration};

    #[tokio::test]
    async fn sections_are_exclusive_per_lot() {
        let locks = LotLocks::new(Duration::from_millis(50));
        let held = locks.acquire(1).await.unwrap();

        // Same lot times out while the section is held.
        assert_eq!(locks.acquire(1).await.unwrap_err(), AcquireTimeout);
        // A different lot is unaffected.
        assert!(locks.acquire(2).await.is_ok());

        drop(held);
        assert!(locks.acquire(1).await.is_ok());
    }

    #[tokio::test]
    async fn waiting_succeeds_once_the_section_frees_up() {
        let locks = LotLocks::new(Duration::from_secs(1));
        let held = locks.acquire(1).await.unwrap();

        let contender = {
            let locks = locks.clone();
            tokio::spawn(async move { locks.acquire(1).await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        drop(held);

        assert!(contender.await.unwrap().is_ok());
    }
}
