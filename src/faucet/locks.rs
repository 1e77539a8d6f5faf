//! Per-wallet async locks that live exactly as long as someone holds or
//! waits on them.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use crate::address::WalletAddress;

#[derive(Default)]
pub struct WalletLocks {
    held: Mutex<HashMap<WalletAddress, Arc<AsyncMutex<()>>>>,
}

impl WalletLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `wallet`.
    pub async fn acquire(&self, wallet: WalletAddress) -> WalletLockGuard<'_> {
        let lock = {
            let mut held = self.held.lock().unwrap_or_else(PoisonError::into_inner);
            Arc::clone(held.entry(wallet).or_default())
        };
        let guard = Arc::clone(&lock).lock_owned().await;
        WalletLockGuard {
            locks: self,
            wallet,
            lock,
            guard: Some(guard),
        }
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.held
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

pub struct WalletLockGuard<'a> {
    locks: &'a WalletLocks,
    wallet: WalletAddress,
    lock: Arc<AsyncMutex<()>>,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for WalletLockGuard<'_> {
    fn drop(&mut self) {
        drop(self.guard.take());
        let mut held = self
            .locks
            .held
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        // The table and this guard are the only owners: nobody is waiting
        if Arc::strong_count(&self.lock) == 2 {
            held.remove(&self.wallet);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use super::*;
    use crate::test_support::wallet_str;

    fn wallet(fill: char) -> WalletAddress {
        WalletAddress::parse(&wallet_str(fill)).unwrap()
    }

    #[tokio::test]
    async fn test_released_locks_leave_the_table() {
        let locks = WalletLocks::new();
        {
            let _a = locks.acquire(wallet('a')).await;
            let _b = locks.acquire(wallet('b')).await;
            assert_eq!(locks.len(), 2);
        }
        assert_eq!(locks.len(), 0);
    }

    #[tokio::test]
    async fn test_holders_of_one_wallet_never_overlap() {
        let locks = Arc::new(WalletLocks::new());
        let inside = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let locks = Arc::clone(&locks);
                let inside = Arc::clone(&inside);
                let peak = Arc::clone(&peak);
                tokio::spawn(async move {
                    let _guard = locks.acquire(wallet('c')).await;
                    let now = inside.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(5)).await;
                    inside.fetch_sub(1, Ordering::SeqCst);
                })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(peak.load(Ordering::SeqCst), 1);
        assert_eq!(locks.len(), 0);
    }

    #[tokio::test]
    async fn test_waiter_keeps_entry_alive() {
        let locks = Arc::new(WalletLocks::new());
        let first = locks.acquire(wallet('d')).await;

        let waiter = {
            let locks = Arc::clone(&locks);
            tokio::spawn(async move {
                let _guard = locks.acquire(wallet('d')).await;
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        drop(first);
        // The waiter is parked on the lock and still owns a clone
        assert_eq!(locks.len(), 1);

        waiter.await.unwrap();
        assert_eq!(locks.len(), 0);
    }
}
