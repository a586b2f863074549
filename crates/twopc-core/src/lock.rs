//! Exclusive hold on the resources a participant touches during a transaction.
//!
//! Acquisition is scoped: the hold lives exactly as long as its
//! [`TransactionLockGuard`], so it is released once on every exit path,
//! including a task being aborted mid-transaction.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Result};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::time::timeout;
use tracing::trace;

#[derive(Clone)]
pub struct TransactionLock {
    sem: Arc<Semaphore>,
}

pub struct TransactionLockGuard {
    _permit: OwnedSemaphorePermit,
}

impl TransactionLock {
    #[must_use]
    pub fn new() -> Self {
        Self { sem: Arc::new(Semaphore::new(1)) }
    }

    pub async fn acquire(&self) -> Result<TransactionLockGuard> {
        let permit = Arc::clone(&self.sem).acquire_owned().await.map_err(|_| anyhow!("transaction lock is closed"))?;
        trace!("transaction lock acquired");
        Ok(TransactionLockGuard { _permit: permit })
    }

    pub async fn acquire_timeout(&self, limit: Duration) -> Result<TransactionLockGuard> {
        match timeout(limit, self.acquire()).await {
            Ok(result) => result,
            Err(_) => Err(anyhow!("timed out acquiring transaction lock after {limit:?}")),
        }
    }

    #[must_use]
    pub fn try_acquire(&self) -> Option<TransactionLockGuard> {
        let permit = Arc::clone(&self.sem).try_acquire_owned().ok()?;
        Some(TransactionLockGuard { _permit: permit })
    }

    #[must_use]
    pub fn is_held(&self) -> bool {
        self.sem.available_permits() == 0
    }

    /// Makes every pending and future acquisition fail.
    pub fn close(&self) {
        self.sem.close();
    }
}

impl Default for TransactionLock {
    fn default() -> Self {
        Self::new()
    }
}

impl TransactionLockGuard {
    pub fn release(self) {
        drop(self);
    }
}

impl Drop for TransactionLockGuard {
    fn drop(&mut self) {
        trace!("transaction lock released");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use tokio::spawn;

    #[tokio::test]
    async fn exclusive() {
        let lock = TransactionLock::new();
        let guard = lock.acquire().await.unwrap();
        assert!(lock.is_held());
        assert!(lock.try_acquire().is_none());

        guard.release();
        assert!(!lock.is_held());
        assert!(lock.try_acquire().is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn contended_acquire_times_out() {
        let lock = TransactionLock::new();
        let _guard = lock.acquire().await.unwrap();
        assert!(lock.acquire_timeout(Duration::from_millis(100)).await.is_err());
    }

    #[tokio::test]
    async fn released_when_holder_is_aborted() {
        let lock = TransactionLock::new();
        let holder = {
            let lock = lock.clone();
            spawn(async move {
                let _guard = lock.acquire().await.unwrap();
                std::future::pending::<()>().await;
            })
        };
        while !lock.is_held() {
            tokio::task::yield_now().await;
        }

        holder.abort();
        assert!(holder.await.unwrap_err().is_cancelled());
        assert!(!lock.is_held());
    }

    #[tokio::test]
    async fn closed_lock_refuses() {
        let lock = TransactionLock::new();
        lock.close();
        assert!(lock.acquire().await.is_err());
    }
}
