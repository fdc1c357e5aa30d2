use std::time::Duration;

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use lockable_storage_core::{LockBackend, StorageError};
use tokio::time::Instant;
use tracing::{debug, instrument};

/// In-process lock backend.
///
/// The map's entry API gives the test-and-set: the shard is write-locked while the entry is
/// inspected and filled. Only coordinates tasks that share this instance.
#[derive(Debug, Default)]
pub struct MemoryLock {
    /// path -> expiry (None = held until unlocked)
    locks: DashMap<String, Option<Instant>>,
    lease: Option<Duration>,
}

fn is_live(expires_at: &Option<Instant>) -> bool {
    expires_at.is_none_or(|at| at > Instant::now())
}

impl MemoryLock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Expire every lock `lease` after it was taken.
    pub fn with_lease(mut self, lease: Duration) -> Self {
        self.lease = Some(lease);
        self
    }

    /// A lease too long to represent never expires.
    fn expiry(&self) -> Option<Instant> {
        self.lease.and_then(|ttl| Instant::now().checked_add(ttl))
    }
}

#[async_trait]
impl LockBackend for MemoryLock {
    fn lock_type(&self) -> &'static str {
        "memory"
    }

    #[instrument(skip(self), level = "debug")]
    async fn lock(&self, path: &str) -> Result<bool, StorageError> {
        let acquired = match self.locks.entry(path.to_string()) {
            Entry::Occupied(mut entry) => {
                if is_live(entry.get()) {
                    false
                } else {
                    *entry.get_mut() = self.expiry();
                    true
                }
            }
            Entry::Vacant(entry) => {
                entry.insert(self.expiry());
                true
            }
        };
        debug!("Lock on {}: acquired={}", path, acquired);
        Ok(acquired)
    }

    #[instrument(skip(self), level = "debug")]
    async fn unlock(&self, path: &str) -> Result<bool, StorageError> {
        Ok(self
            .locks
            .remove(path)
            .is_some_and(|(_, expires_at)| is_live(&expires_at)))
    }

    #[instrument(skip(self), level = "debug")]
    async fn is_locked(&self, path: &str) -> Result<bool, StorageError> {
        Ok(self
            .locks
            .get(path)
            .is_some_and(|entry| is_live(entry.value())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_lock_unlock() {
        let locks = MemoryLock::new();

        assert!(!locks.is_locked("p").await.unwrap());
        assert!(locks.lock("p").await.unwrap());
        assert!(!locks.lock("p").await.unwrap());
        assert!(locks.is_locked("p").await.unwrap());
        assert!(locks.unlock("p").await.unwrap());
        assert!(!locks.unlock("p").await.unwrap());
        assert!(!locks.is_locked("p").await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn test_lease_expiry() {
        let locks = MemoryLock::new().with_lease(Duration::from_secs(30));

        assert!(locks.lock("p").await.unwrap());
        tokio::time::advance(Duration::from_secs(29)).await;
        assert!(locks.is_locked("p").await.unwrap());
        assert!(!locks.lock("p").await.unwrap());

        tokio::time::advance(Duration::from_secs(2)).await;
        assert!(!locks.is_locked("p").await.unwrap());
        assert!(locks.lock("p").await.unwrap());
        assert!(locks.is_locked("p").await.unwrap());
    }

    #[tokio::test]
    async fn test_unbounded_lease() {
        let locks = MemoryLock::new().with_lease(Duration::MAX);
        assert!(locks.lock("p").await.unwrap());
        assert!(locks.is_locked("p").await.unwrap());
        assert!(!locks.lock("p").await.unwrap());
        assert!(locks.unlock("p").await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn test_unlock_after_expiry() {
        let locks = MemoryLock::new().with_lease(Duration::from_millis(10));
        assert!(locks.lock("p").await.unwrap());

        tokio::time::advance(Duration::from_millis(50)).await;
        assert!(!locks.unlock("p").await.unwrap());
        assert!(!locks.is_locked("p").await.unwrap());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_single_winner() {
        let locks = Arc::new(MemoryLock::new());

        let tasks: Vec<_> = (0..32)
            .map(|_| {
                let locks = locks.clone();
                tokio::spawn(async move { locks.lock("race").await.unwrap() })
            })
            .collect();

        let results = futures::future::join_all(tasks).await;
        let winners = results.into_iter().filter(|r| *r.as_ref().unwrap()).count();
        assert_eq!(winners, 1);
    }
}
