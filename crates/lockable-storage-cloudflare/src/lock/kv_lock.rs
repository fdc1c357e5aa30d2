use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use lockable_storage_core::{LockBackend, StorageError};
use tracing::{debug, instrument};

use super::record::LockData;
use crate::kv::KvClient;

/// Smallest `expiration_ttl` KV accepts, in seconds.
const MIN_KV_TTL_SECS: u64 = 60;

/// KV-based lock backend.
///
/// Lock keys: `lock:{path}`
///
/// With a lease, each record carries its expiry (checked on every read) and is also written with
/// a KV `expiration_ttl` so abandoned records are eventually purged. KV only accepts TTLs of a
/// minute or more, so short leases are enforced client-side and purged later.
///
/// KV is eventually consistent and has no conditional put, so `lock` is a read followed by a
/// write. Two callers racing on the same path within KV's propagation window can both see it
/// free and both get `true`. Use this where that window is acceptable (optimistic locking with
/// retries), not for strict mutual exclusion; [`R2Lock`](super::R2Lock) gives an atomic
/// test-and-set.
pub struct KvLock {
    kv_client: Arc<KvClient>,
    lease: Option<Duration>,
}

impl KvLock {
    /// Create a new KvLock. Locks never expire.
    pub fn new(kv_client: Arc<KvClient>) -> Self {
        Self {
            kv_client,
            lease: None,
        }
    }

    /// Expire every lock `lease` after it was taken.
    pub fn with_lease(mut self, lease: Duration) -> Self {
        self.lease = Some(lease);
        self
    }

    /// Get the KV key for a lock.
    fn lock_key(path: &str) -> String {
        format!("lock:{}", path)
    }

    fn kv_ttl(&self) -> Option<u64> {
        self.lease
            .map(|lease| lease.as_secs_f64().ceil() as u64)
            .map(|secs| secs.max(MIN_KV_TTL_SECS))
    }

    /// Whether the stored record (if any) is a live lock.
    async fn is_held(&self, key: &str) -> Result<bool, StorageError> {
        let Some(existing) = self.kv_client.get(key).await? else {
            return Ok(false);
        };
        Ok(LockData::is_live_record(key, &existing))
    }
}

#[async_trait]
impl LockBackend for KvLock {
    fn lock_type(&self) -> &'static str {
        "kv"
    }

    #[instrument(skip(self), level = "debug")]
    async fn lock(&self, path: &str) -> Result<bool, StorageError> {
        let key = Self::lock_key(path);

        if self.is_held(&key).await? {
            debug!("Lock on {} is held", path);
            return Ok(false);
        }

        let lock_data = LockData::new(self.lease);
        let lock_json = serde_json::to_string(&lock_data).map_err(|e| {
            StorageError::Serialization(format!("Failed to serialize lock data: {}", e))
        })?;

        self.kv_client.put(&key, &lock_json, self.kv_ttl()).await?;

        debug!(
            "Acquired lock on {} (expires at {:?})",
            path, lock_data.expires_at
        );
        Ok(true)
    }

    #[instrument(skip(self), level = "debug")]
    async fn unlock(&self, path: &str) -> Result<bool, StorageError> {
        let key = Self::lock_key(path);
        let was_held = self.is_held(&key).await?;
        let removed = self.kv_client.delete(&key).await?;
        debug!(
            "Unlock {}: held={}, record removed={}",
            path, was_held, removed
        );
        Ok(was_held && removed)
    }

    #[instrument(skip(self), level = "debug")]
    async fn is_locked(&self, path: &str) -> Result<bool, StorageError> {
        self.is_held(&Self::lock_key(path)).await
    }
}
