use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, instrument};

use crate::error::{BackendKind, StorageError};
use crate::lock::{acquire_lock, LockBackend, RetryPolicy};
use crate::storage::StorageBackend;

/// Construction-time configuration for [`LockableStorageManager`].
///
/// Either half may be left out. Deployments that only store, or only lock, are common.
#[derive(Clone, Default)]
pub struct ManagerConfig {
    pub storage: Option<Arc<dyn StorageBackend>>,
    pub lock: Option<Arc<dyn LockBackend>>,
}

impl ManagerConfig {
    pub fn with_storage(mut self, storage: Arc<dyn StorageBackend>) -> Self {
        self.storage = Some(storage);
        self
    }

    pub fn with_lock(mut self, lock: Arc<dyn LockBackend>) -> Self {
        self.lock = Some(lock);
        self
    }
}

impl fmt::Debug for ManagerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ManagerConfig")
            .field("storage", &self.storage.as_ref().map(|s| s.backend_name()))
            .field("lock", &self.lock.as_ref().map(|l| l.lock_type()))
            .finish()
    }
}

/// Facade routing storage calls to one backend and lock calls to another.
///
/// Every call is forwarded as-is. The manager never checks `is_locked` before `write` or
/// `delete`, never retries on its own, and caches nothing. Calling an operation whose backend
/// was not configured fails with [`StorageError::BackendNotConfigured`].
///
/// The manager only holds shared references to its backends, so it can be cloned or put behind
/// an `Arc` and used from many tasks at once.
#[derive(Clone, Default)]
pub struct LockableStorageManager {
    storage: Option<Arc<dyn StorageBackend>>,
    lock: Option<Arc<dyn LockBackend>>,
}

impl LockableStorageManager {
    pub fn new(config: ManagerConfig) -> Self {
        Self {
            storage: config.storage,
            lock: config.lock,
        }
    }

    pub fn has_storage(&self) -> bool {
        self.storage.is_some()
    }

    pub fn has_lock(&self) -> bool {
        self.lock.is_some()
    }

    fn storage(&self) -> Result<&dyn StorageBackend, StorageError> {
        self.storage
            .as_deref()
            .ok_or(StorageError::BackendNotConfigured(BackendKind::Storage))
    }

    fn locks(&self) -> Result<&dyn LockBackend, StorageError> {
        self.lock
            .as_deref()
            .ok_or(StorageError::BackendNotConfigured(BackendKind::Lock))
    }

    /// Run [`acquire_lock`] against the configured lock backend.
    pub async fn acquire_lock(&self, path: &str, policy: RetryPolicy) -> Result<(), StorageError> {
        acquire_lock(path, self.locks()?, policy).await
    }
}

impl From<ManagerConfig> for LockableStorageManager {
    fn from(config: ManagerConfig) -> Self {
        Self::new(config)
    }
}

impl fmt::Debug for LockableStorageManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LockableStorageManager")
            .field("storage", &self.storage.as_ref().map(|s| s.backend_name()))
            .field("lock", &self.lock.as_ref().map(|l| l.lock_type()))
            .finish()
    }
}

#[async_trait]
impl StorageBackend for LockableStorageManager {
    fn backend_name(&self) -> &'static str {
        self.storage.as_ref().map_or("none", |s| s.backend_name())
    }

    #[instrument(skip(self, data), level = "debug", fields(data_len = data.len()))]
    async fn write(&self, data: &str, path: &str) -> Result<(), StorageError> {
        let storage = self.storage()?;
        debug!("Routing write of {} to {}", path, storage.backend_name());
        storage.write(data, path).await
    }

    #[instrument(skip(self, default), level = "debug")]
    async fn read(&self, path: &str, default: &str) -> Result<String, StorageError> {
        self.storage()?.read(path, default).await
    }

    #[instrument(skip(self), level = "debug")]
    async fn delete(&self, path: &str) -> Result<(), StorageError> {
        self.storage()?.delete(path).await
    }

    #[instrument(skip(self), level = "debug")]
    async fn exists(&self, path: &str) -> Result<bool, StorageError> {
        self.storage()?.exists(path).await
    }
}

#[async_trait]
impl LockBackend for LockableStorageManager {
    fn lock_type(&self) -> &'static str {
        self.lock.as_ref().map_or("none", |l| l.lock_type())
    }

    #[instrument(skip(self), level = "debug")]
    async fn lock(&self, path: &str) -> Result<bool, StorageError> {
        self.locks()?.lock(path).await
    }

    #[instrument(skip(self), level = "debug")]
    async fn unlock(&self, path: &str) -> Result<bool, StorageError> {
        self.locks()?.unlock(path).await
    }

    #[instrument(skip(self), level = "debug")]
    async fn is_locked(&self, path: &str) -> Result<bool, StorageError> {
        self.locks()?.is_locked(path).await
    }
}
