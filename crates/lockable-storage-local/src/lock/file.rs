use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use lockable_storage_core::{LockBackend, StorageError};
use serde::{Deserialize, Serialize};
use tokio::fs;
use tracing::{debug, instrument, warn};

use crate::paths::{is_absent, relative_path};

/// Age after which a removal guard is assumed to belong to a crashed process.
const GUARD_ABANDONED_AFTER: Duration = Duration::from_secs(30);

/// Pause between attempts on a busy removal guard in `unlock`.
const GUARD_POLL: Duration = Duration::from_millis(5);

const GUARD_MAX_POLLS: u32 = 400;

/// File-based lock backend.
///
/// Lock records are stored at:
/// `{lock_dir}/{path}.lock`
///
/// Each record is a small JSON document with the acquisition time and, when a lease is
/// configured, the expiry time (milliseconds since the epoch). Records are published with a
/// hard link from a fully written scratch file, so a record is either absent or complete and
/// creating it fails if one already exists. That hard link is the test-and-set.
///
/// Expired or unreadable records count as unlocked. The next `lock` on the path reclaims them.
///
/// Records are only deleted while holding a per-path guard file
/// (`{lock_dir}/{path}.lock.guard`, created exclusively), after re-reading the record under
/// that guard. A guard left behind by a crashed process is cleared once it is 30 seconds old.
#[derive(Debug, Clone)]
pub struct FileLock {
    lock_dir: PathBuf,
    lease: Option<Duration>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct LockRecord {
    acquired_at: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    expires_at: Option<i64>,
}

impl LockRecord {
    fn new(lease: Option<Duration>) -> Self {
        let now = chrono::Utc::now().timestamp_millis();
        Self {
            acquired_at: now,
            expires_at: lease.map(|ttl| {
                now.saturating_add(i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX))
            }),
        }
    }

    fn is_live(&self, now: i64) -> bool {
        self.expires_at.is_none_or(|expires_at| expires_at > now)
    }
}

/// Exclusive right to delete the record at one path. Dropping it releases the guard.
#[derive(Debug)]
struct RemovalGuard {
    path: PathBuf,
}

impl Drop for RemovalGuard {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RecordState {
    Missing,
    Live,
    Stale,
}

impl FileLock {
    /// Create a new FileLock storing records under `lock_dir`. Locks never expire.
    pub fn new(lock_dir: impl AsRef<Path>) -> Self {
        Self {
            lock_dir: lock_dir.as_ref().to_path_buf(),
            lease: None,
        }
    }

    /// Expire every lock `lease` after it was taken, whether or not it was unlocked.
    pub fn with_lease(mut self, lease: Duration) -> Self {
        self.lease = Some(lease);
        self
    }

    pub fn lease(&self) -> Option<Duration> {
        self.lease
    }

    /// Get the path to a lock record.
    fn record_path(&self, path: &str) -> Result<PathBuf, StorageError> {
        let mut file = self.lock_dir.join(relative_path(path)?).into_os_string();
        file.push(".lock");
        Ok(PathBuf::from(file))
    }

    /// A uniquely named sibling of `record`.
    fn scratch_path(record: &Path, tag: &str) -> PathBuf {
        let mut file = record.as_os_str().to_os_string();
        file.push(format!(".{}.{}", uuid::Uuid::new_v4(), tag));
        PathBuf::from(file)
    }

    async fn ensure_parent(record: &Path) -> Result<(), StorageError> {
        if let Some(dir) = record.parent() {
            fs::create_dir_all(dir).await.map_err(|e| {
                StorageError::Io(format!("Failed to create locks dir {}: {}", dir.display(), e))
            })?;
        }
        Ok(())
    }

    async fn inspect(record: &Path) -> Result<RecordState, StorageError> {
        let content = match fs::read_to_string(record).await {
            Ok(content) => content,
            Err(e) if is_absent(&e) => return Ok(RecordState::Missing),
            Err(e) => {
                return Err(StorageError::Io(format!(
                    "Failed to read lock {}: {}",
                    record.display(),
                    e
                )))
            }
        };

        match serde_json::from_str::<LockRecord>(&content) {
            Ok(lock) if lock.is_live(chrono::Utc::now().timestamp_millis()) => {
                Ok(RecordState::Live)
            }
            Ok(_) => Ok(RecordState::Stale),
            Err(e) => {
                warn!("Ignoring unreadable lock record {}: {}", record.display(), e);
                Ok(RecordState::Stale)
            }
        }
    }

    /// Atomically publish a fresh record. Returns false if one already exists.
    async fn try_create(&self, record: &Path) -> Result<bool, StorageError> {
        let content = serde_json::to_string(&LockRecord::new(self.lease)).map_err(|e| {
            StorageError::Serialization(format!("Failed to serialize lock: {}", e))
        })?;

        let scratch = Self::scratch_path(record, "tmp");
        fs::write(&scratch, &content).await.map_err(|e| {
            StorageError::Io(format!("Failed to write lock file: {}", e))
        })?;

        let linked = fs::hard_link(&scratch, record).await;
        let _ = fs::remove_file(&scratch).await;

        match linked {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => Ok(false),
            Err(e) => Err(StorageError::Io(format!(
                "Failed to create lock {}: {}",
                record.display(),
                e
            ))),
        }
    }

    fn guard_path(record: &Path) -> PathBuf {
        let mut file = record.as_os_str().to_os_string();
        file.push(".guard");
        PathBuf::from(file)
    }

    /// Take the removal guard for `record`, or `None` if another caller holds it.
    async fn try_guard(record: &Path) -> Result<Option<RemovalGuard>, StorageError> {
        let path = Self::guard_path(record);
        match fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await
        {
            Ok(_) => Ok(Some(RemovalGuard { path })),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                if Self::guard_abandoned(&path).await {
                    warn!("Removing abandoned lock guard {}", path.display());
                    let _ = fs::remove_file(&path).await;
                }
                Ok(None)
            }
            Err(e) => Err(StorageError::Io(format!(
                "Failed to create lock guard {}: {}",
                path.display(),
                e
            ))),
        }
    }

    async fn guard_abandoned(path: &Path) -> bool {
        match fs::metadata(path).await.and_then(|meta| meta.modified()) {
            Ok(modified) => modified
                .elapsed()
                .is_ok_and(|age| age > GUARD_ABANDONED_AFTER),
            Err(_) => false,
        }
    }

    /// Take the removal guard for `record`, waiting while another caller holds it.
    async fn wait_for_guard(record: &Path) -> Result<RemovalGuard, StorageError> {
        for _ in 0..GUARD_MAX_POLLS {
            if let Some(guard) = Self::try_guard(record).await? {
                return Ok(guard);
            }
            tokio::time::sleep(GUARD_POLL).await;
        }
        Err(StorageError::Io(format!(
            "Timed out waiting for lock guard on {}",
            record.display()
        )))
    }

    /// Re-inspect the record and delete it when `should_remove` says so.
    ///
    /// Callers must hold the removal guard. Records are only ever created while absent and
    /// only ever removed under the guard, so the state seen here cannot change before the
    /// delete.
    async fn remove_guarded(
        record: &Path,
        _guard: &RemovalGuard,
        should_remove: impl Fn(RecordState) -> bool,
    ) -> Result<RecordState, StorageError> {
        let state = Self::inspect(record).await?;
        if state != RecordState::Missing && should_remove(state) {
            match fs::remove_file(record).await {
                Ok(()) => {}
                Err(e) if is_absent(&e) => {}
                Err(e) => {
                    return Err(StorageError::Io(format!(
                        "Failed to remove lock {}: {}",
                        record.display(),
                        e
                    )))
                }
            }
        }
        Ok(state)
    }

    /// Delete `record` if it is expired or unreadable.
    ///
    /// Returns false when the record turned out to be live, or when another caller is
    /// removing it right now.
    async fn clear_stale(&self, record: &Path) -> Result<bool, StorageError> {
        let Some(guard) = Self::try_guard(record).await? else {
            return Ok(false);
        };
        let state =
            Self::remove_guarded(record, &guard, |state| state == RecordState::Stale).await?;
        Ok(state != RecordState::Live)
    }
}

#[async_trait]
impl LockBackend for FileLock {
    fn lock_type(&self) -> &'static str {
        "file"
    }

    #[instrument(skip(self), level = "debug")]
    async fn lock(&self, path: &str) -> Result<bool, StorageError> {
        let record = self.record_path(path)?;
        Self::ensure_parent(&record).await?;

        if self.try_create(&record).await? {
            debug!("Acquired lock on {} (lease: {:?})", path, self.lease);
            return Ok(true);
        }

        match Self::inspect(&record).await? {
            RecordState::Live => {
                debug!("Lock on {} is held", path);
                return Ok(false);
            }
            RecordState::Stale => {
                if !self.clear_stale(&record).await? {
                    debug!("Lock on {} is being reclaimed or was retaken", path);
                    return Ok(false);
                }
                debug!("Reclaimed expired lock on {}", path);
            }
            // Released between our two calls
            RecordState::Missing => {}
        }

        let acquired = self.try_create(&record).await?;
        debug!("Second attempt on {}: acquired={}", path, acquired);
        Ok(acquired)
    }

    #[instrument(skip(self), level = "debug")]
    async fn unlock(&self, path: &str) -> Result<bool, StorageError> {
        let record = self.record_path(path)?;
        if Self::inspect(&record).await? == RecordState::Missing {
            debug!("Lock on {} not found for release", path);
            return Ok(false);
        }

        let guard = Self::wait_for_guard(&record).await?;
        let state = Self::remove_guarded(&record, &guard, |_| true).await?;
        drop(guard);
        match state {
            RecordState::Live => debug!("Released lock on {}", path),
            RecordState::Stale => debug!("Removed expired lock on {}", path),
            RecordState::Missing => debug!("Lock on {} not found for release", path),
        }
        Ok(state == RecordState::Live)
    }

    #[instrument(skip(self), level = "debug")]
    async fn is_locked(&self, path: &str) -> Result<bool, StorageError> {
        let record = self.record_path(path)?;
        Ok(Self::inspect(&record).await? == RecordState::Live)
    }
}
