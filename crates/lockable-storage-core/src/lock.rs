use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, instrument, warn};

use crate::error::StorageError;

/// Default number of `lock` attempts made by [`acquire_lock`].
pub const DEFAULT_MAX_RETRY: u32 = 5;

/// Default pause between two `lock` attempts, in milliseconds.
pub const DEFAULT_RETRY_WAIT_MS: u64 = 400;

/// Default pause between two `lock` attempts.
pub const DEFAULT_RETRY_WAIT: Duration = Duration::from_millis(DEFAULT_RETRY_WAIT_MS);

/// Lock backend abstraction over the storage path namespace.
///
/// A lock is a record keyed by path; the record existing means the path is locked. Locks are
/// always exclusive and carry no holder identity, so `unlock` releases whoever took the lock.
///
/// Implementations must make `lock` an atomic test-and-set against their backing store.
/// They may attach a lease after which the record disappears without an `unlock`; callers
/// must tolerate a lock vanishing under them.
#[async_trait]
pub trait LockBackend: Send + Sync {
    /// Returns the lock implementation identifier (e.g., "file", "memory", "kv").
    fn lock_type(&self) -> &'static str;

    /// Create the lock record for `path` if none exists.
    ///
    /// Returns `Ok(false)` when the path is already locked; that case is not an error.
    async fn lock(&self, path: &str) -> Result<bool, StorageError>;

    /// Remove the lock record for `path`.
    ///
    /// Returns whether a record was removed. Whatever the outcome, no record is left behind.
    async fn unlock(&self, path: &str) -> Result<bool, StorageError>;

    /// Check whether a live (non-expired) lock record exists for `path`.
    async fn is_locked(&self, path: &str) -> Result<bool, StorageError>;
}

/// Bounds for [`acquire_lock`]: how many attempts, and the fixed pause between them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Number of `lock` attempts. Zero fails without trying.
    pub max_retry: u32,
    /// Pause after each unsuccessful attempt except the last.
    pub retry_wait: Duration,
}

impl RetryPolicy {
    pub fn new(max_retry: u32, retry_wait: Duration) -> Self {
        Self {
            max_retry,
            retry_wait,
        }
    }

    /// Upper bound on the time spent sleeping, excluding backend calls.
    pub fn max_total_wait(&self) -> Duration {
        self.retry_wait * self.max_retry.saturating_sub(1)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_RETRY, DEFAULT_RETRY_WAIT)
    }
}

/// Try to lock `path` up to `policy.max_retry` times, sleeping `policy.retry_wait` between
/// attempts.
///
/// Only a refused lock (`Ok(false)`) is retried. A backend error aborts immediately and is
/// returned unchanged. There is no sleep after the final attempt, so the total wait never
/// exceeds `(max_retry - 1) * retry_wait`. The sleep suspends only the calling task.
///
/// There is no fairness between competing callers: whichever `lock` call reaches the backend
/// first wins.
#[instrument(skip(locks), level = "debug", fields(lock_type = locks.lock_type()))]
pub async fn acquire_lock<L>(path: &str, locks: &L, policy: RetryPolicy) -> Result<(), StorageError>
where
    L: LockBackend + ?Sized,
{
    if path.is_empty() {
        return Err(StorageError::InvalidArgument(
            "lock path must not be empty".to_string(),
        ));
    }

    debug!(
        "Acquiring lock on {} ({} attempt(s), up to {:?} of waiting)",
        path,
        policy.max_retry,
        policy.max_total_wait()
    );
    for attempt in 1..=policy.max_retry {
        if locks.lock(path).await? {
            debug!("Acquired lock on {} (attempt {})", path, attempt);
            return Ok(());
        }

        if attempt < policy.max_retry {
            debug!(
                "Lock on {} is held, retrying in {:?} ({}/{})",
                path, policy.retry_wait, attempt, policy.max_retry
            );
            tokio::time::sleep(policy.retry_wait).await;
        }
    }

    warn!(
        "Giving up on lock {} after {} attempt(s)",
        path, policy.max_retry
    );
    Err(StorageError::LockAcquisitionFailed {
        path: path.to_string(),
        attempts: policy.max_retry,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::SetLock;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::{Arc, Mutex};
    use tokio::time::Instant;

    /// Lock backend that replays a fixed sequence of `lock` outcomes.
    struct ScriptedLock {
        outcomes: Mutex<VecDeque<Result<bool, StorageError>>>,
        calls: AtomicU32,
    }

    impl ScriptedLock {
        fn new(outcomes: Vec<Result<bool, StorageError>>) -> Self {
            Self {
                outcomes: Mutex::new(outcomes.into()),
                calls: AtomicU32::new(0),
            }
        }

        fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl LockBackend for ScriptedLock {
        fn lock_type(&self) -> &'static str {
            "scripted"
        }

        async fn lock(&self, _path: &str) -> Result<bool, StorageError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.outcomes
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Ok(false))
        }

        async fn unlock(&self, _path: &str) -> Result<bool, StorageError> {
            Ok(true)
        }

        async fn is_locked(&self, _path: &str) -> Result<bool, StorageError> {
            Ok(false)
        }
    }

    #[test]
    fn test_default_policy() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_retry, 5);
        assert_eq!(policy.retry_wait, Duration::from_millis(400));
        assert_eq!(policy.max_total_wait(), Duration::from_millis(1600));
        assert_eq!(
            RetryPolicy::new(0, Duration::from_secs(1)).max_total_wait(),
            Duration::ZERO
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_attempt_does_not_wait() {
        let locks = ScriptedLock::new(vec![Ok(true)]);
        let start = Instant::now();

        acquire_lock("a", &locks, RetryPolicy::default()).await.unwrap();

        assert_eq!(locks.calls(), 1);
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_succeeds_on_third_attempt() {
        let locks = ScriptedLock::new(vec![Ok(false), Ok(false), Ok(true)]);
        let policy = RetryPolicy::new(3, Duration::from_millis(100));
        let start = Instant::now();

        acquire_lock("a", &locks, policy).await.unwrap();

        let elapsed = start.elapsed();
        assert_eq!(locks.calls(), 3);
        assert!(elapsed >= Duration::from_millis(200));
        assert!(elapsed < Duration::from_millis(300));
    }

    #[tokio::test(start_paused = true)]
    async fn test_single_attempt_fails_without_waiting() {
        let locks = ScriptedLock::new(vec![Ok(false)]);
        let policy = RetryPolicy::new(1, Duration::from_secs(10));
        let start = Instant::now();

        let err = acquire_lock("docs/a", &locks, policy).await.unwrap_err();

        assert!(matches!(
            err,
            StorageError::LockAcquisitionFailed { ref path, attempts: 1 } if path == "docs/a"
        ));
        assert_eq!(locks.calls(), 1);
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_attempts_fails_immediately() {
        let locks = ScriptedLock::new(vec![Ok(true)]);
        let policy = RetryPolicy::new(0, Duration::from_millis(400));

        let err = acquire_lock("a", &locks, policy).await.unwrap_err();

        assert!(matches!(
            err,
            StorageError::LockAcquisitionFailed { attempts: 0, .. }
        ));
        assert_eq!(locks.calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhaustion_skips_trailing_wait() {
        let locks = ScriptedLock::new(vec![]);
        let start = Instant::now();

        let err = acquire_lock("a", &locks, RetryPolicy::default())
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            StorageError::LockAcquisitionFailed { attempts: 5, .. }
        ));
        assert_eq!(locks.calls(), 5);
        assert_eq!(start.elapsed(), Duration::from_millis(1600));
    }

    #[tokio::test(start_paused = true)]
    async fn test_backend_error_is_not_retried() {
        let locks = ScriptedLock::new(vec![
            Err(StorageError::Io("connection reset".to_string())),
            Ok(true),
        ]);

        let err = acquire_lock("a", &locks, RetryPolicy::default())
            .await
            .unwrap_err();

        assert!(matches!(err, StorageError::Io(ref msg) if msg == "connection reset"));
        assert_eq!(locks.calls(), 1);
    }

    #[tokio::test]
    async fn test_empty_path_rejected() {
        let locks = ScriptedLock::new(vec![Ok(true)]);

        let err = acquire_lock("", &locks, RetryPolicy::default())
            .await
            .unwrap_err();

        assert!(matches!(err, StorageError::InvalidArgument(_)));
        assert_eq!(locks.calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_waiter_wins_after_holder_unlocks() {
        let locks = Arc::new(SetLock::default());
        assert!(locks.lock("shared").await.unwrap());

        let holder = {
            let locks = locks.clone();
            async move {
                tokio::time::sleep(Duration::from_millis(250)).await;
                locks.unlock("shared").await.unwrap()
            }
        };
        let waiter = acquire_lock(
            "shared",
            locks.as_ref(),
            RetryPolicy::new(5, Duration::from_millis(100)),
        );

        let start = Instant::now();
        let (released, acquired) = futures::join!(holder, waiter);

        assert!(released);
        acquired.unwrap();
        assert!(locks.is_locked("shared").await.unwrap());
        // Attempts at 0, 100, 200 fail; the one at 300 succeeds.
        assert_eq!(start.elapsed(), Duration::from_millis(300));
    }
}
