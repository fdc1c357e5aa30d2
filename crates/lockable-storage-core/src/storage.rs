use async_trait::async_trait;

use crate::error::StorageError;

/// Storage backend abstraction for opaque string payloads at named paths.
///
/// Path semantics (flat or hierarchical, case sensitivity, allowed characters) belong to the
/// implementation. Callers should treat a path as an opaque key.
///
/// Absence is never an error: `read` falls back to the caller's default, `exists` reports
/// `false` and `delete` succeeds.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Returns the backend identifier (e.g., "local", "memory", "r2").
    fn backend_name(&self) -> &'static str;

    /// Store `data` at `path`, replacing any previous payload.
    async fn write(&self, data: &str, path: &str) -> Result<(), StorageError>;

    /// Load the payload at `path`, or `default` if nothing is stored there.
    async fn read(&self, path: &str, default: &str) -> Result<String, StorageError>;

    /// Remove the payload at `path`. Removing an absent path succeeds.
    async fn delete(&self, path: &str) -> Result<(), StorageError>;

    /// Check whether a payload is stored at `path`.
    async fn exists(&self, path: &str) -> Result<bool, StorageError>;
}
