use async_trait::async_trait;
use dashmap::DashMap;
use lockable_storage_core::{StorageBackend, StorageError};
use tracing::{debug, instrument};

/// In-process storage backend.
///
/// Paths are plain map keys. Nothing survives the process.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    entries: DashMap<String, String>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl StorageBackend for MemoryStorage {
    fn backend_name(&self) -> &'static str {
        "memory"
    }

    #[instrument(skip(self, data), level = "debug", fields(data_len = data.len()))]
    async fn write(&self, data: &str, path: &str) -> Result<(), StorageError> {
        self.entries.insert(path.to_string(), data.to_string());
        debug!("Stored {} ({} bytes)", path, data.len());
        Ok(())
    }

    #[instrument(skip(self, default), level = "debug")]
    async fn read(&self, path: &str, default: &str) -> Result<String, StorageError> {
        Ok(self
            .entries
            .get(path)
            .map(|entry| entry.value().clone())
            .unwrap_or_else(|| default.to_string()))
    }

    #[instrument(skip(self), level = "debug")]
    async fn delete(&self, path: &str) -> Result<(), StorageError> {
        self.entries.remove(path);
        Ok(())
    }

    #[instrument(skip(self), level = "debug")]
    async fn exists(&self, path: &str) -> Result<bool, StorageError> {
        Ok(self.entries.contains_key(path))
    }
}
