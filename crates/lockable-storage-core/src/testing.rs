//! In-process backends shared by the unit tests.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::StorageError;
use crate::lock::LockBackend;
use crate::storage::StorageBackend;

#[derive(Default)]
pub(crate) struct MapStorage {
    entries: Mutex<HashMap<String, String>>,
}

#[async_trait]
impl StorageBackend for MapStorage {
    fn backend_name(&self) -> &'static str {
        "map"
    }

    async fn write(&self, data: &str, path: &str) -> Result<(), StorageError> {
        self.entries
            .lock()
            .unwrap()
            .insert(path.to_string(), data.to_string());
        Ok(())
    }

    async fn read(&self, path: &str, default: &str) -> Result<String, StorageError> {
        Ok(self
            .entries
            .lock()
            .unwrap()
            .get(path)
            .cloned()
            .unwrap_or_else(|| default.to_string()))
    }

    async fn delete(&self, path: &str) -> Result<(), StorageError> {
        self.entries.lock().unwrap().remove(path);
        Ok(())
    }

    async fn exists(&self, path: &str) -> Result<bool, StorageError> {
        Ok(self.entries.lock().unwrap().contains_key(path))
    }
}

#[derive(Default)]
pub(crate) struct SetLock {
    held: Mutex<HashSet<String>>,
}

#[async_trait]
impl LockBackend for SetLock {
    fn lock_type(&self) -> &'static str {
        "set"
    }

    async fn lock(&self, path: &str) -> Result<bool, StorageError> {
        Ok(self.held.lock().unwrap().insert(path.to_string()))
    }

    async fn unlock(&self, path: &str) -> Result<bool, StorageError> {
        Ok(self.held.lock().unwrap().remove(path))
    }

    async fn is_locked(&self, path: &str) -> Result<bool, StorageError> {
        Ok(self.held.lock().unwrap().contains(path))
    }
}
