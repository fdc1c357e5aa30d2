use std::io;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use lockable_storage_core::{StorageBackend, StorageError};
use tokio::fs;
use tracing::{debug, instrument};

use crate::paths::{is_absent, relative_path};

/// Local filesystem storage backend.
///
/// Each path maps to one file below the base directory:
/// ```text
/// {base_dir}/
///   {path}            # payload, UTF-8
/// ```
///
/// Paths are hierarchical (`/` separated) and may not contain `..` or be absolute. A path
/// cannot be both a payload and a directory of other payloads.
#[derive(Debug, Clone)]
pub struct LocalStorage {
    base_dir: PathBuf,
}

impl LocalStorage {
    /// Create a new LocalStorage with the given base directory.
    pub fn new(base_dir: impl AsRef<Path>) -> Self {
        Self {
            base_dir: base_dir.as_ref().to_path_buf(),
        }
    }

    fn file_path(&self, path: &str) -> Result<PathBuf, StorageError> {
        Ok(self.base_dir.join(relative_path(path)?))
    }
}

#[async_trait]
impl StorageBackend for LocalStorage {
    fn backend_name(&self) -> &'static str {
        "local"
    }

    #[instrument(skip(self, data), level = "debug", fields(data_len = data.len()))]
    async fn write(&self, data: &str, path: &str) -> Result<(), StorageError> {
        let file = self.file_path(path)?;
        if let Some(parent) = file.parent() {
            fs::create_dir_all(parent).await.map_err(|e| {
                StorageError::Io(format!("Failed to create dir {}: {}", parent.display(), e))
            })?;
        }

        // Write atomically via temp file
        let mut temp = file.clone().into_os_string();
        temp.push(format!(".{}.tmp", uuid::Uuid::new_v4()));
        let temp = PathBuf::from(temp);

        fs::write(&temp, data).await.map_err(|e| {
            StorageError::Io(format!("Failed to write {}: {}", temp.display(), e))
        })?;
        if let Err(e) = fs::rename(&temp, &file).await {
            let _ = fs::remove_file(&temp).await;
            return Err(StorageError::Io(format!(
                "Failed to rename to {}: {}",
                file.display(),
                e
            )));
        }

        debug!("Wrote {} ({} bytes)", path, data.len());
        Ok(())
    }

    #[instrument(skip(self, default), level = "debug")]
    async fn read(&self, path: &str, default: &str) -> Result<String, StorageError> {
        let file = self.file_path(path)?;
        match fs::read_to_string(&file).await {
            Ok(data) => {
                debug!("Read {} ({} bytes)", path, data.len());
                Ok(data)
            }
            Err(e) if is_absent(&e) => {
                debug!("{} not found, using default", path);
                Ok(default.to_string())
            }
            Err(e) if e.kind() == io::ErrorKind::InvalidData => Err(StorageError::Serialization(
                format!("{} is not valid UTF-8: {}", file.display(), e),
            )),
            Err(e) => Err(StorageError::Io(format!(
                "Failed to read {}: {}",
                file.display(),
                e
            ))),
        }
    }

    #[instrument(skip(self), level = "debug")]
    async fn delete(&self, path: &str) -> Result<(), StorageError> {
        let file = self.file_path(path)?;
        match fs::remove_file(&file).await {
            Ok(()) => {
                debug!("Deleted {}", path);
                Ok(())
            }
            Err(e) if is_absent(&e) => Ok(()),
            Err(e) => Err(StorageError::Io(format!(
                "Failed to delete {}: {}",
                file.display(),
                e
            ))),
        }
    }

    #[instrument(skip(self), level = "debug")]
    async fn exists(&self, path: &str) -> Result<bool, StorageError> {
        let file = self.file_path(path)?;
        match fs::metadata(&file).await {
            Ok(meta) => Ok(meta.is_file()),
            Err(e) if is_absent(&e) => Ok(false),
            Err(e) => Err(StorageError::Io(format!(
                "Failed to stat {}: {}",
                file.display(),
                e
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn setup() -> (LocalStorage, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let storage = LocalStorage::new(temp_dir.path());
        (storage, temp_dir)
    }

    #[tokio::test]
    async fn test_crud() {
        let (storage, temp) = setup();
        let path = "tenant-a/settings.json";

        // Initially doesn't exist
        assert!(!storage.exists(path).await.unwrap());
        assert_eq!(storage.read(path, "fallback").await.unwrap(), "fallback");

        storage.write("{\"theme\":\"dark\"}", path).await.unwrap();
        assert!(storage.exists(path).await.unwrap());
        assert_eq!(
            storage.read(path, "fallback").await.unwrap(),
            "{\"theme\":\"dark\"}"
        );
        assert!(temp.path().join("tenant-a").join("settings.json").is_file());

        // Overwrite
        storage.write("{}", path).await.unwrap();
        assert_eq!(storage.read(path, "").await.unwrap(), "{}");

        storage.delete(path).await.unwrap();
        assert!(!storage.exists(path).await.unwrap());
        assert_eq!(storage.read(path, "fallback").await.unwrap(), "fallback");
    }

    #[tokio::test]
    async fn test_delete_missing_is_ok() {
        let (storage, _temp) = setup();
        storage.delete("never/written").await.unwrap();
    }

    #[tokio::test]
    async fn test_no_temp_files_left() {
        let (storage, temp) = setup();
        storage.write("a", "k").await.unwrap();
        storage.write("b", "k").await.unwrap();

        let names: Vec<_> = std::fs::read_dir(temp.path())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(names, vec![std::ffi::OsString::from("k")]);
    }

    #[tokio::test]
    async fn test_directory_is_not_a_payload() {
        let (storage, _temp) = setup();
        storage.write("x", "dir/file").await.unwrap();

        assert!(!storage.exists("dir").await.unwrap());
        // Under a file, not a directory
        assert!(!storage.exists("dir/file/deeper").await.unwrap());
        assert_eq!(storage.read("dir/file/deeper", "d").await.unwrap(), "d");
    }

    #[tokio::test]
    async fn test_rejects_escaping_path() {
        let (storage, _temp) = setup();
        let err = storage.write("x", "../outside").await.unwrap_err();
        assert!(matches!(err, StorageError::InvalidArgument(_)));
        let err = storage.exists("/etc/passwd").await.unwrap_err();
        assert!(matches!(err, StorageError::InvalidArgument(_)));
    }

    #[tokio::test]
    async fn test_invalid_utf8() {
        let (storage, temp) = setup();
        std::fs::write(temp.path().join("bin"), [0xff, 0xfe, 0x00]).unwrap();

        let err = storage.read("bin", "").await.unwrap_err();
        assert!(matches!(err, StorageError::Serialization(_)));
    }
}
