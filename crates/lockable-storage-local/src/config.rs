use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use lockable_storage_core::cli::Command;
use lockable_storage_local::{FileLock, LocalStorage, LockableStorageManager, ManagerConfig};

/// Configuration for the lockable-storage-local command line.
#[derive(Parser, Debug, Clone)]
#[command(name = "lockable-storage-local")]
#[command(about = "Read, write and lock paths on the local filesystem")]
pub struct Config {
    /// Base directory for stored payloads
    #[arg(long, env = "LOCAL_STORAGE_DIR", global = true)]
    pub storage_dir: Option<PathBuf>,

    /// Directory for lock records (defaults to a `.locks` sibling of the storage dir)
    #[arg(long, env = "LOCAL_LOCK_DIR", global = true)]
    pub lock_dir: Option<PathBuf>,

    /// Expire locks this many seconds after they are taken
    #[arg(long, env = "LOCK_LEASE_SECS", global = true)]
    pub lock_lease_secs: Option<u64>,

    /// Run without a storage backend
    #[arg(long, global = true)]
    pub no_storage: bool,

    /// Run without a lock backend
    #[arg(long, global = true)]
    pub no_lock: bool,

    #[command(subcommand)]
    pub command: Command,
}

fn data_root() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("lockable-storage")
}

impl Config {
    /// Get the effective storage directory.
    pub fn effective_storage_dir(&self) -> PathBuf {
        self.storage_dir
            .clone()
            .unwrap_or_else(|| data_root().join("data"))
    }

    /// Get the effective lock directory.
    ///
    /// Lock records never live inside the storage dir, where a storage path could overwrite
    /// them. The default is `{storage_dir}.locks` next to it.
    pub fn effective_lock_dir(&self) -> PathBuf {
        if let Some(lock_dir) = &self.lock_dir {
            return lock_dir.clone();
        }

        let storage_dir = self.effective_storage_dir();
        let storage_dir: PathBuf = std::path::absolute(&storage_dir)
            .unwrap_or(storage_dir)
            .components()
            .collect();
        match storage_dir.file_name() {
            Some(name) => {
                let mut name = name.to_os_string();
                name.push(".locks");
                storage_dir.with_file_name(name)
            }
            // Filesystem root or a path ending in `..`
            None => data_root().join("locks"),
        }
    }

    pub fn build_manager(&self) -> LockableStorageManager {
        let mut config = ManagerConfig::default();
        if !self.no_storage {
            config = config.with_storage(Arc::new(LocalStorage::new(self.effective_storage_dir())));
        }
        if !self.no_lock {
            let mut lock = FileLock::new(self.effective_lock_dir());
            if let Some(secs) = self.lock_lease_secs {
                lock = lock.with_lease(Duration::from_secs(secs));
            }
            config = config.with_lock(Arc::new(lock));
        }
        LockableStorageManager::new(config)
    }
}
