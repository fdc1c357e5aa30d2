//! Local backends for lockable-storage.
//!
//! - [`LocalStorage`]: one file per path under a base directory
//! - [`FileLock`]: one lock record file per path, optionally leased
//! - [`MemoryStorage`] / [`MemoryLock`]: in-process maps, for tests and single-process use

pub mod lock;
mod paths;
pub mod storage;

pub use lock::{FileLock, MemoryLock};
pub use storage::{LocalStorage, MemoryStorage};

pub use lockable_storage_core::{
    acquire_lock, LockBackend, LockableStorageManager, ManagerConfig, RetryPolicy,
    StorageBackend, StorageError,
};
