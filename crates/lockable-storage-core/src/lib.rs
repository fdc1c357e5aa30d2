//! Core traits and types for lockable-storage backends.
//!
//! This crate defines the abstractions shared between local and cloud implementations:
//! - `StorageBackend`: write, read, delete and existence checks on string payloads
//! - `LockBackend`: exclusive lock records over the same path namespace
//! - `acquire_lock`: bounded, fixed-interval retry on top of a single `lock` attempt
//! - `LockableStorageManager`: one facade over an optional storage and an optional lock backend
//!
//! # Locks are advisory
//!
//! Storage operations never consult the lock backend. A `write` or `delete` on a path that
//! somebody else has locked goes through; holding the lock before mutating is the caller's
//! discipline.
//!
//! Lock records carry no owner token. Any caller that can name a path can `unlock` it,
//! including a lock taken by another process. Only use this within a group of cooperating
//! callers.
//!
//! Backends configured with a lease may drop a record on their own once it expires, even
//! while the original caller is still working under it. Nothing renews a lease.
//!
//! # No cancellation
//!
//! `acquire_lock` takes no cancellation token or deadline. It stops only after
//! `max_retry` attempts, so it can wait for up to [`RetryPolicy::max_total_wait`] plus the
//! time the attempts themselves take. Callers that need a deadline must size `max_retry` and
//! `retry_wait` to fit it. Dropping the future instead (e.g. with `tokio::time::timeout`) while
//! a `lock` call is in flight can leave a record taken that nobody will unlock.

#[cfg(feature = "cli")]
pub mod cli;
mod error;
mod lock;
mod manager;
mod storage;
#[cfg(test)]
mod testing;

pub use error::{BackendKind, StorageError};
pub use lock::{
    acquire_lock, LockBackend, RetryPolicy, DEFAULT_MAX_RETRY, DEFAULT_RETRY_WAIT,
    DEFAULT_RETRY_WAIT_MS,
};
pub use manager::{LockableStorageManager, ManagerConfig};
pub use storage::StorageBackend;
