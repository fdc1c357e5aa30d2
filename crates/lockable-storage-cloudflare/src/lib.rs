//! Cloudflare backends for lockable-storage.
//!
//! - [`R2Storage`]: payloads as objects in an R2 bucket (S3-compatible API)
//! - [`R2Lock`]: lock records as objects in an R2 bucket, taken with conditional writes
//! - [`KvLock`]: lock records as keys in a Workers KV namespace
//!
//! KV is eventually consistent and has no conditional write, so [`KvLock`] cannot give a
//! strict test-and-set. Use [`R2Lock`] when callers on several machines need mutual exclusion.

pub mod kv;
pub mod lock;
pub mod storage;

pub use kv::KvClient;
pub use lock::{KvLock, R2Lock};
pub use storage::R2Storage;
