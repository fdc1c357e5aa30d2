mod kv_lock;
mod r2_lock;
mod record;

pub use kv_lock::KvLock;
pub use r2_lock::R2Lock;
