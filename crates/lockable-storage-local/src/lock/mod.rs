mod file;
mod memory;

pub use file::FileLock;
pub use memory::MemoryLock;
