//! Subcommands shared by the backend binaries.
//!
//! Each subcommand maps to exactly one facade call, so the binaries stay thin wrappers that
//! only differ in how they build their backends.

use std::time::Duration;

use clap::Subcommand;

use crate::error::StorageError;
use crate::lock::{LockBackend, RetryPolicy, DEFAULT_MAX_RETRY, DEFAULT_RETRY_WAIT_MS};
use crate::manager::LockableStorageManager;
use crate::storage::StorageBackend;

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Store DATA at PATH
    Write { path: String, data: String },

    /// Print the payload at PATH
    Read {
        path: String,
        /// Printed when nothing is stored at PATH
        #[arg(long, default_value = "")]
        default: String,
    },

    /// Remove the payload at PATH (succeeds if absent)
    Delete { path: String },

    /// Print whether a payload is stored at PATH
    Exists { path: String },

    /// Try once to lock PATH and print whether it was acquired
    Lock { path: String },

    /// Remove the lock on PATH and print whether one was held
    Unlock { path: String },

    /// Print whether PATH is currently locked
    IsLocked { path: String },

    /// Lock PATH, retrying at a fixed interval until acquired or out of attempts
    Acquire {
        path: String,
        /// Number of lock attempts
        #[arg(long, default_value_t = DEFAULT_MAX_RETRY)]
        max_retry: u32,
        /// Pause between attempts, in milliseconds
        #[arg(long, default_value_t = DEFAULT_RETRY_WAIT_MS)]
        retry_wait_ms: u64,
    },
}

/// Run `command` against `manager` and return the line to print.
pub async fn execute(
    manager: &LockableStorageManager,
    command: Command,
) -> Result<String, StorageError> {
    let output = match command {
        Command::Write { path, data } => {
            manager.write(&data, &path).await?;
            "ok".to_string()
        }
        Command::Read { path, default } => manager.read(&path, &default).await?,
        Command::Delete { path } => {
            manager.delete(&path).await?;
            "ok".to_string()
        }
        Command::Exists { path } => manager.exists(&path).await?.to_string(),
        Command::Lock { path } => manager.lock(&path).await?.to_string(),
        Command::Unlock { path } => manager.unlock(&path).await?.to_string(),
        Command::IsLocked { path } => manager.is_locked(&path).await?.to_string(),
        Command::Acquire {
            path,
            max_retry,
            retry_wait_ms,
        } => {
            let policy = RetryPolicy::new(max_retry, Duration::from_millis(retry_wait_ms));
            manager.acquire_lock(&path, policy).await?;
            "ok".to_string()
        }
    };
    Ok(output)
}
