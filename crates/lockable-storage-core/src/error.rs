use std::fmt;

use thiserror::Error;

/// Which half of the facade an operation needed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    Storage,
    Lock,
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendKind::Storage => write!(f, "storage"),
            BackendKind::Lock => write!(f, "lock"),
        }
    }
}

/// Errors that can occur in the storage and locking layer.
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("I/O error: {0}")]
    Io(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// An operation was invoked on a facade built without the backend it needs.
    #[error("No {0} backend configured")]
    BackendNotConfigured(BackendKind),

    /// `acquire_lock` ran out of attempts.
    #[error("Failed to acquire lock on {path} after {attempts} attempt(s)")]
    LockAcquisitionFailed { path: String, attempts: u32 },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages() {
        let err = StorageError::BackendNotConfigured(BackendKind::Storage);
        assert_eq!(err.to_string(), "No storage backend configured");

        let err = StorageError::LockAcquisitionFailed {
            path: "docs/a.json".to_string(),
            attempts: 5,
        };
        assert_eq!(
            err.to_string(),
            "Failed to acquire lock on docs/a.json after 5 attempt(s)"
        );
    }
}
