use std::io;
use std::path::{Component, Path, PathBuf};

use lockable_storage_core::StorageError;

/// Turn a storage path into a relative filesystem path that cannot escape its base directory.
pub(crate) fn relative_path(path: &str) -> Result<PathBuf, StorageError> {
    if path.is_empty() {
        return Err(StorageError::InvalidArgument("path must not be empty".to_string()));
    }

    let mut relative = PathBuf::new();
    for component in Path::new(path).components() {
        match component {
            Component::Normal(part) => relative.push(part),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                return Err(StorageError::InvalidArgument(format!(
                    "path must be relative and stay inside the base directory: {}",
                    path
                )));
            }
        }
    }

    if relative.as_os_str().is_empty() {
        return Err(StorageError::InvalidArgument(format!(
            "path does not name a file: {}",
            path
        )));
    }
    Ok(relative)
}

/// I/O errors that mean "nothing stored there".
pub(crate) fn is_absent(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::NotFound | io::ErrorKind::NotADirectory
    )
}
