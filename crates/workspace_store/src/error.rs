use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum WorkspaceError {
    #[error("workspace root {path} is not a directory")]
    RootNotDirectory { path: PathBuf },

    #[error("I/O error while {operation} at {path}: {source}")]
    Io {
        operation: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("path {path} must be relative and free of parent segments")]
    InvalidRelativePath { path: PathBuf },

    #[error("path escapes workspace root: {path}")]
    OutsideRoot { path: PathBuf },

    #[error("no existing ancestor found for path {path}")]
    NoExistingAncestor { path: PathBuf },
}

impl WorkspaceError {
    #[must_use]
    pub fn io(operation: &'static str, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            operation,
            path: path.into(),
            source,
        }
    }
}
