use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Error types for reading or writing a target file.
///
/// All of them concern a single file; the batch skips that file and carries on.
#[derive(Error, Debug)]
pub enum PatchError {
    #[error("{} not found", path.display())]
    NotFound { path: PathBuf },

    #[error("permission denied on {}", path.display())]
    PermissionDenied { path: PathBuf },

    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl PatchError {
    /// Classify an I/O error raised while touching `path`.
    pub fn from_io(path: &Path, err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::NotFound => PatchError::NotFound {
                path: path.to_path_buf(),
            },
            io::ErrorKind::PermissionDenied => PatchError::PermissionDenied {
                path: path.to_path_buf(),
            },
            _ => PatchError::Io {
                path: path.to_path_buf(),
                source: err,
            },
        }
    }

    pub fn path(&self) -> &Path {
        match self {
            PatchError::NotFound { path }
            | PatchError::PermissionDenied { path }
            | PatchError::Io { path, .. } => path,
        }
    }
}

pub type Result<T> = core::result::Result<T, PatchError>;
