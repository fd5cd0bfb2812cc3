//! Error types for the sync engine.
//!
//! Only fatal conditions are represented here. Soft per-item failures
//! (one file failing to copy, one custom directory failing to transfer)
//! are logged and never surface as a `SyncError`.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SyncError {
    /// The local directory to sync does not exist.
    #[error("Local path not found: '{path}'")]
    LocalRootNotFound { path: PathBuf },

    /// The local path exists but is not a directory.
    #[error("Local path is not a directory: '{path}'")]
    NotADirectory { path: PathBuf },

    /// A session with this name is already registered.
    #[error("Sync session '{name}' already exists. Stop it first or pick another name.")]
    SessionExists { name: String },

    /// No session with this name is registered.
    #[error("Sync session '{name}' not found")]
    SessionNotFound { name: String },

    /// The session was stopped while its initial sync was still running.
    #[error("Sync session '{name}' was stopped during initialization")]
    SessionCancelled { name: String },

    /// The file-change subscription could not be established.
    #[error("Failed to watch '{path}': {source}")]
    Subscribe {
        path: PathBuf,
        #[source]
        source: anyhow::Error,
    },

    /// Packing or remote extraction failed during a bulk transfer.
    #[error("Transfer of '{path}' to '{destination}' failed: {source}")]
    Transfer {
        path: PathBuf,
        destination: String,
        #[source]
        source: anyhow::Error,
    },

    /// Every unit of a custom-directory batch failed.
    #[error("All {total} custom directories failed to sync")]
    AllUnitsFailed { total: usize },

    /// Generic I/O error
    #[error("I/O error on '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl SyncError {
    /// Classify an I/O error raised while resolving a local path.
    pub fn from_io(error: io::Error, path: PathBuf) -> Self {
        match error.kind() {
            io::ErrorKind::NotFound => SyncError::LocalRootNotFound { path },
            _ => SyncError::Io {
                path,
                source: error,
            },
        }
    }
}

pub type SyncResult<T> = Result<T, SyncError>;
