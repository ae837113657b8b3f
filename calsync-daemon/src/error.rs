use std::path::PathBuf;

use thiserror::Error;

/// Error surface for the daemon runtime.
#[derive(Debug, Error)]
pub enum DaemonError {
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("notify error: {0}")]
    Notify(#[from] notify::Error),

    #[error("sync stopped the daemon: {0}")]
    Sync(#[from] calsync_sync::SyncError),

    #[error("source file {path} has no parent directory to watch")]
    Unwatchable { path: PathBuf },

    #[error("{0}")]
    Task(String),
}

pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> DaemonError {
    DaemonError::Io {
        path: path.into(),
        source,
    }
}
