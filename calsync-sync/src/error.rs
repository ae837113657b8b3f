//! Error types for calsync-sync.

use thiserror::Error;

use calsync_core::{ConnectorError, SourceError};

/// Errors that end a whole orchestrated run.
///
/// Transient connector failures never show up here; they are confined to
/// their (calendar, backend) pair and reported in the run summary.
#[derive(Debug, Error)]
pub enum SyncError {
    /// The local snapshot could not be read.
    #[error("event source error: {0}")]
    Source(#[from] SourceError),

    /// A backend failed in a way retrying cannot fix (auth, configuration).
    #[error("backend '{backend}' failed on calendar '{calendar}' during {operation}: {source}")]
    Fatal {
        backend: String,
        calendar: String,
        operation: &'static str,
        #[source]
        source: ConnectorError,
    },
}

impl SyncError {
    pub fn is_fatal(&self) -> bool {
        matches!(self, SyncError::Fatal { .. })
    }
}

/// A connector error that ended a reconciliation pass, tagged with the
/// connector operation that raised it.
#[derive(Debug, Error)]
#[error("{operation} failed: {source}")]
pub struct PassError {
    pub operation: &'static str,
    #[source]
    pub source: ConnectorError,
}

impl PassError {
    pub fn is_fatal(&self) -> bool {
        self.source.is_fatal()
    }
}
