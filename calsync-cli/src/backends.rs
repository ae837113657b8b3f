//! Backend selection by configured name.

use std::path::Path;

use calsync_core::{BackendSection, ConfigError, ConnectorError};
use calsync_google::GoogleCalendarConnector;
use calsync_sync::memory::MemoryConnector;
use calsync_sync::SyncBackend;

pub const MEMORY_BACKEND: &str = "memory";

/// Construct the connector registered under `name`. Google connectors
/// authenticate here, interactively if no usable token is stored.
pub fn build_backend(
    name: &str,
    section: &BackendSection,
    home: &Path,
    data_dir: &Path,
) -> Result<Box<dyn SyncBackend>, ConnectorError> {
    match name {
        calsync_google::BACKEND_NAME => Ok(Box::new(GoogleCalendarConnector::connect(
            section, home, data_dir,
        )?)),
        MEMORY_BACKEND => Ok(Box::new(MemoryConnector::new(MEMORY_BACKEND).with_wall_clock())),
        other => Err(ConfigError::UnknownBackend {
            name: other.to_string(),
        }
        .into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_backend_needs_no_options() {
        let backend = build_backend(
            "memory",
            &BackendSection::default(),
            Path::new("/home/op"),
            Path::new("/home/op/.calsync/data"),
        )
        .map_err(|e| e.to_string())
        .expect("memory backend");
        assert_eq!(backend.name(), "memory");
    }

    #[test]
    fn unknown_backend_is_a_config_error() {
        let err = build_backend(
            "outlook",
            &BackendSection::default(),
            Path::new("/home/op"),
            Path::new("/data"),
        )
        .err()
        .expect("error");
        assert!(err.is_fatal());
        assert!(err.to_string().contains("unknown backend 'outlook'"));
    }

    #[test]
    fn google_backend_requires_credentials() {
        let err = build_backend(
            "google_calendar",
            &BackendSection::default(),
            Path::new("/home/op"),
            Path::new("/data"),
        )
        .err()
        .expect("error");
        assert!(err.to_string().contains("credentials_file"));
    }
}
