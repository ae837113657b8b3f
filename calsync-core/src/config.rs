//! YAML settings for the sync client.
//!
//! # File layout
//!
//! ```yaml
//! sync_delay_secs: 5
//! source_path: ~/Games/WTF/SavedVariables/CalendarSync.yaml
//! enabled_backends: [google_calendar]
//! backends:
//!   google_calendar:
//!     credentials_file: ~/.calsync/credentials.json
//! ```
//!
//! Backend sections are opaque string maps handed to that backend's constructor.
//!
//! # API pattern
//!
//! `load_at(home, …)` takes an explicit home for tests; [`load`] derives it
//! from `dirs::home_dir()`.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{config_io_err, ConfigError};
use crate::paths;

/// Default quiet window before a sync runs, in seconds.
pub const DEFAULT_SYNC_DELAY_SECS: u64 = 5;

/// Opaque key/value configuration for one backend.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BackendSection(pub BTreeMap<String, String>);

impl BackendSection {
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    /// Like [`get`](Self::get), but a missing or blank value is a [`ConfigError::MissingOption`].
    pub fn require(&self, backend: &str, key: &str) -> Result<&str, ConfigError> {
        match self.get(key) {
            Some(value) if !value.trim().is_empty() => Ok(value),
            _ => Err(ConfigError::MissingOption {
                backend: backend.to_string(),
                option: key.to_string(),
            }),
        }
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for BackendSection {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

/// Root of `config.yaml`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    /// Quiet window `D`: seconds of silence after the last change before a sync starts.
    #[serde(default = "default_sync_delay_secs")]
    pub sync_delay_secs: u64,
    /// Location of the local event source file.
    pub source_path: PathBuf,
    /// Backends to sync, in the order they are reconciled.
    #[serde(default)]
    pub enabled_backends: Vec<String>,
    #[serde(default)]
    pub backends: BTreeMap<String, BackendSection>,
}

fn default_sync_delay_secs() -> u64 {
    DEFAULT_SYNC_DELAY_SECS
}

impl Settings {
    pub fn quiet_window(&self) -> Duration {
        Duration::from_secs(self.sync_delay_secs)
    }

    /// The section of an enabled backend.
    pub fn backend_section(&self, name: &str) -> Result<&BackendSection, ConfigError> {
        self.backends
            .get(name)
            .ok_or_else(|| ConfigError::MissingBackendSection {
                name: name.to_string(),
            })
    }

    /// Check the invariants a sync run relies on.
    ///
    /// `path` is only used to point error messages at the offending file.
    pub fn validate(&self, path: &Path) -> Result<(), ConfigError> {
        let enabled: Vec<&String> = self
            .enabled_backends
            .iter()
            .filter(|name| !name.trim().is_empty())
            .collect();
        if enabled.is_empty() {
            return Err(ConfigError::NoBackends {
                path: path.to_path_buf(),
            });
        }
        for name in enabled {
            self.backend_section(name)?;
        }
        if !self.source_path.exists() {
            return Err(ConfigError::SourceNotFound {
                path: self.source_path.clone(),
            });
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Load
// ---------------------------------------------------------------------------

/// Parse `path` without validating it. `~` in `source_path` is expanded against `home`.
pub fn parse_at(home: &Path, path: &Path) -> Result<Settings, ConfigError> {
    if !path.exists() {
        return Err(ConfigError::NotFound {
            path: path.to_path_buf(),
        });
    }
    let contents = std::fs::read_to_string(path).map_err(|e| config_io_err(path, e))?;
    let mut settings: Settings =
        serde_yaml::from_str(&contents).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            source: e,
        })?;
    settings.source_path = paths::expand_tilde(&settings.source_path, home);
    settings.enabled_backends = settings
        .enabled_backends
        .into_iter()
        .map(|name| name.trim().to_string())
        .filter(|name| !name.is_empty())
        .collect();
    Ok(settings)
}

/// Load and validate settings from `path`, or from `<home>/.calsync/config.yaml`.
pub fn load_at(home: &Path, path: Option<&Path>) -> Result<Settings, ConfigError> {
    let path = match path {
        Some(path) => paths::expand_tilde(path, home),
        None => paths::config_path(home),
    };
    let settings = parse_at(home, &path)?;
    settings.validate(&path)?;
    Ok(settings)
}

/// `load_at` convenience wrapper.
pub fn load(path: Option<&Path>) -> Result<Settings, ConfigError> {
    load_at(&paths::home()?, path)
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write_config(home: &TempDir, body: &str) -> PathBuf {
        let path = paths::config_path(home.path());
        std::fs::create_dir_all(path.parent().expect("parent")).expect("mkdir");
        std::fs::write(&path, body).expect("write config");
        path
    }

    #[test]
    fn defaults_apply_when_omitted() {
        let home = TempDir::new().expect("home");
        write_config(&home, "source_path: /nowhere.yaml\n");
        let settings = parse_at(home.path(), &paths::config_path(home.path())).expect("parse");
        assert_eq!(settings.sync_delay_secs, DEFAULT_SYNC_DELAY_SECS);
        assert_eq!(settings.quiet_window(), Duration::from_secs(5));
        assert!(settings.enabled_backends.is_empty());
    }

    #[test]
    fn source_path_tilde_is_expanded() {
        let home = TempDir::new().expect("home");
        write_config(&home, "source_path: ~/events.yaml\n");
        let settings = parse_at(home.path(), &paths::config_path(home.path())).expect("parse");
        assert_eq!(settings.source_path, home.path().join("events.yaml"));
    }

    #[test]
    fn blank_backend_names_are_dropped() {
        let home = TempDir::new().expect("home");
        write_config(
            &home,
            "source_path: /x.yaml\nenabled_backends: [' google_calendar ', '']\n",
        );
        let settings = parse_at(home.path(), &paths::config_path(home.path())).expect("parse");
        assert_eq!(settings.enabled_backends, vec!["google_calendar".to_string()]);
    }

    #[test]
    fn require_rejects_blank_values() {
        let section: BackendSection = [("credentials_file", "  ")].into_iter().collect();
        let err = section.require("google_calendar", "credentials_file").unwrap_err();
        assert!(matches!(err, ConfigError::MissingOption { .. }));
        assert!(err.to_string().contains("credentials_file"));
    }

    #[test]
    fn load_missing_config_returns_not_found() {
        let home = TempDir::new().expect("home");
        let err = load_at(home.path(), None).unwrap_err();
        assert!(matches!(err, ConfigError::NotFound { .. }), "got: {err}");
    }
}
