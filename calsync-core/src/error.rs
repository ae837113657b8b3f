//! Error types for calsync-core.

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while loading or validating the settings file.
///
/// Every variant is fatal: the process reports it and exits before any sync
/// pass starts.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("config not found at {path}")]
    NotFound { path: PathBuf },

    /// YAML parse error on load: includes file path and line context from serde_yaml.
    #[error("failed to parse config at {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("no backends enabled; set `enabled_backends` in {path}")]
    NoBackends { path: PathBuf },

    #[error("backend '{name}' is enabled but has no section under `backends`")]
    MissingBackendSection { name: String },

    #[error("unknown backend '{name}'")]
    UnknownBackend { name: String },

    #[error("backend '{backend}' is missing required option '{option}'")]
    MissingOption { backend: String, option: String },

    #[error("event source not found at {path}; check `source_path`")]
    SourceNotFound { path: PathBuf },

    /// `dirs::home_dir()` returned `None`: cannot locate `~/.calsync/`.
    #[error("cannot determine home directory; set $HOME or equivalent")]
    HomeNotFound,
}

/// Errors raised while reading the local event snapshot.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("event source not found at {path}")]
    NotFound { path: PathBuf },

    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse event source at {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
}

/// Errors surfaced by a [`Connector`](crate::Connector) operation.
///
/// A lookup miss is never an error; it is reported as `Ok(None)`.
#[derive(Debug, Error)]
pub enum ConnectorError {
    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("backend configuration error: {0}")]
    Config(String),

    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },

    #[error("transport error: {0}")]
    Transport(String),

    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid response from backend: {0}")]
    InvalidResponse(String),

    /// The local event cannot be expressed on this backend (e.g. out-of-range time).
    #[error("event cannot be sent to backend: {0}")]
    InvalidEvent(String),
}

impl ConnectorError {
    /// Auth and configuration failures cannot be cured by running again.
    pub fn is_fatal(&self) -> bool {
        matches!(self, ConnectorError::Auth(_) | ConnectorError::Config(_))
    }
}

impl From<ConfigError> for ConnectorError {
    fn from(err: ConfigError) -> Self {
        ConnectorError::Config(err.to_string())
    }
}

pub(crate) fn config_io_err(path: impl Into<PathBuf>, source: std::io::Error) -> ConfigError {
    ConfigError::Io {
        path: path.into(),
        source,
    }
}

/// Convenience constructor for [`ConnectorError::Io`].
pub fn connector_io_err(path: impl Into<PathBuf>, source: std::io::Error) -> ConnectorError {
    ConnectorError::Io {
        path: path.into(),
        source,
    }
}
