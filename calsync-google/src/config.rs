//! Backend section options and the OAuth client secrets file.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use calsync_core::{paths, BackendSection, ConnectorError};

use crate::BACKEND_NAME;

pub const DEFAULT_TIME_ZONE: &str = "UTC";
pub const DEFAULT_API_BASE: &str = "https://www.googleapis.com/calendar/v3";
pub const DEFAULT_REDIRECT_PORT: u16 = 8080;

const DEFAULT_AUTH_URI: &str = "https://accounts.google.com/o/oauth2/auth";
const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";

/// Options read from the `google_calendar` section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GoogleConfig {
    pub credentials_file: PathBuf,
    pub token_file: PathBuf,
    pub time_zone: String,
    pub api_base: String,
    pub redirect_port: u16,
}

impl GoogleConfig {
    /// Read the section. `data_dir` is the root for per-backend state; the
    /// token file defaults to `<data_dir>/google_calendar/token.json`.
    pub fn from_section(
        section: &BackendSection,
        home: &Path,
        data_dir: &Path,
    ) -> Result<Self, ConnectorError> {
        let credentials = section.require(BACKEND_NAME, "credentials_file")?;
        let credentials_file = paths::expand_tilde(Path::new(credentials), home);

        let token_file = match non_blank(section, "token_file") {
            Some(path) => paths::expand_tilde(Path::new(path), home),
            None => data_dir.join(BACKEND_NAME).join("token.json"),
        };

        let redirect_port = match non_blank(section, "redirect_port") {
            Some(port) => port.parse().map_err(|_| {
                ConnectorError::Config(format!("redirect_port '{port}' is not a port number"))
            })?,
            None => DEFAULT_REDIRECT_PORT,
        };

        Ok(Self {
            credentials_file,
            token_file,
            time_zone: non_blank(section, "time_zone")
                .unwrap_or(DEFAULT_TIME_ZONE)
                .to_string(),
            api_base: non_blank(section, "api_base")
                .unwrap_or(DEFAULT_API_BASE)
                .trim_end_matches('/')
                .to_string(),
            redirect_port,
        })
    }
}

fn non_blank<'a>(section: &'a BackendSection, key: &str) -> Option<&'a str> {
    section.get(key).map(str::trim).filter(|v| !v.is_empty())
}

// ---------------------------------------------------------------------------
// Client secrets
// ---------------------------------------------------------------------------

/// OAuth client registration, as downloaded from the Google Cloud console.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ClientSecrets {
    pub client_id: String,
    pub client_secret: String,
    #[serde(default = "default_auth_uri")]
    pub auth_uri: String,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
}

fn default_auth_uri() -> String {
    DEFAULT_AUTH_URI.to_string()
}

fn default_token_uri() -> String {
    DEFAULT_TOKEN_URI.to_string()
}

/// The console wraps the registration in `installed` (desktop apps) or `web`.
#[derive(Deserialize)]
struct SecretsFile {
    installed: Option<ClientSecrets>,
    web: Option<ClientSecrets>,
}

impl ClientSecrets {
    pub fn parse(raw: &str) -> Result<Self, ConnectorError> {
        let file: SecretsFile = serde_json::from_str(raw)
            .map_err(|e| ConnectorError::Config(format!("invalid client secrets: {e}")))?;
        file.installed.or(file.web).ok_or_else(|| {
            ConnectorError::Config(
                "client secrets contain neither an 'installed' nor a 'web' client".to_string(),
            )
        })
    }

    pub fn load(path: &Path) -> Result<Self, ConnectorError> {
        let raw = fs::read_to_string(path).map_err(|e| {
            ConnectorError::Config(format!(
                "cannot read credentials file {}: {e}",
                path.display()
            ))
        })?;
        Self::parse(&raw)
    }
}
