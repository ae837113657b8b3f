//! OAuth session state for the Google backend.
//!
//! A [`Session`] is the access token plus what is needed to renew it. It is
//! persisted as JSON in the token file (mode 0600 on unix). When neither a
//! fresh token nor a refresh token is available, [`authorize_interactive`]
//! runs the installed-app loopback flow: it prints and opens the consent URL,
//! then waits for Google to redirect the browser back to `127.0.0.1:<port>`.

use std::fs;
use std::io::{self, BufRead, BufReader, Write};
use std::net::{TcpListener, TcpStream};
use std::path::Path;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use url::Url;

use calsync_core::error::connector_io_err;
use calsync_core::ConnectorError;

use crate::config::ClientSecrets;

pub const SCOPE: &str = "https://www.googleapis.com/auth/calendar";

/// Tokens this close to expiry are treated as expired.
const EXPIRY_MARGIN_SECS: i64 = 60;
const DEFAULT_TOKEN_LIFETIME_SECS: i64 = 3600;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub access_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    pub expires_at: DateTime<Utc>,
}

impl Session {
    pub fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        self.expires_at - Duration::seconds(EXPIRY_MARGIN_SECS) > now
    }

    /// Read the token file. A missing or unreadable-as-JSON file yields `None`
    /// so the caller falls through to a new authorization.
    pub fn load(path: &Path) -> Result<Option<Self>, ConnectorError> {
        let raw = match fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(connector_io_err(path, e)),
        };
        match serde_json::from_str(&raw) {
            Ok(session) => Ok(Some(session)),
            Err(err) => {
                tracing::warn!(path = %path.display(), error = %err, "ignoring corrupt token file");
                Ok(None)
            }
        }
    }

    /// Write the token file through a temp file and rename.
    pub fn save(&self, path: &Path) -> Result<(), ConnectorError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| connector_io_err(parent, e))?;
        }
        let body = serde_json::to_vec_pretty(self).map_err(|e| connector_io_err(path, e.into()))?;

        let tmp = path.with_extension("json.tmp");
        write_private(&tmp, &body).map_err(|e| connector_io_err(&tmp, e))?;
        if let Err(e) = fs::rename(&tmp, path) {
            let _ = fs::remove_file(&tmp);
            return Err(connector_io_err(path, e));
        }
        tracing::debug!(path = %path.display(), "saved OAuth token");
        Ok(())
    }
}

fn write_private(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let _ = fs::remove_file(path);
    let mut options = fs::OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    let mut file = options.open(path)?;
    file.write_all(bytes)?;
    file.sync_all()
}

// ---------------------------------------------------------------------------
// Token endpoint
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<i64>,
    #[serde(default)]
    refresh_token: Option<String>,
}

impl TokenResponse {
    /// Google omits the refresh token on refresh responses; keep the old one.
    fn into_session(self, previous_refresh: Option<String>, now: DateTime<Utc>) -> Session {
        let lifetime = self.expires_in.unwrap_or(DEFAULT_TOKEN_LIFETIME_SECS);
        Session {
            access_token: self.access_token,
            refresh_token: self.refresh_token.or(previous_refresh),
            expires_at: now + Duration::seconds(lifetime),
        }
    }
}

fn token_request(
    agent: &ureq::Agent,
    secrets: &ClientSecrets,
    form: &[(&str, &str)],
) -> Result<TokenResponse, ConnectorError> {
    let response = agent
        .post(&secrets.token_uri)
        .send_form(form)
        .map_err(|err| match err {
            // `invalid_grant` (revoked or expired refresh token) and bad client credentials.
            ureq::Error::Status(status @ (400 | 401), response) => {
                let body = response.into_string().unwrap_or_default();
                ConnectorError::Auth(format!("token endpoint returned HTTP {status}: {body}"))
            }
            ureq::Error::Status(status, response) => ConnectorError::Http {
                status,
                body: response.into_string().unwrap_or_default(),
            },
            ureq::Error::Transport(transport) => ConnectorError::Transport(transport.to_string()),
        })?;
    response
        .into_json()
        .map_err(|e| ConnectorError::InvalidResponse(format!("token response: {e}")))
}

/// Trade a refresh token for a new access token.
pub fn refresh(
    agent: &ureq::Agent,
    secrets: &ClientSecrets,
    refresh_token: &str,
) -> Result<Session, ConnectorError> {
    let token = token_request(
        agent,
        secrets,
        &[
            ("grant_type", "refresh_token"),
            ("client_id", secrets.client_id.as_str()),
            ("client_secret", secrets.client_secret.as_str()),
            ("refresh_token", refresh_token),
        ],
    )?;
    tracing::info!("refreshed OAuth access token");
    Ok(token.into_session(Some(refresh_token.to_string()), Utc::now()))
}

// ---------------------------------------------------------------------------
// Loopback consent flow
// ---------------------------------------------------------------------------

pub fn consent_url(
    secrets: &ClientSecrets,
    redirect_uri: &str,
    state: &str,
) -> Result<Url, ConnectorError> {
    Url::parse_with_params(
        &secrets.auth_uri,
        &[
            ("client_id", secrets.client_id.as_str()),
            ("redirect_uri", redirect_uri),
            ("response_type", "code"),
            ("scope", SCOPE),
            ("access_type", "offline"),
            ("prompt", "consent"),
            ("state", state),
        ],
    )
    .map_err(|e| ConnectorError::Config(format!("invalid auth_uri '{}': {e}", secrets.auth_uri)))
}

/// Run the interactive installed-app flow and return a brand-new session.
pub fn authorize_interactive(
    agent: &ureq::Agent,
    secrets: &ClientSecrets,
    port: u16,
) -> Result<Session, ConnectorError> {
    let redirect_uri = format!("http://127.0.0.1:{port}/");
    let state = consent_state();
    let consent = consent_url(secrets, &redirect_uri, &state)?;

    let listener = TcpListener::bind(("127.0.0.1", port))
        .map_err(|e| ConnectorError::Auth(format!("cannot listen on {redirect_uri}: {e}")))?;

    tracing::warn!("Google Calendar authorization required, waiting for consent in the browser");
    eprintln!("Open this URL in a browser to authorize calsync:\n\n  {consent}\n");
    if let Err(err) = open::that(consent.as_str()) {
        tracing::debug!(error = %err, "could not launch a browser");
    }

    let code = wait_for_code(&listener, &state)?;
    let token = token_request(
        agent,
        secrets,
        &[
            ("grant_type", "authorization_code"),
            ("code", code.as_str()),
            ("client_id", secrets.client_id.as_str()),
            ("client_secret", secrets.client_secret.as_str()),
            ("redirect_uri", redirect_uri.as_str()),
        ],
    )?;
    tracing::info!("Google Calendar authorization complete");
    Ok(token.into_session(None, Utc::now()))
}

/// Random anti-forgery token echoed back by the consent redirect.
fn consent_state() -> String {
    use rand::{distributions::Alphanumeric, Rng};

    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(32)
        .map(char::from)
        .collect()
}

#[derive(Debug, PartialEq, Eq)]
enum Callback {
    Code(String),
    Denied(String),
    /// Not the redirect (e.g. a favicon request); keep waiting.
    Ignored,
}

fn parse_callback(request_line: &str, expected_state: &str) -> Callback {
    let Some(target) = request_line.split_whitespace().nth(1) else {
        return Callback::Ignored;
    };
    let Ok(url) = Url::parse(&format!("http://127.0.0.1{target}")) else {
        return Callback::Ignored;
    };

    let (mut code, mut state, mut error) = (None, None, None);
    for (key, value) in url.query_pairs() {
        match key.as_ref() {
            "code" => code = Some(value.into_owned()),
            "state" => state = Some(value.into_owned()),
            "error" => error = Some(value.into_owned()),
            _ => {}
        }
    }

    if let Some(error) = error {
        return Callback::Denied(error);
    }
    match code {
        None => Callback::Ignored,
        Some(_) if state.as_deref() != Some(expected_state) => {
            Callback::Denied("state mismatch".to_string())
        }
        Some(code) => Callback::Code(code),
    }
}

fn wait_for_code(listener: &TcpListener, state: &str) -> Result<String, ConnectorError> {
    loop {
        let (mut stream, _) = listener
            .accept()
            .map_err(|e| ConnectorError::Auth(format!("loopback listener failed: {e}")))?;
        let mut request_line = String::new();
        if BufReader::new(&stream).read_line(&mut request_line).is_err() {
            continue;
        }

        match parse_callback(&request_line, state) {
            Callback::Ignored => respond(&mut stream, "404 Not Found", "Not found."),
            Callback::Code(code) => {
                respond(
                    &mut stream,
                    "200 OK",
                    "calsync is authorized. You can close this window.",
                );
                return Ok(code);
            }
            Callback::Denied(reason) => {
                respond(&mut stream, "400 Bad Request", "Authorization failed.");
                return Err(ConnectorError::Auth(format!("authorization denied: {reason}")));
            }
        }
    }
}

fn respond(stream: &mut TcpStream, status: &str, body: &str) {
    let reply = format!(
        "HTTP/1.1 {status}\r\nContent-Type: text/plain; charset=utf-8\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
        body.len()
    );
    if let Err(err) = stream.write_all(reply.as_bytes()) {
        tracing::debug!(error = %err, "failed to answer loopback request");
    }
}
