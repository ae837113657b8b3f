//! [`Connector`] implementation over the Calendar API v3 REST endpoints.

use std::path::Path;
use std::time::Duration as StdDuration;

use chrono::{Duration, SecondsFormat, Utc};
use serde::de::DeserializeOwned;
use url::Url;

use calsync_core::{BackendSection, Comparison, Connector, ConnectorError, LocalEvent};

use crate::config::{ClientSecrets, GoogleConfig};
use crate::session::{self, Session};
use crate::wire::{self, EventBody, GoogleCalendar, GoogleEvent, NewCalendar, Page};
use crate::BACKEND_NAME;

const HTTP_TIMEOUT: StdDuration = StdDuration::from_secs(30);
const PAGE_SIZE: &str = "250";

pub struct GoogleCalendarConnector {
    config: GoogleConfig,
    secrets: ClientSecrets,
    agent: ureq::Agent,
    session: Option<Session>,
}

impl GoogleCalendarConnector {
    /// Read the client secrets. Nothing is sent to Google yet.
    pub fn new(config: GoogleConfig) -> Result<Self, ConnectorError> {
        let secrets = ClientSecrets::load(&config.credentials_file)?;
        let agent = ureq::AgentBuilder::new().timeout(HTTP_TIMEOUT).build();
        Ok(Self {
            config,
            secrets,
            agent,
            session: None,
        })
    }

    /// Build from the backend section and authenticate, running the
    /// interactive consent flow when no usable token is stored.
    pub fn connect(
        section: &BackendSection,
        home: &Path,
        data_dir: &Path,
    ) -> Result<Self, ConnectorError> {
        let mut connector = Self::new(GoogleConfig::from_section(section, home, data_dir)?)?;
        connector.ensure_authenticated()?;
        Ok(connector)
    }

    pub fn config(&self) -> &GoogleConfig {
        &self.config
    }

    /// Return a usable access token, in order of preference: the cached
    /// session, the token file, a refresh, a new interactive authorization.
    pub fn ensure_authenticated(&mut self) -> Result<String, ConnectorError> {
        let now = Utc::now();
        if let Some(current) = &self.session {
            if current.is_fresh(now) {
                return Ok(current.access_token.clone());
            }
        }

        let stored = match self.session.take() {
            Some(current) => Some(current),
            None => Session::load(&self.config.token_file)?,
        };

        let session = match stored {
            Some(stored) if stored.is_fresh(now) => stored,
            Some(Session {
                refresh_token: Some(refresh_token),
                ..
            }) => match session::refresh(&self.agent, &self.secrets, &refresh_token) {
                Ok(renewed) => {
                    renewed.save(&self.config.token_file)?;
                    renewed
                }
                Err(ConnectorError::Auth(reason)) => {
                    tracing::warn!(backend = BACKEND_NAME, error = %reason, "refresh token rejected, authorizing again");
                    self.authorize()?
                }
                Err(err) => return Err(err),
            },
            _ => self.authorize()?,
        };

        let token = session.access_token.clone();
        self.session = Some(session);
        Ok(token)
    }

    fn authorize(&self) -> Result<Session, ConnectorError> {
        let granted =
            session::authorize_interactive(&self.agent, &self.secrets, self.config.redirect_port)?;
        granted.save(&self.config.token_file)?;
        Ok(granted)
    }

    fn can_refresh(&self) -> bool {
        self.session
            .as_ref()
            .is_some_and(|session| session.refresh_token.is_some())
    }

    /// Mark the access token as expired, in memory and in the token file, so
    /// the next call renews it. The refresh token is kept.
    fn expire_session(&mut self) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        session.expires_at = Utc::now() - Duration::seconds(1);
        if let Err(err) = session.save(&self.config.token_file) {
            tracing::warn!(backend = BACKEND_NAME, error = %err, "could not persist expired token");
        }
    }

    // -----------------------------------------------------------------------
    // HTTP plumbing
    // -----------------------------------------------------------------------

    fn endpoint(&self, segments: &[&str]) -> Result<Url, ConnectorError> {
        let mut url = Url::parse(&self.config.api_base).map_err(|e| {
            ConnectorError::Config(format!("invalid api_base '{}': {e}", self.config.api_base))
        })?;
        url.path_segments_mut()
            .map_err(|()| {
                ConnectorError::Config(format!("api_base '{}' cannot be a base", self.config.api_base))
            })?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    /// Attach the bearer token and send. `body` is sent as JSON when present.
    /// A 401 with a refresh token at hand renews the session and resends once.
    fn send(
        &mut self,
        request: ureq::Request,
        body: Option<serde_json::Value>,
    ) -> Result<ureq::Response, ConnectorError> {
        let token = self.ensure_authenticated()?;
        match dispatch(request.clone(), &token, body.as_ref()) {
            Err(ureq::Error::Status(401, _)) if self.can_refresh() => {
                tracing::warn!(backend = BACKEND_NAME, "access token rejected, renewing it");
                self.expire_session();
                let token = self.ensure_authenticated()?;
                dispatch(request, &token, body.as_ref()).map_err(|err| self.failed(err))
            }
            result => result.map_err(|err| self.failed(err)),
        }
    }

    fn failed(&mut self, err: ureq::Error) -> ConnectorError {
        if let ureq::Error::Status(401, _) = &err {
            self.expire_session();
        }
        map_ureq_error(err)
    }

    fn paginate<T: DeserializeOwned>(
        &mut self,
        url: &Url,
        query: &[(&str, &str)],
    ) -> Result<Vec<T>, ConnectorError> {
        let mut items = Vec::new();
        let mut page_token: Option<String> = None;
        loop {
            let mut request = self.agent.get(url.as_str());
            for (key, value) in query {
                request = request.query(key, value);
            }
            if let Some(token) = &page_token {
                request = request.query("pageToken", token);
            }
            let page: Page<T> = read_json(self.send(request, None)?)?;
            items.extend(page.items);
            match page.next_page_token {
                Some(next) => page_token = Some(next),
                None => return Ok(items),
            }
        }
    }
}

fn dispatch(
    request: ureq::Request,
    token: &str,
    body: Option<&serde_json::Value>,
) -> Result<ureq::Response, ureq::Error> {
    let request = request.set("Authorization", &format!("Bearer {token}"));
    match body {
        Some(body) => request.send_json(body),
        None => request.call(),
    }
}

fn body_json(body: &impl serde::Serialize) -> Result<serde_json::Value, ConnectorError> {
    serde_json::to_value(body).map_err(|e| ConnectorError::InvalidEvent(e.to_string()))
}

fn read_json<T: DeserializeOwned>(response: ureq::Response) -> Result<T, ConnectorError> {
    response
        .into_json()
        .map_err(|e| ConnectorError::InvalidResponse(e.to_string()))
}

fn map_ureq_error(err: ureq::Error) -> ConnectorError {
    match err {
        ureq::Error::Status(status, response) => {
            status_error(status, response.into_string().unwrap_or_default())
        }
        ureq::Error::Transport(transport) => ConnectorError::Transport(transport.to_string()),
    }
}

/// Google answers quota exhaustion with a 403 as well; that one is transient.
pub(crate) fn status_error(status: u16, body: String) -> ConnectorError {
    let rate_limited = body.contains("rateLimitExceeded")
        || body.contains("RateLimitExceeded")
        || body.contains("quotaExceeded");
    match status {
        401 => ConnectorError::Auth(format!("HTTP 401: {body}")),
        403 if !rate_limited => ConnectorError::Auth(format!("HTTP 403: {body}")),
        _ => ConnectorError::Http { status, body },
    }
}

fn is_gone(err: &ConnectorError) -> bool {
    matches!(err, ConnectorError::Http { status: 404 | 410, .. })
}

// ---------------------------------------------------------------------------
// Connector
// ---------------------------------------------------------------------------

impl Connector for GoogleCalendarConnector {
    type Calendar = GoogleCalendar;
    type RemoteEvent = GoogleEvent;

    fn name(&self) -> &str {
        BACKEND_NAME
    }

    fn find_calendar(&mut self, name: &str) -> Result<Option<GoogleCalendar>, ConnectorError> {
        let url = self.endpoint(&["users", "me", "calendarList"])?;
        let calendars: Vec<GoogleCalendar> = self.paginate(&url, &[("maxResults", PAGE_SIZE)])?;
        Ok(calendars.into_iter().find(|c| c.summary == name))
    }

    fn create_calendar(&mut self, name: &str) -> Result<GoogleCalendar, ConnectorError> {
        let url = self.endpoint(&["calendars"])?;
        let body = body_json(&NewCalendar {
            summary: name,
            time_zone: "UTC",
        })?;
        let request = self.agent.post(url.as_str());
        let created: GoogleCalendar = read_json(self.send(request, Some(body))?)?;
        tracing::info!(backend = BACKEND_NAME, calendar = name, id = %created.id, "created calendar");
        Ok(created)
    }

    fn create_event(
        &mut self,
        calendar: &GoogleCalendar,
        local: &LocalEvent,
    ) -> Result<(), ConnectorError> {
        let body = body_json(&EventBody::from_local(local, &self.config.time_zone, true)?)?;
        let url = self.endpoint(&["calendars", &calendar.id, "events"])?;
        let request = self.agent.post(url.as_str());
        match self.send(request, Some(body)) {
            Ok(_) => Ok(()),
            // The id belongs to an event deleted earlier; overwrite it instead.
            Err(ConnectorError::Http { status: 409, .. }) => {
                let body = body_json(&EventBody::from_local(local, &self.config.time_zone, false)?)?;
                let id = wire::remote_event_id(local.id)?;
                let url = self.endpoint(&["calendars", &calendar.id, "events", &id])?;
                let request = self.agent.put(url.as_str());
                self.send(request, Some(body)).map(|_| ())
            }
            Err(err) => Err(err),
        }
    }

    fn get_event(
        &mut self,
        calendar: &GoogleCalendar,
        local: &LocalEvent,
    ) -> Result<Option<GoogleEvent>, ConnectorError> {
        let id = wire::remote_event_id(local.id)?;
        let url = self.endpoint(&["calendars", &calendar.id, "events", &id])?;
        let request = self.agent.get(url.as_str());
        match self.send(request, None) {
            Ok(response) => {
                let event: GoogleEvent = read_json(response)?;
                Ok((!event.is_cancelled()).then_some(event))
            }
            Err(err) if is_gone(&err) => Ok(None),
            Err(err) => Err(err),
        }
    }

    fn get_events(
        &mut self,
        calendar: &GoogleCalendar,
        lookahead_days: u32,
    ) -> Result<Vec<GoogleEvent>, ConnectorError> {
        let now = Utc::now();
        let time_min = now.to_rfc3339_opts(SecondsFormat::Secs, true);
        let time_max = (now + Duration::days(i64::from(lookahead_days)))
            .to_rfc3339_opts(SecondsFormat::Secs, true);

        let url = self.endpoint(&["calendars", &calendar.id, "events"])?;
        let events: Vec<GoogleEvent> = self.paginate(
            &url,
            &[
                ("timeMin", time_min.as_str()),
                ("timeMax", time_max.as_str()),
                ("singleEvents", "true"),
                ("orderBy", "startTime"),
                ("maxResults", PAGE_SIZE),
            ],
        )?;
        Ok(events.into_iter().filter(|e| !e.is_cancelled()).collect())
    }

    fn update_event(
        &mut self,
        calendar: &GoogleCalendar,
        remote: &GoogleEvent,
        local: &LocalEvent,
    ) -> Result<(), ConnectorError> {
        let body = body_json(&EventBody::from_local(local, &self.config.time_zone, false)?)?;
        let url = self.endpoint(&["calendars", &calendar.id, "events", &remote.id])?;
        let request = self.agent.request("PATCH", url.as_str());
        self.send(request, Some(body)).map(|_| ())
    }

    fn remove_event(
        &mut self,
        calendar: &GoogleCalendar,
        remote: &GoogleEvent,
    ) -> Result<(), ConnectorError> {
        let url = self.endpoint(&["calendars", &calendar.id, "events", &remote.id])?;
        let request = self.agent.delete(url.as_str());
        match self.send(request, None) {
            Ok(_) => Ok(()),
            Err(err) if is_gone(&err) => {
                tracing::debug!(backend = BACKEND_NAME, event = %remote.id, "event already deleted");
                Ok(())
            }
            Err(err) => Err(err),
        }
    }

    fn compare_events(&self, local: &LocalEvent, remote: &GoogleEvent) -> Comparison {
        wire::compare(local, remote)
    }

    fn describe(&self, remote: &GoogleEvent) -> String {
        remote.describe()
    }

    fn verify_access(&mut self) -> Result<(), ConnectorError> {
        let url = self.endpoint(&["users", "me", "calendarList"])?;
        let request = self.agent.get(url.as_str()).query("maxResults", "1");
        self.send(request, None).map(|_| ())
    }
}
