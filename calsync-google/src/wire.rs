//! Calendar API v3 payloads and the mapping between local and remote events.
//!
//! Identity: the remote event id is the local id rendered in decimal and
//! zero-padded to five digits, because Google requires ids of at least five
//! characters from the base32hex alphabet. The creator is not a field on the
//! remote side; it is appended to the description after [`CREATED_BY`] and
//! stripped again before comparing.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use calsync_core::{Comparison, ConnectorError, EventId, LocalEvent};

pub const CREATED_BY: &str = "\n\n~ Created by";

/// Negative ids have no base32hex form and are rejected before any request.
pub fn remote_event_id(id: EventId) -> Result<String, ConnectorError> {
    if id.0 < 0 {
        return Err(ConnectorError::InvalidEvent(format!(
            "event id {id} is negative and cannot be used as a Google event id"
        )));
    }
    Ok(format!("{:05}", id.0))
}

/// `None` for ids this backend did not create.
pub fn local_event_id(remote_id: &str) -> Option<EventId> {
    remote_id.parse::<i64>().ok().map(EventId)
}

pub fn with_creator(description: &str, creator: &str) -> String {
    format!("{description}{CREATED_BY} {creator}")
}

pub fn strip_creator(description: &str) -> &str {
    description.split(CREATED_BY).next().unwrap_or("").trim()
}

// ---------------------------------------------------------------------------
// Read models
// ---------------------------------------------------------------------------

/// One page of a list response.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    #[serde(default = "Vec::new")]
    pub items: Vec<T>,
    pub next_page_token: Option<String>,
}

/// Entry of `users/me/calendarList`, also the body returned by `calendars.insert`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct GoogleCalendar {
    pub id: String,
    #[serde(default)]
    pub summary: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventTime {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_time: Option<String>,
    /// Set instead of `date_time` on all-day events.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_zone: Option<String>,
}

impl EventTime {
    fn at(instant: DateTime<Utc>, time_zone: &str) -> Self {
        Self {
            date_time: Some(instant.to_rfc3339_opts(SecondsFormat::Secs, true)),
            date: None,
            time_zone: Some(time_zone.to_string()),
        }
    }

    /// Unix seconds of a timed event; `None` for all-day or malformed times.
    pub fn unix_seconds(&self) -> Option<i64> {
        let raw = self.date_time.as_deref()?;
        DateTime::parse_from_rfc3339(raw).ok().map(|t| t.timestamp())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct GoogleEvent {
    pub id: String,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub start: EventTime,
    #[serde(default)]
    pub end: EventTime,
    #[serde(default)]
    pub status: Option<String>,
}

impl GoogleEvent {
    pub fn is_cancelled(&self) -> bool {
        self.status.as_deref() == Some("cancelled")
    }

    pub fn describe(&self) -> String {
        let start = self
            .start
            .date_time
            .as_deref()
            .or(self.start.date.as_deref())
            .unwrap_or("?");
        format!("{} - {}", self.summary, start)
    }
}

/// Identity first, then content.
pub fn compare(local: &LocalEvent, remote: &GoogleEvent) -> Comparison {
    if local_event_id(&remote.id) != Some(local.id) {
        return Comparison::Different;
    }
    let same = remote.summary == local.title
        && strip_creator(&remote.description) == local.description.trim()
        && remote.start.unix_seconds() == Some(local.start_time)
        && remote.end.unix_seconds() == Some(local.end_time);
    if same {
        Comparison::Equal
    } else {
        Comparison::Updated
    }
}

// ---------------------------------------------------------------------------
// Write models
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewCalendar<'a> {
    pub summary: &'a str,
    pub time_zone: &'a str,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EventBody {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub summary: String,
    pub description: String,
    pub start: EventTime,
    pub end: EventTime,
    /// Set to `confirmed` so a write to a previously deleted id restores it.
    pub status: &'static str,
}

impl EventBody {
    /// Body for `events.insert` (`with_id`) or `events.patch`/`update`.
    pub fn from_local(
        local: &LocalEvent,
        time_zone: &str,
        with_id: bool,
    ) -> Result<Self, ConnectorError> {
        let start = local.starts_at().ok_or_else(|| out_of_range(local, "start"))?;
        let end = local.ends_at().ok_or_else(|| out_of_range(local, "end"))?;
        Ok(Self {
            id: if with_id {
                Some(remote_event_id(local.id)?)
            } else {
                None
            },
            summary: local.title.clone(),
            description: with_creator(&local.description, &local.creator),
            start: EventTime::at(start, time_zone),
            end: EventTime::at(end, time_zone),
            status: "confirmed",
        })
    }
}

fn out_of_range(local: &LocalEvent, which: &str) -> ConnectorError {
    ConnectorError::InvalidEvent(format!("event {} has an out-of-range {which} time", local.id))
}
