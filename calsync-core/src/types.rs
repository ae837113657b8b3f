//! Domain types shared by the engine, the connectors and the loaders.
//!
//! Event times are unix seconds (UTC), exactly as the local source records them.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Newtypes
// ---------------------------------------------------------------------------

/// Identity of a local event. Stable for the event's lifetime and never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventId(pub i64);

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<i64> for EventId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

/// A strongly-typed calendar name, as it appears in the local source.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CalendarName(pub String);

impl CalendarName {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CalendarName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<String> for CalendarName {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for CalendarName {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

// ---------------------------------------------------------------------------
// Local events
// ---------------------------------------------------------------------------

/// An event read from the local source. Authoritative for every sync decision.
///
/// Accepts the add-on's camelCase keys (`eventID`, `startTime`, `endTime`) as
/// well as snake_case.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalEvent {
    #[serde(alias = "eventID", alias = "event_id")]
    pub id: EventId,
    pub title: String,
    #[serde(alias = "startTime")]
    pub start_time: i64,
    #[serde(alias = "endTime")]
    pub end_time: i64,
    #[serde(default)]
    pub creator: String,
    #[serde(default)]
    pub description: String,
}

impl LocalEvent {
    pub fn starts_at(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(self.start_time, 0)
    }

    pub fn ends_at(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(self.end_time, 0)
    }
}

impl fmt::Display for LocalEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.starts_at() {
            Some(start) => write!(f, "{} #{} - {}", self.title, self.id, start.to_rfc3339()),
            None => write!(f, "{} #{}", self.title, self.id),
        }
    }
}

// ---------------------------------------------------------------------------
// Comparison
// ---------------------------------------------------------------------------

/// How a local event relates to a remote one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparison {
    /// The remote event already reflects the local event's content.
    Equal,
    /// Same identity, different content: the remote side needs an update.
    Updated,
    /// No identity correlation.
    Different,
}

impl Comparison {
    /// `true` for `Equal` and `Updated`.
    pub fn is_match(self) -> bool {
        !matches!(self, Comparison::Different)
    }
}

impl fmt::Display for Comparison {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Comparison::Equal => write!(f, "equal"),
            Comparison::Updated => write!(f, "updated"),
            Comparison::Different => write!(f, "different"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn newtype_display() {
        assert_eq!(EventId::from(42).to_string(), "42");
        assert_eq!(CalendarName::from("Guild").to_string(), "Guild");
    }

    #[test]
    fn local_event_accepts_addon_keys() {
        let yaml = "eventID: 7\ntitle: Raid\nstartTime: 1000\nendTime: 2000\ncreator: Thrall\n";
        let event: LocalEvent = serde_yaml::from_str(yaml).expect("deserialize");
        assert_eq!(event.id, EventId(7));
        assert_eq!(event.start_time, 1000);
        assert_eq!(event.end_time, 2000);
        assert_eq!(event.description, "", "missing description loads empty");
    }

    #[test]
    fn local_event_display_includes_start() {
        let event = LocalEvent {
            id: EventId(1),
            title: "Raid".into(),
            start_time: 0,
            end_time: 60,
            creator: String::new(),
            description: String::new(),
        };
        assert_eq!(event.to_string(), "Raid #1 - 1970-01-01T00:00:00+00:00");
    }

    #[test]
    fn comparison_match() {
        assert!(Comparison::Equal.is_match());
        assert!(Comparison::Updated.is_match());
        assert!(!Comparison::Different.is_match());
        assert_eq!(Comparison::Updated.to_string(), "updated");
    }
}
