//! In-process backend that keeps calendars in memory.
//!
//! Records every contract call it receives, which makes it the reference
//! connector for exercising the engine, and backs the `memory` backend used
//! for dry configuration checks. Failures can be injected per operation.

use std::collections::BTreeMap;

use chrono::Utc;

use calsync_core::{Comparison, Connector, ConnectorError, EventId, LocalEvent};

const SECONDS_PER_DAY: i64 = 24 * 60 * 60;

/// Remote-side copy of an event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryEvent {
    pub id: EventId,
    pub title: String,
    pub start_time: i64,
    pub end_time: i64,
    pub description: String,
}

impl MemoryEvent {
    pub fn from_local(local: &LocalEvent) -> Self {
        Self {
            id: local.id,
            title: local.title.clone(),
            start_time: local.start_time,
            end_time: local.end_time,
            description: local.description.clone(),
        }
    }
}

/// Contract operations, used to select where a failure is injected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    FindCalendar,
    CreateCalendar,
    CreateEvent,
    GetEvent,
    GetEvents,
    UpdateEvent,
    RemoveEvent,
}

/// A recorded contract call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    FindCalendar(String),
    CreateCalendar(String),
    CreateEvent(EventId),
    GetEvent(EventId),
    GetEvents(String, u32),
    UpdateEvent(EventId),
    RemoveEvent(EventId),
}

impl Call {
    /// Whether the call changes remote state.
    pub fn is_mutation(&self) -> bool {
        matches!(
            self,
            Call::CreateCalendar(_)
                | Call::CreateEvent(_)
                | Call::UpdateEvent(_)
                | Call::RemoveEvent(_)
        )
    }
}

#[derive(Debug, Clone)]
pub struct MemoryConnector {
    name: String,
    calendars: BTreeMap<String, Vec<MemoryEvent>>,
    calls: Vec<Call>,
    fail_on: Option<Operation>,
    auth_denied: bool,
    now: Option<i64>,
}

impl MemoryConnector {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            calendars: BTreeMap::new(),
            calls: Vec::new(),
            fail_on: None,
            auth_denied: false,
            now: None,
        }
    }

    /// Seed a calendar with remote events.
    pub fn with_calendar(mut self, name: &str, events: Vec<MemoryEvent>) -> Self {
        self.calendars.insert(name.to_string(), events);
        self
    }

    /// Make every call of `operation` fail with an HTTP 503.
    pub fn fail_on(mut self, operation: Operation) -> Self {
        self.fail_on = Some(operation);
        self
    }

    /// Reject every call as unauthenticated, like a revoked token.
    pub fn deny_auth(mut self) -> Self {
        self.auth_denied = true;
        self
    }

    /// Pin "now" (unix seconds) so `get_events` applies the lookahead window.
    /// Without a pinned clock every stored event is returned.
    pub fn at_time(mut self, now: i64) -> Self {
        self.now = Some(now);
        self
    }

    /// Filter `get_events` against the wall clock.
    pub fn with_wall_clock(self) -> Self {
        let now = Utc::now().timestamp();
        self.at_time(now)
    }

    pub fn calls(&self) -> &[Call] {
        &self.calls
    }

    pub fn clear_calls(&mut self) {
        self.calls.clear();
    }

    pub fn calendar(&self, name: &str) -> Option<&[MemoryEvent]> {
        self.calendars.get(name).map(Vec::as_slice)
    }

    fn check_auth(&self) -> Result<(), ConnectorError> {
        if self.auth_denied {
            return Err(ConnectorError::Auth(format!("{} rejected the token", self.name)));
        }
        Ok(())
    }

    fn check(&self, operation: Operation) -> Result<(), ConnectorError> {
        self.check_auth()?;
        if self.fail_on == Some(operation) {
            return Err(ConnectorError::Http {
                status: 503,
                body: format!("injected failure on {operation:?}"),
            });
        }
        Ok(())
    }

    fn events_mut(&mut self, calendar: &str) -> Result<&mut Vec<MemoryEvent>, ConnectorError> {
        self.calendars
            .get_mut(calendar)
            .ok_or_else(|| ConnectorError::Http {
                status: 404,
                body: format!("calendar '{calendar}' not found"),
            })
    }
}

impl Connector for MemoryConnector {
    type Calendar = String;
    type RemoteEvent = MemoryEvent;

    fn name(&self) -> &str {
        &self.name
    }

    fn find_calendar(&mut self, name: &str) -> Result<Option<String>, ConnectorError> {
        self.calls.push(Call::FindCalendar(name.to_string()));
        self.check(Operation::FindCalendar)?;
        Ok(self.calendars.contains_key(name).then(|| name.to_string()))
    }

    fn create_calendar(&mut self, name: &str) -> Result<String, ConnectorError> {
        self.calls.push(Call::CreateCalendar(name.to_string()));
        self.check(Operation::CreateCalendar)?;
        self.calendars.entry(name.to_string()).or_default();
        Ok(name.to_string())
    }

    fn create_event(&mut self, calendar: &String, local: &LocalEvent) -> Result<(), ConnectorError> {
        self.calls.push(Call::CreateEvent(local.id));
        self.check(Operation::CreateEvent)?;
        self.events_mut(calendar)?.push(MemoryEvent::from_local(local));
        Ok(())
    }

    fn get_event(
        &mut self,
        calendar: &String,
        local: &LocalEvent,
    ) -> Result<Option<MemoryEvent>, ConnectorError> {
        self.calls.push(Call::GetEvent(local.id));
        self.check(Operation::GetEvent)?;
        Ok(self
            .calendars
            .get(calendar)
            .and_then(|events| events.iter().find(|e| e.id == local.id))
            .cloned())
    }

    fn get_events(
        &mut self,
        calendar: &String,
        lookahead_days: u32,
    ) -> Result<Vec<MemoryEvent>, ConnectorError> {
        self.calls
            .push(Call::GetEvents(calendar.clone(), lookahead_days));
        self.check(Operation::GetEvents)?;
        let now = self.now;
        let mut events: Vec<MemoryEvent> = self
            .events_mut(calendar)?
            .iter()
            .filter(|e| match now {
                Some(now) => {
                    let horizon = now + i64::from(lookahead_days) * SECONDS_PER_DAY;
                    e.start_time >= now && e.start_time <= horizon
                }
                None => true,
            })
            .cloned()
            .collect();
        events.sort_by_key(|e| e.start_time);
        Ok(events)
    }

    fn update_event(
        &mut self,
        calendar: &String,
        remote: &MemoryEvent,
        local: &LocalEvent,
    ) -> Result<(), ConnectorError> {
        self.calls.push(Call::UpdateEvent(remote.id));
        self.check(Operation::UpdateEvent)?;
        let events = self.events_mut(calendar)?;
        if let Some(stored) = events.iter_mut().find(|e| *e == remote) {
            *stored = MemoryEvent::from_local(local);
        }
        Ok(())
    }

    fn remove_event(&mut self, calendar: &String, remote: &MemoryEvent) -> Result<(), ConnectorError> {
        self.calls.push(Call::RemoveEvent(remote.id));
        self.check(Operation::RemoveEvent)?;
        let events = self.events_mut(calendar)?;
        if let Some(index) = events.iter().position(|e| e == remote) {
            events.remove(index);
        }
        Ok(())
    }

    fn compare_events(&self, local: &LocalEvent, remote: &MemoryEvent) -> Comparison {
        if local.id != remote.id {
            return Comparison::Different;
        }
        if MemoryEvent::from_local(local) == *remote {
            Comparison::Equal
        } else {
            Comparison::Updated
        }
    }

    fn describe(&self, remote: &MemoryEvent) -> String {
        format!("{} #{} @ {}", remote.title, remote.id, remote.start_time)
    }

    fn verify_access(&mut self) -> Result<(), ConnectorError> {
        self.check_auth()
    }
}
