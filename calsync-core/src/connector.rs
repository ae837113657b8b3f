//! The capability set every remote calendar backend implements.
//!
//! Operations are blocking and run sequentially inside a reconciliation pass.
//! They take `&mut self` so an implementation can refresh its cached session
//! before each call. Comparison and stringification live here rather than in
//! the engine so each backend keeps its own identity-correlation rule.

use crate::error::ConnectorError;
use crate::types::{Comparison, LocalEvent};

pub trait Connector {
    /// Backend-defined calendar identifier, scoped to this connector instance.
    type Calendar;
    /// Backend-defined representation of an event on the remote service.
    type RemoteEvent;

    /// Name used in logs and reports (e.g. `google_calendar`).
    fn name(&self) -> &str;

    /// Look up a calendar by name. `Ok(None)` when no such calendar exists.
    fn find_calendar(&mut self, name: &str) -> Result<Option<Self::Calendar>, ConnectorError>;

    fn create_calendar(&mut self, name: &str) -> Result<Self::Calendar, ConnectorError>;

    /// Create a remote event whose identity is derived from `local.id`.
    fn create_event(
        &mut self,
        calendar: &Self::Calendar,
        local: &LocalEvent,
    ) -> Result<(), ConnectorError>;

    /// The remote event matching `local.id`, or `Ok(None)` on a "not found" response.
    fn get_event(
        &mut self,
        calendar: &Self::Calendar,
        local: &LocalEvent,
    ) -> Result<Option<Self::RemoteEvent>, ConnectorError>;

    /// Every remote event starting within `[now, now + lookahead_days]`,
    /// ordered by start time ascending.
    fn get_events(
        &mut self,
        calendar: &Self::Calendar,
        lookahead_days: u32,
    ) -> Result<Vec<Self::RemoteEvent>, ConnectorError>;

    /// Replace the content of `remote` with that of `local`.
    fn update_event(
        &mut self,
        calendar: &Self::Calendar,
        remote: &Self::RemoteEvent,
        local: &LocalEvent,
    ) -> Result<(), ConnectorError>;

    fn remove_event(
        &mut self,
        calendar: &Self::Calendar,
        remote: &Self::RemoteEvent,
    ) -> Result<(), ConnectorError>;

    /// Pure classification of a local/remote pair.
    fn compare_events(&self, local: &LocalEvent, remote: &Self::RemoteEvent) -> Comparison;

    /// One-line human-readable summary of a remote event, for logs.
    fn describe(&self, remote: &Self::RemoteEvent) -> String;

    /// Make one cheap authenticated request so bad credentials surface now
    /// rather than during the first sync.
    fn verify_access(&mut self) -> Result<(), ConnectorError>;
}
