//! Reconciliation of one calendar against one connector.
//!
//! ## Pass protocol
//!
//! 1. Resolve the calendar handle, creating the calendar when it is missing.
//! 2. Fetch remote events inside the lookahead window.
//! 3. Create/update: for each local event (source order), the first remote
//!    event in backend order that is not `Different` is its match.
//!    `Updated` → update, `Equal` → nothing, no match → create.
//! 4. Delete: every remote event no local event matches is removed.
//!
//! Step 3 completes before step 4 starts. The first-match rule is kept even
//! when a backend's comparison is not a strict identity check; such a backend
//! can attach a local event to the wrong remote event.

use serde::Serialize;

use calsync_core::{CalendarName, Comparison, Connector, ConnectorError, LocalEvent};

use crate::error::PassError;

/// What one pass did (or, in dry-run mode, would have done).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PassReport {
    pub backend: String,
    pub calendar: String,
    pub dry_run: bool,
    /// The calendar did not exist on the backend and was (or would be) created.
    pub calendar_created: bool,
    pub created: Vec<String>,
    pub updated: Vec<String>,
    pub removed: Vec<String>,
    pub unchanged: usize,
}

impl PassReport {
    fn new(backend: &str, calendar: &CalendarName, dry_run: bool) -> Self {
        Self {
            backend: backend.to_string(),
            calendar: calendar.0.clone(),
            dry_run,
            ..Self::default()
        }
    }

    /// No remote mutation was made.
    pub fn is_noop(&self) -> bool {
        !self.calendar_created
            && self.created.is_empty()
            && self.updated.is_empty()
            && self.removed.is_empty()
    }
}

/// Run one reconciliation pass of `local_events` against `calendar` on `connector`.
///
/// The first connector error aborts the pass and is returned with the name
/// of the operation that raised it.
/// With `dry_run`, only read operations reach the connector.
pub fn reconcile<C>(
    connector: &mut C,
    calendar: &CalendarName,
    local_events: &[LocalEvent],
    lookahead_days: u32,
    dry_run: bool,
) -> Result<PassReport, PassError>
where
    C: Connector + ?Sized,
{
    let backend = connector.name().to_string();
    let span = tracing::info_span!("reconcile", backend = %backend, calendar = %calendar);
    let _entered = span.enter();

    let mut report = PassReport::new(&backend, calendar, dry_run);
    let prefix = if dry_run { "[dry-run] " } else { "" };

    let handle = match connector
        .find_calendar(calendar.as_str())
        .map_err(failed("find_calendar"))? {
        Some(handle) => Some(handle),
        None => {
            tracing::info!("{prefix}calendar not found, creating it");
            report.calendar_created = true;
            if dry_run {
                None
            } else {
                Some(
                    connector
                        .create_calendar(calendar.as_str())
                        .map_err(failed("create_calendar"))?,
                )
            }
        }
    };

    // Dry run against a calendar that does not exist yet: everything is new.
    let Some(handle) = handle else {
        for local in local_events {
            tracing::info!(event = %local, "{prefix}creating event");
            report.created.push(local.to_string());
        }
        return Ok(report);
    };

    let remote_events = connector
        .get_events(&handle, lookahead_days)
        .map_err(failed("get_events"))?;
    tracing::debug!(
        local = local_events.len(),
        remote = remote_events.len(),
        lookahead_days,
        "fetched remote events",
    );

    // Create / update pass.
    for local in local_events {
        let matched = remote_events.iter().find_map(|remote| {
            let comparison = connector.compare_events(local, remote);
            comparison.is_match().then_some((remote, comparison))
        });

        match matched {
            Some((remote, Comparison::Updated)) => {
                let summary = connector.describe(remote);
                tracing::info!(event = %summary, "{prefix}updating event");
                if !dry_run {
                    connector
                        .update_event(&handle, remote, local)
                        .map_err(failed("update_event"))?;
                }
                report.updated.push(summary);
            }
            Some(_) => report.unchanged += 1,
            None => {
                tracing::info!(event = %local, creator = %local.creator, "{prefix}creating event");
                if !dry_run {
                    connector
                        .create_event(&handle, local)
                        .map_err(failed("create_event"))?;
                }
                report.created.push(local.to_string());
            }
        }
    }

    // Delete pass.
    for remote in &remote_events {
        let referenced = local_events
            .iter()
            .any(|local| connector.compare_events(local, remote).is_match());
        if referenced {
            continue;
        }
        let summary = connector.describe(remote);
        tracing::info!(event = %summary, "{prefix}no longer exists, removing");
        if !dry_run {
            connector
                .remove_event(&handle, remote)
                .map_err(failed("remove_event"))?;
        }
        report.removed.push(summary);
    }

    Ok(report)
}

/// Log a failed connector call inside the pass span and tag it with `operation`.
fn failed(operation: &'static str) -> impl FnOnce(ConnectorError) -> PassError {
    move |source| {
        tracing::warn!(operation, error = %source, "connector call failed");
        PassError { operation, source }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{Call, MemoryConnector, MemoryEvent, Operation};
    use calsync_core::EventId;

    fn local(id: i64, description: &str) -> LocalEvent {
        LocalEvent {
            id: EventId(id),
            title: format!("event {id}"),
            start_time: 1_000 * id,
            end_time: 1_000 * id + 500,
            creator: "Thrall".into(),
            description: description.into(),
        }
    }

    fn guild() -> CalendarName {
        CalendarName::from("Guild")
    }

    fn mutations(connector: &MemoryConnector) -> Vec<Call> {
        connector
            .calls()
            .iter()
            .filter(|call| call.is_mutation())
            .cloned()
            .collect()
    }

    #[test]
    fn missing_calendar_is_created_before_fetching() {
        let mut connector = MemoryConnector::new("memory");
        let report = reconcile(&mut connector, &guild(), &[local(1, "go")], 7, false)
            .expect("reconcile");

        assert!(report.calendar_created);
        assert_eq!(
            connector.calls()[..3],
            [
                Call::FindCalendar("Guild".into()),
                Call::CreateCalendar("Guild".into()),
                Call::GetEvents("Guild".into(), 7),
            ]
        );
        assert_eq!(report.created.len(), 1);
    }

    #[test]
    fn first_match_wins_over_later_candidates() {
        // Two remote copies of id 5: the first (stale) one is updated, the second
        // still matches the local event during the delete pass and is kept.
        let mut connector = MemoryConnector::new("memory").with_calendar(
            "Guild",
            vec![
                MemoryEvent::from_local(&local(5, "old")),
                MemoryEvent::from_local(&local(5, "new")),
            ],
        );
        let report = reconcile(&mut connector, &guild(), &[local(5, "new")], 7, false)
            .expect("reconcile");

        assert_eq!(report.updated.len(), 1);
        assert_eq!(report.unchanged, 0);
        assert!(report.removed.is_empty());
        assert_eq!(mutations(&connector), vec![Call::UpdateEvent(EventId(5))]);
    }

    #[test]
    fn error_aborts_remaining_pass() {
        let mut connector = MemoryConnector::new("memory")
            .with_calendar("Guild", vec![MemoryEvent::from_local(&local(9, "x"))])
            .fail_on(Operation::CreateEvent);
        let err = reconcile(&mut connector, &guild(), &[local(1, "a")], 7, false).unwrap_err();

        assert_eq!(err.operation, "create_event");
        assert!(matches!(err.source, ConnectorError::Http { status: 503, .. }));
        assert!(
            !connector
                .calls()
                .iter()
                .any(|call| matches!(call, Call::RemoveEvent(_))),
            "delete pass must not start after a failed create"
        );
    }

    #[test]
    fn dry_run_only_reads() {
        let mut connector = MemoryConnector::new("memory").with_calendar(
            "Guild",
            vec![
                MemoryEvent::from_local(&local(2, "meet")),
                MemoryEvent::from_local(&local(9, "orphan")),
            ],
        );
        let locals = [local(1, "new"), local(2, "meet now")];
        let report = reconcile(&mut connector, &guild(), &locals, 7, true).expect("reconcile");

        assert!(report.dry_run);
        assert_eq!(report.created.len(), 1);
        assert_eq!(report.updated.len(), 1);
        assert_eq!(report.removed.len(), 1);
        assert!(mutations(&connector).is_empty(), "dry run must not mutate");
    }

    #[test]
    fn dry_run_with_missing_calendar_reports_all_creates() {
        let mut connector = MemoryConnector::new("memory");
        let report = reconcile(&mut connector, &guild(), &[local(1, "a"), local(2, "b")], 7, true)
            .expect("reconcile");

        assert!(report.calendar_created);
        assert_eq!(report.created.len(), 2);
        assert_eq!(connector.calls(), &[Call::FindCalendar("Guild".into())]);
        assert!(connector.calendar("Guild").is_none());
    }

    #[test]
    fn noop_report() {
        let mut connector = MemoryConnector::new("memory")
            .with_calendar("Guild", vec![MemoryEvent::from_local(&local(3, "same"))]);
        let report = reconcile(&mut connector, &guild(), &[local(3, "same")], 7, false)
            .expect("reconcile");
        assert!(report.is_noop());
        assert_eq!(report.unchanged, 1);
    }
}
