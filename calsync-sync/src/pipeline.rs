//! Sync orchestration shared by the CLI and the daemon.
//!
//! One run = load the snapshot fresh from disk, then reconcile every calendar
//! against every backend, one pair at a time.
//!
//! Failure policy: a transient connector error aborts only its own
//! (calendar, backend) pair and the run moves on to the next pair. Fatal
//! connector errors (auth, configuration) and snapshot load failures abort
//! the run.

use std::time::Instant;

use serde::Serialize;

use calsync_core::{CalendarName, Connector, ConnectorError, LocalEvent, SourceLoader};

use crate::reconcile::{reconcile, PassReport};
use crate::{PassError, SyncError};

// ---------------------------------------------------------------------------
// Backend trait object
// ---------------------------------------------------------------------------

/// Object-safe face of a [`Connector`], so different backends can be driven
/// from one list.
pub trait SyncBackend: Send {
    fn name(&self) -> &str;

    fn reconcile_calendar(
        &mut self,
        calendar: &CalendarName,
        events: &[LocalEvent],
        lookahead_days: u32,
        dry_run: bool,
    ) -> Result<PassReport, PassError>;

    /// One authenticated round trip, without touching any calendar.
    fn verify_access(&mut self) -> Result<(), ConnectorError>;
}

impl<C> SyncBackend for C
where
    C: Connector + Send,
{
    fn name(&self) -> &str {
        Connector::name(self)
    }

    fn reconcile_calendar(
        &mut self,
        calendar: &CalendarName,
        events: &[LocalEvent],
        lookahead_days: u32,
        dry_run: bool,
    ) -> Result<PassReport, PassError> {
        reconcile(self, calendar, events, lookahead_days, dry_run)
    }

    fn verify_access(&mut self) -> Result<(), ConnectorError> {
        Connector::verify_access(self)
    }
}

// ---------------------------------------------------------------------------
// Results
// ---------------------------------------------------------------------------

/// Result of one (calendar, backend) pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum PairOutcome {
    Reconciled(PassReport),
    Failed {
        backend: String,
        calendar: String,
        /// Connector operation that failed, e.g. `get_events`.
        operation: String,
        error: String,
    },
}

/// Outcome of a full orchestrated run.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub dry_run: bool,
    pub outcomes: Vec<PairOutcome>,
    pub duration_ms: u128,
}

impl RunSummary {
    fn reports(&self) -> impl Iterator<Item = &PassReport> {
        self.outcomes.iter().filter_map(|outcome| match outcome {
            PairOutcome::Reconciled(report) => Some(report),
            PairOutcome::Failed { .. } => None,
        })
    }

    pub fn created(&self) -> usize {
        self.reports().map(|r| r.created.len()).sum()
    }

    pub fn updated(&self) -> usize {
        self.reports().map(|r| r.updated.len()).sum()
    }

    pub fn removed(&self) -> usize {
        self.reports().map(|r| r.removed.len()).sum()
    }

    pub fn failed(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| matches!(o, PairOutcome::Failed { .. }))
            .count()
    }

    pub fn is_success(&self) -> bool {
        self.failed() == 0
    }
}

// ---------------------------------------------------------------------------
// Orchestrator
// ---------------------------------------------------------------------------

pub struct Orchestrator {
    source: SourceLoader,
    backends: Vec<Box<dyn SyncBackend>>,
    calendar_filter: Option<CalendarName>,
}

impl Orchestrator {
    pub fn new(source: SourceLoader, backends: Vec<Box<dyn SyncBackend>>) -> Self {
        Self {
            source,
            backends,
            calendar_filter: None,
        }
    }

    /// Restrict runs to a single calendar of the snapshot.
    pub fn with_calendar_filter(mut self, calendar: Option<CalendarName>) -> Self {
        self.calendar_filter = calendar;
        self
    }

    pub fn source(&self) -> &SourceLoader {
        &self.source
    }

    pub fn backend_names(&self) -> Vec<String> {
        self.backends.iter().map(|b| b.name().to_string()).collect()
    }

    /// Run every (calendar, backend) pair against the snapshot currently on disk.
    pub fn run(&mut self, dry_run: bool) -> Result<RunSummary, SyncError> {
        let started = Instant::now();
        let snapshot = self.source.load()?;

        let mut outcomes = Vec::new();
        for (calendar, calendar_source) in &snapshot.calendars {
            if let Some(filter) = &self.calendar_filter {
                if filter != calendar {
                    continue;
                }
            }
            let lookahead_days = snapshot.lookahead_for(calendar);
            tracing::info!(
                calendar = %calendar,
                events = calendar_source.events.len(),
                lookahead_days,
                "found local calendar",
            );

            for backend in self.backends.iter_mut() {
                let name = backend.name().to_string();
                match backend.reconcile_calendar(
                    calendar,
                    &calendar_source.events,
                    lookahead_days,
                    dry_run,
                ) {
                    Ok(report) => outcomes.push(PairOutcome::Reconciled(report)),
                    Err(err) if err.is_fatal() => {
                        tracing::error!(backend = %name, calendar = %calendar, operation = err.operation, error = %err.source, "fatal backend error, aborting run");
                        return Err(SyncError::Fatal {
                            backend: name,
                            calendar: calendar.0.clone(),
                            operation: err.operation,
                            source: err.source,
                        });
                    }
                    Err(err) => {
                        tracing::error!(backend = %name, calendar = %calendar, operation = err.operation, error = %err.source, "reconciliation failed, skipping pair");
                        outcomes.push(PairOutcome::Failed {
                            backend: name,
                            calendar: calendar.0.clone(),
                            operation: err.operation.to_string(),
                            error: err.to_string(),
                        });
                    }
                }
            }
        }

        let summary = RunSummary {
            dry_run,
            outcomes,
            duration_ms: started.elapsed().as_millis(),
        };
        tracing::info!(
            created = summary.created(),
            updated = summary.updated(),
            removed = summary.removed(),
            failed = summary.failed(),
            duration_ms = summary.duration_ms,
            "sync complete",
        );
        Ok(summary)
    }
}
