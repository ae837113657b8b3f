//! `calsync sync`: one orchestrated run over every calendar and backend.

use std::path::Path;

use anyhow::{bail, Context, Result};
use clap::Args;
use colored::Colorize;

use calsync_core::CalendarName;
use calsync_sync::{PairOutcome, PassReport, RunSummary};

/// Arguments for `calsync sync`.
#[derive(Args, Debug)]
pub struct SyncArgs {
    /// Report what would change without touching any backend.
    #[arg(long)]
    pub dry_run: bool,

    /// Only sync this calendar.
    #[arg(long, value_name = "NAME")]
    pub calendar: Option<String>,

    /// Emit the run summary as JSON.
    #[arg(long)]
    pub json: bool,
}

impl SyncArgs {
    pub fn run(self, config: Option<&Path>) -> Result<()> {
        let home = super::home()?;
        let settings = super::load_settings(&home, config)?;
        let mut orchestrator =
            super::build_orchestrator(&home, &settings, self.calendar.clone().map(CalendarName))?;

        let summary = orchestrator.run(self.dry_run).context("sync failed")?;

        if self.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&summary).context("failed to serialize sync summary")?
            );
        } else {
            print_summary(&summary, self.calendar.as_deref());
        }

        if !summary.is_success() {
            bail!("{} calendar/backend pair(s) failed", summary.failed());
        }
        Ok(())
    }
}

fn print_summary(summary: &RunSummary, calendar: Option<&str>) {
    let prefix = if summary.dry_run { "[dry-run] " } else { "" };

    if summary.outcomes.is_empty() {
        match calendar {
            Some(name) => println!("{prefix}No calendar named '{name}' in the event source."),
            None => println!("{prefix}No calendars in the event source."),
        }
        return;
    }

    for outcome in &summary.outcomes {
        match outcome {
            PairOutcome::Reconciled(report) => print_report(prefix, report),
            PairOutcome::Failed {
                backend,
                calendar,
                error,
                ..
            } => println!(
                "{prefix}{} '{calendar}' → {backend}: {}",
                "✗".red().bold(),
                error.red()
            ),
        }
    }

    println!(
        "{prefix}{} created, {} updated, {} removed, {} failed in {} ms",
        summary.created(),
        summary.updated(),
        summary.removed(),
        summary.failed(),
        summary.duration_ms,
    );
}

fn print_report(prefix: &str, report: &PassReport) {
    if report.is_noop() {
        println!(
            "{prefix}{} '{}' → {}: nothing to do ({} unchanged)",
            "✓".green(),
            report.calendar,
            report.backend,
            report.unchanged,
        );
        return;
    }

    println!(
        "{prefix}{} '{}' → {} ({} created, {} updated, {} removed, {} unchanged)",
        "✓".green(),
        report.calendar,
        report.backend,
        report.created.len(),
        report.updated.len(),
        report.removed.len(),
        report.unchanged,
    );
    if report.calendar_created {
        println!("  {}  calendar '{}'", "+".green(), report.calendar);
    }
    for event in &report.created {
        println!("  {}  {event}", "+".green());
    }
    for event in &report.updated {
        println!("  {}  {event}", "~".yellow());
    }
    for event in &report.removed {
        println!("  {}  {event}", "-".red());
    }
}
