//! `calsync status`: configuration and event source overview.

use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::Args;
use colored::Colorize;
use serde::Serialize;
use tabled::{settings::Style, Table, Tabled};

use calsync_core::{paths, Settings, SourceLoader, SourceSnapshot};

/// Arguments for `calsync status`.
#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,
}

impl StatusArgs {
    pub fn run(self, config: Option<&Path>) -> Result<()> {
        let home = super::home()?;
        let config_path = match config {
            Some(path) => paths::expand_tilde(path, &home),
            None => paths::config_path(&home),
        };
        let settings = super::load_settings(&home, config)?;
        let snapshot = SourceLoader::new(&settings.source_path)
            .load()
            .context("failed to load the event source")?;

        let report = build_report(&config_path, &settings, &snapshot, Utc::now().timestamp());
        if self.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&report).context("failed to serialize status JSON")?
            );
            return Ok(());
        }

        print_table(report);
        Ok(())
    }
}

#[derive(Debug, Serialize)]
struct StatusReport {
    config: String,
    source: String,
    sync_delay_secs: u64,
    backends: Vec<String>,
    calendars: Vec<CalendarStatus>,
}

#[derive(Debug, Serialize)]
struct CalendarStatus {
    calendar: String,
    events: usize,
    lookahead_days: u32,
    /// Unix seconds of the next upcoming event, if any.
    next_event_at: Option<i64>,
    next_event: Option<String>,
}

#[derive(Tabled)]
struct CalendarTableRow {
    #[tabled(rename = "calendar")]
    calendar: String,
    #[tabled(rename = "events")]
    events: usize,
    #[tabled(rename = "lookahead")]
    lookahead: String,
    #[tabled(rename = "next event")]
    next_event: String,
}

fn build_report(
    config_path: &Path,
    settings: &Settings,
    snapshot: &SourceSnapshot,
    now: i64,
) -> StatusReport {
    let calendars = snapshot
        .calendars
        .iter()
        .map(|(name, source)| {
            let next = source
                .events
                .iter()
                .filter(|event| event.start_time >= now)
                .min_by_key(|event| event.start_time);
            CalendarStatus {
                calendar: name.0.clone(),
                events: source.events.len(),
                lookahead_days: snapshot.lookahead_for(name),
                next_event_at: next.map(|event| event.start_time),
                next_event: next.map(|event| event.title.clone()),
            }
        })
        .collect();

    StatusReport {
        config: config_path.display().to_string(),
        source: settings.source_path.display().to_string(),
        sync_delay_secs: settings.sync_delay_secs,
        backends: settings.enabled_backends.clone(),
        calendars,
    }
}

fn format_instant(unix_seconds: i64) -> String {
    DateTime::<Utc>::from_timestamp(unix_seconds, 0)
        .map(|t| t.format("%Y-%m-%d %H:%M UTC").to_string())
        .unwrap_or_else(|| unix_seconds.to_string())
}

fn print_table(report: StatusReport) {
    println!(
        "calsync v{} | {} backends | {} calendars | quiet window {}s",
        env!("CARGO_PKG_VERSION"),
        report.backends.len(),
        report.calendars.len(),
        report.sync_delay_secs,
    );
    println!("{} {}", "config:".bold(), report.config);
    println!("{} {}", "source:".bold(), report.source);
    println!("{} {}", "backends:".bold(), report.backends.join(", "));

    if report.calendars.is_empty() {
        println!("No calendars in the event source.");
        return;
    }

    let rows: Vec<CalendarTableRow> = report
        .calendars
        .into_iter()
        .map(|row| CalendarTableRow {
            calendar: row.calendar,
            events: row.events,
            lookahead: format!("{} days", row.lookahead_days),
            next_event: match (row.next_event, row.next_event_at) {
                (Some(title), Some(at)) => format!("{title} ({})", format_instant(at)),
                _ => "none upcoming".bright_black().to_string(),
            },
        })
        .collect();
    let mut table = Table::new(rows);
    table.with(Style::rounded());
    println!("{table}");
}
