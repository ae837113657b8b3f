pub mod auth;
pub mod status;
pub mod sync;
pub mod watch;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use calsync_core::{config, paths, CalendarName, Settings, SourceLoader};
use calsync_sync::{Orchestrator, SyncBackend};

use crate::backends::build_backend;

pub(crate) fn home() -> Result<PathBuf> {
    dirs::home_dir().context("could not determine home directory")
}

pub(crate) fn load_settings(home: &Path, config: Option<&Path>) -> Result<Settings> {
    config::load_at(home, config).context("failed to load configuration")
}

/// Build every enabled backend, in configuration order.
pub(crate) fn build_backends(home: &Path, settings: &Settings) -> Result<Vec<Box<dyn SyncBackend>>> {
    let data_dir = paths::data_dir(home);
    settings
        .enabled_backends
        .iter()
        .map(|name| {
            let section = settings.backend_section(name)?;
            build_backend(name, section, home, &data_dir)
                .with_context(|| format!("failed to initialise backend '{name}'"))
        })
        .collect()
}

pub(crate) fn build_orchestrator(
    home: &Path,
    settings: &Settings,
    calendar: Option<CalendarName>,
) -> Result<Orchestrator> {
    let backends = build_backends(home, settings)?;
    Ok(
        Orchestrator::new(SourceLoader::new(&settings.source_path), backends)
            .with_calendar_filter(calendar),
    )
}
