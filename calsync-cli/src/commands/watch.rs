//! `calsync watch`: run the sync daemon in the foreground.

use std::path::Path;

use anyhow::{Context, Result};
use clap::Args;

/// Arguments for `calsync watch`.
#[derive(Args, Debug)]
pub struct WatchArgs {}

impl WatchArgs {
    pub fn run(self, config: Option<&Path>) -> Result<()> {
        let home = super::home()?;
        let settings = super::load_settings(&home, config)?;
        let orchestrator = super::build_orchestrator(&home, &settings, None)?;
        calsync_daemon::start_blocking(settings, orchestrator).context("daemon exited with error")
    }
}
