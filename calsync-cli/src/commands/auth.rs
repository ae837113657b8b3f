//! `calsync auth`: complete a backend's authentication up front.

use std::path::Path;

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;

use calsync_core::paths;

use crate::backends::build_backend;

/// Arguments for `calsync auth`.
#[derive(Args, Debug)]
pub struct AuthArgs {
    /// Backend to authenticate, as named under `backends:` in the config.
    pub backend: String,
}

impl AuthArgs {
    pub fn run(self, config: Option<&Path>) -> Result<()> {
        let home = super::home()?;
        let settings = super::load_settings(&home, config)?;
        let section = settings.backend_section(&self.backend)?;

        let mut backend = build_backend(&self.backend, section, &home, &paths::data_dir(&home))
            .with_context(|| format!("authentication failed for '{}'", self.backend))?;
        backend
            .verify_access()
            .with_context(|| format!("'{}' rejected the stored credentials", self.backend))?;

        println!("{} '{}' is authenticated", "✓".green(), self.backend);
        Ok(())
    }
}
