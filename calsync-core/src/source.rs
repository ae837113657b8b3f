//! Local event snapshot.
//!
//! The snapshot is read fresh for every sync run and dropped at the end of it;
//! nothing here is cached between runs.
//!
//! ```yaml
//! lookahead_days: 7
//! calendars:
//!   Guild Events:
//!     lookahead_days: 14      # optional per-calendar override
//!     events:
//!       - id: 1
//!         title: Raid
//!         start_time: 1700000000
//!         end_time: 1700007200
//!         creator: Thrall
//!         description: bring flasks
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::SourceError;
use crate::types::{CalendarName, LocalEvent};

/// Lookahead horizon used when the source does not set one.
pub const DEFAULT_LOOKAHEAD_DAYS: u32 = 7;

fn default_lookahead_days() -> u32 {
    DEFAULT_LOOKAHEAD_DAYS
}

/// Events of one calendar, in source order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalendarSource {
    #[serde(default, alias = "lookaheadDays", skip_serializing_if = "Option::is_none")]
    pub lookahead_days: Option<u32>,
    #[serde(default)]
    pub events: Vec<LocalEvent>,
}

/// Everything the local source currently holds, keyed by calendar name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceSnapshot {
    #[serde(default = "default_lookahead_days", alias = "lookaheadDays")]
    pub lookahead_days: u32,
    #[serde(default)]
    pub calendars: BTreeMap<CalendarName, CalendarSource>,
}

impl Default for SourceSnapshot {
    fn default() -> Self {
        Self {
            lookahead_days: DEFAULT_LOOKAHEAD_DAYS,
            calendars: BTreeMap::new(),
        }
    }
}

impl SourceSnapshot {
    /// Horizon for `calendar`: its own override, else the snapshot default.
    pub fn lookahead_for(&self, calendar: &CalendarName) -> u32 {
        self.calendars
            .get(calendar)
            .and_then(|source| source.lookahead_days)
            .unwrap_or(self.lookahead_days)
    }

    pub fn event_count(&self) -> usize {
        self.calendars.values().map(|c| c.events.len()).sum()
    }
}

/// Reads a [`SourceSnapshot`] from a YAML file.
#[derive(Debug, Clone)]
pub struct SourceLoader {
    path: PathBuf,
}

impl SourceLoader {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read and parse the file as it is on disk right now.
    pub fn load(&self) -> Result<SourceSnapshot, SourceError> {
        let contents = match std::fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Err(SourceError::NotFound {
                    path: self.path.clone(),
                })
            }
            Err(err) => {
                return Err(SourceError::Io {
                    path: self.path.clone(),
                    source: err,
                })
            }
        };
        if contents.trim().is_empty() {
            return Ok(SourceSnapshot::default());
        }
        serde_yaml::from_str(&contents).map_err(|e| SourceError::Parse {
            path: self.path.clone(),
            source: e,
        })
    }
}
