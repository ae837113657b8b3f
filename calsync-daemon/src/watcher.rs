//! Change notification for the local event source.
//!
//! The source file's parent directory is watched (not the file itself) so
//! that editors which save by writing a new file and renaming it over the old
//! one are still seen.

use std::ffi::OsStr;
use std::fs;
use std::path::{Path, PathBuf};

use notify::{recommended_watcher, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::{broadcast, mpsc};

use crate::error::DaemonError;
use crate::scheduler::Scheduler;

/// The hook the watcher calls for each relevant change.
pub fn on_local_source_changed(scheduler: &Scheduler) {
    tracing::info!("local event source changed");
    scheduler.trigger();
}

fn is_relevant_event_kind(kind: &EventKind) -> bool {
    matches!(kind, EventKind::Create(_) | EventKind::Modify(_))
}

/// Whether `event` is a create/modify touching a file named `file_name`.
pub fn is_source_event(event: &Event, file_name: &OsStr) -> bool {
    is_relevant_event_kind(&event.kind)
        && event
            .paths
            .iter()
            .any(|path| path.file_name() == Some(file_name))
}

/// Watch `source` until `shutdown` fires, triggering `scheduler` on changes.
pub async fn watch_source(
    source: PathBuf,
    scheduler: Scheduler,
    mut shutdown: broadcast::Receiver<()>,
) -> Result<(), DaemonError> {
    let (dir, file_name) = split_source(&source)?;
    // Canonicalize so the watch survives symlinked parents.
    let dir = fs::canonicalize(&dir).unwrap_or(dir);

    let (event_tx, mut event_rx) = mpsc::unbounded_channel::<notify::Result<Event>>();
    let mut watcher: RecommendedWatcher = recommended_watcher(move |event| {
        let _ = event_tx.send(event);
    })?;
    watcher.watch(&dir, RecursiveMode::NonRecursive)?;
    tracing::info!(dir = %dir.display(), file = ?file_name, "watching event source");

    loop {
        tokio::select! {
            _ = shutdown.recv() => break,
            event = event_rx.recv() => {
                let Some(event) = event else { break };
                match event {
                    Ok(event) if is_source_event(&event, &file_name) => {
                        tracing::debug!(kind = ?event.kind, "source event");
                        on_local_source_changed(&scheduler);
                    }
                    Ok(_) => {}
                    Err(err) => tracing::warn!(error = %err, "watcher event error"),
                }
            }
        }
    }

    Ok(())
}

fn split_source(source: &Path) -> Result<(PathBuf, std::ffi::OsString), DaemonError> {
    let unwatchable = || DaemonError::Unwatchable {
        path: source.to_path_buf(),
    };
    let file_name = source.file_name().ok_or_else(unwatchable)?.to_os_string();
    let dir = match source.parent() {
        Some(parent) if parent.as_os_str().is_empty() => PathBuf::from("."),
        Some(parent) => parent.to_path_buf(),
        None => return Err(unwatchable()),
    };
    Ok((dir, file_name))
}
