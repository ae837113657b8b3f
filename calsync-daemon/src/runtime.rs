use std::sync::Arc;

use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::sync::broadcast;

use calsync_core::Settings;
use calsync_sync::{Orchestrator, SyncError};

use crate::error::{io_err, DaemonError};
use crate::scheduler::Scheduler;
use crate::watcher;

/// Start the daemon runtime and block the current thread until it exits.
pub fn start_blocking(settings: Settings, orchestrator: Orchestrator) -> Result<(), DaemonError> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| io_err("tokio-runtime", e))?;
    runtime.block_on(run(settings, orchestrator))
}

/// Run the daemon: an initial sync, then one debounced sync per burst of
/// source changes, until ctrl-c or a fatal sync error.
pub async fn run(settings: Settings, orchestrator: Orchestrator) -> Result<(), DaemonError> {
    let source = orchestrator.source().path().to_path_buf();
    tracing::info!(
        source = %source.display(),
        backends = ?orchestrator.backend_names(),
        quiet_window_secs = settings.sync_delay_secs,
        "starting calsync daemon",
    );

    let orchestrator = Arc::new(Mutex::new(orchestrator));
    let fatal: Arc<Mutex<Option<SyncError>>> = Arc::new(Mutex::new(None));
    let (shutdown_tx, _) = broadcast::channel::<()>(16);

    let scheduler = {
        let orchestrator = orchestrator.clone();
        let fatal = fatal.clone();
        let shutdown = shutdown_tx.clone();
        Scheduler::new(Handle::current(), settings.quiet_window(), move || {
            sync_job(orchestrator.clone(), fatal.clone(), shutdown.clone())
        })
    };

    // Receivers exist before the first trigger, so no shutdown can be missed.
    let watcher_handle = {
        let shutdown = shutdown_tx.clone();
        let shutdown_rx = shutdown_tx.subscribe();
        let scheduler = scheduler.clone();
        tokio::spawn(async move {
            let result = watcher::watch_source(source, scheduler, shutdown_rx).await;
            let _ = shutdown.send(());
            result
        })
    };

    let signal_handle = {
        let shutdown = shutdown_tx.clone();
        let mut shutdown_rx = shutdown_tx.subscribe();
        tokio::spawn(async move {
            tokio::select! {
                _ = shutdown_rx.recv() => Ok(()),
                signal = tokio::signal::ctrl_c() => {
                    match signal {
                        Ok(()) => {
                            tracing::info!("received ctrl-c, shutting down daemon");
                            let _ = shutdown.send(());
                            Ok(())
                        }
                        Err(err) => Err(DaemonError::Task(format!("ctrl-c handler failed: {err}"))),
                    }
                }
            }
        })
    };

    // Sync once at startup so changes made while stopped are picked up.
    scheduler.trigger();

    let (watcher_result, signal_result) = tokio::join!(watcher_handle, signal_handle);
    handle_join("watcher", watcher_result)?;
    handle_join("signal_handler", signal_result)?;

    if let Some(err) = fatal.lock().take() {
        return Err(DaemonError::Sync(err));
    }
    tracing::info!("calsync daemon stopped");
    Ok(())
}

/// One scheduled run: the orchestrator is blocking, so it goes to the blocking pool.
async fn sync_job(
    orchestrator: Arc<Mutex<Orchestrator>>,
    fatal: Arc<Mutex<Option<SyncError>>>,
    shutdown: broadcast::Sender<()>,
) {
    let result = tokio::task::spawn_blocking(move || orchestrator.lock().run(false)).await;
    match result {
        Ok(Ok(summary)) if summary.is_success() => {}
        Ok(Ok(summary)) => {
            tracing::warn!(failed = summary.failed(), "sync finished with failed pairs");
        }
        Ok(Err(err)) if err.is_fatal() => {
            tracing::error!(error = %err, "fatal sync error, stopping daemon");
            *fatal.lock() = Some(err);
            let _ = shutdown.send(());
        }
        Ok(Err(err)) => {
            tracing::error!(error = %err, "sync failed, waiting for the next change");
        }
        Err(err) => {
            tracing::error!(error = %err, "sync task join failure");
        }
    }
}

fn handle_join(
    task: &str,
    result: Result<Result<(), DaemonError>, tokio::task::JoinError>,
) -> Result<(), DaemonError> {
    match result {
        Ok(inner) => inner,
        Err(err) => Err(DaemonError::Task(format!("{task} task join failure: {err}"))),
    }
}

/// Install the global tracing subscriber. `RUST_LOG` overrides the default
/// `info` filter; `json` switches to one JSON object per line.
pub fn init_tracing(json: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);
    let _ = if json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
}
