//! calsync daemon: file watcher + debounce scheduler driving the sync orchestrator.

mod error;
mod runtime;
pub mod scheduler;
pub mod watcher;

pub use error::DaemonError;
pub use runtime::{init_tracing, run, start_blocking};
pub use scheduler::{Scheduler, SchedulerState};
