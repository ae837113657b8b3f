//! # calsync-sync
//!
//! Reconciliation of local events against remote calendars.
//!
//! [`reconcile`] runs one pass for a single (calendar, connector) pair;
//! [`Orchestrator`] loads the current snapshot and drives every pair.

pub mod error;
pub mod memory;
pub mod pipeline;
pub mod reconcile;

pub use error::{PassError, SyncError};
pub use pipeline::{Orchestrator, PairOutcome, RunSummary, SyncBackend};
pub use reconcile::{reconcile, PassReport};
