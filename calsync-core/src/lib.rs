//! calsync core library: domain types, the connector contract, configuration
//! and event-source loading.
//!
//! - [`types`]: newtypes, [`LocalEvent`] and [`Comparison`]
//! - [`connector`]: the [`Connector`] capability trait every backend implements
//! - [`config`]: YAML settings ([`Settings`])
//! - [`source`]: local event snapshot loading ([`SourceLoader`])
//! - [`error`]: [`ConfigError`], [`SourceError`], [`ConnectorError`]

pub mod config;
pub mod connector;
pub mod error;
pub mod paths;
pub mod source;
pub mod types;

pub use config::{BackendSection, Settings};
pub use connector::Connector;
pub use error::{ConfigError, ConnectorError, SourceError};
pub use source::{CalendarSource, SourceLoader, SourceSnapshot};
pub use types::{CalendarName, Comparison, EventId, LocalEvent};
