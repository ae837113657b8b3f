//! Google Calendar backend.
//!
//! - [`config`]: backend section parsing and OAuth client secrets
//! - [`session`]: access/refresh tokens, token file, loopback consent flow
//! - [`wire`]: REST payloads and the local ↔ remote event mapping
//! - [`connector`]: [`GoogleCalendarConnector`], the [`Connector`](calsync_core::Connector) impl

pub mod config;
pub mod connector;
pub mod session;
pub mod wire;

pub use config::{ClientSecrets, GoogleConfig};
pub use connector::GoogleCalendarConnector;
pub use session::Session;

/// Name under which this backend is enabled in the configuration.
pub const BACKEND_NAME: &str = "google_calendar";
