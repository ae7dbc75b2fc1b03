//! CalDAV integration
//!
//! Calendar events over CalDAV (Nextcloud, Baïkal, Radicale): the iCalendar
//! codec, the calendar-query REPORT and [`HttpCalDavClient`], which
//! implements the application's `CalendarPort` on top of a `TransportPort`.

pub mod client;
pub mod config;
pub mod ics;
pub mod xml;

pub use client::HttpCalDavClient;
pub use config::CalDavConfig;
pub use ics::{decode_event, encode_event};
