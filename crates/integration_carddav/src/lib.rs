#![forbid(unsafe_code)]
//! CardDAV integration
//!
//! Contacts over CardDAV (Nextcloud, Baïkal, Radicale): the vCard 3.0 codec
//! (RFC 2426), addressbook-query REPORTs with search filters, and
//! [`HttpCardDavClient`], which implements the application's `ContactPort`.

pub mod client;
pub mod config;
pub mod vcard;
pub mod xml;

pub use client::HttpCardDavClient;
pub use config::CardDavConfig;
pub use vcard::{decode_contact, encode_contact};
