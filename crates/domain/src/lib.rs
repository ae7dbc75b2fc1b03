//! Domain layer for davbridge
//!
//! Calendar events, contacts and the values that travel with them between a
//! caller and a CalDAV/CardDAV server. No I/O happens here.

pub mod entities;
pub mod errors;
pub mod privacy;
pub mod value_objects;

pub use entities::*;
pub use errors::DomainError;
pub use privacy::{
    ALTERNATE_REDACTION_MARKER, REDACTION_MARKER, mask, mask_contact, mask_for_read,
};
pub use value_objects::*;
