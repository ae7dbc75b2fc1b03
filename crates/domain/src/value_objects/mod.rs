//! Value Objects - Immutable, identity-less domain primitives

mod conditional_write;
mod duration;
mod entity_tag;
mod event_time;
mod time_range;
mod uid;

pub use conditional_write::ConditionalWriteContext;
pub use duration::{format_iso_duration, iso_duration, parse_iso_duration};
pub use entity_tag::EntityTag;
pub use event_time::EventTime;
pub use time_range::TimeRange;
pub use uid::{MAX_UID_LEN, generate_uid, validate_uid};
