//! Calendar port for application layer
//!
//! Defines the interface for calendar operations (read/write events).
//! Implemented by the CalDAV integration.

use async_trait::async_trait;
use domain::{EntityTag, Event, TimeRange};

use crate::{error::DavError, request_context::RequestContext, services::DeleteOutcome};

/// Calendar port trait
///
/// `calendar` selects a collection of the requesting user; `None` means the
/// configured default calendar.
#[async_trait]
pub trait CalendarPort: Send + Sync {
    /// Fetch one event, redacted when `privacy` is set or the event is private
    async fn get_event(
        &self,
        ctx: &RequestContext,
        calendar: Option<&str>,
        uid: &str,
        privacy: bool,
    ) -> Result<Event, DavError>;

    /// Events overlapping `range`, ordered by start then uid
    ///
    /// Private events are always redacted; `privacy` redacts every event.
    async fn list_events(
        &self,
        ctx: &RequestContext,
        calendar: Option<&str>,
        range: &TimeRange,
        privacy: bool,
    ) -> Result<Vec<Event>, DavError>;

    /// Create an event, assigning a uid when it has none
    async fn create_event(
        &self,
        ctx: &RequestContext,
        calendar: Option<&str>,
        event: Event,
    ) -> Result<Event, DavError>;

    /// Replace an event, conditional on `event.etag` or the stored tag
    async fn update_event(
        &self,
        ctx: &RequestContext,
        calendar: Option<&str>,
        event: Event,
    ) -> Result<Event, DavError>;

    /// Delete an event; an absent uid is reported, not raised
    async fn delete_event(
        &self,
        ctx: &RequestContext,
        calendar: Option<&str>,
        uid: &str,
        known_tag: Option<EntityTag>,
    ) -> Result<DeleteOutcome, DavError>;
}
