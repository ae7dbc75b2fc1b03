//! Calendar event entity (VEVENT)

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::Reminder;
use crate::{
    DomainError,
    value_objects::{EntityTag, EventTime, validate_uid},
};

/// Generates the `as_ical` / `from_ical` pair for an iCalendar enumerated value
macro_rules! ical_enum {
    ($name:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        impl $name {
            /// iCalendar text for this value
            #[must_use]
            pub const fn as_ical(&self) -> &'static str {
                match self {
                    $(Self::$variant => $text,)+
                }
            }

            /// Parse iCalendar text (case-insensitive)
            #[must_use]
            pub fn from_ical(value: &str) -> Option<Self> {
                match value.trim().to_ascii_uppercase().as_str() {
                    $($text => Some(Self::$variant),)+
                    _ => None,
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_ical())
            }
        }
    };
}

/// Event status
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventStatus {
    /// Confirmed (default for new events)
    #[default]
    Confirmed,
    /// Tentative
    Tentative,
    /// Cancelled
    Cancelled,
}

ical_enum!(EventStatus {
    Confirmed => "CONFIRMED",
    Tentative => "TENTATIVE",
    Cancelled => "CANCELLED",
});

/// Access classification (`CLASS`)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Classification {
    /// Visible to anyone with access to the calendar
    #[default]
    Public,
    /// Only time information may be shown to others
    Private,
    /// Stricter than private
    Confidential,
}

ical_enum!(Classification {
    Public => "PUBLIC",
    Private => "PRIVATE",
    Confidential => "CONFIDENTIAL",
});

impl Classification {
    /// Whether content must be redacted when shown
    #[must_use]
    pub const fn requires_masking(&self) -> bool {
        matches!(self, Self::Private | Self::Confidential)
    }
}

/// Attendee role (`ROLE`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING-KEBAB-CASE")]
pub enum AttendeeRole {
    /// Chairs the meeting
    Chair,
    /// Required participant
    ReqParticipant,
    /// Optional participant
    OptParticipant,
    /// Copied for information
    NonParticipant,
}

ical_enum!(AttendeeRole {
    Chair => "CHAIR",
    ReqParticipant => "REQ-PARTICIPANT",
    OptParticipant => "OPT-PARTICIPANT",
    NonParticipant => "NON-PARTICIPANT",
});

/// Participation status (`PARTSTAT`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING-KEBAB-CASE")]
pub enum ParticipationStatus {
    /// No answer yet
    NeedsAction,
    /// Accepted
    Accepted,
    /// Declined
    Declined,
    /// Tentatively accepted
    Tentative,
    /// Delegated to someone else
    Delegated,
}

ical_enum!(ParticipationStatus {
    NeedsAction => "NEEDS-ACTION",
    Accepted => "ACCEPTED",
    Declined => "DECLINED",
    Tentative => "TENTATIVE",
    Delegated => "DELEGATED",
});

/// Calendar user type (`CUTYPE`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CalendarUserType {
    /// A person
    Individual,
    /// A group of people
    Group,
    /// A physical resource
    Resource,
    /// A room
    Room,
    /// Unknown
    Unknown,
}

ical_enum!(CalendarUserType {
    Individual => "INDIVIDUAL",
    Group => "GROUP",
    Resource => "RESOURCE",
    Room => "ROOM",
    Unknown => "UNKNOWN",
});

/// Event participant
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attendee {
    /// Email address (without `mailto:`)
    pub email: String,
    /// Common name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Role
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<AttendeeRole>,
    /// Participation status
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<ParticipationStatus>,
    /// Calendar user type
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<CalendarUserType>,
}

impl Attendee {
    /// Attendee with only an email address
    #[must_use]
    pub fn new(email: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            name: None,
            role: None,
            status: None,
            kind: None,
        }
    }

    /// Set the common name
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Set the role
    #[must_use]
    pub const fn with_role(mut self, role: AttendeeRole) -> Self {
        self.role = Some(role);
        self
    }

    /// Set the participation status
    #[must_use]
    pub const fn with_status(mut self, status: ParticipationStatus) -> Self {
        self.status = Some(status);
        self
    }

    /// Set the calendar user type
    #[must_use]
    pub const fn with_kind(mut self, kind: CalendarUserType) -> Self {
        self.kind = Some(kind);
        self
    }
}

/// A calendar event
///
/// `uid` is empty until assigned; `etag`, `url`, `created` and
/// `last_modified` are maintained by the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    /// Stable identifier
    #[serde(default)]
    pub uid: String,
    /// Title
    pub summary: String,
    /// Long description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Location
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    /// Start
    pub start: EventTime,
    /// End (exclusive; the day after the last day for all-day events)
    pub end: EventTime,
    /// All-day flag, implied by date-only start/end
    #[serde(default)]
    pub all_day: bool,
    /// Creation instant
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created: Option<DateTime<Utc>>,
    /// Last modification instant
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_modified: Option<DateTime<Utc>>,
    /// Status
    #[serde(default)]
    pub status: EventStatus,
    /// Organizer email (without `mailto:`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub organizer: Option<String>,
    /// Categories
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub categories: BTreeSet<String>,
    /// Attendees in document order
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attendees: Vec<Attendee>,
    /// Alarms in document order
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub reminders: Vec<Reminder>,
    /// Raw RFC 5545 recurrence rule
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recurrence_rule: Option<String>,
    /// Identifies an overridden instance of a recurring series
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recurrence_id: Option<EventTime>,
    /// Access classification
    #[serde(default)]
    pub classification: Classification,
    /// Server version token
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub etag: Option<EntityTag>,
    /// Resource URL on the server
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

impl Event {
    /// Create a confirmed public event
    #[must_use]
    pub fn new(summary: impl Into<String>, start: EventTime, end: EventTime) -> Self {
        let all_day = start.is_date();
        Self {
            uid: String::new(),
            summary: summary.into(),
            description: None,
            location: None,
            start,
            end,
            all_day,
            created: None,
            last_modified: None,
            status: EventStatus::default(),
            organizer: None,
            categories: BTreeSet::new(),
            attendees: Vec::new(),
            reminders: Vec::new(),
            recurrence_rule: None,
            recurrence_id: None,
            classification: Classification::default(),
            etag: None,
            url: None,
        }
    }

    /// Set the uid
    #[must_use]
    pub fn with_uid(mut self, uid: impl Into<String>) -> Self {
        self.uid = uid.into();
        self
    }

    /// Set the description
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Set the location
    #[must_use]
    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    /// Set the status
    #[must_use]
    pub const fn with_status(mut self, status: EventStatus) -> Self {
        self.status = status;
        self
    }

    /// Set the classification
    #[must_use]
    pub const fn with_classification(mut self, classification: Classification) -> Self {
        self.classification = classification;
        self
    }

    /// Set the organizer
    #[must_use]
    pub fn with_organizer(mut self, email: impl Into<String>) -> Self {
        self.organizer = Some(email.into());
        self
    }

    /// Add a category
    #[must_use]
    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.categories.insert(category.into());
        self
    }

    /// Add an attendee
    #[must_use]
    pub fn with_attendee(mut self, attendee: Attendee) -> Self {
        self.attendees.push(attendee);
        self
    }

    /// Add a reminder
    #[must_use]
    pub fn with_reminder(mut self, reminder: Reminder) -> Self {
        self.reminders.push(reminder);
        self
    }

    /// Set the recurrence rule
    #[must_use]
    pub fn with_recurrence_rule(mut self, rule: impl Into<String>) -> Self {
        self.recurrence_rule = Some(rule.into());
        self
    }

    /// Set the entity tag
    #[must_use]
    pub fn with_etag(mut self, etag: EntityTag) -> Self {
        self.etag = Some(etag);
        self
    }

    /// Whether the uid still has to be assigned
    #[must_use]
    pub fn has_uid(&self) -> bool {
        !self.uid.trim().is_empty()
    }

    /// Start as a UTC instant
    #[must_use]
    pub fn start_utc(&self) -> DateTime<Utc> {
        self.start.to_utc()
    }

    /// End as a UTC instant
    #[must_use]
    pub fn end_utc(&self) -> DateTime<Utc> {
        self.end.to_utc()
    }

    /// Make the all-day flag and the start/end representation agree
    ///
    /// An all-day event gets date-only bounds; date-only bounds mark the event
    /// all-day. Line breaks in text become LF and blank optional strings
    /// become `None`.
    #[must_use]
    pub fn normalized(mut self) -> Self {
        if self.start.is_date() {
            self.all_day = true;
        }
        if self.all_day {
            self.start = EventTime::Date(self.start.calendar_date());
            let end_date = self.end.calendar_date();
            self.end = EventTime::Date(end_date.max(self.start_date_plus_one()));
        }
        super::unify_line_breaks(&mut self.summary);
        for text in [&mut self.description, &mut self.location]
            .into_iter()
            .flatten()
            .chain(self.reminders.iter_mut().filter_map(|r| r.description.as_mut()))
        {
            super::unify_line_breaks(text);
        }
        for field in [
            &mut self.description,
            &mut self.location,
            &mut self.organizer,
            &mut self.recurrence_rule,
        ] {
            if field.as_deref().is_some_and(|value| value.trim().is_empty()) {
                *field = None;
            }
        }
        self
    }

    fn start_date_plus_one(&self) -> chrono::NaiveDate {
        let start = self.start.calendar_date();
        start.succ_opt().unwrap_or(start)
    }

    /// Check the invariants a writable event must satisfy
    pub fn validate(&self) -> Result<(), DomainError> {
        if self.has_uid() {
            validate_uid(&self.uid)?;
        }
        if self.summary.trim().is_empty() {
            return Err(DomainError::ValidationError(
                "event summary must not be empty".to_string(),
            ));
        }
        if !self.all_day && self.end_utc() < self.start_utc() {
            return Err(DomainError::InvalidTimeRange {
                start: self.start.to_string(),
                end: self.end.to_string(),
            });
        }
        Ok(())
    }
}
