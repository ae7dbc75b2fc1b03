//! Event alarms (VALARM)

use chrono::TimeDelta;
use serde::{Deserialize, Serialize};

use crate::value_objects::{EventTime, iso_duration};

/// What the client should do when an alarm fires
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AlarmAction {
    /// Show a notification
    #[default]
    Display,
    /// Play a sound
    Audio,
    /// Send an email
    Email,
}

impl AlarmAction {
    /// iCalendar `ACTION` value
    #[must_use]
    pub const fn as_ical(&self) -> &'static str {
        match self {
            Self::Display => "DISPLAY",
            Self::Audio => "AUDIO",
            Self::Email => "EMAIL",
        }
    }

    /// Parse an iCalendar `ACTION` value, defaulting to display
    #[must_use]
    pub fn from_ical(value: &str) -> Self {
        match value.trim().to_ascii_uppercase().as_str() {
            "AUDIO" => Self::Audio,
            "EMAIL" => Self::Email,
            _ => Self::Display,
        }
    }
}

/// Event boundary a relative trigger is anchored to
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TriggerRelation {
    /// Relative to DTSTART
    #[default]
    Start,
    /// Relative to DTEND
    End,
}

/// When an alarm fires
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum ReminderTrigger {
    /// Offset from the event start or end, e.g. `-PT15M`
    Relative {
        /// Signed offset
        #[serde(with = "iso_duration")]
        offset: TimeDelta,
        /// Anchor
        #[serde(default)]
        related: TriggerRelation,
    },
    /// Fixed point in time, keeping its timezone
    Absolute {
        /// Fire time
        fire_time: EventTime,
    },
}

/// An alarm attached to an event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reminder {
    /// Alarm action
    #[serde(default)]
    pub action: AlarmAction,
    /// Trigger
    #[serde(flatten)]
    pub trigger: ReminderTrigger,
    /// Text shown when the alarm fires
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl Reminder {
    /// Display alarm `offset` before (negative) or after the event start
    #[must_use]
    pub const fn before_start(offset: TimeDelta) -> Self {
        Self {
            action: AlarmAction::Display,
            trigger: ReminderTrigger::Relative {
                offset,
                related: TriggerRelation::Start,
            },
            description: None,
        }
    }

    /// Display alarm at a fixed time
    #[must_use]
    pub const fn at(fire_time: EventTime) -> Self {
        Self {
            action: AlarmAction::Display,
            trigger: ReminderTrigger::Absolute { fire_time },
            description: None,
        }
    }

    /// Set the description
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Concrete fire time for an event spanning `start..end`
    #[must_use]
    pub fn fire_time(&self, start: &EventTime, end: &EventTime) -> EventTime {
        match &self.trigger {
            ReminderTrigger::Relative { offset, related } => {
                let anchor = match related {
                    TriggerRelation::Start => start,
                    TriggerRelation::End => end,
                };
                anchor.shifted(*offset)
            },
            ReminderTrigger::Absolute { fire_time } => fire_time.clone(),
        }
    }
}
