//! Calendar time values as they appear on the wire

use std::{cmp::Ordering, fmt, str::FromStr};

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, TimeDelta, TimeZone, Timelike, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Deserializer, Serialize, Serializer, de};

use crate::DomainError;

/// A point in calendar time, keeping the representation the server used
///
/// Keeping the TZID (instead of normalising to UTC) lets a value written as
/// `TZID=Europe/Berlin:20250421T140000` come back out exactly as it went in.
///
/// Textual form (used in JSON):
///
/// | variant    | example                               |
/// |------------|---------------------------------------|
/// | `Date`     | `2025-04-21`                          |
/// | `Utc`      | `2025-04-21T14:00:00Z`                |
/// | `Zoned`    | `2025-04-21T14:00:00[Europe/Berlin]`  |
/// | `Floating` | `2025-04-21T14:00:00`                 |
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EventTime {
    /// Date without time, used by all-day events
    Date(NaiveDate),
    /// Absolute UTC instant
    Utc(DateTime<Utc>),
    /// Wall-clock time in a named IANA timezone
    Zoned {
        /// Local wall-clock time
        local: NaiveDateTime,
        /// IANA timezone identifier
        tzid: String,
    },
    /// Wall-clock time without a timezone (interpreted as UTC for ordering)
    Floating(NaiveDateTime),
}

impl EventTime {
    /// Create a zoned time, checking the timezone identifier
    pub fn zoned(local: NaiveDateTime, tzid: impl Into<String>) -> Result<Self, DomainError> {
        let tzid = tzid.into();
        tzid.parse::<Tz>()
            .map_err(|_| DomainError::UnknownTimezone(tzid.clone()))?;
        Ok(Self::Zoned {
            local: truncate_seconds(local),
            tzid,
        })
    }

    /// Create a UTC time truncated to whole seconds
    #[must_use]
    pub fn utc(instant: DateTime<Utc>) -> Self {
        Self::Utc(instant.with_nanosecond(0).unwrap_or(instant))
    }

    /// Whether this is a date-only value
    #[must_use]
    pub const fn is_date(&self) -> bool {
        matches!(self, Self::Date(_))
    }

    /// The timezone identifier, if any
    #[must_use]
    pub fn tzid(&self) -> Option<&str> {
        match self {
            Self::Zoned { tzid, .. } => Some(tzid),
            _ => None,
        }
    }

    /// Resolve to a UTC instant
    ///
    /// Dates resolve to midnight UTC; floating times and unknown zones are
    /// read as UTC. A local time skipped by a DST transition resolves to the
    /// same wall-clock reading in UTC.
    #[must_use]
    pub fn to_utc(&self) -> DateTime<Utc> {
        match self {
            Self::Date(date) => Utc.from_utc_datetime(&date.and_time(NaiveTime::MIN)),
            Self::Utc(instant) => *instant,
            Self::Zoned { local, tzid } => tzid
                .parse::<Tz>()
                .ok()
                .and_then(|tz| tz.from_local_datetime(local).earliest())
                .map_or_else(
                    || Utc.from_utc_datetime(local),
                    |zoned| zoned.with_timezone(&Utc),
                ),
            Self::Floating(local) => Utc.from_utc_datetime(local),
        }
    }

    /// Calendar date as written, without converting to UTC
    #[must_use]
    pub fn calendar_date(&self) -> NaiveDate {
        match self {
            Self::Date(date) => *date,
            Self::Utc(instant) => instant.date_naive(),
            Self::Zoned { local, .. } | Self::Floating(local) => local.date(),
        }
    }

    /// Compare two values by the instant they denote
    #[must_use]
    pub fn cmp_instant(&self, other: &Self) -> Ordering {
        self.to_utc().cmp(&other.to_utc())
    }

    /// Shift by a duration, keeping the representation
    ///
    /// Dates move by whole days only.
    #[must_use]
    pub fn shifted(&self, delta: TimeDelta) -> Self {
        match self {
            Self::Date(date) => Self::Date(*date + TimeDelta::days(delta.num_days())),
            Self::Utc(instant) => Self::Utc(*instant + delta),
            Self::Zoned { local, tzid } => Self::Zoned {
                local: *local + delta,
                tzid: tzid.clone(),
            },
            Self::Floating(local) => Self::Floating(*local + delta),
        }
    }
}

fn truncate_seconds(value: NaiveDateTime) -> NaiveDateTime {
    value.with_nanosecond(0).unwrap_or(value)
}

fn parse_naive(s: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M"))
        .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S"))
        .ok()
        .map(truncate_seconds)
}

impl FromStr for EventTime {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let invalid = || DomainError::InvalidDateTime(s.to_string());

        if let Some((local, zone)) = s.strip_suffix(']').and_then(|rest| rest.split_once('[')) {
            let local = parse_naive(local).ok_or_else(invalid)?;
            return Self::zoned(local, zone);
        }

        if s.len() == 10 {
            return NaiveDate::parse_from_str(s, "%Y-%m-%d")
                .map(Self::Date)
                .map_err(|_| invalid());
        }

        if let Ok(instant) = DateTime::parse_from_rfc3339(s) {
            return Ok(Self::utc(instant.with_timezone(&Utc)));
        }

        if let Some(local) = s.strip_suffix('Z').and_then(parse_naive) {
            return Ok(Self::Utc(Utc.from_utc_datetime(&local)));
        }

        parse_naive(s).map(Self::Floating).ok_or_else(invalid)
    }
}

impl fmt::Display for EventTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Date(date) => write!(f, "{}", date.format("%Y-%m-%d")),
            Self::Utc(instant) => write!(f, "{}", instant.format("%Y-%m-%dT%H:%M:%SZ")),
            Self::Zoned { local, tzid } => {
                write!(f, "{}[{tzid}]", local.format("%Y-%m-%dT%H:%M:%S"))
            },
            Self::Floating(local) => write!(f, "{}", local.format("%Y-%m-%dT%H:%M:%S")),
        }
    }
}

impl Serialize for EventTime {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for EventTime {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn naive(s: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S").unwrap()
    }

    #[test]
    fn calendar_date_keeps_the_local_day() {
        let zoned = EventTime::zoned(naive("2025-04-21T00:00:00"), "Pacific/Auckland").unwrap();
        assert_eq!(zoned.to_utc().date_naive(), NaiveDate::from_ymd_opt(2025, 4, 20).unwrap());
        assert_eq!(zoned.calendar_date(), NaiveDate::from_ymd_opt(2025, 4, 21).unwrap());
        assert_eq!(
            EventTime::Floating(naive("2025-04-21T23:30:00")).calendar_date(),
            NaiveDate::from_ymd_opt(2025, 4, 21).unwrap()
        );
    }

    #[test]
    fn parses_every_textual_form() {
        assert!(matches!(
            "2025-04-21".parse::<EventTime>().unwrap(),
            EventTime::Date(_)
        ));
        assert!(matches!(
            "2025-04-21T14:00:00Z".parse::<EventTime>().unwrap(),
            EventTime::Utc(_)
        ));
        assert!(matches!(
            "2025-04-21T14:00:00".parse::<EventTime>().unwrap(),
            EventTime::Floating(_)
        ));
        assert_eq!(
            "2025-04-21T14:00:00[Europe/Berlin]"
                .parse::<EventTime>()
                .unwrap()
                .tzid(),
            Some("Europe/Berlin")
        );
    }

    #[test]
    fn offsets_are_converted_to_utc() {
        let time: EventTime = "2025-04-21T14:00:00+02:00".parse().unwrap();
        assert_eq!(time.to_string(), "2025-04-21T12:00:00Z");
    }

    #[test]
    fn display_roundtrips() {
        for text in [
            "2025-04-21",
            "2025-04-21T14:00:00Z",
            "2025-04-21T14:00:00",
            "2025-04-21T14:00:00[America/New_York]",
        ] {
            let parsed: EventTime = text.parse().unwrap();
            assert_eq!(parsed.to_string(), text);
        }
    }

    #[test]
    fn unknown_timezone_is_rejected() {
        let err = "2025-04-21T14:00:00[Mars/Olympus]"
            .parse::<EventTime>()
            .unwrap_err();
        assert_eq!(err, DomainError::UnknownTimezone("Mars/Olympus".to_string()));
    }

    #[test]
    fn garbage_is_rejected() {
        assert!("tomorrow-ish".parse::<EventTime>().is_err());
        assert!("2025-13-40".parse::<EventTime>().is_err());
    }

    #[test]
    fn zoned_resolves_with_offset() {
        let berlin = EventTime::zoned(naive("2025-04-21T14:00:00"), "Europe/Berlin").unwrap();
        assert_eq!(
            berlin.to_utc(),
            Utc.from_utc_datetime(&naive("2025-04-21T12:00:00"))
        );
    }

    #[test]
    fn date_resolves_to_midnight() {
        let date: EventTime = "2025-04-21".parse().unwrap();
        assert_eq!(date.to_utc().to_rfc3339(), "2025-04-21T00:00:00+00:00");
    }

    #[test]
    fn shifted_keeps_zone() {
        let berlin = EventTime::zoned(naive("2025-04-21T14:00:00"), "Europe/Berlin").unwrap();
        let later = berlin.shifted(TimeDelta::hours(1));
        assert_eq!(later.to_string(), "2025-04-21T15:00:00[Europe/Berlin]");
    }

    #[test]
    fn cmp_instant_orders_across_representations() {
        let utc: EventTime = "2025-04-21T12:30:00Z".parse().unwrap();
        let berlin: EventTime = "2025-04-21T14:00:00[Europe/Berlin]".parse().unwrap();
        assert_eq!(berlin.cmp_instant(&utc), Ordering::Less);
    }

    #[test]
    fn serde_uses_textual_form() {
        let time: EventTime = "2025-04-21T14:00:00Z".parse().unwrap();
        let json = serde_json::to_string(&time).unwrap();
        assert_eq!(json, "\"2025-04-21T14:00:00Z\"");
        let back: EventTime = serde_json::from_str(&json).unwrap();
        assert_eq!(back, time);
    }
}
