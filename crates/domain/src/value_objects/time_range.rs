//! Half-open time window used by range queries

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::EventTime;
use crate::DomainError;

/// A `[start, end)` window with `end` strictly after `start`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    start: DateTime<Utc>,
    end: DateTime<Utc>,
}

impl TimeRange {
    /// Create a window, rejecting empty or inverted ranges
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Self, DomainError> {
        if end <= start {
            return Err(DomainError::InvalidTimeRange {
                start: start.to_rfc3339(),
                end: end.to_rfc3339(),
            });
        }
        Ok(Self { start, end })
    }

    /// Parse both bounds from ISO-8601 text
    ///
    /// Accepts anything [`EventTime`] accepts; naive values are read as UTC.
    pub fn parse(start: &str, end: &str) -> Result<Self, DomainError> {
        let start: EventTime = start.parse()?;
        let end: EventTime = end.parse()?;
        Self::new(start.to_utc(), end.to_utc())
    }

    /// Inclusive lower bound
    #[must_use]
    pub const fn start(&self) -> DateTime<Utc> {
        self.start
    }

    /// Exclusive upper bound
    #[must_use]
    pub const fn end(&self) -> DateTime<Utc> {
        self.end
    }

    /// Whether `[start, end)` overlaps this window
    #[must_use]
    pub fn overlaps(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> bool {
        start < self.end && end > self.start
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn range(start: &str, end: &str) -> TimeRange {
        TimeRange::parse(start, end).unwrap()
    }

    fn at(s: &str) -> DateTime<Utc> {
        s.parse::<EventTime>().unwrap().to_utc()
    }

    #[test]
    fn rejects_inverted_and_empty_ranges() {
        assert!(TimeRange::parse("2025-04-22T00:00:00", "2025-04-21T00:00:00").is_err());
        assert!(TimeRange::parse("2025-04-21T00:00:00", "2025-04-21T00:00:00").is_err());
    }

    #[test]
    fn rejects_unparseable_bounds() {
        assert!(matches!(
            TimeRange::parse("yesterday", "2025-04-21T00:00:00"),
            Err(DomainError::InvalidDateTime(_))
        ));
    }

    #[test]
    fn overlap_is_half_open() {
        let window = range("2025-04-21T10:00:00Z", "2025-04-21T12:00:00Z");
        assert!(window.overlaps(at("2025-04-21T11:00:00Z"), at("2025-04-21T13:00:00Z")));
        assert!(!window.overlaps(at("2025-04-21T12:00:00Z"), at("2025-04-21T13:00:00Z")));
        assert!(!window.overlaps(at("2025-04-21T09:00:00Z"), at("2025-04-21T10:00:00Z")));
    }

    #[test]
    fn accepts_dates() {
        let window = range("2025-04-21", "2025-04-22");
        assert_eq!(window.end() - window.start(), chrono::TimeDelta::days(1));
    }
}
