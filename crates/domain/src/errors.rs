//! Domain-level errors

use thiserror::Error;

/// Errors that can occur in the domain layer
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// Resource identifier is empty, too long or contains reserved characters
    #[error("Invalid uid '{uid}': {reason}")]
    InvalidUid { uid: String, reason: String },

    /// Date/time text could not be parsed
    #[error("Invalid date/time: {0}")]
    InvalidDateTime(String),

    /// Time window whose end is not after its start
    #[error("Invalid time range: end {end} must be after start {start}")]
    InvalidTimeRange { start: String, end: String },

    /// ISO-8601 duration could not be parsed
    #[error("Invalid duration: {0}")]
    InvalidDuration(String),

    /// Unknown IANA timezone identifier
    #[error("Unknown timezone: {0}")]
    UnknownTimezone(String),

    /// Validation failed
    #[error("Validation failed: {0}")]
    ValidationError(String),
}

impl DomainError {
    /// Create an invalid uid error
    pub fn invalid_uid(uid: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidUid {
            uid: uid.into(),
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_uid_message_names_uid_and_reason() {
        let err = DomainError::invalid_uid("a/b", "contains '/'");
        assert_eq!(err.to_string(), "Invalid uid 'a/b': contains '/'");
    }

    #[test]
    fn invalid_time_range_message() {
        let err = DomainError::InvalidTimeRange {
            start: "2025-01-02T00:00:00Z".to_string(),
            end: "2025-01-01T00:00:00Z".to_string(),
        };
        assert!(err.to_string().contains("must be after start"));
    }

    #[test]
    fn errors_are_comparable() {
        assert_eq!(
            DomainError::InvalidDuration("P".to_string()),
            DomainError::InvalidDuration("P".to_string())
        );
    }
}
