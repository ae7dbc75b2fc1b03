//! ISO-8601 / RFC 5545 durations (`-P1DT2H30M`)

use chrono::TimeDelta;
use serde::{Deserialize, Deserializer, Serializer, de};

use crate::DomainError;

/// Parse a duration of the form `[+-]P[nW][nD][T[nH][nM][nS]]`
pub fn parse_iso_duration(input: &str) -> Result<TimeDelta, DomainError> {
    let invalid = || DomainError::InvalidDuration(input.to_string());
    let trimmed = input.trim().to_ascii_uppercase();

    let (negative, rest) = match trimmed.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, trimmed.strip_prefix('+').unwrap_or(&trimmed)),
    };
    let body = rest.strip_prefix('P').ok_or_else(invalid)?;

    let mut seconds: i64 = 0;
    let mut digits = String::new();
    let mut in_time = false;
    let mut saw_component = false;
    let mut saw_time_component = false;

    for ch in body.chars() {
        if ch.is_ascii_digit() {
            digits.push(ch);
            continue;
        }
        if ch == 'T' {
            if in_time || !digits.is_empty() {
                return Err(invalid());
            }
            in_time = true;
            continue;
        }

        let value: i64 = digits.parse().map_err(|_| invalid())?;
        digits.clear();
        let unit = match (in_time, ch) {
            (false, 'W') => 7 * 86_400,
            (false, 'D') => 86_400,
            (true, 'H') => 3_600,
            (true, 'M') => 60,
            (true, 'S') => 1,
            _ => return Err(invalid()),
        };
        seconds = value
            .checked_mul(unit)
            .and_then(|part| seconds.checked_add(part))
            .ok_or_else(invalid)?;
        saw_component = true;
        saw_time_component |= in_time;
    }

    if !digits.is_empty() || !saw_component || (in_time && !saw_time_component) {
        return Err(invalid());
    }

    let delta = TimeDelta::try_seconds(seconds).ok_or_else(invalid)?;
    Ok(if negative { -delta } else { delta })
}

/// Render a duration as `[-]P[nD][T[nH][nM][nS]]`, `PT0S` for zero
#[must_use]
pub fn format_iso_duration(delta: TimeDelta) -> String {
    let total = delta.num_seconds();
    let sign = if total < 0 { "-" } else { "" };
    let total = total.unsigned_abs();

    let days = total / 86_400;
    let hours = (total % 86_400) / 3_600;
    let minutes = (total % 3_600) / 60;
    let seconds = total % 60;

    let mut out = format!("{sign}P");
    if days > 0 {
        out.push_str(&format!("{days}D"));
    }

    let mut time = String::new();
    if hours > 0 {
        time.push_str(&format!("{hours}H"));
    }
    if minutes > 0 {
        time.push_str(&format!("{minutes}M"));
    }
    if seconds > 0 || (days == 0 && time.is_empty()) {
        time.push_str(&format!("{seconds}S"));
    }
    if !time.is_empty() {
        out.push('T');
        out.push_str(&time);
    }
    out
}

/// Serde adapter storing a `TimeDelta` as an ISO-8601 duration string
pub mod iso_duration {
    use super::{Deserialize, Deserializer, Serializer, TimeDelta, de};

    /// Serialize as ISO-8601 text
    pub fn serialize<S: Serializer>(delta: &TimeDelta, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&super::format_iso_duration(*delta))
    }

    /// Deserialize from ISO-8601 text
    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<TimeDelta, D::Error> {
        let raw = String::deserialize(deserializer)?;
        super::parse_iso_duration(&raw).map_err(de::Error::custom)
    }
}
