//! Entity tag (ETag) value object

use std::fmt;

use serde::{Deserialize, Serialize};

/// Opaque version token the DAV server assigns to a resource representation
///
/// The raw value is kept exactly as the server sent it (including quotes and a
/// weak `W/` prefix) so it can be echoed back in conditional headers.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityTag(String);

impl EntityTag {
    /// Create an entity tag from the raw header value
    #[must_use]
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into().trim().to_string())
    }

    /// Parse an optional header value, ignoring blanks
    #[must_use]
    pub fn from_header(raw: Option<&str>) -> Option<Self> {
        raw.map(str::trim)
            .filter(|value| !value.is_empty())
            .map(Self::new)
    }

    /// The tag as received
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether the server marked this tag as weak
    #[must_use]
    pub fn is_weak(&self) -> bool {
        self.0.starts_with("W/")
    }

    /// Value suitable for `If-Match`, quoted if the server sent a bare token
    #[must_use]
    pub fn header_value(&self) -> String {
        if self.0.starts_with('"') || self.is_weak() {
            self.0.clone()
        } else {
            format!("\"{}\"", self.0)
        }
    }

    /// Compare two tags ignoring quoting and weakness markers
    #[must_use]
    pub fn matches(&self, other: &Self) -> bool {
        self.opaque() == other.opaque()
    }

    fn opaque(&self) -> &str {
        self.0.trim_start_matches("W/").trim_matches('"')
    }
}

impl fmt::Display for EntityTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for EntityTag {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for EntityTag {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_value_keeps_quoted_tags() {
        let tag = EntityTag::new("\"abc123\"");
        assert_eq!(tag.header_value(), "\"abc123\"");
    }

    #[test]
    fn header_value_quotes_bare_tokens() {
        let tag = EntityTag::new("abc123");
        assert_eq!(tag.header_value(), "\"abc123\"");
    }

    #[test]
    fn weak_tags_are_passed_through() {
        let tag = EntityTag::new("W/\"v1\"");
        assert!(tag.is_weak());
        assert_eq!(tag.header_value(), "W/\"v1\"");
    }

    #[test]
    fn from_header_skips_blank_values() {
        assert!(EntityTag::from_header(Some("  ")).is_none());
        assert!(EntityTag::from_header(None).is_none());
        assert_eq!(
            EntityTag::from_header(Some(" \"x\" ")).unwrap().as_str(),
            "\"x\""
        );
    }

    #[test]
    fn matches_ignores_quoting() {
        assert!(EntityTag::new("abc").matches(&EntityTag::new("\"abc\"")));
        assert!(!EntityTag::new("abc").matches(&EntityTag::new("\"abd\"")));
    }

    #[test]
    fn serializes_as_plain_string() {
        let tag = EntityTag::new("\"etag-1\"");
        let json = serde_json::to_string(&tag).unwrap();
        assert_eq!(json, r#""\"etag-1\"""#);
    }
}
