//! Resource uid rules

use uuid::Uuid;

use crate::DomainError;

/// Longest uid accepted in a resource path
pub const MAX_UID_LEN: usize = 255;

const RESERVED: &[char] = &[
    '/', '\\', '?', '#', '[', ']', '@', '!', '$', '&', '\'', '(', ')', '*', '+', ',', ';', '=',
];

/// Check that a uid can be used verbatim as a DAV resource name
pub fn validate_uid(uid: &str) -> Result<(), DomainError> {
    if uid.is_empty() {
        return Err(DomainError::invalid_uid(uid, "must not be empty"));
    }
    if uid.chars().count() > MAX_UID_LEN {
        return Err(DomainError::invalid_uid(
            uid,
            format!("longer than {MAX_UID_LEN} characters"),
        ));
    }
    if let Some(bad) = uid
        .chars()
        .find(|c| RESERVED.contains(c) || c.is_whitespace() || c.is_control())
    {
        return Err(DomainError::invalid_uid(
            uid,
            format!("contains reserved character {bad:?}"),
        ));
    }
    Ok(())
}

/// Fresh uid for a resource the caller did not name
#[must_use]
pub fn generate_uid() -> String {
    Uuid::new_v4().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_uuid_and_plain_names() {
        assert!(validate_uid(&generate_uid()).is_ok());
        assert!(validate_uid("event-2025.04_21~x").is_ok());
    }

    #[test]
    fn rejects_reserved_characters() {
        for uid in ["a/b", "a?b", "a#b", "a b", "a@b", "a;b", "a=b", "a\\b"] {
            assert!(validate_uid(uid).is_err(), "accepted {uid}");
        }
    }

    #[test]
    fn rejects_empty_and_overlong() {
        assert!(validate_uid("").is_err());
        assert!(validate_uid(&"x".repeat(MAX_UID_LEN)).is_ok());
        assert!(validate_uid(&"x".repeat(MAX_UID_LEN + 1)).is_err());
    }

    #[test]
    fn generated_uids_are_canonical_v4() {
        let uid = generate_uid();
        let parsed = Uuid::parse_str(&uid).unwrap();
        assert_eq!(parsed.get_version_num(), 4);
        assert_eq!(uid, parsed.hyphenated().to_string());
    }
}
