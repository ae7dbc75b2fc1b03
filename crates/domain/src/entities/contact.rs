//! Address book contact entity (vCard)

use std::collections::BTreeSet;

use chrono::NaiveDate;
use serde::{Deserialize, Deserializer, Serialize};

use crate::{
    DomainError,
    value_objects::{EntityTag, validate_uid},
};

/// Email address with its type tag (`home`, `work`, ...)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContactEmail {
    /// Type tag, lower-case
    #[serde(
        default,
        deserialize_with = "lowercase_tag",
        skip_serializing_if = "Option::is_none"
    )]
    pub tag: Option<String>,
    /// Address
    pub email: String,
}

/// Phone number with its type tag (`cell`, `home`, ...)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContactPhone {
    /// Type tag, lower-case
    #[serde(
        default,
        deserialize_with = "lowercase_tag",
        skip_serializing_if = "Option::is_none"
    )]
    pub tag: Option<String>,
    /// Number as entered
    pub number: String,
}

/// Postal address with its type tag
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContactAddress {
    /// Type tag, lower-case
    #[serde(
        default,
        deserialize_with = "lowercase_tag",
        skip_serializing_if = "Option::is_none"
    )]
    pub tag: Option<String>,
    /// Street
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub street: Option<String>,
    /// City
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    /// State or region
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    /// Postal code
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub postal_code: Option<String>,
    /// Country
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
}

impl ContactAddress {
    /// Whether every component is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        [
            &self.street,
            &self.city,
            &self.state,
            &self.postal_code,
            &self.country,
        ]
        .iter()
        .all(|part| part.as_deref().is_none_or(str::is_empty))
    }
}

/// A contact from a CardDAV address book
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contact {
    /// Stable identifier, unique per address book
    #[serde(default)]
    pub uid: String,
    /// Formatted name
    pub full_name: String,
    /// Email addresses
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub emails: Vec<ContactEmail>,
    /// Phone numbers
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub phones: Vec<ContactPhone>,
    /// Postal addresses
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub addresses: Vec<ContactAddress>,
    /// Birthday
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub birthday: Option<NaiveDate>,
    /// Free-form notes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    /// Groups / categories
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub groups: BTreeSet<String>,
    /// Resource URL on the server
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// Server version token
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub etag: Option<EntityTag>,
}

impl Contact {
    /// Create a contact with only a name
    #[must_use]
    pub fn new(full_name: impl Into<String>) -> Self {
        Self {
            uid: String::new(),
            full_name: full_name.into(),
            emails: Vec::new(),
            phones: Vec::new(),
            addresses: Vec::new(),
            birthday: None,
            notes: None,
            groups: BTreeSet::new(),
            url: None,
            etag: None,
        }
    }

    /// Set the uid
    #[must_use]
    pub fn with_uid(mut self, uid: impl Into<String>) -> Self {
        self.uid = uid.into();
        self
    }

    /// Add an email address
    #[must_use]
    pub fn with_email(mut self, email: impl Into<String>, tag: Option<&str>) -> Self {
        self.emails.push(ContactEmail {
            tag: tag.map(str::to_lowercase),
            email: email.into(),
        });
        self
    }

    /// Add a phone number
    #[must_use]
    pub fn with_phone(mut self, number: impl Into<String>, tag: Option<&str>) -> Self {
        self.phones.push(ContactPhone {
            tag: tag.map(str::to_lowercase),
            number: number.into(),
        });
        self
    }

    /// Add a postal address
    #[must_use]
    pub fn with_address(mut self, address: ContactAddress) -> Self {
        self.addresses.push(address);
        self
    }

    /// Set the birthday
    #[must_use]
    pub const fn with_birthday(mut self, birthday: NaiveDate) -> Self {
        self.birthday = Some(birthday);
        self
    }

    /// Set the notes
    #[must_use]
    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }

    /// Add a group
    #[must_use]
    pub fn with_group(mut self, group: impl Into<String>) -> Self {
        self.groups.insert(group.into());
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

    /// Lower-case every type tag, then drop repeated (tag, value) pairs,
    /// keeping the first occurrence. Line breaks in notes become LF.
    #[must_use]
    pub fn normalized(mut self) -> Self {
        if let Some(notes) = self.notes.as_mut() {
            super::unify_line_breaks(notes);
        }
        for tag in self
            .emails
            .iter_mut()
            .map(|e| &mut e.tag)
            .chain(self.phones.iter_mut().map(|p| &mut p.tag))
            .chain(self.addresses.iter_mut().map(|a| &mut a.tag))
        {
            *tag = tag.take().map(|t| t.to_lowercase());
        }
        dedup_in_order(&mut self.emails);
        dedup_in_order(&mut self.phones);
        dedup_in_order(&mut self.addresses);
        self
    }

    /// Check the invariants a writable contact must satisfy
    pub fn validate(&self) -> Result<(), DomainError> {
        if self.has_uid() {
            validate_uid(&self.uid)?;
        }
        if self.full_name.trim().is_empty() {
            return Err(DomainError::ValidationError(
                "contact full_name must not be empty".to_string(),
            ));
        }
        if let Some(email) = self.emails.iter().find(|e| !e.email.contains('@')) {
            return Err(DomainError::ValidationError(format!(
                "invalid email address: {}",
                email.email
            )));
        }
        Ok(())
    }
}

fn lowercase_tag<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.map(|tag| tag.to_lowercase()))
}

fn dedup_in_order<T: PartialEq>(items: &mut Vec<T>) {
    let mut kept: Vec<T> = Vec::with_capacity(items.len());
    for item in items.drain(..) {
        if !kept.contains(&item) {
            kept.push(item);
        }
    }
    *items = kept;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_lowercases_tags() {
        let contact = Contact::new("Alice")
            .with_email("alice@example.com", Some("WORK"))
            .with_phone("+49 30 123", Some("Cell"));
        assert_eq!(contact.emails[0].tag.as_deref(), Some("work"));
        assert_eq!(contact.phones[0].tag.as_deref(), Some("cell"));
    }

    #[test]
    fn normalized_turns_carriage_returns_into_line_feeds() {
        let contact = Contact::new("Alice").with_notes("line one\r\nline two\r").normalized();
        assert_eq!(contact.notes.as_deref(), Some("line one\nline two\n"));
    }

    #[test]
    fn normalized_keeps_first_occurrence() {
        let contact = Contact::new("Alice")
            .with_email("a@example.com", Some("home"))
            .with_email("b@example.com", Some("work"))
            .with_email("a@example.com", Some("home"))
            .with_email("a@example.com", Some("work"))
            .normalized();
        let emails: Vec<_> = contact
            .emails
            .iter()
            .map(|e| (e.tag.as_deref(), e.email.as_str()))
            .collect();
        assert_eq!(
            emails,
            vec![
                (Some("home"), "a@example.com"),
                (Some("work"), "b@example.com"),
                (Some("work"), "a@example.com"),
            ]
        );
    }

    #[test]
    fn validate_requires_name_and_sane_email() {
        assert!(Contact::new("").validate().is_err());
        assert!(
            Contact::new("Bob")
                .with_email("not-an-email", None)
                .validate()
                .is_err()
        );
        assert!(
            Contact::new("Bob")
                .with_email("bob@example.com", None)
                .validate()
                .is_ok()
        );
    }

    #[test]
    fn address_is_empty() {
        assert!(ContactAddress::default().is_empty());
        let address = ContactAddress {
            city: Some("Berlin".to_string()),
            ..ContactAddress::default()
        };
        assert!(!address.is_empty());
    }

    #[test]
    fn normalized_lowercases_literal_tags() {
        let mut contact = Contact::new("Alice").with_email("a@example.com", Some("work"));
        contact.phones.push(ContactPhone {
            tag: Some("CELL".to_string()),
            number: "+49 30 123".to_string(),
        });
        contact.emails.push(ContactEmail {
            tag: Some("WORK".to_string()),
            email: "a@example.com".to_string(),
        });
        let contact = contact.normalized();
        assert_eq!(contact.phones[0].tag.as_deref(), Some("cell"));
        assert_eq!(contact.emails.len(), 1);
    }

    #[test]
    fn deserialized_tags_are_lowercased() {
        let contact: Contact = serde_json::from_str(
            r#"{"full_name":"Alice","emails":[{"tag":"WORK","email":"a@example.com"}],
                "addresses":[{"tag":"Home","city":"Berlin"}]}"#,
        )
        .unwrap();
        assert_eq!(contact.emails[0].tag.as_deref(), Some("work"));
        assert_eq!(contact.addresses[0].tag.as_deref(), Some("home"));
    }

    #[test]
    fn deserializes_minimal_payload() {
        let contact: Contact = serde_json::from_str(r#"{"full_name":"Alice"}"#).unwrap();
        assert_eq!(contact.full_name, "Alice");
        assert!(contact.emails.is_empty());
        assert!(contact.groups.is_empty());
    }
}
