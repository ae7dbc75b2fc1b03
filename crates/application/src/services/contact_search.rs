//! Contact search criteria
//!
//! A search is sent to the server as an address book query and re-checked
//! locally with the same semantics, so servers with weaker filtering still
//! produce exact results.

use std::fmt;

use domain::Contact;
use serde::{Deserialize, Serialize};

use crate::error::DavError;

/// Searchable contact fields
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContactField {
    /// Identifier
    Uid,
    /// Display name
    FullName,
    /// Any email address
    Email,
    /// Any phone number
    Phone,
    /// Any address component
    Address,
    /// Birthday as `YYYY-MM-DD`
    Birthday,
    /// Group membership
    Group,
}

impl ContactField {
    /// vCard property the field is stored in
    #[must_use]
    pub const fn vcard_property(&self) -> &'static str {
        match self {
            Self::Uid => "UID",
            Self::FullName => "FN",
            Self::Email => "EMAIL",
            Self::Phone => "TEL",
            Self::Address => "ADR",
            Self::Birthday => "BDAY",
            Self::Group => "CATEGORIES",
        }
    }

    fn values(self, contact: &Contact) -> Vec<String> {
        match self {
            Self::Uid => vec![contact.uid.clone()],
            Self::FullName => vec![contact.full_name.clone()],
            Self::Email => contact.emails.iter().map(|e| e.email.clone()).collect(),
            Self::Phone => contact.phones.iter().map(|p| p.number.clone()).collect(),
            Self::Address => contact
                .addresses
                .iter()
                .flat_map(|a| {
                    [&a.street, &a.city, &a.state, &a.postal_code, &a.country]
                        .into_iter()
                        .flatten()
                        .cloned()
                })
                .collect(),
            Self::Birthday => contact
                .birthday
                .map(|d| d.format("%Y-%m-%d").to_string())
                .into_iter()
                .collect(),
            Self::Group => contact.groups.iter().cloned().collect(),
        }
    }
}

impl fmt::Display for ContactField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.vcard_property())
    }
}

/// How several criteria combine
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum MatchMode {
    /// At least one criterion matches
    #[default]
    #[serde(rename = "anyof")]
    AnyOf,
    /// Every criterion matches
    #[serde(rename = "allof")]
    AllOf,
}

impl MatchMode {
    /// Value of the `test` attribute in an address book filter
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::AnyOf => "anyof",
            Self::AllOf => "allof",
        }
    }
}

/// One field/value pair
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchCriterion {
    /// Field to match
    pub field: ContactField,
    /// Substring to look for
    pub value: String,
}

impl SearchCriterion {
    /// Case-insensitive substring match against any value of the field
    fn matches(&self, contact: &Contact) -> bool {
        let needle = fold_case(&self.value);
        self.field
            .values(contact)
            .iter()
            .any(|value| fold_case(value).contains(&needle))
    }
}

/// Contact search request
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactSearch {
    /// Criteria
    pub criteria: Vec<SearchCriterion>,
    /// Combination mode
    #[serde(default)]
    pub mode: MatchMode,
}

impl ContactSearch {
    /// Empty search with the given mode
    #[must_use]
    pub const fn new(mode: MatchMode) -> Self {
        Self {
            criteria: Vec::new(),
            mode,
        }
    }

    /// Add a criterion
    #[must_use]
    pub fn with(mut self, field: ContactField, value: impl Into<String>) -> Self {
        self.criteria.push(SearchCriterion {
            field,
            value: value.into(),
        });
        self
    }

    /// A search needs at least one non-blank criterion
    pub fn validate(&self) -> Result<(), DavError> {
        if self.criteria.is_empty() {
            return Err(DavError::ValidationFailure(
                "search needs at least one criterion".to_string(),
            ));
        }
        if let Some(blank) = self.criteria.iter().find(|c| c.value.trim().is_empty()) {
            return Err(DavError::ValidationFailure(format!(
                "search value for {} must not be empty",
                blank.field
            )));
        }
        Ok(())
    }

    /// Whether a contact satisfies the search
    #[must_use]
    pub fn matches(&self, contact: &Contact) -> bool {
        match self.mode {
            MatchMode::AnyOf => self.criteria.iter().any(|c| c.matches(contact)),
            MatchMode::AllOf => self.criteria.iter().all(|c| c.matches(contact)),
        }
    }
}

/// Case folding matching the `i;unicode-casemap` collation closely enough for
/// substring tests
fn fold_case(value: &str) -> String {
    value.to_lowercase()
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;

    fn alice() -> Contact {
        Contact::new("Alice Müller")
            .with_uid("alice")
            .with_email("Alice@Example.com", Some("work"))
            .with_phone("+49 30 1234", None)
            .with_birthday(NaiveDate::from_ymd_opt(1990, 5, 17).unwrap())
            .with_group("Family")
    }

    #[test]
    fn matching_is_case_insensitive_substring() {
        let search = ContactSearch::new(MatchMode::AnyOf).with(ContactField::FullName, "MÜLL");
        assert!(search.matches(&alice()));
    }

    #[test]
    fn anyof_needs_one_match() {
        let search = ContactSearch::new(MatchMode::AnyOf)
            .with(ContactField::FullName, "bob")
            .with(ContactField::Email, "example.com");
        assert!(search.matches(&alice()));
    }

    #[test]
    fn allof_needs_every_match() {
        let search = ContactSearch::new(MatchMode::AllOf)
            .with(ContactField::FullName, "alice")
            .with(ContactField::Group, "work");
        assert!(!search.matches(&alice()));

        let search = ContactSearch::new(MatchMode::AllOf)
            .with(ContactField::FullName, "alice")
            .with(ContactField::Group, "fam");
        assert!(search.matches(&alice()));
    }

    #[test]
    fn birthday_and_phone_are_searchable() {
        assert!(
            ContactSearch::new(MatchMode::AnyOf)
                .with(ContactField::Birthday, "1990-05")
                .matches(&alice())
        );
        assert!(
            ContactSearch::new(MatchMode::AnyOf)
                .with(ContactField::Phone, "1234")
                .matches(&alice())
        );
    }

    #[test]
    fn empty_or_blank_search_is_rejected() {
        assert!(ContactSearch::default().validate().is_err());
        assert!(
            ContactSearch::new(MatchMode::AnyOf)
                .with(ContactField::Email, "  ")
                .validate()
                .is_err()
        );
        assert!(
            ContactSearch::new(MatchMode::AnyOf)
                .with(ContactField::Email, "a")
                .validate()
                .is_ok()
        );
    }

    #[test]
    fn mode_serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&MatchMode::AllOf).unwrap(),
            "\"allof\""
        );
        assert_eq!(ContactField::Group.vcard_property(), "CATEGORIES");
    }
}
