//! Read-side redaction of decoded records
//!
//! Masking only ever produces a new value; the record it was given is left
//! untouched. Write paths must forward the caller's payload unmasked.

use crate::entities::{Attendee, Classification, Contact, Event};

/// Text substituted for redacted fields
pub const REDACTION_MARKER: &str = "[private]";

/// Substitute for a value that already reads as [`REDACTION_MARKER`]
pub const ALTERNATE_REDACTION_MARKER: &str = "[redacted]";

/// Replacement for `value` that never equals it
fn redact(value: &str) -> String {
    if value == REDACTION_MARKER {
        ALTERNATE_REDACTION_MARKER.to_string()
    } else {
        REDACTION_MARKER.to_string()
    }
}

/// Redact an event's content if `classification` requires it
///
/// uid, start, end and the event's own classification survive so the event
/// can still be placed on a timeline.
#[must_use]
pub fn mask(event: &Event, classification: Classification) -> Event {
    if !classification.requires_masking() {
        return event.clone();
    }

    let mut masked = event.clone();
    masked.summary = redact(&masked.summary);
    masked.description = masked.description.as_deref().map(redact);
    masked.location = masked.location.as_deref().map(redact);
    masked.organizer = masked.organizer.as_deref().map(redact);
    if !masked.attendees.is_empty() {
        masked.attendees = vec![Attendee::new(REDACTION_MARKER).with_name(REDACTION_MARKER)];
    }
    for reminder in &mut masked.reminders {
        reminder.description = reminder.description.as_deref().map(redact);
    }
    masked
}

/// Mask for a read: always when the caller asks, otherwise per the event's class
#[must_use]
pub fn mask_for_read(event: &Event, privacy_requested: bool) -> Event {
    if privacy_requested {
        mask(event, Classification::Private)
    } else {
        mask(event, event.classification)
    }
}

/// Redact a contact's street/city and notes and drop the birthday
#[must_use]
pub fn mask_contact(contact: &Contact) -> Contact {
    let mut masked = contact.clone();
    for address in &mut masked.addresses {
        address.street = address.street.as_deref().map(redact);
        address.city = address.city.as_deref().map(redact);
    }
    masked.notes = masked.notes.as_deref().map(redact);
    masked.birthday = None;
    masked
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::{ContactAddress, Reminder};
    use chrono::{NaiveDate, TimeDelta};

    fn event() -> Event {
        Event::new(
            "Board meeting",
            "2025-04-21T14:00:00Z".parse().unwrap(),
            "2025-04-21T15:00:00Z".parse().unwrap(),
        )
        .with_uid("evt-1")
        .with_description("Quarterly numbers")
        .with_location("Room 4")
        .with_organizer("ceo@example.com")
        .with_attendee(Attendee::new("cfo@example.com").with_name("CFO"))
        .with_attendee(Attendee::new("cto@example.com"))
        .with_reminder(Reminder::before_start(TimeDelta::minutes(-10)).with_description("Prep"))
    }

    #[test]
    fn private_mask_redacts_content_and_keeps_timeline() {
        let original = event();
        let masked = mask(&original, Classification::Private);

        assert_eq!(masked.uid, original.uid);
        assert_eq!(masked.start, original.start);
        assert_eq!(masked.end, original.end);
        assert_eq!(masked.classification, original.classification);
        assert_ne!(masked.summary, original.summary);
        assert_eq!(masked.summary, REDACTION_MARKER);
        assert_eq!(masked.description.as_deref(), Some(REDACTION_MARKER));
        assert_eq!(masked.location.as_deref(), Some(REDACTION_MARKER));
        assert_eq!(masked.attendees.len(), 1);
        assert_eq!(masked.attendees[0].email, REDACTION_MARKER);
        assert_eq!(masked.reminders[0].description.as_deref(), Some(REDACTION_MARKER));
    }

    #[test]
    fn mask_leaves_original_untouched() {
        let original = event();
        let snapshot = original.clone();
        let _ = mask(&original, Classification::Confidential);
        assert_eq!(original, snapshot);
    }

    #[test]
    fn public_classification_is_identity() {
        let original = event();
        assert_eq!(mask(&original, Classification::Public), original);
    }

    #[test]
    fn absent_fields_stay_absent() {
        let bare = Event::new(
            "Dentist",
            "2025-04-21T14:00:00Z".parse().unwrap(),
            "2025-04-21T15:00:00Z".parse().unwrap(),
        );
        let masked = mask(&bare, Classification::Private);
        assert!(masked.description.is_none());
        assert!(masked.location.is_none());
        assert!(masked.attendees.is_empty());
    }

    #[test]
    fn read_mask_honours_request_and_event_class() {
        let public = event();
        assert_eq!(mask_for_read(&public, false), public);
        assert_eq!(mask_for_read(&public, true).summary, REDACTION_MARKER);

        let private = event().with_classification(Classification::Private);
        let masked = mask_for_read(&private, false);
        assert_eq!(masked.summary, REDACTION_MARKER);
        assert_eq!(masked.classification, Classification::Private);
    }

    #[test]
    fn marker_text_is_still_replaced() {
        let decoy = event()
            .with_description(REDACTION_MARKER)
            .with_classification(Classification::Private);
        let decoy = Event {
            summary: REDACTION_MARKER.to_string(),
            ..decoy
        };

        let masked = mask_for_read(&decoy, false);
        assert_ne!(masked.summary, decoy.summary);
        assert_eq!(masked.summary, ALTERNATE_REDACTION_MARKER);
        assert_eq!(masked.description.as_deref(), Some(ALTERNATE_REDACTION_MARKER));
        assert_eq!(masked.location.as_deref(), Some(REDACTION_MARKER));

        let contact = Contact::new("Bob").with_notes(REDACTION_MARKER);
        assert_eq!(
            mask_contact(&contact).notes.as_deref(),
            Some(ALTERNATE_REDACTION_MARKER)
        );
    }

    #[test]
    fn contact_mask_hides_address_notes_and_birthday() {
        let contact = Contact::new("Alice")
            .with_email("alice@example.com", Some("home"))
            .with_address(ContactAddress {
                tag: Some("home".to_string()),
                street: Some("Main St 1".to_string()),
                city: Some("Berlin".to_string()),
                country: Some("Germany".to_string()),
                ..ContactAddress::default()
            })
            .with_notes("Allergic to peanuts")
            .with_birthday(NaiveDate::from_ymd_opt(1990, 5, 17).unwrap());

        let masked = mask_contact(&contact);
        assert_eq!(masked.full_name, "Alice");
        assert_eq!(masked.emails, contact.emails);
        assert_eq!(masked.addresses[0].street.as_deref(), Some(REDACTION_MARKER));
        assert_eq!(masked.addresses[0].city.as_deref(), Some(REDACTION_MARKER));
        assert_eq!(masked.addresses[0].country.as_deref(), Some("Germany"));
        assert_eq!(masked.notes.as_deref(), Some(REDACTION_MARKER));
        assert!(masked.birthday.is_none());
    }
}
