//! Domain entities - Objects with identity and lifecycle

mod audit_entry;
mod contact;
mod event;
mod reminder;

pub use audit_entry::{AuditEntry, AuditOperation, AuditOutcome, EntityKind};
pub use contact::{Contact, ContactAddress, ContactEmail, ContactPhone};
pub use event::{
    Attendee, AttendeeRole, CalendarUserType, Classification, Event, EventStatus,
    ParticipationStatus,
};
pub use reminder::{AlarmAction, Reminder, ReminderTrigger, TriggerRelation};

/// Rewrite CRLF and lone CR as LF
fn unify_line_breaks(text: &mut String) {
    if text.contains('\r') {
        *text = text.replace("\r\n", "\n").replace('\r', "\n");
    }
}
