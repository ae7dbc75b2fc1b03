//! Audit log entry entity - Records every mutation attempt against the DAV server

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::value_objects::EntityTag;

/// Mutating operation being recorded
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditOperation {
    /// Resource creation
    Create,
    /// Conditional update
    Update,
    /// Deletion
    Delete,
}

impl std::fmt::Display for AuditOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
        };
        write!(f, "{s}")
    }
}

/// Kind of resource the entry is about
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    /// Calendar event
    Event,
    /// Address book contact
    Contact,
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Event => "event",
            Self::Contact => "contact",
        };
        write!(f, "{s}")
    }
}

/// How the operation ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditOutcome {
    /// The server accepted the change
    Applied,
    /// The server rejected the precondition
    Conflict,
    /// The resource did not exist
    NotFound,
    /// Any other failure
    Failed,
}

impl std::fmt::Display for AuditOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Applied => "applied",
            Self::Conflict => "conflict",
            Self::NotFound => "not_found",
            Self::Failed => "failed",
        };
        write!(f, "{s}")
    }
}

/// One immutable line of the audit log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    /// When the outcome was determined
    pub timestamp: DateTime<Utc>,
    /// Operation
    pub operation: AuditOperation,
    /// Resource kind
    pub entity_type: EntityKind,
    /// Resource uid
    pub uid: String,
    /// Tag the writer based the change on
    pub prior_tag: Option<EntityTag>,
    /// Tag after the change (`None` unless applied)
    pub new_tag: Option<EntityTag>,
    /// Outcome
    pub outcome: AuditOutcome,
    /// Server state before the change (or the conflicting server state)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub before: Option<serde_json::Value>,
    /// Payload the writer submitted
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub after: Option<serde_json::Value>,
    /// Error description for failed attempts
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Who performed the change
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actor: Option<String>,
    /// Request ID for tracing correlation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<Uuid>,
}

impl AuditEntry {
    /// Create an entry stamped with the current time
    pub fn new(
        operation: AuditOperation,
        entity_type: EntityKind,
        uid: impl Into<String>,
        outcome: AuditOutcome,
    ) -> Self {
        Self {
            timestamp: Utc::now(),
            operation,
            entity_type,
            uid: uid.into(),
            prior_tag: None,
            new_tag: None,
            outcome,
            before: None,
            after: None,
            error: None,
            actor: None,
            request_id: None,
        }
    }

    /// Set the tag the change was based on
    #[must_use]
    pub fn with_prior_tag(mut self, tag: Option<EntityTag>) -> Self {
        self.prior_tag = tag;
        self
    }

    /// Set the resulting tag; ignored unless the change was applied
    #[must_use]
    pub fn with_new_tag(mut self, tag: Option<EntityTag>) -> Self {
        if self.outcome == AuditOutcome::Applied {
            self.new_tag = tag;
        }
        self
    }

    /// Snapshot of the server state
    #[must_use]
    pub fn with_before<T: Serialize>(mut self, before: &T) -> Self {
        self.before = serde_json::to_value(before).ok();
        self
    }

    /// Snapshot of the submitted payload
    #[must_use]
    pub fn with_after<T: Serialize>(mut self, after: &T) -> Self {
        self.after = serde_json::to_value(after).ok();
        self
    }

    /// Set the error description
    #[must_use]
    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }

    /// Set the actor
    #[must_use]
    pub fn with_actor(mut self, actor: impl Into<String>) -> Self {
        self.actor = Some(actor.into());
        self
    }

    /// Set the request ID for tracing correlation
    #[must_use]
    pub const fn with_request_id(mut self, request_id: Uuid) -> Self {
        self.request_id = Some(request_id);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_to_flat_json_line() {
        let entry = AuditEntry::new(
            AuditOperation::Update,
            EntityKind::Contact,
            "contact-1",
            AuditOutcome::Applied,
        )
        .with_prior_tag(Some(EntityTag::new("\"etag-1\"")))
        .with_new_tag(Some(EntityTag::new("\"etag-2\"")));

        let json = serde_json::to_string(&entry).unwrap();
        assert!(!json.contains('\n'));
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["operation"], "update");
        assert_eq!(value["entity_type"], "contact");
        assert_eq!(value["outcome"], "applied");
        assert_eq!(value["prior_tag"], "\"etag-1\"");
        assert_eq!(value["new_tag"], "\"etag-2\"");
        assert!(value.get("error").is_none());
    }

    #[test]
    fn new_tag_is_null_unless_applied() {
        let entry = AuditEntry::new(
            AuditOperation::Update,
            EntityKind::Event,
            "e1",
            AuditOutcome::Conflict,
        )
        .with_new_tag(Some(EntityTag::new("\"x\"")));
        assert!(entry.new_tag.is_none());
        let value = serde_json::to_value(&entry).unwrap();
        assert!(value["new_tag"].is_null());
    }

    #[test]
    fn snapshots_are_embedded_as_json() {
        #[derive(Serialize)]
        struct Payload {
            full_name: &'static str,
        }
        let entry = AuditEntry::new(
            AuditOperation::Create,
            EntityKind::Contact,
            "c1",
            AuditOutcome::Applied,
        )
        .with_after(&Payload {
            full_name: "Alice",
        });
        assert_eq!(entry.after.unwrap()["full_name"], "Alice");
    }

    #[test]
    fn roundtrips_through_serde() {
        let request_id = Uuid::new_v4();
        let entry = AuditEntry::new(
            AuditOperation::Delete,
            EntityKind::Event,
            "e1",
            AuditOutcome::NotFound,
        )
        .with_actor("alice")
        .with_request_id(request_id);
        let json = serde_json::to_string(&entry).unwrap();
        let back: AuditEntry = serde_json::from_str(&json).unwrap();
        assert_eq!(back, entry);
    }

    #[test]
    fn display_impls() {
        assert_eq!(AuditOperation::Create.to_string(), "create");
        assert_eq!(EntityKind::Contact.to_string(), "contact");
        assert_eq!(AuditOutcome::NotFound.to_string(), "not_found");
    }
}
