//! Pairing of a uid with the tag last observed for it

use serde::{Deserialize, Serialize};

use super::EntityTag;

/// What a writer knows about the resource it is about to change
///
/// Created when a record is read, consumed by exactly one write attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConditionalWriteContext {
    uid: String,
    known_tag: Option<EntityTag>,
}

impl ConditionalWriteContext {
    /// Context for a resource whose current tag is known
    #[must_use]
    pub fn new(uid: impl Into<String>, known_tag: Option<EntityTag>) -> Self {
        Self {
            uid: uid.into(),
            known_tag,
        }
    }

    /// Context for a resource that is expected not to exist yet
    #[must_use]
    pub fn for_new(uid: impl Into<String>) -> Self {
        Self::new(uid, None)
    }

    /// Resource uid
    #[must_use]
    pub fn uid(&self) -> &str {
        &self.uid
    }

    /// Last tag observed for the uid
    #[must_use]
    pub const fn known_tag(&self) -> Option<&EntityTag> {
        self.known_tag.as_ref()
    }
}
