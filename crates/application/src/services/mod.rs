//! Application services
//!
//! Protocol-independent logic shared by the CalDAV and CardDAV clients.

mod audit_trail;
mod concurrency_guard;
mod contact_search;

pub use audit_trail::AuditTrail;
pub use concurrency_guard::{
    ConditionalHeaders, DeleteOutcome, WriteResult, error_for_status, headers_for_context,
    interpret_delete_result, interpret_write_result, prepare_conditional_headers,
    prepare_create_headers,
};
pub use contact_search::{ContactField, ContactSearch, MatchMode, SearchCriterion};
