//! Persistence adapters
//!
//! The audit log is the only state that outlives a request.

mod audit_log;

pub use audit_log::{JsonlAuditLog, NullAuditLog};
