//! Port for audit log persistence
//!
//! Recording is fire-and-forget from the caller's point of view: an adapter
//! that cannot persist an entry logs the failure and returns normally.

use async_trait::async_trait;
use domain::AuditEntry;
#[cfg(test)]
use mockall::automock;

/// Append-only sink for audit entries
#[cfg_attr(test, automock)]
#[async_trait]
pub trait AuditLogPort: Send + Sync {
    /// Append an entry; never fails on the caller's behalf
    async fn record(&self, entry: AuditEntry);
}
