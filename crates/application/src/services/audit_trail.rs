//! Audit trail for mutating operations

use std::{fmt, sync::Arc};

use domain::AuditEntry;
use tracing::debug;

use crate::{ports::AuditLogPort, request_context::RequestContext};

/// Stamps audit entries with the request's actor and id before persisting them
#[derive(Clone)]
pub struct AuditTrail {
    sink: Arc<dyn AuditLogPort>,
}

impl fmt::Debug for AuditTrail {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuditTrail").finish_non_exhaustive()
    }
}

impl AuditTrail {
    /// Create a trail writing to `sink`
    pub fn new(sink: Arc<dyn AuditLogPort>) -> Self {
        Self { sink }
    }

    /// Record one mutation
    pub async fn record(&self, ctx: &RequestContext, entry: AuditEntry) {
        let entry = entry
            .with_actor(ctx.username())
            .with_request_id(ctx.request_id());
        debug!(
            operation = %entry.operation,
            entity = %entry.entity_type,
            uid = %entry.uid,
            outcome = %entry.outcome,
            "Recording audit entry"
        );
        self.sink.record(entry).await;
    }
}
