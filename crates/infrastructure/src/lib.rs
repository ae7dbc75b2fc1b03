//! Infrastructure layer - Adapters for external systems
//!
//! Implements the transport and audit ports defined in the application layer:
//! a pooled reqwest client with retry and per-host circuit breaking, and an
//! append-only JSONL audit log. Also loads configuration and installs the
//! tracing subscriber.

pub mod adapters;
pub mod config;
pub mod http;
pub mod persistence;
pub mod retry;
pub mod telemetry;

use std::sync::Arc;

use application::ports::AuditLogPort;

pub use adapters::*;
pub use config::{
    AppConfig, AuditConfig, CircuitBreakerAppConfig, DavConfig, TelemetryAppConfig,
    TransportConfig,
};
pub use http::HttpDavTransport;
pub use persistence::{JsonlAuditLog, NullAuditLog};
pub use retry::{RetryConfig, RetryResult, Retryable, may_retry, retry, with_retry};
pub use telemetry::{TelemetryError, init_telemetry};

/// Audit sink selected by configuration
#[must_use]
pub fn audit_log_from_config(config: &AuditConfig) -> Arc<dyn AuditLogPort> {
    if config.enabled {
        Arc::new(JsonlAuditLog::new(config.path.clone()))
    } else {
        Arc::new(NullAuditLog)
    }
}
