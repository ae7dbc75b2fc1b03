//! Port definitions for application layer
//!
//! Ports are interfaces that define how the application interacts with
//! external systems. Adapters in the infrastructure layer implement these ports.

mod audit_log;
mod calendar_port;
mod contact_port;
mod transport_port;

pub use audit_log::AuditLogPort;
#[cfg(test)]
pub use audit_log::MockAuditLogPort;
pub use calendar_port::CalendarPort;
pub use contact_port::ContactPort;
pub use transport_port::{
    DavMethod, DavRequest, DavResponse, RequestKind, TransportPort, headers,
};
