//! Application layer - Ports and protocol-independent services
//!
//! Defines the ports the DAV clients are written against (transport, audit
//! log, calendar and contact operations), the error taxonomy every operation
//! reports, and the optimistic concurrency helpers shared by both protocols.

pub mod error;
pub mod ports;
pub mod request_context;
pub mod services;

pub use error::{DavError, TransportFailure};
pub use ports::*;
pub use request_context::{DavCredentials, RequestContext};
pub use services::*;
