//! HTTP transport for the DAV clients

mod dav_transport;

pub use dav_transport::HttpDavTransport;
