//! Port for the resilient HTTP transport
//!
//! DAV clients describe a request with [`DavRequest`]; the transport adapter
//! executes it with pooling, retry and circuit breaking.

use std::time::Duration;

use async_trait::async_trait;
use domain::EntityTag;

use crate::{error::DavError, request_context::RequestContext};

/// HTTP methods used by CalDAV/CardDAV
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DavMethod {
    /// Fetch a single resource
    Get,
    /// Create or replace a resource
    Put,
    /// Remove a resource
    Delete,
    /// Calendar/address book query
    Report,
    /// Property discovery
    Propfind,
}

impl DavMethod {
    /// Method name on the wire
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Put => "PUT",
            Self::Delete => "DELETE",
            Self::Report => "REPORT",
            Self::Propfind => "PROPFIND",
        }
    }
}

impl std::fmt::Display for DavMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Retry eligibility of a request, decided before it is sent
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestKind {
    /// Safe to repeat (reads and queries)
    Idempotent,
    /// Write guarded by `If-Match` / `If-None-Match`; a repeat cannot clobber
    ConditionalWrite,
    /// Unguarded write; may only be repeated if it never left the client
    NonIdempotent,
}

impl RequestKind {
    /// Whether a failure after the request was sent may be retried
    #[must_use]
    pub const fn retry_after_send(&self) -> bool {
        !matches!(self, Self::NonIdempotent)
    }
}

/// Header names used across the DAV clients
pub mod headers {
    /// Conditional write on a known tag
    pub const IF_MATCH: &str = "If-Match";
    /// Conditional create
    pub const IF_NONE_MATCH: &str = "If-None-Match";
    /// Version token
    pub const ETAG: &str = "ETag";
    /// Body media type
    pub const CONTENT_TYPE: &str = "Content-Type";
    /// WebDAV depth
    pub const DEPTH: &str = "Depth";
    /// Correlation id
    pub const X_REQUEST_ID: &str = "X-Request-Id";
}

/// A request to the DAV server
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DavRequest {
    /// Method
    pub method: DavMethod,
    /// Absolute URL
    pub url: String,
    /// Extra headers (authorization is added by the transport)
    pub headers: Vec<(String, String)>,
    /// Body
    pub body: Option<String>,
    /// Per-call timeout overriding the transport default
    pub timeout: Option<Duration>,
}

impl DavRequest {
    /// Create a request without headers or body
    #[must_use]
    pub fn new(method: DavMethod, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: Vec::new(),
            body: None,
            timeout: None,
        }
    }

    /// Add a header
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Attach a body with its content type
    #[must_use]
    pub fn with_body(mut self, content_type: &str, body: impl Into<String>) -> Self {
        self.headers
            .push((headers::CONTENT_TYPE.to_string(), content_type.to_string()));
        self.body = Some(body.into());
        self
    }

    /// Override the timeout
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Look up a header (case-insensitive)
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        find_header(&self.headers, name)
    }

    /// Retry eligibility derived from the method and conditional headers
    #[must_use]
    pub fn kind(&self) -> RequestKind {
        match self.method {
            DavMethod::Get | DavMethod::Report | DavMethod::Propfind => RequestKind::Idempotent,
            DavMethod::Put | DavMethod::Delete => {
                if self.header(headers::IF_MATCH).is_some()
                    || self.header(headers::IF_NONE_MATCH).is_some()
                {
                    RequestKind::ConditionalWrite
                } else {
                    RequestKind::NonIdempotent
                }
            },
        }
    }
}

/// A response from the DAV server
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DavResponse {
    /// HTTP status code
    pub status: u16,
    /// Response headers
    pub headers: Vec<(String, String)>,
    /// Body text
    pub body: String,
}

impl DavResponse {
    /// Create a response
    #[must_use]
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: body.into(),
        }
    }

    /// Add a header
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Look up a header (case-insensitive)
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        find_header(&self.headers, name)
    }

    /// The `ETag` header, if present
    #[must_use]
    pub fn etag(&self) -> Option<EntityTag> {
        EntityTag::from_header(self.header(headers::ETAG))
    }

    /// Whether the status is 2xx
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.status >= 200 && self.status < 300
    }
}

fn find_header<'a>(headers: &'a [(String, String)], name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(key, _)| key.eq_ignore_ascii_case(name))
        .map(|(_, value)| value.as_str())
}

/// Executes DAV requests against the upstream server
///
/// Returns `Ok` for every response below 500, so callers can interpret 4xx
/// statuses themselves. Exhausted retries, timeouts and 5xx answers surface
/// as [`DavError::Transport`]; an open breaker as [`DavError::CircuitOpen`].
#[async_trait]
pub trait TransportPort: Send + Sync {
    /// Execute a request with the caller's credentials
    async fn execute(
        &self,
        ctx: &RequestContext,
        request: DavRequest,
    ) -> Result<DavResponse, DavError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_are_idempotent() {
        for method in [DavMethod::Get, DavMethod::Report, DavMethod::Propfind] {
            assert_eq!(
                DavRequest::new(method, "http://x").kind(),
                RequestKind::Idempotent
            );
        }
    }

    #[test]
    fn guarded_writes_are_conditional() {
        let put = DavRequest::new(DavMethod::Put, "http://x").with_header("if-match", "\"1\"");
        assert_eq!(put.kind(), RequestKind::ConditionalWrite);

        let create =
            DavRequest::new(DavMethod::Put, "http://x").with_header(headers::IF_NONE_MATCH, "*");
        assert_eq!(create.kind(), RequestKind::ConditionalWrite);
    }

    #[test]
    fn unguarded_writes_are_non_idempotent() {
        let delete = DavRequest::new(DavMethod::Delete, "http://x");
        assert_eq!(delete.kind(), RequestKind::NonIdempotent);
        assert!(!delete.kind().retry_after_send());
    }

    #[test]
    fn with_body_sets_content_type() {
        let req = DavRequest::new(DavMethod::Put, "http://x").with_body("text/calendar", "BEGIN");
        assert_eq!(req.header("content-type"), Some("text/calendar"));
        assert_eq!(req.body.as_deref(), Some("BEGIN"));
    }

    #[test]
    fn response_etag_lookup_is_case_insensitive() {
        let response = DavResponse::new(201, "").with_header("etag", "\"abc\"");
        assert_eq!(response.etag().unwrap().as_str(), "\"abc\"");
        assert!(response.is_success());
        assert!(!DavResponse::new(412, "").is_success());
    }
}
