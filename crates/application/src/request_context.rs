//! Request context for propagating credentials and request metadata
//!
//! Every DAV operation receives a `RequestContext` explicitly. It carries the
//! Basic credentials forwarded from the inbound request, so no component keeps
//! authentication state of its own.
//!
//! # Examples
//!
//! ```
//! use application::{DavCredentials, RequestContext};
//!
//! let ctx = RequestContext::new(DavCredentials::new("alice", "s3cret"));
//!
//! assert_eq!(ctx.username(), "alice");
//! assert!(!ctx.request_id().is_nil());
//! ```

use std::fmt;

use chrono::{DateTime, Utc};
use secrecy::{ExposeSecret, SecretString};
use uuid::Uuid;

/// Username/password pair forwarded to the DAV server as Basic auth
#[derive(Clone)]
pub struct DavCredentials {
    username: String,
    password: SecretString,
}

impl DavCredentials {
    /// Create credentials
    #[must_use]
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: SecretString::from(password.into()),
        }
    }

    /// Username, also used to build per-user collection paths
    #[must_use]
    pub fn username(&self) -> &str {
        &self.username
    }

    /// Password in clear text, for the Authorization header only
    #[must_use]
    pub fn password(&self) -> &str {
        self.password.expose_secret()
    }
}

impl fmt::Debug for DavCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DavCredentials")
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .finish()
    }
}

/// Context for a single request, carrying credentials and metadata
///
/// - `credentials`: forwarded to the upstream on every call
/// - `request_id`: sent as `X-Request-Id` and written to audit entries
/// - `timestamp`: when the request was received
#[derive(Debug, Clone)]
pub struct RequestContext {
    credentials: DavCredentials,
    request_id: Uuid,
    timestamp: DateTime<Utc>,
}

impl RequestContext {
    /// Create a new request context
    ///
    /// Generates a new random request ID and captures the current timestamp.
    #[must_use]
    pub fn new(credentials: DavCredentials) -> Self {
        Self {
            credentials,
            request_id: Uuid::new_v4(),
            timestamp: Utc::now(),
        }
    }

    /// Create a request context with a specific request ID
    ///
    /// Useful when the request ID is provided by an upstream service
    /// or needs to be correlated with external systems.
    ///
    /// # Examples
    ///
    /// ```
    /// use application::{DavCredentials, RequestContext};
    /// use uuid::Uuid;
    ///
    /// let request_id = Uuid::new_v4();
    /// let ctx = RequestContext::with_request_id(DavCredentials::new("bob", "pw"), request_id);
    /// assert_eq!(ctx.request_id(), request_id);
    /// ```
    #[must_use]
    pub fn with_request_id(credentials: DavCredentials, request_id: Uuid) -> Self {
        Self {
            credentials,
            request_id,
            timestamp: Utc::now(),
        }
    }

    /// Forwarded credentials
    #[must_use]
    pub const fn credentials(&self) -> &DavCredentials {
        &self.credentials
    }

    /// Shorthand for the forwarded username
    #[must_use]
    pub fn username(&self) -> &str {
        self.credentials.username()
    }

    /// Get the unique request identifier
    #[must_use]
    pub const fn request_id(&self) -> Uuid {
        self.request_id
    }

    /// Get the timestamp when the request was received
    #[must_use]
    pub const fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
}
