//! Application-level errors

use std::fmt;

use domain::{AuditOutcome, DomainError, EntityKind, EntityTag};
use serde::de::DeserializeOwned;
use thiserror::Error;

/// Why a request never produced a usable response
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportFailure {
    /// Connection could not be established; the request was not sent
    Connect,
    /// The call exceeded its deadline
    Timeout,
    /// The upstream answered with a server error status
    Status(u16),
    /// Anything else (TLS, body read, redirect loop)
    Other,
}

impl fmt::Display for TransportFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Connect => write!(f, "connect"),
            Self::Timeout => write!(f, "timeout"),
            Self::Status(status) => write!(f, "status {status}"),
            Self::Other => write!(f, "other"),
        }
    }
}

/// Errors surfaced by the DAV integration layer
#[derive(Debug, Error)]
pub enum DavError {
    /// Credentials missing or rejected by the upstream
    #[error("Authentication failed")]
    AuthenticationFailure,

    /// Malformed payload or parameters; no upstream call was made
    #[error("Validation failed: {0}")]
    ValidationFailure(String),

    /// Resource does not exist
    #[error("{entity} not found: {uid}")]
    NotFound { entity: EntityKind, uid: String },

    /// Precondition failed: the resource changed since the caller read it
    #[error("Conflict on {entity} '{uid}': resource was modified on the server")]
    Conflict {
        entity: EntityKind,
        uid: String,
        latest_tag: Option<EntityTag>,
        latest_payload: Option<serde_json::Value>,
    },

    /// Network failure, timeout or upstream server error
    #[error("Transport error ({kind}): {message}")]
    Transport {
        kind: TransportFailure,
        message: String,
    },

    /// The upstream host is judged unhealthy; nothing was sent
    #[error("Circuit breaker open for host '{host}': service is temporarily unavailable")]
    CircuitOpen { host: String },

    /// A wire document could not be mapped onto the data model
    #[error("Codec error: {0}")]
    Codec(String),
}

impl From<DomainError> for DavError {
    fn from(err: DomainError) -> Self {
        Self::ValidationFailure(err.to_string())
    }
}

impl DavError {
    /// Create a not found error
    pub fn not_found(entity: EntityKind, uid: impl Into<String>) -> Self {
        Self::NotFound {
            entity,
            uid: uid.into(),
        }
    }

    /// Create a transport error
    pub fn transport(kind: TransportFailure, message: impl Into<String>) -> Self {
        Self::Transport {
            kind,
            message: message.into(),
        }
    }

    /// Whether retrying the same request may succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Transport { kind, .. } => match kind {
                TransportFailure::Connect | TransportFailure::Timeout => true,
                TransportFailure::Status(status) => matches!(status, 502..=504),
                TransportFailure::Other => false,
            },
            _ => false,
        }
    }

    /// Whether the failure happened before any byte reached the upstream
    pub const fn is_pre_send(&self) -> bool {
        matches!(
            self,
            Self::Transport {
                kind: TransportFailure::Connect,
                ..
            }
        )
    }

    /// Whether this is a conflict
    pub const fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }

    /// Whether this is a not found error
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Decode the upstream's current representation carried by a conflict
    pub fn conflict_payload<T: DeserializeOwned>(&self) -> Option<T> {
        match self {
            Self::Conflict {
                latest_payload: Some(payload),
                ..
            } => serde_json::from_value(payload.clone()).ok(),
            _ => None,
        }
    }

    /// Tag of the upstream's current representation carried by a conflict
    pub const fn conflict_tag(&self) -> Option<&EntityTag> {
        match self {
            Self::Conflict { latest_tag, .. } => latest_tag.as_ref(),
            _ => None,
        }
    }

    /// HTTP status a REST layer should answer with
    pub const fn http_status(&self) -> u16 {
        match self {
            Self::AuthenticationFailure => 401,
            Self::ValidationFailure(_) => 422,
            Self::NotFound { .. } => 404,
            Self::Conflict { .. } => 412,
            Self::Transport { .. } | Self::CircuitOpen { .. } => 503,
            Self::Codec(_) => 502,
        }
    }

    /// Outcome recorded in the audit log for a mutation failing with this error
    pub const fn audit_outcome(&self) -> AuditOutcome {
        match self {
            Self::Conflict { .. } => AuditOutcome::Conflict,
            Self::NotFound { .. } => AuditOutcome::NotFound,
            _ => AuditOutcome::Failed,
        }
    }
}
