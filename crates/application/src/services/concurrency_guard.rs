//! Optimistic concurrency for DAV writes
//!
//! Builds the conditional headers for a write and turns the server's answer
//! into either an applied change or a conflict. Nothing is cached between
//! calls; the tag a write is conditioned on is always the one the caller holds.

use domain::{ConditionalWriteContext, EntityKind, EntityTag};
use serde::Serialize;
use tracing::debug;

use crate::{
    error::{DavError, TransportFailure},
    ports::{DavRequest, DavResponse, headers},
};

/// Conditional headers for one write attempt
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConditionalHeaders {
    /// `If-Match` value
    pub if_match: Option<String>,
    /// `If-None-Match` value
    pub if_none_match: Option<String>,
}

impl ConditionalHeaders {
    /// Whether the write is unconditional
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.if_match.is_none() && self.if_none_match.is_none()
    }

    /// Attach the headers to a request
    #[must_use]
    pub fn apply(&self, mut request: DavRequest) -> DavRequest {
        if let Some(tag) = &self.if_match {
            request = request.with_header(headers::IF_MATCH, tag.clone());
        }
        if let Some(value) = &self.if_none_match {
            request = request.with_header(headers::IF_NONE_MATCH, value.clone());
        }
        request
    }
}

/// Headers for replacing or deleting `uid` given the last tag the caller saw
///
/// With no known tag the write goes out unconditionally.
#[must_use]
pub fn prepare_conditional_headers(uid: &str, known_tag: Option<&EntityTag>) -> ConditionalHeaders {
    let if_match = known_tag.map(EntityTag::header_value);
    debug!(uid = %uid, if_match = ?if_match, "Prepared conditional headers");
    ConditionalHeaders {
        if_match,
        if_none_match: None,
    }
}

/// Headers for the write described by a [`ConditionalWriteContext`]
#[must_use]
pub fn headers_for_context(context: &ConditionalWriteContext) -> ConditionalHeaders {
    prepare_conditional_headers(context.uid(), context.known_tag())
}

/// Headers for a create: only succeed if nothing exists under the uid yet
///
/// Concurrent creates of one uid resolve first-writer-wins; the loser sees a
/// precondition failure.
#[must_use]
pub fn prepare_create_headers() -> ConditionalHeaders {
    ConditionalHeaders {
        if_match: None,
        if_none_match: Some("*".to_string()),
    }
}

/// Result of a conditional write
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteResult {
    /// The server accepted the write
    Applied {
        /// Tag of the new representation, when the server returned one
        new_tag: Option<EntityTag>,
    },
    /// The precondition failed
    Conflict {
        /// Current tag, if the server sent one with the 412
        latest_tag: Option<EntityTag>,
    },
}

/// Outcome of a delete
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DeleteOutcome {
    /// The resource was removed
    Deleted,
    /// There was nothing to remove
    NotFound,
}

/// Interpret the response to a PUT
pub fn interpret_write_result(
    entity: EntityKind,
    uid: &str,
    response: &DavResponse,
) -> Result<WriteResult, DavError> {
    if response.is_success() {
        return Ok(WriteResult::Applied {
            new_tag: response.etag(),
        });
    }
    if response.status == 412 {
        return Ok(WriteResult::Conflict {
            latest_tag: response.etag(),
        });
    }
    Err(error_for_status(entity, uid, response))
}

/// Interpret the response to a DELETE
pub fn interpret_delete_result(
    entity: EntityKind,
    uid: &str,
    response: &DavResponse,
) -> Result<DeleteOutcome, DavError> {
    match response.status {
        status if (200..300).contains(&status) => Ok(DeleteOutcome::Deleted),
        404 | 410 => Ok(DeleteOutcome::NotFound),
        _ => Err(error_for_status(entity, uid, response)),
    }
}

/// Map a non-success status onto the error taxonomy
#[must_use]
pub fn error_for_status(entity: EntityKind, uid: &str, response: &DavResponse) -> DavError {
    match response.status {
        401 | 403 => DavError::AuthenticationFailure,
        404 | 410 => DavError::not_found(entity, uid),
        412 => DavError::Conflict {
            entity,
            uid: uid.to_string(),
            latest_tag: response.etag(),
            latest_payload: None,
        },
        status if status >= 500 => DavError::transport(
            TransportFailure::Status(status),
            format!("upstream answered {status}"),
        ),
        status => DavError::ValidationFailure(format!(
            "server rejected {entity} '{uid}' with status {status}: {}",
            response.body.trim().chars().take(200).collect::<String>()
        )),
    }
}
