//! CalDAV client
//!
//! Implements [`CalendarPort`] on top of the resilient transport. Events live
//! at `{collection}/{uid}.ics`; range queries use a calendar-query REPORT.
//! Every create, update and delete is written to the audit trail before the
//! result is returned.

use std::{fmt, sync::Arc};

use application::{
    AuditTrail, CalendarPort, ConditionalHeaders, DavError, DavRequest, DeleteOutcome,
    RequestContext, TransportPort, WriteResult, error_for_status, interpret_delete_result,
    interpret_write_result, prepare_conditional_headers, prepare_create_headers,
    ports::{DavMethod, headers},
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use domain::{
    AuditEntry, AuditOperation, AuditOutcome, EntityKind, EntityTag, Event, TimeRange,
    generate_uid, mask_for_read, validate_uid,
};
use tracing::{debug, info, instrument, warn};

use crate::{config::CalDavConfig, ics, xml};

/// CalDAV implementation of [`CalendarPort`]
pub struct HttpCalDavClient {
    transport: Arc<dyn TransportPort>,
    audit: AuditTrail,
    config: CalDavConfig,
}

impl fmt::Debug for HttpCalDavClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpCalDavClient")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl HttpCalDavClient {
    /// Create a client
    pub fn new(transport: Arc<dyn TransportPort>, audit: AuditTrail, config: CalDavConfig) -> Self {
        Self {
            transport,
            audit,
            config,
        }
    }

    /// Collection addressing in use
    pub const fn config(&self) -> &CalDavConfig {
        &self.config
    }

    /// GET and decode one event, unmasked, with tag and URL filled in
    async fn fetch(
        &self,
        ctx: &RequestContext,
        calendar: Option<&str>,
        uid: &str,
    ) -> Result<Event, DavError> {
        let url = self.config.event_url(ctx.username(), calendar, uid);
        let response = self
            .transport
            .execute(ctx, DavRequest::new(DavMethod::Get, &url))
            .await?;
        if !response.is_success() {
            return Err(error_for_status(EntityKind::Event, uid, &response));
        }

        let mut event = ics::decode_event(&response.body)?;
        event.etag = response.etag();
        event.url = Some(url);
        Ok(event)
    }

    async fn put(
        &self,
        ctx: &RequestContext,
        url: &str,
        event: &Event,
        conditions: &ConditionalHeaders,
    ) -> Result<WriteResult, DavError> {
        let request = conditions.apply(
            DavRequest::new(DavMethod::Put, url)
                .with_body(ics::CONTENT_TYPE, ics::encode_event(event)),
        );
        let response = self.transport.execute(ctx, request).await?;
        interpret_write_result(EntityKind::Event, &event.uid, &response)
    }

    /// Tag of the stored copy, for servers that answer a PUT without `ETag`
    async fn refresh_tag(
        &self,
        ctx: &RequestContext,
        calendar: Option<&str>,
        uid: &str,
    ) -> Option<EntityTag> {
        match self.fetch(ctx, calendar, uid).await {
            Ok(event) => event.etag,
            Err(e) => {
                debug!(uid = %uid, error = %e, "Could not read back tag after write");
                None
            },
        }
    }

    /// Conflict error carrying the server's current copy and tag
    async fn conflict(
        &self,
        ctx: &RequestContext,
        calendar: Option<&str>,
        uid: &str,
        reported_tag: Option<EntityTag>,
    ) -> (DavError, Option<Event>) {
        let latest = match self.fetch(ctx, calendar, uid).await {
            Ok(latest) => Some(latest),
            Err(e) => {
                warn!(uid = %uid, error = %e, "Could not fetch latest version after conflict");
                None
            },
        };
        let err = DavError::Conflict {
            entity: EntityKind::Event,
            uid: uid.to_string(),
            latest_tag: latest
                .as_ref()
                .and_then(|event| event.etag.clone())
                .or(reported_tag),
            latest_payload: latest
                .as_ref()
                .and_then(|event| serde_json::to_value(event).ok()),
        };
        (err, latest)
    }

    async fn audit_failure(
        &self,
        ctx: &RequestContext,
        operation: AuditOperation,
        uid: &str,
        prior_tag: Option<EntityTag>,
        submitted: Option<&Event>,
        err: &DavError,
    ) {
        let mut entry = AuditEntry::new(operation, EntityKind::Event, uid, err.audit_outcome())
            .with_prior_tag(prior_tag)
            .with_error(err.to_string());
        if let Some(event) = submitted {
            entry = entry.with_after(event);
        }
        self.audit.record(ctx, entry).await;
    }
}

/// Current time at whole-second precision, as iCalendar stores it
fn now() -> DateTime<Utc> {
    let now = Utc::now();
    DateTime::from_timestamp(now.timestamp(), 0).unwrap_or(now)
}

#[async_trait]
impl CalendarPort for HttpCalDavClient {
    #[instrument(skip(self, ctx), fields(request_id = %ctx.request_id()))]
    async fn get_event(
        &self,
        ctx: &RequestContext,
        calendar: Option<&str>,
        uid: &str,
        privacy: bool,
    ) -> Result<Event, DavError> {
        validate_uid(uid)?;
        let event = self.fetch(ctx, calendar, uid).await?;
        debug!(uid = %uid, etag = ?event.etag, "Event fetched");
        Ok(mask_for_read(&event, privacy))
    }

    #[instrument(skip(self, ctx), fields(request_id = %ctx.request_id()))]
    async fn list_events(
        &self,
        ctx: &RequestContext,
        calendar: Option<&str>,
        range: &TimeRange,
        privacy: bool,
    ) -> Result<Vec<Event>, DavError> {
        let collection = self.config.collection_url(ctx.username(), calendar);
        let request = DavRequest::new(DavMethod::Report, &collection)
            .with_header(headers::DEPTH, "1")
            .with_body(xml::CONTENT_TYPE, xml::calendar_query(range));
        let response = self.transport.execute(ctx, request).await?;
        if !response.is_success() {
            return Err(error_for_status(EntityKind::Event, &collection, &response));
        }

        let resources = xml::parse_multistatus(&response.body)?;
        debug!(resources = resources.len(), "REPORT response received");

        let mut events: Vec<Event> = resources
            .into_iter()
            .filter_map(|resource| match ics::decode_event(&resource.data) {
                Ok(mut event) => {
                    event.etag = resource.etag;
                    event.url = Some(xml::resolve_href(&collection, &resource.href));
                    Some(event)
                },
                Err(e) => {
                    warn!(href = %resource.href, error = %e, "Skipping undecodable event");
                    None
                },
            })
            .filter(|event| range.overlaps(event.start_utc(), event.end_utc()))
            .collect();

        events.sort_by(|a, b| a.start.cmp_instant(&b.start).then_with(|| a.uid.cmp(&b.uid)));
        Ok(events
            .iter()
            .map(|event| mask_for_read(event, privacy))
            .collect())
    }

    #[instrument(skip(self, ctx, event), fields(request_id = %ctx.request_id(), uid = %event.uid))]
    async fn create_event(
        &self,
        ctx: &RequestContext,
        calendar: Option<&str>,
        event: Event,
    ) -> Result<Event, DavError> {
        let mut event = event.normalized();
        if !event.has_uid() {
            event.uid = generate_uid();
        }
        if let Err(err) = event.validate() {
            let err = DavError::from(err);
            self.audit_failure(ctx, AuditOperation::Create, &event.uid, None, Some(&event), &err)
                .await;
            return Err(err);
        }

        let stamp = now();
        event.created = Some(event.created.unwrap_or(stamp));
        event.last_modified = Some(stamp);
        event.etag = None;
        event.url = None;
        let uid = event.uid.clone();
        let url = self.config.event_url(ctx.username(), calendar, &uid);

        match self.put(ctx, &url, &event, &prepare_create_headers()).await {
            Ok(WriteResult::Applied { new_tag }) => {
                event.etag = match new_tag {
                    Some(tag) => Some(tag),
                    None => self.refresh_tag(ctx, calendar, &uid).await,
                };
                event.url = Some(url);
                info!(uid = %uid, etag = ?event.etag, "Event created");
                let entry =
                    AuditEntry::new(AuditOperation::Create, EntityKind::Event, &uid, AuditOutcome::Applied)
                        .with_new_tag(event.etag.clone())
                        .with_after(&event);
                self.audit.record(ctx, entry).await;
                Ok(event)
            },
            Ok(WriteResult::Conflict { latest_tag }) => {
                warn!(uid = %uid, "Event already exists, create rejected");
                let (err, latest) = self.conflict(ctx, calendar, &uid, latest_tag).await;
                let mut entry =
                    AuditEntry::new(AuditOperation::Create, EntityKind::Event, &uid, AuditOutcome::Conflict)
                        .with_after(&event);
                if let Some(latest) = &latest {
                    entry = entry.with_before(latest);
                }
                self.audit.record(ctx, entry).await;
                Err(err)
            },
            Err(err) => {
                warn!(uid = %uid, error = %err, "Event create failed");
                self.audit_failure(ctx, AuditOperation::Create, &uid, None, Some(&event), &err)
                    .await;
                Err(err)
            },
        }
    }

    #[instrument(skip(self, ctx, event), fields(request_id = %ctx.request_id(), uid = %event.uid))]
    async fn update_event(
        &self,
        ctx: &RequestContext,
        calendar: Option<&str>,
        event: Event,
    ) -> Result<Event, DavError> {
        let mut event = event.normalized();
        let uid = event.uid.clone();
        if let Err(err) = validate_uid(&uid).and_then(|()| event.validate()) {
            let err = DavError::from(err);
            self.audit_failure(ctx, AuditOperation::Update, &uid, event.etag.clone(), Some(&event), &err)
                .await;
            return Err(err);
        }

        let stored = match self.fetch(ctx, calendar, &uid).await {
            Ok(stored) => stored,
            Err(err) => {
                self.audit_failure(ctx, AuditOperation::Update, &uid, event.etag.clone(), Some(&event), &err)
                    .await;
                return Err(err);
            },
        };

        let known_tag = event.etag.clone().or_else(|| stored.etag.clone());
        event.created = event.created.or(stored.created);
        event.last_modified = Some(now());
        let url = self.config.event_url(ctx.username(), calendar, &uid);
        event.url = event.url.take().or_else(|| stored.url.clone());

        let conditions = prepare_conditional_headers(&uid, known_tag.as_ref());
        match self.put(ctx, &url, &event, &conditions).await {
            Ok(WriteResult::Applied { new_tag }) => {
                event.etag = match new_tag {
                    Some(tag) => Some(tag),
                    None => self.refresh_tag(ctx, calendar, &uid).await,
                };
                info!(uid = %uid, etag = ?event.etag, "Event updated");
                let entry =
                    AuditEntry::new(AuditOperation::Update, EntityKind::Event, &uid, AuditOutcome::Applied)
                        .with_prior_tag(known_tag)
                        .with_new_tag(event.etag.clone())
                        .with_before(&stored)
                        .with_after(&event);
                self.audit.record(ctx, entry).await;
                Ok(event)
            },
            Ok(WriteResult::Conflict { latest_tag }) => {
                warn!(uid = %uid, known_tag = ?known_tag, "Event changed on the server, update rejected");
                let (err, latest) = self.conflict(ctx, calendar, &uid, latest_tag).await;
                let mut entry =
                    AuditEntry::new(AuditOperation::Update, EntityKind::Event, &uid, AuditOutcome::Conflict)
                        .with_prior_tag(known_tag)
                        .with_after(&event);
                if let Some(latest) = &latest {
                    entry = entry.with_before(latest);
                }
                self.audit.record(ctx, entry).await;
                Err(err)
            },
            Err(err) => {
                warn!(uid = %uid, error = %err, "Event update failed");
                self.audit_failure(ctx, AuditOperation::Update, &uid, known_tag, Some(&event), &err)
                    .await;
                Err(err)
            },
        }
    }

    #[instrument(skip(self, ctx, known_tag), fields(request_id = %ctx.request_id()))]
    async fn delete_event(
        &self,
        ctx: &RequestContext,
        calendar: Option<&str>,
        uid: &str,
        known_tag: Option<EntityTag>,
    ) -> Result<DeleteOutcome, DavError> {
        if let Err(err) = validate_uid(uid) {
            let err = DavError::from(err);
            self.audit_failure(ctx, AuditOperation::Delete, uid, known_tag, None, &err)
                .await;
            return Err(err);
        }

        let url = self.config.event_url(ctx.username(), calendar, uid);
        let request = prepare_conditional_headers(uid, known_tag.as_ref())
            .apply(DavRequest::new(DavMethod::Delete, &url));
        let result = match self.transport.execute(ctx, request).await {
            Ok(response) => interpret_delete_result(EntityKind::Event, uid, &response),
            Err(err) => Err(err),
        };

        match result {
            Ok(outcome) => {
                let audit_outcome = match outcome {
                    DeleteOutcome::Deleted => {
                        info!(uid = %uid, "Event deleted");
                        AuditOutcome::Applied
                    },
                    DeleteOutcome::NotFound => {
                        debug!(uid = %uid, "Event already absent");
                        AuditOutcome::NotFound
                    },
                };
                let entry = AuditEntry::new(AuditOperation::Delete, EntityKind::Event, uid, audit_outcome)
                    .with_prior_tag(known_tag);
                self.audit.record(ctx, entry).await;
                Ok(outcome)
            },
            Err(DavError::Conflict { latest_tag, .. }) => {
                warn!(uid = %uid, known_tag = ?known_tag, "Event changed on the server, delete rejected");
                let (err, latest) = self.conflict(ctx, calendar, uid, latest_tag).await;
                let mut entry =
                    AuditEntry::new(AuditOperation::Delete, EntityKind::Event, uid, AuditOutcome::Conflict)
                        .with_prior_tag(known_tag);
                if let Some(latest) = &latest {
                    entry = entry.with_before(latest);
                }
                self.audit.record(ctx, entry).await;
                Err(err)
            },
            Err(err) => {
                warn!(uid = %uid, error = %err, "Event delete failed");
                self.audit_failure(ctx, AuditOperation::Delete, uid, known_tag, None, &err)
                    .await;
                Err(err)
            },
        }
    }
}
