//! CardDAV client
//!
//! Implements [`ContactPort`]. Contacts live at `{addressbook}/{uid}.vcf`;
//! listing and searching use an addressbook-query REPORT. Search results are
//! re-checked locally because servers differ in how strictly they apply
//! text-match filters.

use std::{fmt, sync::Arc};

use application::{
    AuditTrail, ConditionalHeaders, ContactPort, ContactSearch, DavError, DavRequest,
    DeleteOutcome, RequestContext, TransportPort, WriteResult, error_for_status,
    interpret_delete_result, interpret_write_result, prepare_conditional_headers,
    prepare_create_headers,
    ports::{DavMethod, headers},
};
use async_trait::async_trait;
use domain::{
    AuditEntry, AuditOperation, AuditOutcome, Contact, EntityKind, EntityTag, generate_uid,
    mask_contact, validate_uid,
};
use tracing::{debug, info, instrument, warn};

use crate::{config::CardDavConfig, vcard, xml};

/// CardDAV implementation of [`ContactPort`]
pub struct HttpCardDavClient {
    transport: Arc<dyn TransportPort>,
    audit: AuditTrail,
    config: CardDavConfig,
}

impl fmt::Debug for HttpCardDavClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpCardDavClient")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl HttpCardDavClient {
    pub fn new(
        transport: Arc<dyn TransportPort>,
        audit: AuditTrail,
        config: CardDavConfig,
    ) -> Self {
        Self {
            transport,
            audit,
            config,
        }
    }

    /// Address book addressing in use
    pub const fn config(&self) -> &CardDavConfig {
        &self.config
    }

    async fn fetch(
        &self,
        ctx: &RequestContext,
        addressbook: Option<&str>,
        uid: &str,
    ) -> Result<Contact, DavError> {
        let url = self.config.contact_url(ctx.username(), addressbook, uid);
        let response = self
            .transport
            .execute(ctx, DavRequest::new(DavMethod::Get, &url))
            .await?;
        if !response.is_success() {
            return Err(error_for_status(EntityKind::Contact, uid, &response));
        }

        let mut contact = vcard::decode_contact(&response.body)?;
        contact.etag = response.etag();
        contact.url = Some(url);
        Ok(contact)
    }

    /// Run an addressbook-query and decode every card, sorted by name then uid
    async fn query(
        &self,
        ctx: &RequestContext,
        addressbook: Option<&str>,
        search: Option<&ContactSearch>,
    ) -> Result<Vec<Contact>, DavError> {
        let url = self.config.addressbook_url(ctx.username(), addressbook);
        let request = DavRequest::new(DavMethod::Report, &url)
            .with_header(headers::DEPTH, "1")
            .with_body(xml::CONTENT_TYPE, xml::addressbook_query(search));
        let response = self.transport.execute(ctx, request).await?;
        if !response.is_success() {
            return Err(error_for_status(EntityKind::Contact, &url, &response));
        }

        let resources = xml::parse_multistatus(&response.body)?;
        debug!(resources = resources.len(), "REPORT response received");

        let mut contacts: Vec<Contact> = resources
            .into_iter()
            .filter_map(|resource| match vcard::decode_contact(&resource.data) {
                Ok(mut contact) => {
                    contact.etag = resource.etag;
                    contact.url = Some(xml::resolve_href(&url, &resource.href));
                    Some(contact)
                },
                Err(e) => {
                    warn!(href = %resource.href, error = %e, "Skipping undecodable contact");
                    None
                },
            })
            .collect();
        contacts.sort_by(|a, b| {
            a.full_name
                .to_lowercase()
                .cmp(&b.full_name.to_lowercase())
                .then_with(|| a.uid.cmp(&b.uid))
        });
        Ok(contacts)
    }

    async fn put(
        &self,
        ctx: &RequestContext,
        url: &str,
        contact: &Contact,
        conditions: &ConditionalHeaders,
    ) -> Result<WriteResult, DavError> {
        let request = conditions.apply(
            DavRequest::new(DavMethod::Put, url)
                .with_body(vcard::CONTENT_TYPE, vcard::encode_contact(contact)),
        );
        let response = self.transport.execute(ctx, request).await?;
        interpret_write_result(EntityKind::Contact, &contact.uid, &response)
    }

    async fn refresh_tag(
        &self,
        ctx: &RequestContext,
        addressbook: Option<&str>,
        uid: &str,
    ) -> Option<EntityTag> {
        match self.fetch(ctx, addressbook, uid).await {
            Ok(contact) => contact.etag,
            Err(e) => {
                debug!(uid = %uid, error = %e, "Could not read back tag after write");
                None
            },
        }
    }

    async fn conflict(
        &self,
        ctx: &RequestContext,
        addressbook: Option<&str>,
        uid: &str,
        reported_tag: Option<EntityTag>,
    ) -> (DavError, Option<Contact>) {
        let latest = match self.fetch(ctx, addressbook, uid).await {
            Ok(latest) => Some(latest),
            Err(e) => {
                warn!(uid = %uid, error = %e, "Could not fetch latest version after conflict");
                None
            },
        };
        let err = DavError::Conflict {
            entity: EntityKind::Contact,
            uid: uid.to_string(),
            latest_tag: latest
                .as_ref()
                .and_then(|contact| contact.etag.clone())
                .or(reported_tag),
            latest_payload: latest
                .as_ref()
                .and_then(|contact| serde_json::to_value(contact).ok()),
        };
        (err, latest)
    }

    async fn audit_failure(
        &self,
        ctx: &RequestContext,
        operation: AuditOperation,
        uid: &str,
        prior_tag: Option<EntityTag>,
        submitted: Option<&Contact>,
        err: &DavError,
    ) {
        let mut entry = AuditEntry::new(operation, EntityKind::Contact, uid, err.audit_outcome())
            .with_prior_tag(prior_tag)
            .with_error(err.to_string());
        if let Some(contact) = submitted {
            entry = entry.with_after(contact);
        }
        self.audit.record(ctx, entry).await;
    }
}

/// Audit entry for a rejected write, carrying the server's copy when known
fn conflict_entry(
    operation: AuditOperation,
    uid: &str,
    prior_tag: Option<EntityTag>,
    latest: Option<&Contact>,
) -> AuditEntry {
    let entry = AuditEntry::new(operation, EntityKind::Contact, uid, AuditOutcome::Conflict)
        .with_prior_tag(prior_tag);
    match latest {
        Some(latest) => entry.with_before(latest),
        None => entry,
    }
}

fn masked(contacts: Vec<Contact>, privacy: bool) -> Vec<Contact> {
    if privacy {
        contacts.iter().map(mask_contact).collect()
    } else {
        contacts
    }
}

#[async_trait]
impl ContactPort for HttpCardDavClient {
    #[instrument(skip(self, ctx), fields(request_id = %ctx.request_id()))]
    async fn get_contact(
        &self,
        ctx: &RequestContext,
        addressbook: Option<&str>,
        uid: &str,
        privacy: bool,
    ) -> Result<Contact, DavError> {
        validate_uid(uid)?;
        let contact = self.fetch(ctx, addressbook, uid).await?;
        Ok(if privacy {
            mask_contact(&contact)
        } else {
            contact
        })
    }

    #[instrument(skip(self, ctx), fields(request_id = %ctx.request_id()))]
    async fn list_contacts(
        &self,
        ctx: &RequestContext,
        addressbook: Option<&str>,
        privacy: bool,
    ) -> Result<Vec<Contact>, DavError> {
        let contacts = self.query(ctx, addressbook, None).await?;
        Ok(masked(contacts, privacy))
    }

    #[instrument(skip(self, ctx, search), fields(request_id = %ctx.request_id(), mode = search.mode.as_str()))]
    async fn search_contacts(
        &self,
        ctx: &RequestContext,
        addressbook: Option<&str>,
        search: &ContactSearch,
        privacy: bool,
    ) -> Result<Vec<Contact>, DavError> {
        search.validate()?;
        let candidates = self.query(ctx, addressbook, Some(search)).await?;
        let total = candidates.len();
        let matches: Vec<Contact> = candidates
            .into_iter()
            .filter(|contact| search.matches(contact))
            .collect();
        if matches.len() < total {
            debug!(
                returned = total,
                kept = matches.len(),
                "Dropped server results not matching the search"
            );
        }
        Ok(masked(matches, privacy))
    }

    #[instrument(skip(self, ctx, contact), fields(request_id = %ctx.request_id(), uid = %contact.uid))]
    async fn create_contact(
        &self,
        ctx: &RequestContext,
        addressbook: Option<&str>,
        contact: Contact,
    ) -> Result<Contact, DavError> {
        let mut contact = contact.normalized();
        if !contact.has_uid() {
            contact.uid = generate_uid();
        }
        let uid = contact.uid.clone();
        if let Err(err) = contact.validate() {
            let err = DavError::from(err);
            self.audit_failure(ctx, AuditOperation::Create, &uid, None, Some(&contact), &err)
                .await;
            return Err(err);
        }

        contact.etag = None;
        let url = self.config.contact_url(ctx.username(), addressbook, &uid);
        contact.url = None;

        match self.put(ctx, &url, &contact, &prepare_create_headers()).await {
            Ok(WriteResult::Applied { new_tag }) => {
                contact.etag = match new_tag {
                    Some(tag) => Some(tag),
                    None => self.refresh_tag(ctx, addressbook, &uid).await,
                };
                contact.url = Some(url);
                info!(uid = %uid, etag = ?contact.etag, "Contact created");
                let entry = AuditEntry::new(
                    AuditOperation::Create,
                    EntityKind::Contact,
                    &uid,
                    AuditOutcome::Applied,
                )
                .with_new_tag(contact.etag.clone())
                .with_after(&contact);
                self.audit.record(ctx, entry).await;
                Ok(contact)
            },
            Ok(WriteResult::Conflict { latest_tag }) => {
                warn!(uid = %uid, "Contact already exists, create rejected");
                let (err, latest) = self.conflict(ctx, addressbook, &uid, latest_tag).await;
                let entry = conflict_entry(AuditOperation::Create, &uid, None, latest.as_ref())
                    .with_after(&contact);
                self.audit.record(ctx, entry).await;
                Err(err)
            },
            Err(err) => {
                warn!(uid = %uid, error = %err, "Contact create failed");
                self.audit_failure(ctx, AuditOperation::Create, &uid, None, Some(&contact), &err)
                    .await;
                Err(err)
            },
        }
    }

    #[instrument(skip(self, ctx, contact), fields(request_id = %ctx.request_id(), uid = %contact.uid))]
    async fn update_contact(
        &self,
        ctx: &RequestContext,
        addressbook: Option<&str>,
        contact: Contact,
    ) -> Result<Contact, DavError> {
        let mut contact = contact.normalized();
        let uid = contact.uid.clone();
        if let Err(err) = validate_uid(&uid).and_then(|()| contact.validate()) {
            let err = DavError::from(err);
            self.audit_failure(ctx, AuditOperation::Update, &uid, contact.etag.clone(), Some(&contact), &err)
                .await;
            return Err(err);
        }

        let stored = match self.fetch(ctx, addressbook, &uid).await {
            Ok(stored) => stored,
            Err(err) => {
                self.audit_failure(ctx, AuditOperation::Update, &uid, contact.etag.clone(), Some(&contact), &err)
                    .await;
                return Err(err);
            },
        };

        let known_tag = contact.etag.clone().or_else(|| stored.etag.clone());
        let url = self.config.contact_url(ctx.username(), addressbook, &uid);
        contact.url = contact.url.take().or_else(|| stored.url.clone());

        let conditions = prepare_conditional_headers(&uid, known_tag.as_ref());
        match self.put(ctx, &url, &contact, &conditions).await {
            Ok(WriteResult::Applied { new_tag }) => {
                contact.etag = match new_tag {
                    Some(tag) => Some(tag),
                    None => self.refresh_tag(ctx, addressbook, &uid).await,
                };
                info!(uid = %uid, etag = ?contact.etag, "Contact updated");
                let entry = AuditEntry::new(
                    AuditOperation::Update,
                    EntityKind::Contact,
                    &uid,
                    AuditOutcome::Applied,
                )
                .with_prior_tag(known_tag)
                .with_new_tag(contact.etag.clone())
                .with_before(&stored)
                .with_after(&contact);
                self.audit.record(ctx, entry).await;
                Ok(contact)
            },
            Ok(WriteResult::Conflict { latest_tag }) => {
                warn!(uid = %uid, known_tag = ?known_tag, "Contact changed on the server, update rejected");
                let (err, latest) = self.conflict(ctx, addressbook, &uid, latest_tag).await;
                let entry = conflict_entry(AuditOperation::Update, &uid, known_tag, latest.as_ref())
                    .with_after(&contact);
                self.audit.record(ctx, entry).await;
                Err(err)
            },
            Err(err) => {
                warn!(uid = %uid, error = %err, "Contact update failed");
                self.audit_failure(ctx, AuditOperation::Update, &uid, known_tag, Some(&contact), &err)
                    .await;
                Err(err)
            },
        }
    }

    #[instrument(skip(self, ctx, known_tag), fields(request_id = %ctx.request_id()))]
    async fn delete_contact(
        &self,
        ctx: &RequestContext,
        addressbook: Option<&str>,
        uid: &str,
        known_tag: Option<EntityTag>,
    ) -> Result<DeleteOutcome, DavError> {
        if let Err(err) = validate_uid(uid) {
            let err = DavError::from(err);
            self.audit_failure(ctx, AuditOperation::Delete, uid, known_tag, None, &err)
                .await;
            return Err(err);
        }

        let url = self.config.contact_url(ctx.username(), addressbook, uid);
        let request = prepare_conditional_headers(uid, known_tag.as_ref())
            .apply(DavRequest::new(DavMethod::Delete, &url));
        let result = match self.transport.execute(ctx, request).await {
            Ok(response) => interpret_delete_result(EntityKind::Contact, uid, &response),
            Err(err) => Err(err),
        };

        match result {
            Ok(outcome) => {
                let audit_outcome = if outcome == DeleteOutcome::Deleted {
                    info!(uid = %uid, "Contact deleted");
                    AuditOutcome::Applied
                } else {
                    debug!(uid = %uid, "Contact already absent");
                    AuditOutcome::NotFound
                };
                let entry =
                    AuditEntry::new(AuditOperation::Delete, EntityKind::Contact, uid, audit_outcome)
                        .with_prior_tag(known_tag);
                self.audit.record(ctx, entry).await;
                Ok(outcome)
            },
            Err(DavError::Conflict { latest_tag, .. }) => {
                warn!(uid = %uid, known_tag = ?known_tag, "Contact changed on the server, delete rejected");
                let (err, latest) = self.conflict(ctx, addressbook, uid, latest_tag).await;
                let entry = conflict_entry(AuditOperation::Delete, uid, known_tag, latest.as_ref());
                self.audit.record(ctx, entry).await;
                Err(err)
            },
            Err(err) => {
                warn!(uid = %uid, error = %err, "Contact delete failed");
                self.audit_failure(ctx, AuditOperation::Delete, uid, known_tag, None, &err)
                    .await;
                Err(err)
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use application::{AuditLogPort, ContactField, DavCredentials, DavResponse, MatchMode};
    use domain::REDACTION_MARKER;

    use super::*;

    struct ScriptedTransport {
        responses: Mutex<Vec<DavResponse>>,
        requests: Mutex<Vec<DavRequest>>,
    }

    impl ScriptedTransport {
        fn new(responses: Vec<DavResponse>) -> Arc<Self> {
            Arc::new(Self {
                responses: Mutex::new(responses.into_iter().rev().collect()),
                requests: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl TransportPort for ScriptedTransport {
        async fn execute(
            &self,
            _ctx: &RequestContext,
            request: DavRequest,
        ) -> Result<DavResponse, DavError> {
            self.requests.lock().unwrap().push(request);
            Ok(self
                .responses
                .lock()
                .unwrap()
                .pop()
                .unwrap_or_else(|| DavResponse::new(500, "unscripted")))
        }
    }

    #[derive(Default)]
    struct MemoryAudit(Mutex<Vec<AuditEntry>>);

    #[async_trait]
    impl AuditLogPort for MemoryAudit {
        async fn record(&self, entry: AuditEntry) {
            self.0.lock().unwrap().push(entry);
        }
    }

    fn client(transport: Arc<ScriptedTransport>, audit: Arc<MemoryAudit>) -> HttpCardDavClient {
        HttpCardDavClient::new(
            transport,
            AuditTrail::new(audit),
            CardDavConfig::new("http://dav.test/ab/{user}/{collection}/", "contacts"),
        )
    }

    fn ctx() -> RequestContext {
        RequestContext::new(DavCredentials::new("alice", "secret"))
    }

    fn card(uid: &str, name: &str, email: &str) -> String {
        vcard::encode_contact(&Contact::new(name).with_uid(uid).with_email(email, None))
    }

    fn report(cards: &[String]) -> DavResponse {
        let mut body = String::from(r#"<d:multistatus xmlns:d="DAV:" xmlns:c="urn:ietf:params:xml:ns:carddav">"#);
        for (i, data) in cards.iter().enumerate() {
            body.push_str(&format!(
                "<d:response><d:href>c{i}.vcf</d:href><d:propstat><d:prop><d:getetag>\"{i}\"</d:getetag><c:address-data>{data}</c:address-data></d:prop></d:propstat></d:response>"
            ));
        }
        body.push_str("</d:multistatus>");
        DavResponse::new(207, body)
    }

    #[tokio::test]
    async fn search_drops_results_the_server_should_have_filtered() {
        let transport = ScriptedTransport::new(vec![report(&[
            card("c1", "Bob", "bob@example.com"),
            card("c2", "Alice", "alice@example.com"),
        ])]);
        let client = client(Arc::clone(&transport), Arc::new(MemoryAudit::default()));

        let search = ContactSearch::new(MatchMode::AnyOf).with(ContactField::FullName, "ali");
        let found = client
            .search_contacts(&ctx(), None, &search, false)
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].uid, "c2");

        let requests = transport.requests.lock().unwrap();
        assert_eq!(requests[0].method, DavMethod::Report);
        assert!(requests[0].body.as_deref().unwrap().contains(r#"<C:prop-filter name="FN">"#));
    }

    #[tokio::test]
    async fn empty_search_is_rejected_without_a_request() {
        let transport = ScriptedTransport::new(vec![]);
        let client = client(Arc::clone(&transport), Arc::new(MemoryAudit::default()));

        let err = client
            .search_contacts(&ctx(), None, &ContactSearch::default(), false)
            .await
            .unwrap_err();
        assert!(matches!(err, DavError::ValidationFailure(_)));
        assert!(transport.requests.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn list_sorts_by_name_then_uid() {
        let transport = ScriptedTransport::new(vec![report(&[
            card("z", "carol", "c@example.com"),
            card("b", "Bob", "b2@example.com"),
            card("a", "bob", "b1@example.com"),
        ])]);
        let client = client(transport, Arc::new(MemoryAudit::default()));

        let contacts = client.list_contacts(&ctx(), None, false).await.unwrap();
        let uids: Vec<_> = contacts.iter().map(|c| c.uid.as_str()).collect();
        assert_eq!(uids, vec!["a", "b", "z"]);
        assert_eq!(
            contacts[0].url.as_deref(),
            Some("http://dav.test/ab/alice/contacts/c2.vcf")
        );
    }

    #[tokio::test]
    async fn private_read_masks_notes() {
        let stored = Contact::new("Alice")
            .with_uid("c1")
            .with_notes("Allergic to peanuts");
        let transport = ScriptedTransport::new(vec![
            DavResponse::new(200, vcard::encode_contact(&stored)).with_header("ETag", "\"1\""),
        ]);
        let client = client(transport, Arc::new(MemoryAudit::default()));

        let contact = client.get_contact(&ctx(), None, "c1", true).await.unwrap();
        assert_eq!(contact.notes.as_deref(), Some(REDACTION_MARKER));
        assert_eq!(contact.full_name, "Alice");
    }

    #[tokio::test]
    async fn create_with_bad_email_is_audited_as_failed() {
        let transport = ScriptedTransport::new(vec![]);
        let audit = Arc::new(MemoryAudit::default());
        let client = client(Arc::clone(&transport), Arc::clone(&audit));

        let err = client
            .create_contact(&ctx(), None, Contact::new("Bob").with_email("not-an-email", None))
            .await
            .unwrap_err();
        assert!(matches!(err, DavError::ValidationFailure(_)));
        assert!(transport.requests.lock().unwrap().is_empty());
        assert_eq!(audit.0.lock().unwrap()[0].outcome, AuditOutcome::Failed);
    }
}
