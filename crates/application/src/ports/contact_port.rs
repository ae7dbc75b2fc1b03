//! Contact port for application layer
//!
//! Defines the interface for address book operations, implemented by the
//! CardDAV integration.

use async_trait::async_trait;
use domain::{Contact, EntityTag};

use crate::{
    error::DavError,
    request_context::RequestContext,
    services::{ContactSearch, DeleteOutcome},
};

/// Contact port trait
///
/// `addressbook` selects a collection of the requesting user; `None` means
/// the configured default address book.
#[async_trait]
pub trait ContactPort: Send + Sync {
    /// Fetch one contact, optionally redacted
    async fn get_contact(
        &self,
        ctx: &RequestContext,
        addressbook: Option<&str>,
        uid: &str,
        privacy: bool,
    ) -> Result<Contact, DavError>;

    /// Every contact in the address book, ordered by name then uid
    async fn list_contacts(
        &self,
        ctx: &RequestContext,
        addressbook: Option<&str>,
        privacy: bool,
    ) -> Result<Vec<Contact>, DavError>;

    /// Contacts matching the search, ordered by name then uid
    async fn search_contacts(
        &self,
        ctx: &RequestContext,
        addressbook: Option<&str>,
        search: &ContactSearch,
        privacy: bool,
    ) -> Result<Vec<Contact>, DavError>;

    /// Create a contact, assigning a uid when it has none
    async fn create_contact(
        &self,
        ctx: &RequestContext,
        addressbook: Option<&str>,
        contact: Contact,
    ) -> Result<Contact, DavError>;

    /// Replace a contact, conditional on `contact.etag` or the stored tag
    async fn update_contact(
        &self,
        ctx: &RequestContext,
        addressbook: Option<&str>,
        contact: Contact,
    ) -> Result<Contact, DavError>;

    /// Delete a contact; an absent uid is reported, not raised
    async fn delete_contact(
        &self,
        ctx: &RequestContext,
        addressbook: Option<&str>,
        uid: &str,
        known_tag: Option<EntityTag>,
    ) -> Result<DeleteOutcome, DavError>;
}
