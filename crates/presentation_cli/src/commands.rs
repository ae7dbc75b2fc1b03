//! Event and contact subcommands
//!
//! Each command runs one DAV client operation and yields the JSON document
//! printed on stdout.

use std::{io::Read, path::Path};

use anyhow::Context;
use application::{
    CalendarPort, ContactField, ContactPort, ContactSearch, DavError, MatchMode, RequestContext,
};
use clap::{Args, Subcommand};
use domain::{Contact, EntityTag, Event, TimeRange};
use serde::{Serialize, de::DeserializeOwned};
use serde_json::{Value, json};

/// Calendar operations
#[derive(Debug, Subcommand)]
pub enum EventCommand {
    /// Fetch one event
    Get {
        /// Event uid
        uid: String,

        /// Redact description, location and attendees
        #[arg(long)]
        privacy: bool,
    },

    /// List events overlapping a time range
    ///
    /// Accepts RFC 3339, naive ISO-8601 (taken as UTC) or a plain date.
    /// Example: davbridge event list --start 2025-04-01 --end 2025-05-01
    List {
        /// Range start
        #[arg(long)]
        start: String,

        /// Range end (exclusive)
        #[arg(long)]
        end: String,

        /// Redact description, location and attendees of every event
        #[arg(long)]
        privacy: bool,
    },

    /// Create an event from a JSON document
    Create(PayloadArgs),

    /// Replace an event from a JSON document
    ///
    /// The document's `etag` (or the stored one) guards the write.
    Update(PayloadArgs),

    /// Delete an event
    Delete(DeleteArgs),
}

/// Address book operations
#[derive(Debug, Subcommand)]
pub enum ContactCommand {
    /// Fetch one contact
    Get {
        /// Contact uid
        uid: String,

        /// Redact street, city, notes and birthday
        #[arg(long)]
        privacy: bool,
    },

    /// List the whole address book
    List {
        /// Redact street, city, notes and birthday
        #[arg(long)]
        privacy: bool,
    },

    /// Search contacts; values match case-insensitively as substrings
    ///
    /// Example: davbridge contact search --full-name smith --email example.com --all
    Search(SearchArgs),

    /// Create a contact from a JSON document
    Create(PayloadArgs),

    /// Replace a contact from a JSON document
    Update(PayloadArgs),

    /// Delete a contact
    Delete(DeleteArgs),
}

/// JSON payload source
#[derive(Debug, Args)]
pub struct PayloadArgs {
    /// JSON file to read, `-` for stdin
    #[arg(short, long, default_value = "-")]
    pub file: String,
}

/// Arguments of a delete
#[derive(Debug, Args)]
pub struct DeleteArgs {
    /// Resource uid
    pub uid: String,

    /// Only delete if the server still holds this entity tag
    #[arg(long)]
    pub etag: Option<String>,
}

/// Contact search criteria
#[derive(Debug, Default, Args)]
pub struct SearchArgs {
    /// Match the uid
    #[arg(long)]
    pub uid: Option<String>,

    /// Match the display name
    #[arg(long)]
    pub full_name: Option<String>,

    /// Match any email address
    #[arg(long)]
    pub email: Option<String>,

    /// Match any phone number
    #[arg(long)]
    pub phone: Option<String>,

    /// Match any address component
    #[arg(long)]
    pub address: Option<String>,

    /// Match the birthday (`YYYY-MM-DD`)
    #[arg(long)]
    pub birthday: Option<String>,

    /// Match a group
    #[arg(long)]
    pub group: Option<String>,

    /// Require every criterion instead of any
    #[arg(long)]
    pub all: bool,

    /// Redact street, city, notes and birthday
    #[arg(long)]
    pub privacy: bool,
}

impl SearchArgs {
    /// Criteria in field order
    pub fn to_search(&self) -> ContactSearch {
        let mode = if self.all {
            MatchMode::AllOf
        } else {
            MatchMode::AnyOf
        };
        [
            (ContactField::Uid, &self.uid),
            (ContactField::FullName, &self.full_name),
            (ContactField::Email, &self.email),
            (ContactField::Phone, &self.phone),
            (ContactField::Address, &self.address),
            (ContactField::Birthday, &self.birthday),
            (ContactField::Group, &self.group),
        ]
        .into_iter()
        .filter_map(|(field, value)| value.as_ref().map(|value| (field, value)))
        .fold(ContactSearch::new(mode), |search, (field, value)| {
            search.with(field, value.as_str())
        })
    }
}

/// Result of a command: either a document or a typed failure to report
pub type CommandResult = anyhow::Result<Result<Value, DavError>>;

pub async fn run_event(
    port: &dyn CalendarPort,
    ctx: &RequestContext,
    calendar: Option<&str>,
    command: EventCommand,
) -> CommandResult {
    Ok(match command {
        EventCommand::Get { uid, privacy } => {
            to_json(port.get_event(ctx, calendar, &uid, privacy).await)
        },
        EventCommand::List {
            start,
            end,
            privacy,
        } => match TimeRange::parse(&start, &end) {
            Ok(range) => to_json(port.list_events(ctx, calendar, &range, privacy).await),
            Err(e) => Err(DavError::from(e)),
        },
        EventCommand::Create(args) => {
            let event: Event = read_payload(&args.file)?;
            to_json(port.create_event(ctx, calendar, event).await)
        },
        EventCommand::Update(args) => {
            let event: Event = read_payload(&args.file)?;
            to_json(port.update_event(ctx, calendar, event).await)
        },
        EventCommand::Delete(args) => to_json(
            port.delete_event(ctx, calendar, &args.uid, args.etag.map(EntityTag::new))
                .await
                .map(|outcome| json!({ "uid": args.uid, "outcome": outcome })),
        ),
    })
}

pub async fn run_contact(
    port: &dyn ContactPort,
    ctx: &RequestContext,
    addressbook: Option<&str>,
    command: ContactCommand,
) -> CommandResult {
    Ok(match command {
        ContactCommand::Get { uid, privacy } => {
            to_json(port.get_contact(ctx, addressbook, &uid, privacy).await)
        },
        ContactCommand::List { privacy } => {
            to_json(port.list_contacts(ctx, addressbook, privacy).await)
        },
        ContactCommand::Search(args) => to_json(
            port.search_contacts(ctx, addressbook, &args.to_search(), args.privacy)
                .await,
        ),
        ContactCommand::Create(args) => {
            let contact: Contact = read_payload(&args.file)?;
            to_json(port.create_contact(ctx, addressbook, contact).await)
        },
        ContactCommand::Update(args) => {
            let contact: Contact = read_payload(&args.file)?;
            to_json(port.update_contact(ctx, addressbook, contact).await)
        },
        ContactCommand::Delete(args) => to_json(
            port.delete_contact(ctx, addressbook, &args.uid, args.etag.map(EntityTag::new))
                .await
                .map(|outcome| json!({ "uid": args.uid, "outcome": outcome })),
        ),
    })
}

fn to_json<T: Serialize>(result: Result<T, DavError>) -> Result<Value, DavError> {
    result.and_then(|value| {
        serde_json::to_value(value).map_err(|e| DavError::Codec(format!("unserializable result: {e}")))
    })
}

fn read_payload<T: DeserializeOwned>(source: &str) -> anyhow::Result<T> {
    let text = if source == "-" {
        let mut text = String::new();
        std::io::stdin()
            .read_to_string(&mut text)
            .context("reading payload from stdin")?;
        text
    } else {
        std::fs::read_to_string(Path::new(source))
            .with_context(|| format!("reading payload from {source}"))?
    };
    parse_payload(&text)
}

fn parse_payload<T: DeserializeOwned>(text: &str) -> anyhow::Result<T> {
    serde_json::from_str(text).context("payload is not a valid JSON document")
}

/// Error document mirroring what a REST collaborator would answer
pub fn error_body(err: &DavError) -> Value {
    let mut body = json!({
        "error": err.to_string(),
        "status": err.http_status(),
    });
    if let DavError::Conflict {
        latest_tag,
        latest_payload,
        ..
    } = err
    {
        body["latest_tag"] = json!(latest_tag.as_ref().map(EntityTag::as_str));
        body["latest"] = latest_payload.clone().unwrap_or(Value::Null);
    }
    body
}
