//! davbridge CLI
//!
//! Runs calendar and contact operations against a CalDAV/CardDAV server and
//! prints the result as JSON.

#![allow(clippy::print_stdout)]

mod commands;

use std::sync::Arc;

use anyhow::{Context, bail};
use application::{AuditTrail, DavCredentials, RequestContext};
use clap::{Parser, Subcommand};
use commands::{ContactCommand, EventCommand};
use infrastructure::{AppConfig, HttpDavTransport, audit_log_from_config, init_telemetry};
use integration_caldav::{CalDavConfig, HttpCalDavClient};
use integration_carddav::{CardDavConfig, HttpCardDavClient};
use tracing::debug;
use uuid::Uuid;

/// davbridge CLI
#[derive(Debug, Parser)]
#[command(name = "davbridge")]
#[command(author, version, about = "CalDAV/CardDAV bridge", long_about = None)]
struct Cli {
    /// Verbosity level (overrides the configured log filter)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Username forwarded to the DAV server
    #[arg(short, long, env = "DAVBRIDGE_USERNAME")]
    user: String,

    /// Password forwarded to the DAV server
    #[arg(short, long, env = "DAVBRIDGE_PASSWORD", hide_env_values = true)]
    password: String,

    /// Server root, overrides `dav.base_url`
    #[arg(long)]
    base_url: Option<String>,

    /// Calendar or address book name (default from configuration)
    #[arg(short, long, global = true)]
    collection: Option<String>,

    /// Correlation id sent as `X-Request-Id`
    #[arg(long)]
    request_id: Option<Uuid>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Calendar events
    #[command(subcommand)]
    Event(EventCommand),

    /// Address book contacts
    #[command(subcommand)]
    Contact(ContactCommand),
}

/// Determine log filter level from verbosity count
const fn log_filter_from_verbosity(verbose: u8) -> Option<&'static str> {
    match verbose {
        0 => None,
        1 => Some("info"),
        2 => Some("debug"),
        _ => Some("trace"),
    }
}

fn load_config(cli: &Cli) -> anyhow::Result<AppConfig> {
    let mut config = AppConfig::load().context("loading configuration")?;
    if let Some(base_url) = &cli.base_url {
        config.dav.base_url.clone_from(base_url);
    }
    if config.dav.base_url.trim().is_empty() {
        bail!("no DAV server configured: set dav.base_url, DAVBRIDGE_DAV__BASE_URL or --base-url");
    }
    if let Some(filter) = log_filter_from_verbosity(cli.verbose) {
        config.telemetry.log_filter = filter.to_string();
    }
    Ok(config)
}

fn request_context(cli: &Cli) -> RequestContext {
    let credentials = DavCredentials::new(cli.user.as_str(), cli.password.as_str());
    match cli.request_id {
        Some(id) => RequestContext::with_request_id(credentials, id),
        None => RequestContext::new(credentials),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = load_config(&cli)?;
    init_telemetry(&config.telemetry)?;

    let transport = Arc::new(HttpDavTransport::from_config(&config)?);
    let audit = AuditTrail::new(audit_log_from_config(&config.audit));
    let ctx = request_context(&cli);
    debug!(request_id = %ctx.request_id(), base_url = %config.dav.base_url, "Running command");

    let collection = cli.collection.as_deref();
    let outcome = match cli.command {
        Commands::Event(command) => {
            let client = HttpCalDavClient::new(
                transport,
                audit,
                CalDavConfig::new(config.dav.calendar_template(), &config.dav.default_calendar),
            );
            commands::run_event(&client, &ctx, collection, command).await?
        },
        Commands::Contact(command) => {
            let client = HttpCardDavClient::new(
                transport,
                audit,
                CardDavConfig::new(
                    config.dav.addressbook_template(),
                    &config.dav.default_addressbook,
                ),
            );
            commands::run_contact(&client, &ctx, collection, command).await?
        },
    };

    match outcome {
        Ok(document) => {
            println!("{}", serde_json::to_string_pretty(&document)?);
            Ok(())
        },
        Err(err) => {
            println!("{}", serde_json::to_string_pretty(&commands::error_body(&err))?);
            std::process::exit(1);
        },
    }
}

#[cfg(test)]
mod tests {
    use std::ffi::OsString;

    use super::*;

    fn parse_args(args: &[&str]) -> Result<Cli, clap::Error> {
        let os_args: Vec<OsString> = args.iter().map(OsString::from).collect();
        Cli::try_parse_from(os_args)
    }

    #[test]
    fn log_filter_verbosity_zero_keeps_config() {
        assert_eq!(log_filter_from_verbosity(0), None);
    }

    #[test]
    fn log_filter_verbosity_levels() {
        assert_eq!(log_filter_from_verbosity(1), Some("info"));
        assert_eq!(log_filter_from_verbosity(2), Some("debug"));
        assert_eq!(log_filter_from_verbosity(3), Some("trace"));
        assert_eq!(log_filter_from_verbosity(10), Some("trace"));
    }

    #[test]
    fn parses_event_get() {
        let cli = parse_args(&[
            "davbridge", "-u", "alice", "-p", "secret", "event", "get", "evt-1", "--privacy",
        ])
        .unwrap();
        assert_eq!(cli.user, "alice");
        let Commands::Event(EventCommand::Get { uid, privacy }) = cli.command else {
            panic!("expected event get");
        };
        assert_eq!(uid, "evt-1");
        assert!(privacy);
    }

    #[test]
    fn parses_event_list_with_collection() {
        let cli = parse_args(&[
            "davbridge", "-u", "alice", "-p", "secret", "event", "list", "--start", "2025-04-01",
            "--end", "2025-05-01", "--collection", "work",
        ])
        .unwrap();
        assert_eq!(cli.collection.as_deref(), Some("work"));
        assert!(matches!(
            cli.command,
            Commands::Event(EventCommand::List { .. })
        ));
    }

    #[test]
    fn parses_event_list_privacy() {
        let cli = parse_args(&[
            "davbridge", "-u", "alice", "-p", "secret", "event", "list", "--start", "2025-04-01",
            "--end", "2025-05-01", "--privacy",
        ])
        .unwrap();
        let Commands::Event(EventCommand::List { privacy, .. }) = cli.command else {
            panic!("expected event list");
        };
        assert!(privacy);
    }

    #[test]
    fn parses_contact_search() {
        let cli = parse_args(&[
            "davbridge", "-u", "alice", "-p", "secret", "contact", "search", "--email", "example.com",
            "--all",
        ])
        .unwrap();
        let Commands::Contact(ContactCommand::Search(args)) = cli.command else {
            panic!("expected contact search");
        };
        assert_eq!(args.email.as_deref(), Some("example.com"));
        assert!(args.all);
    }

    #[test]
    fn parses_delete_with_etag() {
        let cli = parse_args(&[
            "davbridge", "-u", "alice", "-p", "secret", "contact", "delete", "c-1", "--etag",
            "\"t1\"",
        ])
        .unwrap();
        let Commands::Contact(ContactCommand::Delete(args)) = cli.command else {
            panic!("expected contact delete");
        };
        assert_eq!(args.uid, "c-1");
        assert_eq!(args.etag.as_deref(), Some("\"t1\""));
    }

    #[test]
    fn payload_defaults_to_stdin() {
        let cli = parse_args(&["davbridge", "-u", "a", "-p", "b", "event", "create"]).unwrap();
        let Commands::Event(EventCommand::Create(args)) = cli.command else {
            panic!("expected event create");
        };
        assert_eq!(args.file, "-");
    }

    #[test]
    fn request_id_is_forwarded() {
        let id = Uuid::new_v4();
        let cli = parse_args(&[
            "davbridge",
            "-u",
            "alice",
            "-p",
            "secret",
            "--request-id",
            &id.to_string(),
            "contact",
            "list",
        ])
        .unwrap();
        assert_eq!(request_context(&cli).request_id(), id);
        assert_eq!(request_context(&cli).username(), "alice");
    }

    #[test]
    fn missing_subcommand_is_rejected() {
        assert!(parse_args(&["davbridge", "-u", "a", "-p", "b"]).is_err());
    }
}
