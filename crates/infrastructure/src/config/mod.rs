//! Application configuration
//!
//! Split into focused sub-modules:
//! - `dav`: upstream server and collection paths
//! - `transport`: pooling, timeouts, proxy, TLS
//! - `resilience`: circuit breaker, audit log, telemetry
//!
//! Retry settings deserialize straight into [`RetryConfig`].

mod dav;
mod resilience;
mod transport;

use serde::{Deserialize, Serialize};

pub use dav::DavConfig;
pub use resilience::{AuditConfig, CircuitBreakerAppConfig, TelemetryAppConfig};
pub use transport::TransportConfig;

use crate::retry::RetryConfig;

/// Shared default for boolean `true` fields across config structs
pub(crate) const fn default_true() -> bool {
    true
}

/// Prefix of environment overrides, e.g. `DAVBRIDGE_DAV__BASE_URL`
pub const ENV_PREFIX: &str = "DAVBRIDGE";

/// Main application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Upstream server
    #[serde(default)]
    pub dav: DavConfig,

    /// HTTP transport
    #[serde(default)]
    pub transport: TransportConfig,

    /// Retry policy
    #[serde(default)]
    pub retry: RetryConfig,

    /// Per-host circuit breaker
    #[serde(default)]
    pub circuit_breaker: CircuitBreakerAppConfig,

    /// Audit log
    #[serde(default)]
    pub audit: AuditConfig,

    /// Log output
    #[serde(default)]
    pub telemetry: TelemetryAppConfig,
}

impl AppConfig {
    /// Load configuration from `config.toml` (optional) and the environment
    ///
    /// Environment variables use the `DAVBRIDGE_` prefix and `__` between
    /// nesting levels, so `DAVBRIDGE_TRANSPORT__TIMEOUT_SECS=30` sets
    /// `transport.timeout_secs`.
    pub fn load() -> Result<Self, config::ConfigError> {
        Self::base_builder()?
            .add_source(config::File::with_name("config").required(false))
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()
    }

    /// Parse configuration from TOML text on top of the defaults
    pub fn from_toml(text: &str) -> Result<Self, config::ConfigError> {
        Self::base_builder()?
            .add_source(config::File::from_str(text, config::FileFormat::Toml))
            .build()?
            .try_deserialize()
    }

    fn base_builder()
    -> Result<config::ConfigBuilder<config::builder::DefaultState>, config::ConfigError> {
        config::Config::builder()
            .set_default("dav.default_calendar", "personal")?
            .set_default("dav.default_addressbook", "contacts")?
            .set_default("audit.enabled", true)
    }
}
