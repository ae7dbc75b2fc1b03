//! Tracing subscriber setup
//!
//! Installs an `EnvFilter` plus either a human-readable or a JSON `fmt` layer.
//! Output goes to stderr so command output on stdout stays machine-readable.

use tracing::info;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::TelemetryAppConfig;

/// Error type for telemetry initialization
#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    /// Failed to initialize tracing subscriber
    #[error("Failed to initialize tracing: {0}")]
    Init(String),
}

/// Build the filter, letting `RUST_LOG` override the configured directive
fn build_filter(config: &TelemetryAppConfig) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_filter))
}

/// Initialize the global tracing subscriber
///
/// Fails if a global subscriber is already installed.
///
/// # Example
///
/// ```ignore
/// use infrastructure::{config::TelemetryAppConfig, telemetry::init_telemetry};
///
/// init_telemetry(&TelemetryAppConfig::default())?;
/// ```
pub fn init_telemetry(config: &TelemetryAppConfig) -> Result<(), TelemetryError> {
    let env_filter = build_filter(config);

    let json_layer = config.json.then(|| {
        tracing_subscriber::fmt::layer()
            .json()
            .with_current_span(true)
            .with_writer(std::io::stderr)
    });
    let text_layer = (!config.json).then(|| {
        tracing_subscriber::fmt::layer()
            .with_target(true)
            .with_writer(std::io::stderr)
    });

    tracing_subscriber::registry()
        .with(env_filter)
        .with(json_layer)
        .with(text_layer)
        .try_init()
        .map_err(|e| TelemetryError::Init(e.to_string()))?;

    info!(json = config.json, filter = %config.log_filter, "Telemetry initialized");
    Ok(())
}
