//! Resilience and observability settings: circuit breaker, audit log, telemetry.

use std::{path::PathBuf, time::Duration};

use serde::{Deserialize, Serialize};

use super::default_true;
use crate::adapters::CircuitBreakerConfig;

// ==============================
// Circuit Breaker Configuration
// ==============================

/// Per-host circuit breaker settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CircuitBreakerAppConfig {
    /// Consecutive failures that open the circuit (default: 5)
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,

    /// Cooldown before a probe is admitted, in seconds (default: 30)
    #[serde(default = "default_half_open_timeout")]
    pub half_open_timeout_secs: u64,
}

const fn default_failure_threshold() -> u32 {
    5
}

const fn default_half_open_timeout() -> u64 {
    30
}

impl Default for CircuitBreakerAppConfig {
    fn default() -> Self {
        Self {
            failure_threshold: default_failure_threshold(),
            half_open_timeout_secs: default_half_open_timeout(),
        }
    }
}

impl From<&CircuitBreakerAppConfig> for CircuitBreakerConfig {
    fn from(config: &CircuitBreakerAppConfig) -> Self {
        Self::custom(
            config.failure_threshold,
            Duration::from_secs(config.half_open_timeout_secs),
        )
    }
}

// ==============================
// Audit Configuration
// ==============================

/// Audit log sink
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditConfig {
    /// Write audit entries (default: true)
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// JSONL file entries are appended to
    #[serde(default = "default_audit_path")]
    pub path: PathBuf,
}

fn default_audit_path() -> PathBuf {
    PathBuf::from("logs/audit.log")
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            path: default_audit_path(),
        }
    }
}

// ==============================
// Telemetry Configuration
// ==============================

/// Log output settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryAppConfig {
    /// Filter directive used when `RUST_LOG` is unset
    #[serde(default = "default_log_filter")]
    pub log_filter: String,

    /// Emit JSON lines instead of human-readable output
    #[serde(default)]
    pub json: bool,
}

fn default_log_filter() -> String {
    "info".to_string()
}

impl Default for TelemetryAppConfig {
    fn default() -> Self {
        Self {
            log_filter: default_log_filter(),
            json: false,
        }
    }
}
