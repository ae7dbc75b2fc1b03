//! JSONL audit log implementation
//!
//! Implements the `AuditLogPort` by appending one JSON object per line to a
//! file. The file is opened in append mode for every entry and each line is
//! written with a single `write_all`, so concurrent writers never interleave
//! partial lines and no lock is held in the process.

use std::path::{Path, PathBuf};

use application::ports::AuditLogPort;
use async_trait::async_trait;
use domain::AuditEntry;
use tokio::{fs::OpenOptions, io::AsyncWriteExt};
use tracing::{debug, instrument, warn};

/// File-backed audit log
#[derive(Debug, Clone)]
pub struct JsonlAuditLog {
    path: PathBuf,
}

impl JsonlAuditLog {
    /// Create an audit log appending to `path`
    ///
    /// Parent directories are created on first write.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Target file
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn append(&self, line: &[u8]) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(line).await?;
        file.flush().await
    }
}

#[async_trait]
impl AuditLogPort for JsonlAuditLog {
    #[instrument(skip(self, entry), fields(operation = %entry.operation, uid = %entry.uid))]
    async fn record(&self, entry: AuditEntry) {
        let mut line = match serde_json::to_vec(&entry) {
            Ok(line) => line,
            Err(e) => {
                warn!(error = %e, "Failed to serialize audit entry");
                return;
            },
        };
        line.push(b'\n');

        match self.append(&line).await {
            Ok(()) => debug!(path = %self.path.display(), "Audit entry written"),
            Err(e) => warn!(
                path = %self.path.display(),
                error = %e,
                "Failed to write audit entry"
            ),
        }
    }
}

/// Audit log that discards every entry, used when auditing is disabled
#[derive(Debug, Clone, Copy, Default)]
pub struct NullAuditLog;

#[async_trait]
impl AuditLogPort for NullAuditLog {
    async fn record(&self, entry: AuditEntry) {
        debug!(uid = %entry.uid, "Audit disabled, entry dropped");
    }
}
