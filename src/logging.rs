//! Diagnostic logging and the transaction audit log.
//!
//! Diagnostics go through `tracing`; the binary installs the subscriber.
//! The audit log is a JSONL file with one entry per handled command and
//! per persisted batch:
//! - monotonic sequence numbers for ordering
//! - ISO 8601 timestamps with microsecond precision
//! - actor id and component for correlation

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, OnceLock};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

/// Environment variable that overrides the configured filter.
pub const LOG_ENV: &str = "CASE_ENGINE_LOG";

static TRACING_INITIALIZED: OnceLock<()> = OnceLock::new();

/// Installs the global tracing subscriber once. Later calls are no-ops.
pub fn init_tracing(default_filter: &str, json: bool) {
    TRACING_INITIALIZED.get_or_init(|| {
        let filter = EnvFilter::try_from_env(LOG_ENV)
            .unwrap_or_else(|_| EnvFilter::new(default_filter));
        let layer = if json {
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(true)
                .json()
                .with_filter(filter)
                .boxed()
        } else {
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(true)
                .with_filter(filter)
                .boxed()
        };
        if tracing_subscriber::registry().with(layer).try_init().is_err() {
            tracing::debug!("Global tracing subscriber already initialized");
        }
    });
}

/// A single audit entry.
#[derive(Debug, Serialize, Deserialize)]
pub struct AuditEntry {
    pub seq: u64,
    pub ts: String,
    pub actor_id: String,
    pub component: String,
    pub event: serde_json::Value,
}

/// JSONL audit log of command handling.
pub struct TransactionLogger {
    seq: AtomicU64,
    log_file: Mutex<File>,
    log_path: PathBuf,
}

impl TransactionLogger {
    /// Opens (or creates) the log at `path` in append mode.
    pub fn new(path: &Path) -> anyhow::Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            seq: AtomicU64::new(0),
            log_file: Mutex::new(file),
            log_path: path.to_path_buf(),
        })
    }

    fn next_seq(&self) -> u64 {
        self.seq.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn log(&self, actor_id: &str, component: &str, event: impl Serialize) {
        let entry = AuditEntry {
            seq: self.next_seq(),
            ts: Utc::now().format("%Y-%m-%dT%H:%M:%S%.6fZ").to_string(),
            actor_id: actor_id.to_string(),
            component: component.to_string(),
            event: serde_json::to_value(event).unwrap_or(serde_json::Value::Null),
        };

        if let Ok(mut file) = self.log_file.lock() {
            if let Ok(line) = serde_json::to_string(&entry) {
                let _ = writeln!(file, "{}", line);
                let _ = file.flush();
            }
        }
    }

    /// Logs the outcome of one command.
    pub fn log_command(&self, actor_id: &str, manifest: &str, user: &str, outcome: &str) {
        self.log(
            actor_id,
            "Command",
            serde_json::json!({
                "type": "Handled",
                "command": manifest,
                "user": user,
                "outcome": outcome
            }),
        );
    }

    /// Logs a persisted batch.
    pub fn log_batch(&self, actor_id: &str, first_sequence: u64, manifests: &[String]) {
        self.log(
            actor_id,
            "Journal",
            serde_json::json!({
                "type": "Persisted",
                "first_sequence": first_sequence,
                "events": manifests
            }),
        );
    }

    /// Logs an actor lifecycle change such as recovery or passivation.
    pub fn log_lifecycle(&self, actor_id: &str, change: &str) {
        self.log(
            actor_id,
            "Actor",
            serde_json::json!({
                "type": "Lifecycle",
                "change": change
            }),
        );
    }

    pub fn path(&self) -> &Path {
        &self.log_path
    }
}

#[cfg(test)]
#[path = "tests/logging_tests.rs"]
mod tests;
