use serde::{Deserialize, Serialize};
use std::path::Path;

/// Current operational state of the daemon.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone, Copy)]
#[serde(rename_all = "lowercase")]
pub enum DaemonState {
    /// Nothing is waiting to be delivered.
    Idle,
    /// Events were delivered in the last cycle and the queue was drained.
    Delivering,
    /// The last delivery attempt failed; queued events are retried every cycle.
    Retrying,
}

/// Runtime status written by the daemon to `<data dir>/status.toml`.
/// External tools read this file to see whether events are flowing.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct DaemonStatus {
    /// Daemon binary version (set from Cargo.toml at compile time).
    pub version: String,
    /// Current operational state.
    pub state: DaemonState,
    /// Events currently waiting in the queue.
    pub pending: usize,
    /// Events delivered since startup.
    pub delivered_total: u64,
    /// Events lost to a full queue since startup.
    pub dropped_total: u64,
    /// RFC 3339 timestamp of the most recent successful delivery, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_delivery_timestamp: Option<String>,
    /// The most recent delivery failure, cleared by the next success.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl DaemonStatus {
    /// Constructs the initial idle status on daemon startup.
    pub fn new() -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION").to_string(),
            state: DaemonState::Idle,
            pending: 0,
            delivered_total: 0,
            dropped_total: 0,
            last_delivery_timestamp: None,
            error: None,
        }
    }
}

impl Default for DaemonStatus {
    fn default() -> Self {
        Self::new()
    }
}

/// Serializes `status` to TOML and writes it to `path`.
/// Creates the parent directory if it does not exist.
/// Logs errors rather than panicking.
pub fn write_status(path: &Path, status: &DaemonStatus) {
    if let Some(parent) = path.parent() {
        if let Err(e) = std::fs::create_dir_all(parent) {
            tracing::error!("Failed to create directory {}: {e}", parent.display());
            return;
        }
    }
    match toml::to_string_pretty(status) {
        Ok(content) => {
            if let Err(e) = std::fs::write(path, content) {
                tracing::error!("Failed to write status file: {e}");
            }
        }
        Err(e) => tracing::error!("Failed to serialize status: {e}"),
    }
}
