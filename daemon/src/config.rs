use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::time::Duration;
use toml::{Table, Value};

use crate::payload::SystemVersion;

pub const DEFAULT_POLLING_INTERVAL_NS: u64 = 1_000_000_000;
pub const MAX_ENDPOINT_URL_LEN: usize = 255;
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 5;
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 10;

pub const MIN_QUEUE_CAPACITY: usize = 1;
pub const MAX_QUEUE_CAPACITY: usize = 4096;
pub const DEFAULT_QUEUE_CAPACITY: usize = 100;

pub const MIN_SCAN_BATCH_SIZE: usize = 1;
pub const MAX_SCAN_BATCH_SIZE: usize = 100;
pub const DEFAULT_SCAN_BATCH_SIZE: usize = 10;

pub const DEFAULT_SERIAL: &str = "Unknown";

/// Root configuration. Read from `<data dir>/config.toml` once at startup.
///
/// Every key is optional. A key that is missing or has the wrong shape keeps
/// its default, unknown keys are ignored.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Time between two scan/deliver cycles, in nanoseconds.
    pub event_polling_interval_ns: u64,
    /// Webhook endpoint every event is POSTed to. Empty until configured.
    pub endpoint_url: String,
    pub delivery: DeliveryConfig,
    pub queue: QueueConfig,
    pub device: DeviceConfig,
    pub sources: SourcesConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            event_polling_interval_ns: DEFAULT_POLLING_INTERVAL_NS,
            endpoint_url: String::new(),
            delivery: DeliveryConfig::default(),
            queue: QueueConfig::default(),
            device: DeviceConfig::default(),
            sources: SourcesConfig::default(),
        }
    }
}

/// `[delivery]`: HTTP timeouts for a single POST.
#[derive(Debug, Clone, PartialEq)]
pub struct DeliveryConfig {
    pub connect_timeout_secs: u64,
    pub request_timeout_secs: u64,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            connect_timeout_secs: DEFAULT_CONNECT_TIMEOUT_SECS,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
        }
    }
}

/// `[queue]`: sizing of the pending-event queue and of scan batches.
#[derive(Debug, Clone, PartialEq)]
pub struct QueueConfig {
    /// Clamped to [`MIN_QUEUE_CAPACITY`]–[`MAX_QUEUE_CAPACITY`] when the queue is built.
    pub capacity: usize,
    /// Clamped to [`MIN_SCAN_BATCH_SIZE`]–[`MAX_SCAN_BATCH_SIZE`] when the scanner is built.
    pub scan_batch_size: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_QUEUE_CAPACITY,
            scan_batch_size: DEFAULT_SCAN_BATCH_SIZE,
        }
    }
}

/// `[device]`: static context attached to every payload.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceConfig {
    pub serial: String,
    pub hos_version: SystemVersion,
    pub ams_version: SystemVersion,
    /// Fixed controller count. When unset the count comes from `/dev/input`.
    pub controller_count: Option<i32>,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            serial: DEFAULT_SERIAL.to_string(),
            hos_version: SystemVersion::default(),
            ams_version: SystemVersion::default(),
            controller_count: None,
        }
    }
}

/// `[sources]`: overrides for the files the daemon reads events and
/// metadata from. Relative paths resolve against the working directory.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SourcesConfig {
    pub play_log: Option<PathBuf>,
    pub title_catalog: Option<PathBuf>,
}

impl Config {
    /// Builds a config from a parsed TOML table, keeping defaults for every
    /// key that is missing or malformed.
    pub fn from_table(table: &Table) -> Self {
        let mut config = Config::default();

        if let Some(ns) = take(table, "event_polling_interval_ns", positive_u64) {
            config.event_polling_interval_ns = ns;
        }
        if let Some(url) = take(table, "endpoint_url", endpoint_url) {
            config.endpoint_url = url;
        }

        if let Some(delivery) = section(table, "delivery") {
            if let Some(secs) = take(delivery, "connect_timeout_secs", positive_u64) {
                config.delivery.connect_timeout_secs = secs;
            }
            if let Some(secs) = take(delivery, "request_timeout_secs", positive_u64) {
                config.delivery.request_timeout_secs = secs;
            }
        }

        if let Some(queue) = section(table, "queue") {
            if let Some(n) = take(queue, "capacity", non_negative_usize) {
                config.queue.capacity = n;
            }
            if let Some(n) = take(queue, "scan_batch_size", non_negative_usize) {
                config.queue.scan_batch_size = n;
            }
        }

        if let Some(device) = section(table, "device") {
            if let Some(serial) = take(device, "serial", |v| v.as_str().map(str::to_string)) {
                config.device.serial = serial;
            }
            if let Some(v) = take(device, "hos_version", system_version) {
                config.device.hos_version = v;
            }
            if let Some(v) = take(device, "ams_version", system_version) {
                config.device.ams_version = v;
            }
            if let Some(n) = take(device, "controller_count", |v| {
                v.as_integer().and_then(|n| i32::try_from(n).ok()).filter(|n| *n >= 0)
            }) {
                config.device.controller_count = Some(n);
            }
        }

        if let Some(sources) = section(table, "sources") {
            config.sources.play_log = take(sources, "play_log", path);
            config.sources.title_catalog = take(sources, "title_catalog", path);
        }

        config
    }

    pub fn polling_interval(&self) -> Duration {
        Duration::from_nanos(self.event_polling_interval_ns)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.delivery.connect_timeout_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.delivery.request_timeout_secs)
    }

    /// Returns the play-event log path, falling back to `<data_dir>/play_events.jsonl`.
    pub fn play_log_path(&self, data_dir: &Path) -> PathBuf {
        self.sources
            .play_log
            .clone()
            .unwrap_or_else(|| data_dir.join(crate::paths::PLAY_LOG_FILE_NAME))
    }

    /// Returns the title catalog path, falling back to `<data_dir>/titles.toml`.
    pub fn title_catalog_path(&self, data_dir: &Path) -> PathBuf {
        self.sources
            .title_catalog
            .clone()
            .unwrap_or_else(|| data_dir.join(crate::paths::TITLE_CATALOG_FILE_NAME))
    }
}

/// Loads the config file at `path`, returning `Config::default()` if the file does not exist.
/// Returns an error if the file exists but cannot be read or is not valid TOML.
pub fn load_or_default(path: &Path) -> Result<Config> {
    if !path.exists() {
        return Ok(Config::default());
    }
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    let table: Table = content
        .parse()
        .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
    Ok(Config::from_table(&table))
}

// ── Per-key helpers ────────────────────────────────────────────────────────────

fn section<'a>(table: &'a Table, name: &str) -> Option<&'a Table> {
    let value = table.get(name)?;
    let section = value.as_table();
    if section.is_none() {
        tracing::warn!(section = name, "Ignoring config section: expected a table");
    }
    section
}

fn take<T>(table: &Table, key: &str, convert: impl FnOnce(&Value) -> Option<T>) -> Option<T> {
    let value = table.get(key)?;
    let converted = convert(value);
    if converted.is_none() {
        tracing::warn!(key, %value, "Ignoring malformed config value, keeping default");
    }
    converted
}

fn positive_u64(value: &Value) -> Option<u64> {
    value
        .as_integer()
        .and_then(|n| u64::try_from(n).ok())
        .filter(|n| *n > 0)
}

fn non_negative_usize(value: &Value) -> Option<usize> {
    value.as_integer().and_then(|n| usize::try_from(n).ok())
}

fn endpoint_url(value: &Value) -> Option<String> {
    value
        .as_str()
        .filter(|s| s.len() <= MAX_ENDPOINT_URL_LEN)
        .map(|s| s.trim().to_string())
}

/// Accepts `"17.0.1"` or the packed `major << 16 | minor << 8 | micro` integer.
fn system_version(value: &Value) -> Option<SystemVersion> {
    match value {
        Value::String(s) => s.parse().ok(),
        Value::Integer(n) => u32::try_from(*n)
            .ok()
            .filter(|n| *n <= 0x00FF_FFFF)
            .map(SystemVersion::from_packed),
        _ => None,
    }
}

fn path(value: &Value) -> Option<PathBuf> {
    value.as_str().filter(|s| !s.is_empty()).map(PathBuf::from)
}
