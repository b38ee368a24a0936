use anyhow::{bail, Context, Result};
use std::path::PathBuf;

use sys_webhook::controllers::{ControllerSource, FixedControllers, InputDeviceControllers};
use sys_webhook::dispatcher::Dispatcher;
use sys_webhook::driver::Driver;
use sys_webhook::event_queue::EventQueue;
use sys_webhook::payload::DeviceContext;
use sys_webhook::play_log::JsonlPlayLog;
use sys_webhook::scanner::EventScanner;
use sys_webhook::titles::TitleCatalog;
use sys_webhook::transport::{HttpConfig, HttpTransport};
use sys_webhook::{config, logging, paths};

#[tokio::main]
async fn main() {
    let log_file = std::env::var_os(logging::LOG_FILE_ENV).map(PathBuf::from);
    if let Err(e) = logging::init(log_file.as_deref()) {
        eprintln!("[logging] {e}");
        std::process::exit(1);
    }

    if let Err(e) = run().await {
        tracing::error!("{e:#}");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    // ── Data directory ────────────────────────────────────────────────────────
    let data_dir = paths::app_data_dir().with_context(|| {
        format!("Cannot locate a data directory; set {}", paths::DATA_DIR_ENV)
    })?;
    std::fs::create_dir_all(&data_dir)
        .with_context(|| format!("Failed to create data directory {}", data_dir.display()))?;

    // ── Configuration ─────────────────────────────────────────────────────────
    let config_path = paths::config_file_path(&data_dir);
    let config = config::load_or_default(&config_path).unwrap_or_else(|e| {
        tracing::error!("Config error (using defaults): {e:#}");
        config::Config::default()
    });
    if config.endpoint_url.is_empty() {
        bail!("No endpoint_url configured in {}", config_path.display());
    }

    // ── Event capture ─────────────────────────────────────────────────────────
    let play_log_path = config.play_log_path(&data_dir);
    let controllers: Box<dyn ControllerSource> = match config.device.controller_count {
        Some(count) => Box::new(FixedControllers(count)),
        None => Box::new(InputDeviceControllers::default()),
    };
    let scanner = EventScanner::new(
        JsonlPlayLog::new(&play_log_path),
        controllers,
        config.queue.scan_batch_size,
    )
    .with_context(|| format!("Failed to open play log {}", play_log_path.display()))?;

    // ── Delivery ──────────────────────────────────────────────────────────────
    let transport = HttpTransport::new(HttpConfig {
        connect_timeout: config.connect_timeout(),
        request_timeout: config.request_timeout(),
        ..HttpConfig::default()
    })?;
    let device = DeviceContext {
        serial: config.device.serial.clone(),
        hos_version: config.device.hos_version,
        ams_version: config.device.ams_version,
    };
    let dispatcher = Dispatcher::new(
        config.endpoint_url.clone(),
        device,
        TitleCatalog::new(config.title_catalog_path(&data_dir)),
        transport,
    );

    let driver = Driver::new(
        EventQueue::new(config.queue.capacity),
        scanner,
        dispatcher,
        config.polling_interval(),
    )
    .with_status_file(paths::status_file_path(&data_dir));

    tracing::info!("sys-webhook v{} started", env!("CARGO_PKG_VERSION"));

    // Graceful shutdown on Ctrl+C.
    driver
        .run(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::warn!("Ctrl+C handler unavailable: {e}");
                std::future::pending::<()>().await;
            }
        })
        .await
}
