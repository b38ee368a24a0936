use anyhow::{Context, Result};
use std::future::Future;
use std::path::PathBuf;
use std::time::Duration;
use tokio::time::{interval, MissedTickBehavior};

use crate::controllers::ControllerSource;
use crate::dispatcher::{DeliveryOutcome, Dispatcher};
use crate::event_queue::EventQueue;
use crate::play_log::PlayEventLog;
use crate::scanner::{EventScanner, ScanError, ScanReport};
use crate::status::{self, DaemonState, DaemonStatus};
use crate::titles::TitleMetadata;
use crate::transport::Transport;

/// What one scan + drain cycle did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CycleReport {
    pub scan: ScanReport,
    pub delivered: usize,
    /// Why draining stopped: `Empty` or `Failed`.
    pub stopped_on: DeliveryOutcome,
}

/// Owns the queue, scanner and dispatcher and runs them on a fixed interval.
///
/// Each tick scans the log first, then delivers queued events oldest-first
/// until the queue is empty or a delivery fails. A failure ends the cycle
/// without skipping ahead, so events always leave in log order; whatever is
/// left is retried on the next tick.
pub struct Driver<L, C, M, T> {
    queue: EventQueue,
    scanner: EventScanner<L, C>,
    dispatcher: Dispatcher<M, T>,
    interval: Duration,
    status: DaemonStatus,
    status_path: Option<PathBuf>,
}

impl<L, C, M, T> Driver<L, C, M, T>
where
    L: PlayEventLog,
    C: ControllerSource,
    M: TitleMetadata,
    T: Transport,
{
    pub fn new(
        queue: EventQueue,
        scanner: EventScanner<L, C>,
        dispatcher: Dispatcher<M, T>,
        interval: Duration,
    ) -> Self {
        Self {
            queue,
            scanner,
            dispatcher,
            interval,
            status: DaemonStatus::new(),
            status_path: None,
        }
    }

    /// Mirrors the daemon status to `path` whenever it changes.
    pub fn with_status_file(mut self, path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        status::write_status(&path, &self.status);
        self.status_path = Some(path);
        self
    }

    pub fn queue(&self) -> &EventQueue {
        &self.queue
    }

    pub fn status(&self) -> &DaemonStatus {
        &self.status
    }

    /// Runs one scan followed by a delivery run.
    ///
    /// A scan error is returned as-is; the queue keeps whatever it held.
    pub async fn run_cycle(&mut self) -> Result<CycleReport, ScanError> {
        let scan = match self.scanner.scan(&mut self.queue) {
            Ok(scan) => scan,
            Err(e) => {
                self.update_status(|s| s.error = Some(format!("Play event scan failed: {e}")));
                return Err(e);
            }
        };

        let mut delivered = 0;
        let stopped_on = loop {
            match self.dispatcher.deliver_next(&mut self.queue).await {
                DeliveryOutcome::Delivered => delivered += 1,
                outcome => break outcome,
            }
        };

        let report = CycleReport {
            scan,
            delivered,
            stopped_on,
        };
        self.record_cycle(&report);
        Ok(report)
    }

    /// Runs cycles until `shutdown` resolves. Returns an error when a scan
    /// fails, since the log cursor can no longer be trusted.
    pub async fn run(mut self, shutdown: impl Future<Output = ()>) -> Result<()> {
        let mut ticker = interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tokio::pin!(shutdown);

        tracing::info!(
            endpoint = self.dispatcher.endpoint_url(),
            interval_ms = self.interval.as_millis() as u64,
            cursor = self.scanner.cursor(),
            "Watching play events"
        );

        loop {
            tokio::select! {
                biased;
                _ = &mut shutdown => {
                    tracing::info!(pending = self.queue.len(), "Shutting down");
                    self.update_status(|s| s.state = DaemonState::Idle);
                    return Ok(());
                }
                _ = ticker.tick() => {
                    self.run_cycle().await.context("Play event scan failed")?;
                }
            }
        }
    }

    fn record_cycle(&mut self, report: &CycleReport) {
        if report.scan.queued > 0 || report.delivered > 0 {
            tracing::debug!(
                queued = report.scan.queued,
                delivered = report.delivered,
                pending = self.queue.len(),
                "Cycle complete"
            );
        }

        let pending = self.queue.len();
        let endpoint = self.dispatcher.endpoint_url().to_string();
        self.update_status(|s| {
            s.pending = pending;
            s.delivered_total += report.delivered as u64;
            s.dropped_total += report.scan.dropped as u64;
            if report.delivered > 0 {
                s.last_delivery_timestamp = Some(chrono::Local::now().to_rfc3339());
                s.error = None;
            }
            s.state = match report.stopped_on {
                DeliveryOutcome::Failed => {
                    s.error = Some(format!("Delivery to {endpoint} failed; {pending} event(s) pending"));
                    DaemonState::Retrying
                }
                _ if report.delivered > 0 => DaemonState::Delivering,
                _ => DaemonState::Idle,
            };
        });
    }

    /// Applies `change` and rewrites the status file if anything differs.
    fn update_status(&mut self, change: impl FnOnce(&mut DaemonStatus)) {
        let before = self.status.clone();
        change(&mut self.status);
        if self.status != before {
            if let Some(path) = &self.status_path {
                status::write_status(path, &self.status);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::path::Path;

    use crate::controllers::FixedControllers;
    use crate::dispatcher::tests::{device, RecordingTransport, StubMetadata, ENDPOINT, GAME};
    use crate::play_log::JsonlPlayLog;

    type TestDriver = Driver<JsonlPlayLog, FixedControllers, StubMetadata, RecordingTransport>;

    fn applet_line(program_id: u64, event_type: &str) -> String {
        format!(
            r#"{{"type":"applet","program_id":"{program_id:016X}","applet_id":"application","event_type":"{event_type}"}}"#
        )
    }

    fn append(path: &Path, lines: &[String]) {
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .unwrap();
        for line in lines {
            writeln!(file, "{line}").unwrap();
        }
    }

    /// Builds a driver over a play log that already holds one historical entry.
    fn driver_in(dir: &Path, transport: RecordingTransport, capacity: usize) -> (PathBuf, TestDriver) {
        let log_path = dir.join("play_events.jsonl");
        append(&log_path, &[applet_line(GAME, "launch")]);

        let scanner = EventScanner::new(JsonlPlayLog::new(&log_path), FixedControllers(2), 10).unwrap();
        let dispatcher = Dispatcher::new(ENDPOINT, device(), StubMetadata::with_game(), transport);
        let driver = Driver::new(
            EventQueue::new(capacity),
            scanner,
            dispatcher,
            Duration::from_millis(10),
        );
        (log_path, driver)
    }

    #[tokio::test]
    async fn launch_event_is_delivered_end_to_end() {
        let dir = tempfile::tempdir().unwrap();
        let transport = RecordingTransport::default();
        let (log, mut driver) = driver_in(dir.path(), transport.clone(), 100);
        append(&log, &[r#"{"type":"account"}"#.to_string(), applet_line(GAME, "launch")]);

        let report = driver.run_cycle().await.unwrap();

        assert_eq!(report.scan.examined, 2);
        assert_eq!(report.delivered, 1);
        assert_eq!(report.stopped_on, DeliveryOutcome::Empty);
        assert!(driver.queue().is_empty());

        let sent = transport.sent.borrow();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, "http://example.test/hook");
        assert_eq!(
            sent[0].1,
            concat!(
                r#"{"serial":"XAW10000000001","hos_version":"17.0.1","ams_version":"1.6.2","#,
                r#""action":"Launch","title_id":"0100000000010000","title_version":"1.2.0","#,
                r#""title_name":"MyGame","controller_count":2}"#
            )
        );
    }

    #[tokio::test]
    async fn historical_entries_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let transport = RecordingTransport::default();
        let (_, mut driver) = driver_in(dir.path(), transport.clone(), 100);

        let report = driver.run_cycle().await.unwrap();

        assert_eq!(report.delivered, 0);
        assert_eq!(report.stopped_on, DeliveryOutcome::Empty);
        assert!(transport.sent.borrow().is_empty());
    }

    #[tokio::test]
    async fn failed_delivery_pauses_and_retries_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let transport = RecordingTransport::default();
        let (log, mut driver) = driver_in(dir.path(), transport.clone(), 100);
        transport.set_failing(true);
        append(&log, &[applet_line(GAME, "launch"), applet_line(GAME, "exit")]);

        let report = driver.run_cycle().await.unwrap();
        assert_eq!(report.scan.queued, 2);
        assert_eq!(report.delivered, 0);
        assert_eq!(report.stopped_on, DeliveryOutcome::Failed);
        assert_eq!(driver.queue().len(), 2);
        assert_eq!(driver.status().state, DaemonState::Retrying);
        assert!(driver.status().error.is_some());

        // Still failing: nothing new is scanned, nothing is lost.
        driver.run_cycle().await.unwrap();
        assert_eq!(driver.queue().len(), 2);

        transport.set_failing(false);
        let report = driver.run_cycle().await.unwrap();
        assert_eq!(report.delivered, 2);
        assert!(driver.queue().is_empty());

        let actions: Vec<_> = transport.bodies().iter().map(|b| b["action"].clone()).collect();
        assert_eq!(actions, vec!["Launch", "Exit"]);
        assert_eq!(driver.status().state, DaemonState::Delivering);
        assert_eq!(driver.status().delivered_total, 2);
        assert!(driver.status().error.is_none());
        assert!(driver.status().last_delivery_timestamp.is_some());

        driver.run_cycle().await.unwrap();
        assert_eq!(driver.status().state, DaemonState::Idle);
    }

    #[tokio::test]
    async fn failure_mid_drain_stops_the_run_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let transport = RecordingTransport::default();
        let (log, mut driver) = driver_in(dir.path(), transport.clone(), 100);
        transport.fail_on_attempt(2);
        append(
            &log,
            &[
                applet_line(1, "launch"),
                applet_line(2, "launch"),
                applet_line(3, "launch"),
            ],
        );

        let report = driver.run_cycle().await.unwrap();
        assert_eq!(report.scan.queued, 3);
        assert_eq!(report.delivered, 1);
        assert_eq!(report.stopped_on, DeliveryOutcome::Failed);
        assert_eq!(driver.queue().len(), 2);
        assert_eq!(driver.status().pending, 2);
        assert_eq!(driver.status().state, DaemonState::Retrying);

        let report = driver.run_cycle().await.unwrap();
        assert_eq!(report.delivered, 2);
        assert_eq!(report.stopped_on, DeliveryOutcome::Empty);
        assert!(driver.queue().is_empty());

        let ids: Vec<_> = transport.bodies().iter().map(|b| b["title_id"].clone()).collect();
        assert_eq!(ids, vec!["0000000000000001", "0000000000000002", "0000000000000003"]);
    }

    #[tokio::test]
    async fn overflow_is_counted_as_dropped() {
        let dir = tempfile::tempdir().unwrap();
        let transport = RecordingTransport::default();
        let (log, mut driver) = driver_in(dir.path(), transport.clone(), 2);
        transport.set_failing(true);
        append(
            &log,
            &[
                applet_line(1, "launch"),
                applet_line(2, "launch"),
                applet_line(3, "launch"),
            ],
        );

        let report = driver.run_cycle().await.unwrap();
        assert_eq!(report.scan.queued, 2);
        assert_eq!(report.scan.dropped, 1);
        assert_eq!(driver.status().dropped_total, 1);
        assert_eq!(driver.status().pending, 2);
    }

    #[tokio::test]
    async fn scan_failure_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let transport = RecordingTransport::default();
        let (log, mut driver) = driver_in(dir.path(), transport, 100);
        std::fs::write(&log, "").unwrap();

        assert!(driver.run_cycle().await.is_err());
        assert!(driver.status().error.is_some());
    }

    #[tokio::test]
    async fn run_returns_error_on_scan_failure() {
        let dir = tempfile::tempdir().unwrap();
        let (log, driver) = driver_in(dir.path(), RecordingTransport::default(), 100);
        std::fs::write(&log, "").unwrap();

        let result = driver.run(std::future::pending()).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn status_file_tracks_cycles_and_shutdown() {
        let dir = tempfile::tempdir().unwrap();
        let status_path = dir.path().join("status.toml");
        let transport = RecordingTransport::default();
        let (log, driver) = driver_in(dir.path(), transport.clone(), 100);
        let mut driver = driver.with_status_file(&status_path);
        assert!(status_path.exists());

        transport.set_failing(true);
        append(&log, &[applet_line(GAME, "launch")]);
        driver.run_cycle().await.unwrap();
        let content = std::fs::read_to_string(&status_path).unwrap();
        assert!(content.contains("state = \"retrying\""));
        assert!(content.contains("pending = 1"));

        driver.run(async {}).await.unwrap();
        let content = std::fs::read_to_string(&status_path).unwrap();
        assert!(content.contains("state = \"idle\""));
    }
}
