use crate::config::{MAX_SCAN_BATCH_SIZE, MIN_SCAN_BATCH_SIZE};
use crate::controllers::{ControllerError, ControllerSource};
use crate::event::{format_title_id, EventRecord};
use crate::event_queue::EventQueue;
use crate::play_log::{LogError, PlayEventLog};

#[derive(Debug, thiserror::Error)]
pub enum ScanError {
    #[error(transparent)]
    Log(#[from] LogError),
    #[error(transparent)]
    Controllers(#[from] ControllerError),
}

/// What a single [`EventScanner::scan`] call did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanReport {
    /// Log entries the cursor moved past.
    pub examined: usize,
    /// Lifecycle records pushed into the queue.
    pub queued: usize,
    /// Lifecycle records lost because the queue was full.
    pub dropped: usize,
}

/// Follows the play-event log and turns new application launch/exit entries
/// into [`EventRecord`]s.
///
/// The cursor starts just past the newest entry present at construction, so
/// history recorded before the daemon started is never reported. It only
/// moves forward, by whole batches, whether or not the entries matched.
pub struct EventScanner<L, C> {
    log: L,
    controllers: C,
    batch_size: usize,
    cursor: i32,
}

impl<L: PlayEventLog, C: ControllerSource> EventScanner<L, C> {
    /// Creates a scanner positioned after the current end of `log`.
    /// `batch_size` is clamped to the configured min/max.
    pub fn new(mut log: L, controllers: C, batch_size: usize) -> Result<Self, ScanError> {
        let range = log.range()?;
        Ok(Self {
            log,
            controllers,
            batch_size: batch_size.clamp(MIN_SCAN_BATCH_SIZE, MAX_SCAN_BATCH_SIZE),
            cursor: range.end + 1,
        })
    }

    /// Index of the next log entry that has not been examined yet.
    pub fn cursor(&self) -> i32 {
        self.cursor
    }

    /// Reads every entry appended since the previous scan and queues the
    /// application launch/exit events among them.
    ///
    /// On error the cursor keeps the position reached by the batches that
    /// completed, so the next scan resumes from there.
    pub fn scan(&mut self, queue: &mut EventQueue) -> Result<ScanReport, ScanError> {
        let mut report = ScanReport::default();
        let end = self.log.range()?.end;

        while self.cursor <= end {
            let batch = self.log.query(self.cursor, self.batch_size)?;

            // Guard against a log that claims entries it cannot return.
            if batch.is_empty() {
                tracing::warn!(cursor = self.cursor, end, "Play log returned no entries; retrying next scan");
                break;
            }

            for entry in &batch {
                let Some((application_id, kind)) = entry.application_lifecycle() else {
                    continue;
                };
                let record = EventRecord {
                    application_id,
                    controller_count: self.controllers.connected_count()?,
                    kind,
                };
                if queue.push(record) {
                    report.queued += 1;
                    tracing::debug!(title_id = %format_title_id(application_id), ?kind, "Queued play event");
                } else {
                    report.dropped += 1;
                    tracing::warn!(
                        title_id = %format_title_id(application_id),
                        ?kind,
                        capacity = queue.capacity(),
                        "Event queue full; dropping play event"
                    );
                }
            }

            report.examined += batch.len();
            self.cursor = self.cursor.saturating_add(batch.len() as i32);
        }

        Ok(report)
    }
}
