//! Access to the append-only play-event log.
//!
//! The log is addressed by entry index. [`PlayEventLog::range`] reports the
//! currently available window and [`PlayEventLog::query`] pages through it.
//!
//! The host implementation is a JSON-lines file: every non-blank line is one
//! entry and its position among the non-blank lines is the entry index. Lines
//! are indexed incrementally, so each refresh only reads the bytes appended
//! since the previous one.
use std::fs::File;
use std::io::{BufRead, BufReader, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use crate::event::PlayEvent;

/// Read buffer used while indexing; bounds memory regardless of log size.
const INDEX_CHUNK_SIZE: usize = 64 * 1024;

/// Window of entries currently held by the log. `end` is the index of the
/// newest entry, or `start - 1` when the log is empty.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogRange {
    pub total: i32,
    pub start: i32,
    pub end: i32,
}

impl LogRange {
    pub const EMPTY: LogRange = LogRange {
        total: 0,
        start: 0,
        end: -1,
    };
}

#[derive(Debug, thiserror::Error)]
pub enum LogError {
    #[error("failed to read play log {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("play log {} shrank from {indexed} to {len} bytes", .path.display())]
    Truncated { path: PathBuf, indexed: u64, len: u64 },
    #[error("play log {} holds more entries than can be indexed", .path.display())]
    Overflow { path: PathBuf },
}

/// Paginated, append-only source of [`PlayEvent`]s.
pub trait PlayEventLog {
    fn range(&mut self) -> Result<LogRange, LogError>;

    /// Returns up to `max` entries starting at index `start`. An empty result
    /// means nothing is available at `start`.
    fn query(&mut self, start: i32, max: usize) -> Result<Vec<PlayEvent>, LogError>;
}

/// JSON-lines backed [`PlayEventLog`].
#[derive(Debug)]
pub struct JsonlPlayLog {
    path: PathBuf,
    /// Byte offset of the first byte of every indexed entry.
    line_offsets: Vec<u64>,
    /// End offset of each indexed entry (exclusive, without the newline).
    line_ends: Vec<u64>,
    /// Number of bytes consumed by the index; only complete lines count.
    indexed_len: u64,
}

impl JsonlPlayLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            line_offsets: Vec::new(),
            line_ends: Vec::new(),
            indexed_len: 0,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_error(&self, source: std::io::Error) -> LogError {
        LogError::Io {
            path: self.path.clone(),
            source,
        }
    }

    /// Indexes any complete lines appended since the last refresh.
    fn refresh(&mut self) -> Result<(), LogError> {
        let len = match std::fs::metadata(&self.path) {
            Ok(meta) => meta.len(),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => 0,
            Err(e) => return Err(self.io_error(e)),
        };

        if len < self.indexed_len {
            return Err(LogError::Truncated {
                path: self.path.clone(),
                indexed: self.indexed_len,
                len,
            });
        }
        if len == self.indexed_len {
            return Ok(());
        }

        let mut file = File::open(&self.path).map_err(|e| self.io_error(e))?;
        file.seek(SeekFrom::Start(self.indexed_len))
            .map_err(|e| self.io_error(e))?;
        let mut reader = BufReader::with_capacity(INDEX_CHUNK_SIZE, file.take(len - self.indexed_len));

        let mut pos = self.indexed_len;
        let mut line_start = pos;
        let mut has_content = false;
        loop {
            let chunk = reader.fill_buf().map_err(|e| self.io_error(e))?;
            if chunk.is_empty() {
                break;
            }
            for &byte in chunk {
                if byte == b'\n' {
                    if has_content {
                        self.line_offsets.push(line_start);
                        self.line_ends.push(pos);
                    }
                    line_start = pos + 1;
                    has_content = false;
                } else if !byte.is_ascii_whitespace() {
                    has_content = true;
                }
                pos += 1;
            }
            let consumed = chunk.len();
            reader.consume(consumed);
        }
        // A trailing line without a newline is still being written.
        self.indexed_len = line_start;

        if i32::try_from(self.line_offsets.len()).is_err() {
            return Err(LogError::Overflow {
                path: self.path.clone(),
            });
        }
        Ok(())
    }
}

impl PlayEventLog for JsonlPlayLog {
    fn range(&mut self) -> Result<LogRange, LogError> {
        self.refresh()?;
        let total = self.line_offsets.len() as i32;
        Ok(LogRange {
            total,
            start: 0,
            end: total - 1,
        })
    }

    fn query(&mut self, start: i32, max: usize) -> Result<Vec<PlayEvent>, LogError> {
        let Ok(first) = usize::try_from(start) else {
            return Ok(Vec::new());
        };
        if first >= self.line_offsets.len() || max == 0 {
            return Ok(Vec::new());
        }
        let last = (first + max).min(self.line_offsets.len()) - 1;

        let from = self.line_offsets[first];
        let to = self.line_ends[last];
        let mut file = File::open(&self.path).map_err(|e| self.io_error(e))?;
        file.seek(SeekFrom::Start(from)).map_err(|e| self.io_error(e))?;
        let mut bytes = Vec::with_capacity((to - from) as usize);
        file.take(to - from)
            .read_to_end(&mut bytes)
            .map_err(|e| self.io_error(e))?;

        let events = (first..=last)
            .map(|i| {
                let lo = (self.line_offsets[i] - from) as usize;
                let hi = ((self.line_ends[i] - from) as usize).min(bytes.len());
                decode_entry(&bytes[lo.min(hi)..hi], i)
            })
            .collect();
        Ok(events)
    }
}

fn decode_entry(line: &[u8], index: usize) -> PlayEvent {
    match serde_json::from_slice(line) {
        Ok(event) => event,
        Err(e) => {
            tracing::debug!(index, error = %e, "Undecodable play log entry");
            PlayEvent::Unrecognized
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    use crate::event::EventKind;

    const LAUNCH: &str =
        r#"{"type":"applet","program_id":"0100000000010000","applet_id":"application","event_type":"launch"}"#;
    const EXIT: &str =
        r#"{"type":"applet","program_id":"0100000000010000","applet_id":"application","event_type":"exit"}"#;
    const ACCOUNT: &str = r#"{"type":"account"}"#;

    fn append(path: &Path, lines: &[&str]) {
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .unwrap();
        for line in lines {
            writeln!(file, "{line}").unwrap();
        }
    }

    fn log_in(dir: &tempfile::TempDir) -> (PathBuf, JsonlPlayLog) {
        let path = dir.path().join("play_events.jsonl");
        (path.clone(), JsonlPlayLog::new(path))
    }

    #[test]
    fn missing_file_is_empty_log() {
        let dir = tempfile::tempdir().unwrap();
        let (_, mut log) = log_in(&dir);
        assert_eq!(log.range().unwrap(), LogRange::EMPTY);
        assert!(log.query(0, 10).unwrap().is_empty());
    }

    #[test]
    fn range_counts_entries() {
        let dir = tempfile::tempdir().unwrap();
        let (path, mut log) = log_in(&dir);
        append(&path, &[LAUNCH, ACCOUNT, EXIT]);
        assert_eq!(
            log.range().unwrap(),
            LogRange {
                total: 3,
                start: 0,
                end: 2
            }
        );
    }

    #[test]
    fn range_grows_as_lines_are_appended() {
        let dir = tempfile::tempdir().unwrap();
        let (path, mut log) = log_in(&dir);
        append(&path, &[LAUNCH]);
        assert_eq!(log.range().unwrap().end, 0);
        append(&path, &[ACCOUNT, EXIT]);
        assert_eq!(log.range().unwrap().end, 2);
        let events = log.query(1, 10).unwrap();
        assert_eq!(events[0], PlayEvent::Account {});
        assert_eq!(
            events[1].application_lifecycle(),
            Some((0x0100_0000_0001_0000, EventKind::Exit))
        );
    }

    #[test]
    fn partial_trailing_line_is_not_indexed() {
        let dir = tempfile::tempdir().unwrap();
        let (path, mut log) = log_in(&dir);
        append(&path, &[LAUNCH]);
        {
            let mut file = std::fs::OpenOptions::new().append(true).open(&path).unwrap();
            write!(file, "{}", &EXIT[..20]).unwrap();
        }
        assert_eq!(log.range().unwrap().total, 1);

        {
            let mut file = std::fs::OpenOptions::new().append(true).open(&path).unwrap();
            writeln!(file, "{}", &EXIT[20..]).unwrap();
        }
        assert_eq!(log.range().unwrap().total, 2);
        assert_eq!(
            log.query(1, 1).unwrap()[0].application_lifecycle(),
            Some((0x0100_0000_0001_0000, EventKind::Exit))
        );
    }

    #[test]
    fn blank_lines_do_not_occupy_indices() {
        let dir = tempfile::tempdir().unwrap();
        let (path, mut log) = log_in(&dir);
        append(&path, &[LAUNCH, "", "   ", EXIT]);
        assert_eq!(log.range().unwrap().total, 2);
    }

    #[test]
    fn query_pages_through_log() {
        let dir = tempfile::tempdir().unwrap();
        let (path, mut log) = log_in(&dir);
        append(&path, &[LAUNCH, ACCOUNT, ACCOUNT, EXIT, ACCOUNT]);
        log.range().unwrap();

        assert_eq!(log.query(0, 2).unwrap().len(), 2);
        let tail = log.query(3, 10).unwrap();
        assert_eq!(tail.len(), 2);
        assert!(tail[0].application_lifecycle().is_some());
        assert!(log.query(5, 10).unwrap().is_empty());
        assert!(log.query(-1, 10).unwrap().is_empty());
    }

    #[test]
    fn undecodable_lines_are_unrecognized_entries() {
        let dir = tempfile::tempdir().unwrap();
        let (path, mut log) = log_in(&dir);
        append(&path, &["not json", LAUNCH]);
        assert_eq!(log.range().unwrap().total, 2);
        let events = log.query(0, 2).unwrap();
        assert_eq!(events[0], PlayEvent::Unrecognized);
        assert!(events[1].application_lifecycle().is_some());
    }

    #[test]
    fn lines_spanning_read_chunks_are_indexed() {
        let dir = tempfile::tempdir().unwrap();
        let (path, mut log) = log_in(&dir);
        let lines: Vec<&str> = (0..(3 * INDEX_CHUNK_SIZE / LAUNCH.len()))
            .map(|i| if i % 2 == 0 { LAUNCH } else { ACCOUNT })
            .collect();
        append(&path, &lines);

        let range = log.range().unwrap();
        assert_eq!(range.total as usize, lines.len());
        let last = log.query(range.end, 1).unwrap();
        let expected: PlayEvent = serde_json::from_str(lines[lines.len() - 1]).unwrap();
        assert_eq!(last, vec![expected]);
        for start in [0, range.end / 2, range.end - 1] {
            for event in log.query(start, 2).unwrap() {
                assert_ne!(event, PlayEvent::Unrecognized);
            }
        }
    }

    #[test]
    fn shrinking_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let (path, mut log) = log_in(&dir);
        append(&path, &[LAUNCH, EXIT]);
        log.range().unwrap();
        std::fs::write(&path, format!("{LAUNCH}\n")).unwrap();
        assert!(matches!(log.range(), Err(LogError::Truncated { .. })));
    }
}
