//! In-memory record buffer and its flush policy.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::{debug, error, info, warn};

use super::dirlock::DirLock;
use super::record::{LogRecord, FOOTER, TIMESTAMP_FORMAT};
use super::FORMAT_VERSION;
use crate::error::{LoggerError, Result};
use crate::events::{EventBus, LoggerEvent};

/// When to write the buffer to disk (besides jurisdiction changes and
/// shutdown). The two size policies are mutually exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushPolicy {
    /// Flush before an append would make the file exceed this many bytes
    ByteBudget(usize),
    /// Flush once this many records are buffered
    RecordCount(usize),
}

impl FlushPolicy {
    /// A byte budget of 0 disables byte-budget flushing in favour of the
    /// record count
    pub fn from_limits(max_file_size_bytes: usize, max_records_per_file: usize) -> Self {
        if max_file_size_bytes == 0 {
            FlushPolicy::RecordCount(max_records_per_file.max(1))
        } else {
            FlushPolicy::ByteBudget(max_file_size_bytes)
        }
    }
}

/// Outcome of a successful [`LogBuffer::flush`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlushResult {
    /// Nothing was buffered
    Empty,
    /// The buffered records were written to `path`
    Written {
        path: PathBuf,
        records: usize,
        bytes: usize,
    },
}

/// Buffered records of one jurisdiction, waiting to be written.
///
/// Not synchronized by itself; share it as a
/// [`SharedLogBuffer`](super::SharedLogBuffer) so flushes and uploads
/// exclude each other.
#[derive(Debug)]
pub struct LogBuffer {
    header: String,
    records: Vec<LogRecord>,
    records_bytes: usize,
    jurisdiction: Option<String>,
    policy: FlushPolicy,
    pending_dir: PathBuf,
    events: EventBus,
}

impl LogBuffer {
    /// Create an empty buffer writing files into `pending_dir`.
    ///
    /// `header` is bound for the lifetime of the buffer.
    pub fn new(header: String, policy: FlushPolicy, pending_dir: PathBuf, events: EventBus) -> Self {
        Self {
            header,
            records: Vec::new(),
            records_bytes: 0,
            jurisdiction: None,
            policy,
            pending_dir,
            events,
        }
    }

    /// Directory completed files are written to
    pub fn pending_dir(&self) -> &Path {
        &self.pending_dir
    }

    pub fn header(&self) -> &str {
        &self.header
    }

    pub fn policy(&self) -> FlushPolicy {
        self.policy
    }

    /// Number of buffered records
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Size of the file a flush would write now; 0 when empty
    pub fn accumulated_size(&self) -> usize {
        if self.records.is_empty() {
            0
        } else {
            self.header.len() + self.records_bytes + FOOTER.len()
        }
    }

    /// Country code of the most recently appended record. Survives flushes.
    pub fn current_jurisdiction(&self) -> Option<&str> {
        self.jurisdiction.as_deref()
    }

    /// Buffer a record, flushing first or afterwards as the policy demands.
    ///
    /// Returns the files written during the call. A jurisdiction change
    /// forces a flush of the previous records; if that flush fails the
    /// record is not buffered and the error is returned, since one file
    /// may only hold one jurisdiction. Other flush failures are logged and
    /// published, and the records stay in memory.
    pub fn append(&mut self, record: LogRecord) -> Result<Vec<PathBuf>> {
        let mut written = Vec::new();

        if !self.records.is_empty() && self.jurisdiction.as_deref() != Some(record.jurisdiction()) {
            info!(
                "Jurisdiction changed from {:?} to {}, flushing {} record(s)",
                self.jurisdiction,
                record.jurisdiction(),
                self.records.len()
            );
            if let FlushResult::Written { path, .. } = self.flush()? {
                written.push(path);
            }
        }

        if let FlushPolicy::ByteBudget(budget) = self.policy {
            let projected = self.header.len() + self.records_bytes + record.len() + FOOTER.len();
            if !self.records.is_empty() && projected > budget {
                debug!("Appending would reach {} bytes (budget {}), flushing first", projected, budget);
                self.flush_reporting(&mut written);
            }
        }

        self.jurisdiction = Some(record.jurisdiction().to_string());
        self.records_bytes += record.len();
        self.records.push(record);
        debug!(
            "{} record(s) buffered, {} bytes",
            self.records.len(),
            self.accumulated_size()
        );

        if let FlushPolicy::RecordCount(max) = self.policy {
            if self.records.len() >= max {
                debug!("Max logs per file reached ({}), flushing", max);
                self.flush_reporting(&mut written);
            } else {
                debug!("Max logs per file not reached, wait to write to a file");
            }
        }

        Ok(written)
    }

    fn flush_reporting(&mut self, written: &mut Vec<PathBuf>) {
        match self.flush() {
            Ok(FlushResult::Written { path, .. }) => written.push(path),
            Ok(FlushResult::Empty) => {}
            Err(e) => warn!("Flush failed, keeping records in memory: {}", e),
        }
    }

    /// Write header, records and footer to a new file and clear the buffer.
    ///
    /// The file name is `{version}_{mcc}_log{YYYYMMDDHHMMSS}.xml`, stamped
    /// with the capture time of the newest record. The pending directory
    /// lock is held while writing, so this blocks while an upload pass of
    /// another process is running. On failure nothing is cleared and no
    /// partial file is left behind.
    pub fn flush(&mut self) -> Result<FlushResult> {
        let Some(last) = self.records.last() else {
            return Ok(FlushResult::Empty);
        };

        let jurisdiction = self.jurisdiction.as_deref().unwrap_or_default();
        let file_name = format!(
            "{}_{}_log{}.xml",
            FORMAT_VERSION,
            jurisdiction,
            last.captured_at().format(TIMESTAMP_FORMAT)
        );
        let path = self.pending_dir.join(file_name);

        let mut contents = String::with_capacity(self.accumulated_size());
        contents.push_str(&self.header);
        for record in &self.records {
            contents.push_str(record.as_str());
        }
        contents.push_str(FOOTER);

        // Excludes an upload pass running in another process
        let written = DirLock::acquire(&self.pending_dir)
            .and_then(|_lock| write_new_file(&path, contents.as_bytes()));
        if let Err(source) = written {
            error!("Error while writing GSM/GPS log to {}: {}", path.display(), source);
            self.events.publish(LoggerEvent::FlushFailed {
                reason: source.to_string(),
            });
            return Err(LoggerError::FlushWrite { path, source });
        }

        let records = self.records.len();
        info!("Wrote {} record(s), {} bytes to {}", records, contents.len(), path.display());
        self.records.clear();
        self.records_bytes = 0;
        self.events.publish(LoggerEvent::Flushed {
            path: path.clone(),
            records,
        });

        Ok(FlushResult::Written {
            path,
            records,
            bytes: contents.len(),
        })
    }
}

/// Create `path` (which must not exist yet) and write `contents` to it
fn write_new_file(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    let mut file = OpenOptions::new().write(true).create_new(true).open(path)?;
    let result = file.write_all(contents).and_then(|_| file.sync_all());
    if result.is_err() {
        drop(file);
        // Best effort, the original error is what matters
        let _ = fs::remove_file(path);
    }
    result
}
