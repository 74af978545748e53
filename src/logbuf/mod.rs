//! # Log Buffer Module
//!
//! Batches admitted samples into XML log files.
//!
//! This module handles:
//! - Serializing samples into immutable records
//! - Buffering records in memory with their accumulated size
//! - Deciding when to write a file (byte budget or record count,
//!   jurisdiction change, shutdown)
//! - Naming files by format version, country code and time
//!
//! The pending directory is shared with the uploader, so the buffer is
//! always used through a [`SharedLogBuffer`]: holding its lock excludes
//! both flushes and uploads of this process. Flushes and upload passes
//! additionally take the [`DirLock`] on the pending directory, which
//! excludes other processes.

pub mod buffer;
pub mod dirlock;
pub mod record;

use std::sync::Arc;
use tokio::sync::Mutex;

pub use buffer::{FlushPolicy, FlushResult, LogBuffer};
pub use dirlock::DirLock;
pub use record::{DeviceIdentity, LogRecord};

/// Version tag prefixed to every log file name
pub const FORMAT_VERSION: &str = "V2";

/// Log buffer behind the lock shared by the sampling tick and the uploader
pub type SharedLogBuffer = Arc<Mutex<LogBuffer>>;

/// Wrap a buffer for sharing
pub fn shared(buffer: LogBuffer) -> SharedLogBuffer {
    Arc::new(Mutex::new(buffer))
}
