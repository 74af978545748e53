//! # Logger Events
//!
//! Publish/subscribe channel for state changes that views or the CLI may
//! want to react to (radio validity, logged samples, flushes, uploads).
//!
//! Delivery is best-effort: the channel is a bounded
//! [`tokio::sync::broadcast`] queue, a subscriber that falls behind loses
//! the oldest events and sees a `Lagged` error on its next receive.
//! Publishing never blocks and never fails when nobody listens.

use std::path::PathBuf;
use tokio::sync::broadcast;
use tracing::trace;

use crate::admission::Rejection;

/// Default number of events buffered per subscriber
pub const DEFAULT_EVENT_CAPACITY: usize = 64;

/// Something observable happened in the logger
#[derive(Debug, Clone, PartialEq)]
pub enum LoggerEvent {
    /// A radio notification was applied
    RadioUpdated { valid: bool },
    /// A radio notification handler failed and invalidated the snapshot
    RadioHandlerFailed { reason: String },
    /// A sample passed admission and was appended to the buffer
    SampleLogged { mcc: String },
    /// A sample was rejected
    SampleRejected(Rejection),
    /// Buffered records were written to a file
    Flushed { path: PathBuf, records: usize },
    /// Writing buffered records failed, records kept in memory
    FlushFailed { reason: String },
    /// The scheduler started or stopped
    SchedulerStateChanged { running: bool },
    /// An upload pass ended
    UploadFinished {
        all_succeeded: bool,
        uploaded: usize,
        total: usize,
    },
}

/// Cloneable handle to the event channel
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<LoggerEvent>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_CAPACITY)
    }
}

impl EventBus {
    /// Create a bus buffering up to `capacity` events per subscriber
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Register a new subscriber; it only sees events published afterwards
    pub fn subscribe(&self) -> broadcast::Receiver<LoggerEvent> {
        self.sender.subscribe()
    }

    /// Publish an event to every current subscriber
    pub fn publish(&self, event: LoggerEvent) {
        trace!("Publishing {:?}", event);
        // No subscribers is not an error
        let _ = self.sender.send(event);
    }

    /// Number of live subscribers
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}
