//! # Cell Sampler
//!
//! The logging plugin: on every tick it reads the GPS and the radio,
//! decides whether the pair may be logged and appends the resulting record
//! to the shared log buffer.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{Local, NaiveDateTime};
use tracing::{debug, error, info, warn};

use crate::admission::{admit, Admission, SpeedLimits};
use crate::capability::ResourceLease;
use crate::error::Result;
use crate::events::{EventBus, LoggerEvent};
use crate::logbuf::{FlushResult, LogRecord, SharedLogBuffer};
use crate::position::PositionSource;
use crate::radio::RadioState;
use crate::scheduler::Plugin;

/// Resources leased at init
pub const LEASED_RESOURCES: [&str; 2] = ["GPS", "CPU"];

const PLUGIN_ID: &str = "cellLogger";
const PLUGIN_VERSION: &str = "00.01.00";

/// Wall-clock source for capture times
pub type Clock = Arc<dyn Fn() -> NaiveDateTime + Send + Sync>;

/// Periodic GPS + GSM sampler
pub struct CellSampler {
    radio: Arc<RadioState>,
    position: PositionSource,
    buffer: SharedLogBuffer,
    limits: SpeedLimits,
    frequency: Duration,
    lease: Arc<dyn ResourceLease>,
    directories: Vec<PathBuf>,
    events: EventBus,
    clock: Clock,
    working: AtomicBool,
}

impl std::fmt::Debug for CellSampler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CellSampler")
            .field("limits", &self.limits)
            .field("frequency", &self.frequency)
            .field("directories", &self.directories)
            .finish_non_exhaustive()
    }
}

impl CellSampler {
    pub fn new(
        radio: Arc<RadioState>,
        position: PositionSource,
        buffer: SharedLogBuffer,
        limits: SpeedLimits,
        frequency: Duration,
        lease: Arc<dyn ResourceLease>,
        events: EventBus,
    ) -> Self {
        Self {
            radio,
            position,
            buffer,
            limits,
            frequency,
            lease,
            directories: Vec::new(),
            events,
            clock: Arc::new(|| Local::now().naive_local()),
            working: AtomicBool::new(false),
        }
    }

    /// Directories created by `init`
    pub fn with_directories(mut self, directories: Vec<PathBuf>) -> Self {
        self.directories = directories;
        self
    }

    /// Replace the capture-time source
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    /// Sample once and buffer the record if admitted.
    ///
    /// Returns the admission decision. Only a failed forced flush (on a
    /// jurisdiction change) is reported as an error.
    pub async fn run_cycle(&self) -> Result<Admission> {
        let captured_at = (self.clock)();
        let position = self.position.sample();
        let radio = self.radio.read();

        let admission = admit(&position, &radio, self.limits);
        match (admission, radio.serving.as_ref()) {
            (Admission::Admitted, Some(serving)) => {
                let record = LogRecord::new(captured_at, &position, serving, &radio.neighbours);
                debug!("Admitted sample: {}", record.as_str().trim_end());
                let mcc = serving.mcc.clone();
                self.buffer.lock().await.append(record)?;
                self.events.publish(LoggerEvent::SampleLogged { mcc });
            }
            (Admission::Rejected(rejection), _) => {
                info!("Sample not logged: {}", rejection);
                self.events.publish(LoggerEvent::SampleRejected(rejection));
            }
            (Admission::Admitted, None) => {
                // admit() never passes a snapshot without a serving cell
                warn!("Admitted sample without serving cell ignored");
            }
        }
        Ok(admission)
    }

    /// Write whatever is buffered, regardless of the flush policy
    pub async fn shutdown_flush(&self) -> Result<FlushResult> {
        info!("Flushing buffered records before exit");
        self.buffer.lock().await.flush()
    }
}

#[async_trait]
impl Plugin for CellSampler {
    fn id(&self) -> &str {
        PLUGIN_ID
    }

    fn description(&self) -> &str {
        "Logs the GSM serving and neighbour cells together with the GPS fix"
    }

    fn version(&self) -> &str {
        PLUGIN_VERSION
    }

    async fn init(&self) -> Result<()> {
        for resource in LEASED_RESOURCES {
            match self.lease.request_resource(resource) {
                Ok(()) => info!("{} resource successfully requested", resource),
                Err(e) => error!("Error requesting the {} resource: {}", resource, e),
            }
        }
        for dir in &self.directories {
            std::fs::create_dir_all(dir)?;
            debug!("Directory ready: {}", dir.display());
        }
        Ok(())
    }

    fn is_working(&self) -> bool {
        self.working.load(Ordering::SeqCst)
    }

    async fn do_iteration(&self) {
        self.working.store(true, Ordering::SeqCst);
        let started = Instant::now();
        if let Err(e) = self.run_cycle().await {
            error!("Logging cycle failed: {}", e);
        }
        debug!("Logging cycle took {:?}", started.elapsed());
        self.working.store(false, Ordering::SeqCst);
    }

    fn frequency(&self) -> Duration {
        self.frequency
    }
}
