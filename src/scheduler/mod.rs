//! # Scheduler Module
//!
//! Drives a [`Plugin`] periodically: `Idle -> Running -> (Idle | Running)`.
//!
//! Each tick holds the tick lock for its whole duration, so ticks never
//! overlap. [`Scheduler::stop`] never blocks: when a tick is in flight the
//! stop is recorded and applied by a deferred task as soon as the tick
//! releases the lock, before the next tick can start. A tick already in
//! progress always runs to completion.
//!
//! `start` and `stop` spawn tasks and must be called inside a Tokio runtime.

pub mod plugin;

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::Mutex as TickLock;
use tracing::{debug, info};

use crate::events::{EventBus, LoggerEvent};

pub use plugin::{Plugin, PluginRegistry};

/// Scheduler state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Idle,
    Running,
}

#[derive(Debug)]
struct Control {
    state: SchedulerState,
    /// Bumped on every start so a loop left over from a previous run exits
    generation: u64,
    stop_requested: bool,
}

#[derive(Debug)]
struct Shared {
    control: Mutex<Control>,
    tick_lock: TickLock<()>,
    events: EventBus,
}

impl Shared {
    fn control(&self) -> MutexGuard<'_, Control> {
        self.control.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Must be called with the tick lock held
    fn apply_stop(&self) {
        let was_running = {
            let mut control = self.control();
            control.stop_requested = false;
            std::mem::replace(&mut control.state, SchedulerState::Idle) == SchedulerState::Running
        };
        if was_running {
            info!("Scheduler stopped");
            self.events.publish(LoggerEvent::SchedulerStateChanged { running: false });
        }
    }

    fn should_tick(&self, generation: u64) -> bool {
        let control = self.control();
        control.state == SchedulerState::Running
            && control.generation == generation
            && !control.stop_requested
    }
}

/// Periodic driver for one plugin
pub struct Scheduler {
    plugin: Arc<dyn Plugin>,
    shared: Arc<Shared>,
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("plugin", &self.plugin.id())
            .field("state", &self.state())
            .finish()
    }
}

impl Scheduler {
    pub fn new(plugin: Arc<dyn Plugin>, events: EventBus) -> Self {
        Self {
            plugin,
            shared: Arc::new(Shared {
                control: Mutex::new(Control {
                    state: SchedulerState::Idle,
                    generation: 0,
                    stop_requested: false,
                }),
                tick_lock: TickLock::new(()),
                events,
            }),
        }
    }

    pub fn state(&self) -> SchedulerState {
        self.shared.control().state
    }

    /// True between a start and an applied stop
    pub fn is_running(&self) -> bool {
        self.state() == SchedulerState::Running
    }

    /// Begin periodic ticks. No-op when already running or while a tick
    /// holds the lock.
    pub fn start(&self) {
        let Ok(_tick) = self.shared.tick_lock.try_lock() else {
            debug!("Scheduler is locked, probably already running");
            return;
        };

        let generation = {
            let mut control = self.shared.control();
            if control.state == SchedulerState::Running {
                debug!("Scheduler is already running");
                return;
            }
            control.state = SchedulerState::Running;
            control.stop_requested = false;
            control.generation += 1;
            control.generation
        };

        let period = self.plugin.frequency();
        info!("Plugin '{}' scheduled every {:?}", self.plugin.id(), period);
        self.shared
            .events
            .publish(LoggerEvent::SchedulerStateChanged { running: true });

        let plugin = Arc::clone(&self.plugin);
        let shared = Arc::clone(&self.shared);
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(period).await;
                let _tick = shared.tick_lock.lock().await;
                if !shared.should_tick(generation) {
                    if shared.control().generation == generation {
                        shared.apply_stop();
                    }
                    debug!("Tick loop {} is stopping", generation);
                    break;
                }
                let started = tokio::time::Instant::now();
                plugin.do_iteration().await;
                debug!("Tick ended after {:?}, next in {:?}", started.elapsed(), period);
            }
        });
    }

    /// Request the ticks to stop without blocking the caller.
    pub fn stop(&self) {
        match self.shared.tick_lock.try_lock() {
            Ok(_tick) => {
                debug!("Scheduler locked by stop()");
                self.shared.apply_stop();
            }
            Err(_) => {
                info!("Scheduler currently locked, will retry stopping it later");
                self.shared.control().stop_requested = true;
                let shared = Arc::clone(&self.shared);
                tokio::spawn(async move {
                    let _tick = shared.tick_lock.lock().await;
                    if shared.control().stop_requested {
                        shared.apply_stop();
                    }
                });
            }
        }
    }

    /// Stop and wait for an in-flight tick to finish
    pub async fn stop_and_wait(&self) {
        let _tick = self.shared.tick_lock.lock().await;
        self.shared.apply_stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Result;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio::sync::Notify;

    const PERIOD: Duration = Duration::from_secs(10);

    #[derive(Default)]
    struct CountingPlugin {
        iterations: AtomicUsize,
        working: AtomicBool,
        block: AtomicBool,
        entered: Notify,
        release: Notify,
    }

    #[async_trait]
    impl Plugin for CountingPlugin {
        fn id(&self) -> &str {
            "counting"
        }
        fn description(&self) -> &str {
            "counts iterations"
        }
        fn version(&self) -> &str {
            "00.00.01"
        }
        async fn init(&self) -> Result<()> {
            Ok(())
        }
        fn is_working(&self) -> bool {
            self.working.load(Ordering::SeqCst)
        }
        async fn do_iteration(&self) {
            self.working.store(true, Ordering::SeqCst);
            self.iterations.fetch_add(1, Ordering::SeqCst);
            self.entered.notify_one();
            if self.block.load(Ordering::SeqCst) {
                self.release.notified().await;
            }
            self.working.store(false, Ordering::SeqCst);
        }
        fn frequency(&self) -> Duration {
            PERIOD
        }
    }

    fn scheduler() -> (Arc<CountingPlugin>, Scheduler) {
        let plugin = Arc::new(CountingPlugin::default());
        let scheduler = Scheduler::new(plugin.clone(), EventBus::default());
        (plugin, scheduler)
    }

    #[tokio::test(start_paused = true)]
    async fn test_ticks_at_interval() {
        let (plugin, scheduler) = scheduler();
        assert_eq!(scheduler.state(), SchedulerState::Idle);

        scheduler.start();
        assert!(scheduler.is_running());
        tokio::time::sleep(PERIOD * 3 + PERIOD / 2).await;

        assert_eq!(plugin.iterations.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_twice_is_noop() {
        let (plugin, scheduler) = scheduler();
        scheduler.start();
        scheduler.start();
        tokio::time::sleep(PERIOD * 2 + PERIOD / 2).await;

        assert_eq!(plugin.iterations.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_while_idle_applies_immediately() {
        let (plugin, scheduler) = scheduler();
        scheduler.start();
        scheduler.stop();
        assert!(!scheduler.is_running());

        tokio::time::sleep(PERIOD * 3).await;
        assert_eq!(plugin.iterations.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_during_tick_is_deferred() {
        let (plugin, scheduler) = scheduler();
        plugin.block.store(true, Ordering::SeqCst);

        scheduler.start();
        plugin.entered.notified().await;
        assert!(plugin.is_working());

        // Returns at once even though the tick holds the lock
        scheduler.stop();
        assert!(scheduler.is_running(), "stop is deferred while the tick runs");

        plugin.release.notify_one();
        tokio::time::sleep(PERIOD * 3).await;

        assert!(!scheduler.is_running());
        assert!(!plugin.is_working());
        assert_eq!(plugin.iterations.load(Ordering::SeqCst), 1, "no tick after the stop");
    }

    #[tokio::test(start_paused = true)]
    async fn test_restart_does_not_duplicate_loops() {
        let (plugin, scheduler) = scheduler();
        scheduler.start();
        scheduler.stop();
        scheduler.start();
        tokio::time::sleep(PERIOD * 2 + PERIOD / 2).await;

        assert_eq!(plugin.iterations.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_and_wait_lets_tick_finish() {
        let (plugin, scheduler) = scheduler();
        plugin.block.store(true, Ordering::SeqCst);
        scheduler.start();
        plugin.entered.notified().await;

        let releaser = {
            let plugin = Arc::clone(&plugin);
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_secs(1)).await;
                plugin.release.notify_one();
            })
        };
        scheduler.stop_and_wait().await;

        assert!(!plugin.is_working());
        assert!(!scheduler.is_running());
        releaser.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_state_changes_are_published() {
        let events = EventBus::default();
        let mut rx = events.subscribe();
        let scheduler = Scheduler::new(Arc::new(CountingPlugin::default()), events);

        scheduler.start();
        scheduler.stop();

        assert_eq!(rx.recv().await.unwrap(), LoggerEvent::SchedulerStateChanged { running: true });
        assert_eq!(rx.recv().await.unwrap(), LoggerEvent::SchedulerStateChanged { running: false });
    }
}
