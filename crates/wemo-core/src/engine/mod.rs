//! Scheduler engine
//!
//! The SchedulerEngine is responsible for:
//! - Reloading jobs from the ScheduleStore on every tick
//! - Resolving fixed and solar-anchored trigger times
//! - Firing each job at most once per calendar day
//! - Persisting the fire date after a successful action
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────────┐      ┌──────────────┐
//! │ ScheduleStore │◄────►│              │◄──── Clock
//! └───────────────┘      │ Scheduler    │
//! ┌───────────────┐      │ Engine       │───► Events
//! │  SolarTimes   │─────►│              │
//! └───────────────┘      └──────────────┘
//!                               │
//!                               ▼
//!                      ┌─────────────────┐
//!                      │ DeviceDirectory │ (resolve, rediscover)
//!                      └─────────────────┘
//! ```
//!
//! ## Tick Flow
//!
//! 1. Reload jobs (a load failure ends the tick)
//! 2. Fetch solar times only if an eligible job needs them
//! 3. Evaluate each job against the clock and its effective fire date
//! 4. Resolve the device, rediscovering at most once per tick
//! 5. Run the action under a timeout
//! 6. On success, record the date in the overlay and persist it
//!
//! ## Fired Overlay
//!
//! The engine remembers which jobs it fired today. A job whose write-back
//! failed is still treated as fired, and later ticks retry the write until
//! the stored date catches up.

use chrono::NaiveDate;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{MissedTickBehavior, timeout};
use tracing::{debug, error, info, warn};

use crate::clock::Clock;
use crate::config::SchedulerConfig;
use crate::error::{Error, Result};
use crate::schedule::{Action, Evaluation, Job};
use crate::traits::{DeviceDirectory, DeviceHandle, ScheduleStore, SolarTimes};

/// Events emitted by the SchedulerEngine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    /// Engine started
    Started { jobs: usize },

    /// Action succeeded and the job counts as fired today
    JobFired {
        job_id: String,
        device: String,
        action: Action,
    },

    /// Action failed or timed out; the job stays unfired
    ActionFailed {
        job_id: String,
        device: String,
        error: String,
    },

    /// Device unknown even after rediscovery
    DeviceNotFound { job_id: String, device: String },

    /// Fire date could not be written back
    PersistFailed { job_id: String, error: String },

    /// Jobs could not be loaded; the whole tick was skipped
    TickFailed { error: String },

    /// Engine stopped
    Stopped { reason: String },
}

/// Counters for one tick
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    /// Jobs loaded
    pub jobs: usize,
    /// Actions that succeeded
    pub fired: usize,
    /// Actions that failed or timed out
    pub failed: usize,
    /// Solar-anchored jobs skipped for lack of solar times
    pub skipped_solar: usize,
    /// Due jobs whose device could not be resolved
    pub missing_devices: usize,
    /// Write-backs that failed (new fires and retries)
    pub persist_failures: usize,
    /// A rediscovery pass ran during this tick
    pub rediscovered: bool,
}

/// Time-driven job scheduler
///
/// ## Lifecycle
///
/// 1. Create with [`SchedulerEngine::new()`]
/// 2. Start with [`SchedulerEngine::run()`], or drive [`SchedulerEngine::tick()`] directly
/// 3. The loop runs until the shutdown signal arrives; a tick in progress completes first
pub struct SchedulerEngine {
    store: Arc<dyn ScheduleStore>,
    devices: Arc<dyn DeviceDirectory>,
    solar: Arc<dyn SolarTimes>,
    clock: Arc<dyn Clock>,

    tick_interval: Duration,
    action_timeout: Duration,

    /// Job id -> date fired by this engine
    fired: Mutex<HashMap<String, NaiveDate>>,

    event_tx: mpsc::Sender<EngineEvent>,
}

impl SchedulerEngine {
    /// Create a new scheduler engine
    ///
    /// # Parameters
    ///
    /// - `store`: Job source and fire-date sink
    /// - `devices`: Name-to-handle resolution and rediscovery
    /// - `solar`: Today's sunrise/sunset
    /// - `clock`: Local wall clock
    /// - `config`: Tick interval, action timeout, event channel capacity
    ///
    /// # Returns
    ///
    /// A tuple of (engine, event_receiver) where event_receiver yields engine events
    pub fn new(
        store: Arc<dyn ScheduleStore>,
        devices: Arc<dyn DeviceDirectory>,
        solar: Arc<dyn SolarTimes>,
        clock: Arc<dyn Clock>,
        config: &SchedulerConfig,
    ) -> Result<(Self, mpsc::Receiver<EngineEvent>)> {
        config.validate()?;

        let (tx, rx) = mpsc::channel(config.event_channel_capacity);

        let engine = Self {
            store,
            devices,
            solar,
            clock,
            tick_interval: config.tick_interval(),
            action_timeout: config.action_timeout(),
            fired: Mutex::new(HashMap::new()),
            event_tx: tx,
        };

        Ok((engine, rx))
    }

    /// Run the tick loop until Ctrl-C
    ///
    /// # Returns
    ///
    /// - `Ok(())`: Clean shutdown
    /// - `Err(Error)`: Fatal error
    pub async fn run(&self) -> Result<()> {
        self.run_internal(None).await
    }

    /// Run the tick loop until `shutdown_rx` fires (or its sender is dropped)
    ///
    /// Used by tests and by the daemon, which owns signal handling itself.
    pub async fn run_with_shutdown(&self, shutdown_rx: Option<oneshot::Receiver<()>>) -> Result<()> {
        self.run_internal(shutdown_rx).await
    }

    async fn run_internal(&self, shutdown_rx: Option<oneshot::Receiver<()>>) -> Result<()> {
        let jobs = match self.store.load_jobs().await {
            Ok(jobs) => jobs.len(),
            Err(e) => {
                warn!("Cannot load jobs at startup: {}", e);
                0
            }
        };
        info!(
            "Scheduler started with {} jobs, ticking every {:?}",
            jobs, self.tick_interval
        );
        self.emit_event(EngineEvent::Started { jobs });

        let shutdown = async move {
            match shutdown_rx {
                Some(rx) => {
                    let _ = rx.await;
                }
                None => {
                    if let Err(e) = tokio::signal::ctrl_c().await {
                        error!("Cannot listen for Ctrl-C: {}", e);
                        std::future::pending::<()>().await;
                    }
                }
            }
        };
        tokio::pin!(shutdown);

        let mut ticker = tokio::time::interval(self.tick_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;

                _ = &mut shutdown => {
                    info!("Shutdown signal received");
                    self.emit_event(EngineEvent::Stopped {
                        reason: "Shutdown signal".to_string(),
                    });
                    break;
                }

                _ = ticker.tick() => {
                    // Errors are already logged and emitted; the next tick retries
                    let _ = self.tick().await;
                }
            }
        }

        info!("Scheduler stopped");
        Ok(())
    }

    /// Evaluate every job once against the current clock
    ///
    /// # Returns
    ///
    /// - `Ok(TickReport)`: Jobs were loaded; per-job failures are counted, not returned
    /// - `Err(Error)`: Jobs could not be loaded
    pub async fn tick(&self) -> Result<TickReport> {
        let now = self.clock.now();
        let today = now.date();

        let jobs = match self.store.load_jobs().await {
            Ok(jobs) => jobs,
            Err(e) => {
                error!("Cannot load jobs, skipping tick: {}", e);
                self.emit_event(EngineEvent::TickFailed {
                    error: e.to_string(),
                });
                return Err(e);
            }
        };

        self.prune_overlay(today);

        let mut report = TickReport {
            jobs: jobs.len(),
            ..TickReport::default()
        };

        let weekday = chrono::Datelike::weekday(&today);
        let needs_solar = jobs
            .iter()
            .any(|job| job.runs_on(weekday) && job.trigger.needs_solar());
        let solar = if needs_solar {
            self.solar.solar_times().await
        } else {
            None
        };

        for job in &jobs {
            let overlay = self.overlay_date(&job.id);

            if let Some(date) = overlay
                && job.last_fired_date < Some(date)
            {
                debug!("Retrying write-back for job {}", job.id);
                self.persist(job, date, &mut report).await;
            }

            let last_fired = job.last_fired_date.max(overlay);
            match job.evaluate(now, last_fired, solar.as_ref()) {
                Evaluation::Due { trigger } => {
                    debug!("Job {} due at {}", job.id, trigger.format("%H:%M"));
                    self.fire(job, today, &mut report).await;
                }
                Evaluation::SolarUnavailable => report.skipped_solar += 1,
                Evaluation::WrongDay
                | Evaluation::NotDue { .. }
                | Evaluation::AlreadyFired { .. } => {}
            }
        }

        if report.skipped_solar > 0 {
            debug!(
                "Skipped {} solar jobs: solar times unavailable",
                report.skipped_solar
            );
        }

        Ok(report)
    }

    async fn fire(&self, job: &Job, today: NaiveDate, report: &mut TickReport) {
        let Some(device) = self.resolve_device(&job.device, report).await else {
            warn!("Job {}: device {:?} not found", job.id, job.device);
            report.missing_devices += 1;
            self.emit_event(EngineEvent::DeviceNotFound {
                job_id: job.id.clone(),
                device: job.device.clone(),
            });
            return;
        };

        let outcome = timeout(self.action_timeout, job.action.apply(device.as_ref()))
            .await
            .unwrap_or_else(|_| {
                Err(Error::timeout(format!(
                    "{} on {} exceeded {:?}",
                    job.action, job.device, self.action_timeout
                )))
            });

        match outcome {
            Ok(()) => {
                info!("Fired job {}: {} {}", job.id, job.device, job.action);
                report.fired += 1;
                self.record_fired(&job.id, today);
                self.emit_event(EngineEvent::JobFired {
                    job_id: job.id.clone(),
                    device: job.device.clone(),
                    action: job.action,
                });
                self.persist(job, today, report).await;
            }
            Err(e) => {
                warn!("Job {}: {} {} failed: {}", job.id, job.device, job.action, e);
                report.failed += 1;
                self.emit_event(EngineEvent::ActionFailed {
                    job_id: job.id.clone(),
                    device: job.device.clone(),
                    error: e.to_string(),
                });
            }
        }
    }

    /// Resolve by name, with one rediscovery per tick on a miss
    async fn resolve_device(
        &self,
        name: &str,
        report: &mut TickReport,
    ) -> Option<Arc<dyn DeviceHandle>> {
        if let Some(handle) = self.devices.resolve(name).await {
            return Some(handle);
        }

        if !report.rediscovered {
            report.rediscovered = true;
            info!("Device {:?} unknown, running rediscovery", name);
            if let Err(e) = self.devices.rediscover().await {
                warn!("Rediscovery failed: {}", e);
            }
        }

        self.devices.resolve(name).await
    }

    async fn persist(&self, job: &Job, date: NaiveDate, report: &mut TickReport) {
        if let Err(e) = self.store.mark_fired(&job.id, date).await {
            warn!("Cannot record fire of job {}: {}", job.id, e);
            report.persist_failures += 1;
            self.emit_event(EngineEvent::PersistFailed {
                job_id: job.id.clone(),
                error: e.to_string(),
            });
        }
    }

    fn overlay_date(&self, job_id: &str) -> Option<NaiveDate> {
        self.lock_fired().get(job_id).copied()
    }

    fn record_fired(&self, job_id: &str, date: NaiveDate) {
        self.lock_fired().insert(job_id.to_string(), date);
    }

    fn prune_overlay(&self, today: NaiveDate) {
        self.lock_fired().retain(|_, date| *date == today);
    }

    fn lock_fired(&self) -> std::sync::MutexGuard<'_, HashMap<String, NaiveDate>> {
        self.fired.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Emit an engine event
    ///
    /// Drops the event with a warning when the channel is full.
    fn emit_event(&self, event: EngineEvent) {
        if self.event_tx.try_send(event).is_err() {
            warn!("Event channel full, dropping event. Consider increasing event_channel_capacity.");
        }
    }
}
