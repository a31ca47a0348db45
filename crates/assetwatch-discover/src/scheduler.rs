//! Scan scheduling engine.
//!
//! Owns a single recurring scan job, keyed by [`SCAN_JOB_ID`]. The job is
//! armed from the persisted [`ScanConfiguration`] on start and re-armed by
//! [`ScanScheduler::reconcile`] after every configuration write, so there is
//! never more than one timer loop.
//!
//! [`ScanConfiguration`]: assetwatch_core::ScanConfiguration

use std::sync::Arc;
use std::time::Duration;

use assetwatch_core::{DiscoveryStore, StoreResult};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::orchestrator::{ScanOrchestrator, ScanReport};
use crate::range;

/// Identifier of the recurring scan job.
pub const SCAN_JOB_ID: &str = "assetwatch-recurring-scan";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Stopped,
    /// Running, with no recurring job armed.
    Idle,
    Scheduled { interval: Duration },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobInfo {
    pub id: &'static str,
    pub interval: Duration,
}

/// What one firing of the job did.
#[derive(Debug)]
pub enum FireOutcome {
    Completed(ScanReport),
    Skipped(&'static str),
    Failed(String),
}

/// The body of the recurring job.
pub struct ScanJob {
    store: Arc<dyn DiscoveryStore>,
    orchestrator: Arc<ScanOrchestrator>,
    /// Held for the whole of a firing; shared across re-arms.
    in_flight: Mutex<()>,
}

impl ScanJob {
    pub fn new(store: Arc<dyn DiscoveryStore>, orchestrator: Arc<ScanOrchestrator>) -> Self {
        Self {
            store,
            orchestrator,
            in_flight: Mutex::new(()),
        }
    }

    /// Run one firing. Configuration is read fresh every time.
    ///
    /// Skipped while an earlier firing, possibly from a replaced timer, is
    /// still running.
    pub async fn fire(&self) -> FireOutcome {
        let Ok(_running) = self.in_flight.try_lock() else {
            tracing::warn!(job = SCAN_JOB_ID, "Previous scan still running, skipping");
            return FireOutcome::Skipped("previous firing still running");
        };

        let config = match self.store.get_scan_configuration().await {
            Ok(c) => c,
            Err(e) => {
                tracing::error!(job = SCAN_JOB_ID, error = %e, "Could not load scan configuration");
                return FireOutcome::Failed(e.to_string());
            }
        };

        if !config.enabled {
            tracing::info!(job = SCAN_JOB_ID, "Recurring scan disabled, skipping");
            return FireOutcome::Skipped("disabled");
        }
        let Some(ranges) = config.ranges() else {
            tracing::info!(job = SCAN_JOB_ID, "No address ranges configured, skipping");
            return FireOutcome::Skipped("no ranges");
        };

        let addresses = range::expand(ranges);
        if addresses.is_empty() {
            tracing::warn!(job = SCAN_JOB_ID, ranges = %ranges, "Configured ranges yield no addresses");
            return FireOutcome::Skipped("no valid addresses");
        }

        tracing::info!(job = SCAN_JOB_ID, addresses = addresses.len(), "Scheduled scan triggered");
        FireOutcome::Completed(self.orchestrator.run_scan(addresses).await)
    }
}

struct ScheduledJob {
    interval: Duration,
    handle: JoinHandle<()>,
}

#[derive(Default)]
struct Slot {
    running: bool,
    job: Option<ScheduledJob>,
}

impl Slot {
    fn clear(&mut self) {
        if let Some(job) = self.job.take() {
            job.handle.abort();
            tracing::info!(job = SCAN_JOB_ID, "Recurring scan removed");
        }
    }

    fn state(&self) -> SchedulerState {
        match (&self.job, self.running) {
            (_, false) => SchedulerState::Stopped,
            (Some(job), true) => SchedulerState::Scheduled {
                interval: job.interval,
            },
            (None, true) => SchedulerState::Idle,
        }
    }
}

pub struct ScanScheduler {
    slot: Mutex<Slot>,
    job: Arc<ScanJob>,
    store: Arc<dyn DiscoveryStore>,
    initial_delay: Duration,
}

impl ScanScheduler {
    pub fn new(
        store: Arc<dyn DiscoveryStore>,
        orchestrator: Arc<ScanOrchestrator>,
        initial_delay: Duration,
    ) -> Self {
        Self {
            slot: Mutex::new(Slot::default()),
            job: Arc::new(ScanJob::new(store.clone(), orchestrator)),
            store,
            initial_delay,
        }
    }

    /// Start the scheduler and arm the job from the persisted configuration.
    pub async fn start(&self) -> StoreResult<SchedulerState> {
        let mut slot = self.slot.lock().await;
        slot.running = true;
        tracing::info!("Scheduler started");
        self.rearm(&mut slot).await
    }

    /// Remove the job and stop. Idempotent.
    pub async fn stop(&self) {
        let mut slot = self.slot.lock().await;
        slot.clear();
        if slot.running {
            slot.running = false;
            tracing::info!("Scheduler stopped");
        }
    }

    /// Replace the job with one matching the current configuration.
    ///
    /// A no-op while stopped. The existing job is always removed, even when
    /// the configuration then cannot be read.
    pub async fn reconcile(&self) -> StoreResult<SchedulerState> {
        let mut slot = self.slot.lock().await;
        if !slot.running {
            return Ok(SchedulerState::Stopped);
        }
        self.rearm(&mut slot).await
    }

    pub async fn state(&self) -> SchedulerState {
        self.slot.lock().await.state()
    }

    pub async fn job(&self) -> Option<JobInfo> {
        self.slot.lock().await.job.as_ref().map(|j| JobInfo {
            id: SCAN_JOB_ID,
            interval: j.interval,
        })
    }

    async fn rearm(&self, slot: &mut Slot) -> StoreResult<SchedulerState> {
        slot.clear();

        let config = self.store.get_scan_configuration().await?;

        if let Some(interval) = config.recurring_interval() {
            let handle = spawn_timer(self.job.clone(), interval, self.initial_delay);
            slot.job = Some(ScheduledJob { interval, handle });
            tracing::info!(
                job = SCAN_JOB_ID,
                interval_minutes = config.interval_minutes,
                initial_delay_secs = self.initial_delay.as_secs(),
                "Recurring scan armed"
            );
        } else {
            tracing::info!(
                job = SCAN_JOB_ID,
                enabled = config.enabled,
                interval_minutes = config.interval_minutes,
                "No recurring scan"
            );
        }

        Ok(slot.state())
    }
}

impl Drop for ScanScheduler {
    fn drop(&mut self) {
        if let Ok(mut slot) = self.slot.try_lock() {
            slot.clear();
        }
    }
}

/// Timer loop: wait `initial_delay`, then fire every `interval`.
///
/// Each firing runs in its own task, so a panic is logged and the loop keeps
/// going. Aborting the loop does not cancel a firing already in flight; the
/// next timer skips its firings until that one finishes.
fn spawn_timer(job: Arc<ScanJob>, interval: Duration, initial_delay: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        tokio::time::sleep(initial_delay).await;

        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;

            let job = job.clone();
            match tokio::spawn(async move { job.fire().await }).await {
                Ok(FireOutcome::Completed(report)) => {
                    tracing::debug!(job = SCAN_JOB_ID, live = report.live(), "Firing finished");
                }
                Ok(FireOutcome::Skipped(reason)) => {
                    tracing::debug!(job = SCAN_JOB_ID, reason, "Firing skipped");
                }
                Ok(FireOutcome::Failed(error)) => {
                    tracing::warn!(job = SCAN_JOB_ID, error = %error, "Firing failed");
                }
                Err(e) => {
                    tracing::error!(job = SCAN_JOB_ID, error = %e, "Scheduled scan panicked");
                }
            }
        }
    })
}
