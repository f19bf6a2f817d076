//! Scheduler facade and scheduling loop.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, Duration, Utc};
use tokio::sync::{Mutex, watch};
use tokio::task::{JoinError, JoinHandle};
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

use crate::registry::{Claim, Registry};
use crate::types::offset;
use crate::{
    Clock, Dispatch, Governor, Job, JobContext, JobError, JobStatus, Permit, SchedulerConfig,
    SchedulerError, SystemClock, Trigger,
};

/// Runs registered jobs on their intervals under a global concurrency budget.
///
/// Share it behind an `Arc` to trigger jobs or read status from elsewhere
/// (e.g. HTTP handlers) while it runs.
pub struct Scheduler {
    core: Arc<Core>,
    lifecycle: Mutex<Lifecycle>,
}

/// State shared between the facade, the scheduling loop and executions.
struct Core {
    config: SchedulerConfig,
    clock: Arc<dyn Clock>,
    registry: Registry,
    governor: Governor,
    executions: TaskTracker,
    stopped: AtomicBool,
}

enum Lifecycle {
    Idle,
    Running {
        shutdown_tx: watch::Sender<bool>,
        handle: JoinHandle<()>,
    },
    Stopped,
}

impl Scheduler {
    /// Create a scheduler on the system clock with the default tick.
    pub fn new(
        max_concurrent: usize,
        job_timeout: std::time::Duration,
    ) -> Result<Self, SchedulerError> {
        Self::with_config(
            SchedulerConfig::new(max_concurrent, job_timeout),
            Arc::new(SystemClock),
        )
    }

    /// Create a scheduler with explicit configuration and time source.
    pub fn with_config(
        config: SchedulerConfig,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, SchedulerError> {
        config.validate()?;

        let core = Core {
            governor: Governor::new(config.max_concurrent),
            config,
            clock,
            registry: Registry::default(),
            executions: TaskTracker::new(),
            stopped: AtomicBool::new(false),
        };

        Ok(Self {
            core: Arc::new(core),
            lifecycle: Mutex::new(Lifecycle::Idle),
        })
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.core.config
    }

    /// Register a job whose first run is one interval from now.
    pub async fn register(&self, job: Arc<dyn Job>, interval: Duration) {
        let next_run = offset(self.core.clock.now(), interval);
        self.insert(job, interval, next_run).await;
    }

    /// Register a job that is due on the next tick.
    pub async fn register_immediate(&self, job: Arc<dyn Job>, interval: Duration) {
        let next_run = self.core.clock.now();
        self.insert(job, interval, next_run).await;
    }

    async fn insert(&self, job: Arc<dyn Job>, interval: Duration, next_run: DateTime<Utc>) {
        let name = job.name().to_string();
        let replaced = self.core.registry.insert(job, interval, next_run).await;

        if replaced {
            warn!(job = %name, "replaced existing registration");
        }
        info!(
            job = %name,
            interval_secs = interval.num_seconds(),
            next_run = %next_run,
            "registered job"
        );
    }

    /// Launch the scheduling loop and return.
    ///
    /// Calling this again while running does nothing. A stopped scheduler
    /// cannot be restarted.
    #[tracing::instrument(skip(self))]
    pub async fn start(&self) -> Result<(), SchedulerError> {
        let mut lifecycle = self.lifecycle.lock().await;
        match *lifecycle {
            Lifecycle::Idle => {}
            Lifecycle::Running { .. } => {
                warn!("scheduler already running");
                return Ok(());
            }
            Lifecycle::Stopped => return Err(SchedulerError::Stopped),
        }

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(Arc::clone(&self.core).run(shutdown_rx));
        *lifecycle = Lifecycle::Running {
            shutdown_tx,
            handle,
        };

        Ok(())
    }

    /// Stop scheduling and wait for in-flight executions to finish.
    ///
    /// Running jobs are not cancelled; each can keep going until its own
    /// timeout, so this may take up to `job_timeout` to return.
    #[tracing::instrument(skip(self))]
    pub async fn stop(&self) {
        self.core.stopped.store(true, Ordering::SeqCst);
        let previous = {
            let mut lifecycle = self.lifecycle.lock().await;
            std::mem::replace(&mut *lifecycle, Lifecycle::Stopped)
        };

        if let Lifecycle::Running {
            shutdown_tx,
            handle,
        } = previous
        {
            let _ = shutdown_tx.send(true);
            if let Err(e) = handle.await {
                error!(error = %e, "scheduling loop ended abnormally");
            }
        }

        self.core.executions.close();
        let in_flight = self.core.executions.len();
        if in_flight > 0 {
            info!(in_flight, "waiting for running jobs to finish");
        }
        self.core.executions.wait().await;

        info!("scheduler stopped");
    }

    /// Run a job now, outside its schedule.
    ///
    /// If the job is already running nothing new is started and the result
    /// is `Ok(Dispatch::AlreadyRunning)`; likewise `Ok(Dispatch::AtCapacity)`
    /// when no slot is free. Neither is queued for later.
    #[tracing::instrument(skip(self))]
    pub async fn run_now(&self, name: &str) -> Result<Dispatch, SchedulerError> {
        if self.core.stopped.load(Ordering::SeqCst) {
            return Err(SchedulerError::Stopped);
        }

        match self.core.registry.is_running(name).await {
            None => return Err(SchedulerError::JobNotFound(name.to_string())),
            Some(true) => {
                info!(job = %name, "job already running, ignoring manual trigger");
                return Ok(Dispatch::AlreadyRunning);
            }
            Some(false) => {}
        }

        let dispatch = self.core.dispatch(name, Trigger::Manual).await?;
        if dispatch == Dispatch::AtCapacity {
            info!(job = %name, "no free slot, ignoring manual trigger");
        }
        Ok(dispatch)
    }

    /// Snapshot of every registered job's schedule, keyed by name.
    pub async fn status(&self) -> BTreeMap<String, JobStatus> {
        self.core.registry.snapshot().await
    }

    /// Snapshot of one job's schedule.
    pub async fn job_status(&self, name: &str) -> Option<JobStatus> {
        self.core.registry.get(name).await
    }

    pub async fn job_count(&self) -> usize {
        self.core.registry.len().await
    }

    /// Number of executions currently holding a concurrency slot.
    pub fn in_flight(&self) -> usize {
        self.core.governor.in_use()
    }

    pub fn capacity(&self) -> usize {
        self.core.governor.capacity()
    }
}

impl Core {
    /// The scheduling loop: one scan per tick until shutdown is signalled.
    async fn run(self: Arc<Self>, mut shutdown_rx: watch::Receiver<bool>) {
        info!(
            tick_ms = self.config.tick.as_millis() as u64,
            max_concurrent = self.config.max_concurrent,
            "scheduler starting"
        );

        let mut ticker = tokio::time::interval(self.config.tick);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;

                changed = shutdown_rx.changed() => {
                    if changed.is_err() || *shutdown_rx.borrow() {
                        info!("scheduler received shutdown signal");
                        break;
                    }
                }

                _ = ticker.tick() => {
                    self.tick().await;
                }
            }
        }

        info!("scheduling loop stopped");
    }

    async fn tick(self: &Arc<Self>) {
        let now = self.clock.now();
        let due = self.registry.due(now).await;
        if due.is_empty() {
            return;
        }

        debug!(count = due.len(), "found due jobs");
        for name in due {
            match self.dispatch(&name, Trigger::Schedule).await {
                Ok(Dispatch::AtCapacity) => {
                    debug!(job = %name, "no free slot, deferring to next tick");
                }
                Ok(_) => {}
                Err(e) => warn!(job = %name, error = %e, "failed to dispatch due job"),
            }
        }
    }

    /// Admit and launch one execution of `name`, never waiting for a slot.
    async fn dispatch(
        self: &Arc<Self>,
        name: &str,
        trigger: Trigger,
    ) -> Result<Dispatch, SchedulerError> {
        let Some(permit) = self.governor.try_acquire() else {
            return Ok(Dispatch::AtCapacity);
        };

        let job = match self.registry.claim(name).await {
            Claim::Claimed(job) => job,
            Claim::Busy => return Ok(Dispatch::AlreadyRunning),
            Claim::Missing => return Err(SchedulerError::JobNotFound(name.to_string())),
        };

        // Holding a tracker token keeps `stop` from finishing its drain between
        // this check and the spawn below.
        let _pending = self.executions.token();
        if self.stopped.load(Ordering::SeqCst) {
            self.registry.release(name).await;
            return Err(SchedulerError::Stopped);
        }

        self.executions.spawn(Arc::clone(self).execute(
            name.to_string(),
            job,
            permit,
            trigger,
        ));
        Ok(Dispatch::Started)
    }

    /// One execution: run the job, free its slot, then update its entry.
    async fn execute(
        self: Arc<Self>,
        name: String,
        job: Arc<dyn Job>,
        permit: Permit,
        trigger: Trigger,
    ) {
        let timeout = self.config.job_timeout;
        let ctx = JobContext::new(name.as_str(), trigger, timeout);

        info!(job = %name, %trigger, "starting job");
        let started = Instant::now();
        let result = run_isolated(job, ctx, timeout).await;
        let elapsed_ms = started.elapsed().as_millis() as u64;

        drop(permit);
        let completed_at = self.clock.now();
        if !self.registry.complete(&name, completed_at).await {
            warn!(job = %name, "finished job is no longer registered");
        }

        match result {
            Ok(()) => info!(job = %name, elapsed_ms, "job completed"),
            Err(e @ JobError::Panicked(_)) => {
                error!(job = %name, error = %e, elapsed_ms, "job panicked")
            }
            Err(e) => warn!(job = %name, error = %e, elapsed_ms, "job failed"),
        }
    }
}

/// Run the job on its own task so a panic cannot take the scheduler down,
/// cancelling and aborting it once the timeout passes.
async fn run_isolated(
    job: Arc<dyn Job>,
    ctx: JobContext,
    timeout: std::time::Duration,
) -> Result<(), JobError> {
    let watchdog = ctx.clone();
    let mut handle = tokio::spawn(async move { job.run(ctx).await });

    match tokio::time::timeout(timeout, &mut handle).await {
        Ok(Ok(result)) => result,
        Ok(Err(e)) => Err(JobError::Panicked(panic_message(e))),
        Err(_) => {
            watchdog.cancel();
            handle.abort();
            Err(JobError::TimedOut(timeout))
        }
    }
}

fn panic_message(e: JoinError) -> String {
    match e.try_into_panic() {
        Ok(payload) => payload
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "non-string panic payload".to_string()),
        Err(e) => e.to_string(),
    }
}
