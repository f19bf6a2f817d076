//! Worker mode: host the scheduler until a shutdown signal arrives.

use std::sync::Arc;
use std::time::Duration;

use miette::Result;
use tokio::sync::watch;
use tracing::{info, warn};

use cadence_scheduler::{Scheduler, SchedulerConfig, SystemClock};

use crate::jobs::HeartbeatJob;

/// Settings for a worker process.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub max_concurrent: usize,
    pub job_timeout: Duration,
    pub tick: Duration,
    pub heartbeat_interval: chrono::Duration,
    /// Zero disables periodic status logging.
    pub status_interval: Duration,
}

impl WorkerConfig {
    fn scheduler_config(&self) -> SchedulerConfig {
        SchedulerConfig::new(self.max_concurrent, self.job_timeout).tick(self.tick)
    }
}

/// Build a scheduler with the built-in jobs registered.
pub async fn build_scheduler(config: &WorkerConfig) -> Result<Scheduler> {
    let scheduler = Scheduler::with_config(config.scheduler_config(), Arc::new(SystemClock))
        .map_err(|e| miette::miette!("{}", e))?;

    scheduler
        .register_immediate(Arc::new(HeartbeatJob::new()), config.heartbeat_interval)
        .await;

    Ok(scheduler)
}

/// Run the worker until ctrl-c, then drain running jobs and return.
pub async fn run(config: WorkerConfig) -> Result<()> {
    let scheduler = Arc::new(build_scheduler(&config).await?);

    // Create shutdown channel
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // Handle shutdown signals
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("received shutdown signal");
        let _ = shutdown_tx.send(true);
    });

    scheduler
        .start()
        .await
        .map_err(|e| miette::miette!("failed to start scheduler: {}", e))?;
    info!(
        jobs = scheduler.job_count().await,
        capacity = scheduler.capacity(),
        "worker started"
    );

    let reporter = spawn_status_reporter(
        Arc::clone(&scheduler),
        config.status_interval,
        shutdown_rx.clone(),
    );

    wait_for_shutdown(shutdown_rx).await;

    scheduler.stop().await;
    if let Some(reporter) = reporter {
        let _ = reporter.await;
    }

    info!("worker stopped");
    Ok(())
}

async fn wait_for_shutdown(mut shutdown_rx: watch::Receiver<bool>) {
    loop {
        if *shutdown_rx.borrow() {
            return;
        }
        if shutdown_rx.changed().await.is_err() {
            return;
        }
    }
}

fn spawn_status_reporter(
    scheduler: Arc<Scheduler>,
    interval: Duration,
    mut shutdown_rx: watch::Receiver<bool>,
) -> Option<tokio::task::JoinHandle<()>> {
    if interval.is_zero() {
        return None;
    }

    Some(tokio::spawn(async move {
        loop {
            tokio::select! {
                biased;

                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        break;
                    }
                }

                _ = tokio::time::sleep(interval) => {
                    log_status(&scheduler).await;
                }
            }
        }
    }))
}

/// Log the status snapshot as JSON, the same shape an HTTP status endpoint would return.
async fn log_status(scheduler: &Scheduler) {
    let status = scheduler.status().await;
    match serde_json::to_string(&status) {
        Ok(json) => info!(in_flight = scheduler.in_flight(), status = %json, "scheduler status"),
        Err(e) => warn!(error = %e, "failed to serialize scheduler status"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> WorkerConfig {
        WorkerConfig {
            max_concurrent: 2,
            job_timeout: Duration::from_secs(30),
            tick: Duration::from_secs(1),
            heartbeat_interval: chrono::Duration::seconds(60),
            status_interval: Duration::from_secs(5),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_build_scheduler_registers_heartbeat() {
        let scheduler = build_scheduler(&config()).await.unwrap();

        let status = scheduler.status().await;
        let heartbeat = status.get("heartbeat").expect("heartbeat registered");
        assert_eq!(heartbeat.interval, chrono::Duration::seconds(60));
        assert_eq!(scheduler.capacity(), 2);
        assert_eq!(scheduler.config().tick, Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_heartbeat_runs_once_started() {
        let scheduler = build_scheduler(&config()).await.unwrap();
        scheduler.start().await.unwrap();

        tokio::time::sleep(Duration::from_millis(100)).await;
        let heartbeat = scheduler.job_status("heartbeat").await.unwrap();
        assert!(heartbeat.last_run.is_some());

        scheduler.stop().await;
    }

    #[tokio::test]
    async fn test_invalid_config_is_reported() {
        let mut config = config();
        config.max_concurrent = 0;
        let err = build_scheduler(&config).await.err().expect("zero capacity rejected");
        assert!(err.to_string().contains("max_concurrent"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_status_reporter_stops_on_shutdown() {
        let scheduler = Arc::new(build_scheduler(&config()).await.unwrap());
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let reporter = spawn_status_reporter(scheduler, Duration::from_secs(5), shutdown_rx)
            .expect("reporter enabled");
        tokio::time::sleep(Duration::from_secs(12)).await;

        shutdown_tx.send(true).unwrap();
        reporter.await.unwrap();
    }

    #[tokio::test]
    async fn test_status_reporter_disabled_by_zero_interval() {
        let scheduler = Arc::new(build_scheduler(&config()).await.unwrap());
        let (_tx, rx) = watch::channel(false);
        assert!(spawn_status_reporter(scheduler, Duration::ZERO, rx).is_none());
    }
}
