//! Cadence: recurring maintenance worker
//!
//! Main binary with subcommands:
//! - `worker`: Run the scheduler with the built-in maintenance jobs until ctrl-c

use clap::{Parser, Subcommand};
use miette::Result;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod jobs;
mod worker;

/// Largest interval, in seconds, that a `chrono::Duration` can hold.
const MAX_INTERVAL_SECS: i64 = i64::MAX / 1000;

#[derive(Parser)]
#[command(name = "cadence")]
#[command(about = "Recurring maintenance job worker", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the worker (scheduler plus built-in jobs)
    Worker {
        /// Maximum number of jobs running at once
        #[arg(long, env = "CADENCE_MAX_CONCURRENT", default_value = "4")]
        max_concurrent: usize,

        /// Per-execution timeout in seconds
        #[arg(long, env = "CADENCE_JOB_TIMEOUT_SECS", default_value = "300")]
        job_timeout_secs: u64,

        /// How often the scheduler checks for due jobs, in milliseconds
        #[arg(long, env = "CADENCE_TICK_MILLIS", default_value = "1000")]
        tick_millis: u64,

        /// Heartbeat job interval in seconds
        #[arg(
            long,
            env = "CADENCE_HEARTBEAT_INTERVAL_SECS",
            default_value = "60",
            value_parser = clap::value_parser!(i64).range(0..=MAX_INTERVAL_SECS)
        )]
        heartbeat_interval_secs: i64,

        /// How often to log the scheduler status snapshot, in seconds (0 disables)
        #[arg(long, env = "CADENCE_STATUS_INTERVAL_SECS", default_value = "300")]
        status_interval_secs: u64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG")
                .unwrap_or_else(|_| "cadence=info,cadence_scheduler=info".to_string()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Worker {
            max_concurrent,
            job_timeout_secs,
            tick_millis,
            heartbeat_interval_secs,
            status_interval_secs,
        } => {
            let config = worker::WorkerConfig {
                max_concurrent,
                job_timeout: std::time::Duration::from_secs(job_timeout_secs),
                tick: std::time::Duration::from_millis(tick_millis),
                heartbeat_interval: heartbeat_interval(heartbeat_interval_secs)?,
                status_interval: std::time::Duration::from_secs(status_interval_secs),
            };
            worker::run(config).await
        }
    }
}

fn heartbeat_interval(secs: i64) -> Result<chrono::Duration> {
    chrono::Duration::try_seconds(secs)
        .ok_or_else(|| miette::miette!("heartbeat interval out of range: {} seconds", secs))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_worker_defaults() {
        let cli = Cli::try_parse_from(["cadence", "worker"]).unwrap();
        let Commands::Worker {
            max_concurrent,
            job_timeout_secs,
            tick_millis,
            heartbeat_interval_secs,
            status_interval_secs,
        } = cli.command;
        assert_eq!(max_concurrent, 4);
        assert_eq!(job_timeout_secs, 300);
        assert_eq!(tick_millis, 1000);
        assert_eq!(heartbeat_interval_secs, 60);
        assert_eq!(status_interval_secs, 300);
    }

    #[test]
    fn test_worker_flags_override_defaults() {
        let cli = Cli::try_parse_from([
            "cadence",
            "worker",
            "--max-concurrent",
            "8",
            "--tick-millis",
            "250",
        ])
        .unwrap();
        let Commands::Worker {
            max_concurrent,
            tick_millis,
            ..
        } = cli.command;
        assert_eq!(max_concurrent, 8);
        assert_eq!(tick_millis, 250);
    }

    #[test]
    fn test_out_of_range_heartbeat_interval_rejected() {
        let result = Cli::try_parse_from([
            "cadence",
            "worker",
            "--heartbeat-interval-secs",
            "9223372036854775807",
        ]);
        assert!(result.is_err());

        let result = Cli::try_parse_from(["cadence", "worker", "--heartbeat-interval-secs", "-5"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_heartbeat_interval_conversion() {
        assert_eq!(
            heartbeat_interval(60).unwrap(),
            chrono::Duration::seconds(60)
        );
        assert!(heartbeat_interval(MAX_INTERVAL_SECS).is_ok());
        assert!(heartbeat_interval(i64::MAX).is_err());
        assert!(heartbeat_interval(i64::MIN).is_err());
    }
}
