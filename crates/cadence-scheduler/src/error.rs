//! Error types for the scheduler.

use std::time::Duration;

use thiserror::Error;

/// Errors returned by scheduler operations.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// No job is registered under this name.
    #[error("job not found: {0}")]
    JobNotFound(String),

    /// Invalid scheduler configuration.
    #[error("invalid scheduler configuration: {0}")]
    InvalidConfig(String),

    /// The scheduler has been stopped and cannot accept new work.
    #[error("scheduler has been stopped")]
    Stopped,
}

/// Errors a job execution can end with.
///
/// None of these are fatal to the scheduler: they are logged and the job
/// simply waits for its next interval.
#[derive(Debug, Error)]
pub enum JobError {
    /// The job reported a failure.
    #[error("job execution failed: {0}")]
    Failed(String),

    /// The job observed cancellation and gave up.
    #[error("job was cancelled")]
    Cancelled,

    /// The job did not finish within the configured timeout.
    #[error("job timed out after {0:?}")]
    TimedOut(Duration),

    /// The job panicked.
    #[error("job panicked: {0}")]
    Panicked(String),

    /// Any other error raised by the job body.
    #[error(transparent)]
    Other(#[from] Box<dyn std::error::Error + Send + Sync>),
}

impl JobError {
    /// Build a [`JobError::Failed`] from anything displayable.
    pub fn failed(message: impl std::fmt::Display) -> Self {
        Self::Failed(message.to_string())
    }
}
