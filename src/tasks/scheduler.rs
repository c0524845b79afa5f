//! Recurring job scheduling.
//!
//! Only the contract exists for now: [`DisabledScheduler`] validates jobs and
//! then refuses them, so callers can be wired against [`JobScheduler`] before a
//! cron-backed implementation lands.

use async_trait::async_trait;
use thiserror::Error;
use tracing::debug;

use super::envelope::TaskOptions;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SchedulerError {
    #[error("Recurring jobs are not supported: {0}")]
    Unsupported(String),

    #[error("Invalid recurring job {name}: {reason}")]
    InvalidJob { name: String, reason: String },
}

/// A task enqueued on a cron schedule
#[derive(Debug, Clone, PartialEq)]
pub struct RecurringJob {
    pub name: String,
    /// Five-field cron expression
    pub schedule: String,
    pub task_type: String,
    pub payload: serde_json::Value,
    pub options: TaskOptions,
}

impl RecurringJob {
    pub fn validate(&self) -> Result<(), SchedulerError> {
        let invalid = |reason: &str| SchedulerError::InvalidJob {
            name: self.name.clone(),
            reason: reason.to_string(),
        };

        if self.name.trim().is_empty() {
            return Err(invalid("name is empty"));
        }
        if self.task_type.trim().is_empty() {
            return Err(invalid("task_type is empty"));
        }
        if self.schedule.split_whitespace().count() != 5 {
            return Err(invalid("schedule must have five cron fields"));
        }
        Ok(())
    }
}

#[async_trait]
pub trait JobScheduler: Send + Sync + 'static {
    async fn register(&self, job: RecurringJob) -> Result<(), SchedulerError>;

    async fn unregister(&self, name: &str) -> Result<(), SchedulerError>;

    async fn start(&self) -> Result<(), SchedulerError>;

    /// Safe to call on a scheduler that never started
    async fn shutdown(&self) -> Result<(), SchedulerError>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DisabledScheduler;

#[async_trait]
impl JobScheduler for DisabledScheduler {
    async fn register(&self, job: RecurringJob) -> Result<(), SchedulerError> {
        job.validate()?;
        Err(SchedulerError::Unsupported(format!(
            "cannot register job {}",
            job.name
        )))
    }

    async fn unregister(&self, name: &str) -> Result<(), SchedulerError> {
        Err(SchedulerError::Unsupported(format!(
            "cannot unregister job {name}"
        )))
    }

    async fn start(&self) -> Result<(), SchedulerError> {
        Err(SchedulerError::Unsupported(
            "scheduler is disabled".to_string(),
        ))
    }

    async fn shutdown(&self) -> Result<(), SchedulerError> {
        debug!("Disabled scheduler shutdown");
        Ok(())
    }
}
