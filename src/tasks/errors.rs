//! # Task Error Classification
//!
//! Every handler failure is either permanent ([`TaskError::SkipRetry`], the
//! message is archived immediately) or retryable ([`TaskError::Retry`], the
//! queue redelivers it after a backoff until attempts run out).
//!
//! | Failure | Class |
//! |---|---|
//! | payload does not deserialize | permanent |
//! | referenced user/payment/order missing | permanent |
//! | store connectivity, timeout, pool | retryable |
//! | mail delivery | retryable |

use std::time::Duration;

use thiserror::Error;

use crate::error::CommerceError;
use crate::notifications::MailError;
use crate::state_machine::TaskState;

#[derive(Debug, Error)]
pub enum TaskError {
    #[error("Permanent task failure: {0}")]
    SkipRetry(String),

    #[error("Retryable task failure: {0}")]
    Retry(String),
}

impl TaskError {
    pub fn skip_retry(message: impl Into<String>) -> Self {
        Self::SkipRetry(message.into())
    }

    pub fn retry(message: impl Into<String>) -> Self {
        Self::Retry(message.into())
    }

    pub fn is_permanent(&self) -> bool {
        matches!(self, Self::SkipRetry(_))
    }
}

impl From<CommerceError> for TaskError {
    fn from(err: CommerceError) -> Self {
        match err {
            CommerceError::NotFound { .. } | CommerceError::Validation(_) => {
                Self::SkipRetry(err.to_string())
            }
            other => Self::Retry(other.to_string()),
        }
    }
}

impl From<MailError> for TaskError {
    fn from(err: MailError) -> Self {
        Self::Retry(format!("mail delivery failed: {err}"))
    }
}

impl From<serde_json::Error> for TaskError {
    fn from(err: serde_json::Error) -> Self {
        Self::SkipRetry(format!("invalid task payload: {err}"))
    }
}

/// What the processor did with one received message
#[derive(Debug, Clone, PartialEq)]
pub enum TaskDisposition {
    /// Handler succeeded; message deleted
    Completed,
    /// Handler failed transiently; message hidden for `delay` before attempt `attempt + 1`
    Retrying { attempt: u32, delay: Duration },
    /// Retry budget exhausted; message archived
    DeadLettered { attempts: u32 },
    /// Permanent failure, unknown type or malformed envelope; message archived
    Skipped { reason: String },
}

impl TaskDisposition {
    pub fn state(&self) -> TaskState {
        match self {
            Self::Completed => TaskState::Completed,
            Self::Retrying { .. } => TaskState::Retrying,
            Self::DeadLettered { .. } => TaskState::DeadLettered,
            Self::Skipped { .. } => TaskState::Skipped,
        }
    }
}
