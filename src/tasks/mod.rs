//! # Background Tasks
//!
//! Enqueue side ([`TaskDistributor`]), consume side ([`TaskProcessor`]) and the
//! built-in handlers for verification and order-confirmation mail.

pub mod distributor;
pub mod envelope;
pub mod errors;
pub mod handler;
pub mod handlers;
pub mod processor;
pub mod scheduler;

pub use distributor::{EnqueuedTask, TaskDistributor, TaskPublisher};
pub use envelope::{OrderConfirmationPayload, TaskEnvelope, TaskOptions, VerifyEmailPayload};
pub use errors::{TaskDisposition, TaskError};
pub use handler::{HandlerRegistry, TaskHandler};
pub use handlers::{OrderConfirmationHandler, VerifyEmailHandler};
pub use processor::{ProcessedTask, ProcessorConfig, TaskProcessor};
pub use scheduler::{DisabledScheduler, JobScheduler, RecurringJob, SchedulerError};
