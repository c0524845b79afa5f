//! # Messaging
//!
//! Durable queue capability for background tasks.

pub mod errors;
pub mod service;

pub use errors::{MessagingError, MessagingResult};
pub use service::{
    ArchivedMessage, InMemoryMessagingService, MessageId, MessagingService, PgmqMessagingService,
    QueueHealthReport, QueueMessage, QueueStats, QueuedMessage, ReceiptHandle,
};
