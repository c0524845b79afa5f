//! # Messaging Service
//!
//! [`MessagingService`] abstracts the durable queue. Providers:
//!
//! - [`PgmqMessagingService`] - PostgreSQL pgmq extension, production
//! - [`InMemoryMessagingService`] - process-local queues for tests

pub mod providers;
pub mod traits;
pub mod types;

pub use providers::{ArchivedMessage, InMemoryMessagingService, PgmqMessagingService};
pub use traits::{MessagingService, QueueMessage};
pub use types::{MessageId, QueueHealthReport, QueueStats, QueuedMessage, ReceiptHandle};
