mod in_memory;
mod pgmq;

pub use in_memory::{ArchivedMessage, InMemoryMessagingService};
pub use pgmq::PgmqMessagingService;
