//! # Database Layer
//!
//! Connection pools, the store capability traits, and their PostgreSQL and
//! in-memory implementations.
//!
//! - [`connection`] - pool creation with bounded startup retry
//! - [`store`] - [`CommerceStore`] / [`CommerceTx`] capabilities
//! - [`postgres`] - PostgreSQL store over the `models` queries
//! - [`memory`] - in-memory store with fault injection for tests
//! - [`transaction`] - [`TransactionExecutor`] commit/rollback wrapper

pub mod connection;
pub mod memory;
pub mod postgres;
pub mod store;
pub mod transaction;

pub use connection::{connect_with_retry, DatabasePools};
pub use memory::{FailPoint, InMemoryCommerceStore, InMemoryCommerceTx, InMemoryState};
pub use postgres::{PgCommerceStore, PgCommerceTx};
pub use store::{CommerceStore, CommerceTx};
pub use transaction::{TransactionExecutor, TxFuture};
