#![allow(clippy::doc_markdown)] // Allow technical terms like PostgreSQL, SQLx in docs
#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # Storefront Core
//!
//! Transactional order fulfillment and background notification processing for a
//! commerce backend.
//!
//! ## Overview
//!
//! Two parts of the storefront need more than plain data access:
//!
//! - **Order fulfillment**: checkout, cancellation and primary-flag exchanges are
//!   multi-step updates that must be all-or-nothing and safe under concurrency.
//! - **Task distribution**: notification mail is queued after the business
//!   transaction commits and processed by a worker pool that classifies failures
//!   as permanent or retryable.
//!
//! HTTP routing, authentication and request validation live in the surrounding
//! service; this crate consumes a relational store and a durable queue.
//!
//! ## Module Organization
//!
//! - [`database`] - pools, store capability traits, PostgreSQL and in-memory stores, transaction executor
//! - [`checkout`] - cart mutation and the checkout workflow
//! - [`lifecycle`] - order cancellation/advancement and primary address/image exchanges
//! - [`tasks`] - task distributor, task processor, handlers, scheduler boundary
//! - [`messaging`] - durable queue capability (pgmq, in-memory)
//! - [`notifications`] - mail templates and delivery
//! - [`models`] - row types and their SQL
//! - [`state_machine`] - order and task states
//! - [`config`] - layered configuration
//! - [`error`] - structured error handling
//! - [`bootstrap`] - process wiring and ordered shutdown
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use storefront_core::bootstrap::PgStorefrontContext;
//! use storefront_core::checkout::CheckoutRequest;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let context = PgStorefrontContext::bootstrap().await?;
//!
//! let receipt = context
//!     .checkout_workflow()
//!     .checkout(CheckoutRequest {
//!         user_id: 1,
//!         cart_id: 10,
//!         address_id: 3,
//!         payment_method: "cash".to_string(),
//!         cash_on_delivery: true,
//!     })
//!     .await?;
//! println!("order {} total {}", receipt.order.id, receipt.order.total_price);
//!
//! context.shutdown(None).await;
//! # Ok(())
//! # }
//! ```
//!
//! ## Testing
//!
//! ```bash
//! cargo test                                   # in-memory store and queue
//! cargo test --features test-db                # PostgreSQL (DATABASE_URL)
//! cargo test --features test-messaging         # PostgreSQL with pgmq
//! ```

pub mod bootstrap;
pub mod checkout;
pub mod config;
pub mod constants;
pub mod database;
pub mod error;
pub mod lifecycle;
pub mod logging;
pub mod messaging;
pub mod models;
pub mod notifications;
pub mod state_machine;
pub mod tasks;

pub use bootstrap::{InMemoryStorefrontContext, PgStorefrontContext, StorefrontContext};
pub use config::{
    BackoffConfig, ConfigManager, DatabaseConfig, MailConfig, QueueConfig, StorefrontConfig,
};
pub use constants::{payment_status, queues, system, task_types};
pub use error::{CommerceError, CommerceResult};
pub use state_machine::{OrderStatus, TaskState};
