//! # Error Types
//!
//! Structured error taxonomy for checkout, order lifecycle and store access.
//!
//! Errors fall into a handful of families that callers treat differently:
//!
//! - **Not found**: a referenced cart, order, user, payment, address, product or image
//!   does not exist. Surfaced to the caller, never retried.
//! - **Conflict / invariant violation**: empty cart, insufficient stock, disallowed
//!   status transitions, unique-key collisions. The transaction is aborted.
//! - **Transient**: connectivity, timeouts, pool exhaustion, serialization failures and
//!   detected deadlocks. Safe to retry the whole unit of work.
//! - **Rollback failure**: the unit of work failed *and* the rollback failed. Both
//!   errors are carried together.

use thiserror::Error;

/// SQLSTATE raised by PostgreSQL when a serializable transaction cannot commit
const SQLSTATE_SERIALIZATION_FAILURE: &str = "40001";
/// SQLSTATE raised by PostgreSQL when it breaks a deadlock
const SQLSTATE_DEADLOCK_DETECTED: &str = "40P01";
/// SQLSTATE for unique constraint violations
const SQLSTATE_UNIQUE_VIOLATION: &str = "23505";

#[derive(Debug, Error)]
pub enum CommerceError {
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: i64 },

    #[error("Cart {cart_id} has no items")]
    EmptyCart { cart_id: i64 },

    #[error("Insufficient stock for product {product_id}: requested {requested}, available {available}")]
    InsufficientStock {
        product_id: i64,
        requested: i32,
        available: i32,
    },

    #[error("Product {product_id} is archived and cannot be ordered")]
    ProductUnavailable { product_id: i64 },

    #[error("Order {order_id} cannot move from {from} to {to}")]
    InvalidTransition {
        order_id: i64,
        from: String,
        to: String,
    },

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Transient error: {0}")]
    Transient(String),

    #[error("Rollback failed after error ({source}); rollback error: {rollback}")]
    RollbackFailed {
        #[source]
        source: Box<CommerceError>,
        rollback: Box<CommerceError>,
    },

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Messaging error: {0}")]
    Messaging(String),
}

impl CommerceError {
    pub fn not_found(entity: &'static str, id: i64) -> Self {
        Self::NotFound { entity, id }
    }

    pub fn invalid_transition(order_id: i64, from: impl ToString, to: impl ToString) -> Self {
        Self::InvalidTransition {
            order_id,
            from: from.to_string(),
            to: to.to_string(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn database(message: impl Into<String>) -> Self {
        Self::Database(message.into())
    }

    pub fn transient(message: impl Into<String>) -> Self {
        Self::Transient(message.into())
    }

    /// Pair the error that aborted a unit of work with the error raised while rolling it back
    pub fn rollback_failed(source: CommerceError, rollback: CommerceError) -> Self {
        Self::RollbackFailed {
            source: Box::new(source),
            rollback: Box::new(rollback),
        }
    }

    /// True when the referenced entity does not exist and will not appear by retrying
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// True when retrying the same operation later may succeed
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transient(_) | Self::Database(_) => true,
            Self::RollbackFailed { source, .. } => source.is_transient(),
            _ => false,
        }
    }

    /// True for business-rule rejections that abort the transaction without retry
    pub fn is_conflict(&self) -> bool {
        matches!(
            self,
            Self::EmptyCart { .. }
                | Self::InsufficientStock { .. }
                | Self::ProductUnavailable { .. }
                | Self::InvalidTransition { .. }
                | Self::Conflict(_)
        )
    }
}

impl From<sqlx::Error> for CommerceError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => Self::Database("expected row was not returned".to_string()),
            sqlx::Error::Database(db_err) => match db_err.code().as_deref() {
                Some(SQLSTATE_SERIALIZATION_FAILURE) | Some(SQLSTATE_DEADLOCK_DETECTED) => {
                    Self::Transient(db_err.to_string())
                }
                Some(SQLSTATE_UNIQUE_VIOLATION) => Self::Conflict(db_err.to_string()),
                _ => Self::Database(db_err.to_string()),
            },
            sqlx::Error::PoolTimedOut => Self::Transient("database pool timed out".to_string()),
            sqlx::Error::PoolClosed => Self::Transient("database pool is closed".to_string()),
            sqlx::Error::Io(io_err) => Self::Transient(format!("database io: {io_err}")),
            sqlx::Error::Tls(tls_err) => Self::Transient(format!("database tls: {tls_err}")),
            sqlx::Error::Configuration(config_err) => Self::Configuration(config_err.to_string()),
            other => Self::Database(other.to_string()),
        }
    }
}

impl From<crate::messaging::MessagingError> for CommerceError {
    fn from(err: crate::messaging::MessagingError) -> Self {
        Self::Messaging(err.to_string())
    }
}

impl From<crate::config::ConfigurationError> for CommerceError {
    fn from(err: crate::config::ConfigurationError) -> Self {
        Self::Configuration(err.to_string())
    }
}

pub type CommerceResult<T> = std::result::Result<T, CommerceError>;
