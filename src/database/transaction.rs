//! # Transaction Executor
//!
//! Runs a unit of work inside one store transaction. The work receives the
//! open transaction, and the executor commits on `Ok` and rolls back on `Err`.
//! When the rollback itself fails, both errors are returned together as
//! [`CommerceError::RollbackFailed`].
//!
//! The transaction is owned by [`TransactionExecutor::execute`], so it is
//! always ended on return: explicitly by commit/rollback, or by drop (which
//! rolls back) if the future is cancelled mid-flight.
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use storefront_core::database::{CommerceTx, InMemoryCommerceStore, TransactionExecutor};
//!
//! # async fn example() -> storefront_core::error::CommerceResult<()> {
//! let executor = TransactionExecutor::new(Arc::new(InMemoryCommerceStore::new()));
//! let product_id = 7;
//! let new_stock = executor
//!     .execute(move |tx| Box::pin(async move { tx.restock(product_id, 3).await }))
//!     .await?;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use futures::future::BoxFuture;
use tracing::{debug, error, warn};

use super::store::{CommerceStore, CommerceTx};
use crate::error::{CommerceError, CommerceResult};

/// Future returned by a unit of work borrowing the transaction for `'t`
pub type TxFuture<'t, T> = BoxFuture<'t, CommerceResult<T>>;

pub struct TransactionExecutor<S: CommerceStore> {
    store: Arc<S>,
}

impl<S: CommerceStore> Clone for TransactionExecutor<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
        }
    }
}

impl<S: CommerceStore> std::fmt::Debug for TransactionExecutor<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransactionExecutor")
            .field("backend", &self.store.backend_name())
            .finish()
    }
}

impl<S: CommerceStore> TransactionExecutor<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Run `work` in a fresh transaction and commit or roll back on its result
    pub async fn execute<T, F>(&self, work: F) -> CommerceResult<T>
    where
        T: Send,
        F: for<'t> FnOnce(&'t mut S::Tx) -> TxFuture<'t, T> + Send,
    {
        let mut tx = self.store.begin().await?;

        match work(&mut tx).await {
            Ok(value) => {
                tx.commit().await?;
                debug!(backend = self.store.backend_name(), "Transaction committed");
                Ok(value)
            }
            Err(err) => match tx.rollback().await {
                Ok(()) => {
                    debug!(
                        backend = self.store.backend_name(),
                        error = %err,
                        "Transaction rolled back"
                    );
                    Err(err)
                }
                Err(rollback_err) => {
                    error!(
                        backend = self.store.backend_name(),
                        error = %err,
                        rollback_error = %rollback_err,
                        "Transaction rollback failed"
                    );
                    Err(CommerceError::rollback_failed(err, rollback_err))
                }
            },
        }
    }

    /// Like [`execute`](Self::execute), logging transient failures for the caller to retry
    pub async fn execute_logged<T, F>(&self, operation: &str, work: F) -> CommerceResult<T>
    where
        T: Send,
        F: for<'t> FnOnce(&'t mut S::Tx) -> TxFuture<'t, T> + Send,
    {
        let result = self.execute(work).await;
        if let Err(err) = &result {
            if err.is_transient() {
                warn!(operation = operation, error = %err, "Transient failure; safe to retry");
            }
        }
        result
    }
}
