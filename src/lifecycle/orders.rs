//! # Order Lifecycle
//!
//! Status changes on placed orders. Each runs in one transaction with the order
//! row locked, so two concurrent cancellations of the same order cannot both
//! restock.
//!
//! Cancellation restocks every line with a relative update, so restocks from
//! different orders touching the same product add up.

use std::sync::Arc;

use tracing::instrument;

use crate::database::{CommerceStore, CommerceTx, TransactionExecutor};
use crate::error::{CommerceError, CommerceResult};
use crate::logging::log_order_operation;
use crate::models::Order;
use crate::state_machine::OrderStatus;

#[derive(Debug)]
pub struct OrderLifecycle<S: CommerceStore> {
    executor: TransactionExecutor<S>,
}

impl<S: CommerceStore> OrderLifecycle<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self {
            executor: TransactionExecutor::new(store),
        }
    }

    /// Cancel the order and return every line's quantity to stock
    ///
    /// Only `wait_for_confirming` and `confirmed` orders can be cancelled.
    #[instrument(skip(self))]
    pub async fn cancel(&self, order_id: i64) -> CommerceResult<Order> {
        let order = self
            .executor
            .execute_logged("cancel_order", move |tx| Box::pin(cancel_in_tx(tx, order_id)))
            .await?;

        log_order_operation(
            "cancel",
            Some(order.id),
            Some(order.user_id),
            &order.status,
            None,
        );
        Ok(order)
    }

    /// Move the order to `target` along an allowed transition
    ///
    /// A `cancelled` target goes through [`cancel`](Self::cancel) so stock is returned.
    #[instrument(skip(self))]
    pub async fn advance(&self, order_id: i64, target: OrderStatus) -> CommerceResult<Order> {
        if target == OrderStatus::Cancelled {
            return self.cancel(order_id).await;
        }

        let order = self
            .executor
            .execute_logged("advance_order", move |tx| {
                Box::pin(async move {
                    let current = lock_order(tx, order_id).await?;
                    let from = current.order_status()?;
                    if !from.can_transition_to(target) {
                        return Err(CommerceError::invalid_transition(order_id, from, target));
                    }
                    tx.update_order_status(order_id, target)
                        .await?
                        .ok_or_else(|| CommerceError::not_found("order", order_id))
                })
            })
            .await?;

        log_order_operation(
            "advance",
            Some(order.id),
            Some(order.user_id),
            &order.status,
            None,
        );
        Ok(order)
    }
}

async fn lock_order<T: CommerceTx>(tx: &mut T, order_id: i64) -> CommerceResult<Order> {
    tx.lock_order(order_id)
        .await?
        .ok_or_else(|| CommerceError::not_found("order", order_id))
}

async fn cancel_in_tx<T: CommerceTx>(tx: &mut T, order_id: i64) -> CommerceResult<Order> {
    let current = lock_order(tx, order_id).await?;
    let from = current.order_status()?;
    if !from.is_cancellable() {
        return Err(CommerceError::invalid_transition(
            order_id,
            from,
            OrderStatus::Cancelled,
        ));
    }

    let cancelled = tx
        .update_order_status(order_id, OrderStatus::Cancelled)
        .await?
        .ok_or_else(|| CommerceError::not_found("order", order_id))?;

    let mut items = tx.order_items(order_id).await?;
    // Consistent product lock order across concurrent cancellations
    items.sort_by_key(|item| item.product_id);
    for item in &items {
        tx.restock(item.product_id, item.quantity)
            .await?
            .ok_or_else(|| CommerceError::not_found("product", item.product_id))?;
    }

    Ok(cancelled)
}
