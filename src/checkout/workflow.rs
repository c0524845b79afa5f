//! # Checkout Workflow
//!
//! Converts a cart into an order, its line items and a payment inside one
//! transaction.
//!
//! ## Steps
//!
//! 1. Lock the cart row (`FOR UPDATE`) so concurrent checkouts of one cart serialize
//! 2. Check the shipping address belongs to the user and is active
//! 3. Load cart lines with current product prices
//! 4. Reserve stock per line (compare-and-swap, product id order)
//! 5. Insert the order, the line items with price snapshots, and one `not_paid` payment
//! 6. Clear the cart and stamp `checked_out_at`
//!
//! Any failure rolls all of it back: no order, no payment, cart untouched.
//! After commit an order-confirmation task is published when a publisher is
//! configured. Publish failures are logged and do not affect the receipt.

use std::sync::Arc;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use crate::constants::payment_status;
use crate::database::{CommerceStore, CommerceTx, TransactionExecutor};
use crate::error::{CommerceError, CommerceResult};
use crate::logging::log_order_operation;
use crate::models::{CartLine, NewOrder, NewOrderItem, NewPayment, Order, OrderItem, Payment};
use crate::tasks::TaskPublisher;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckoutRequest {
    pub user_id: i64,
    pub cart_id: i64,
    pub address_id: i64,
    pub payment_method: String,
    pub cash_on_delivery: bool,
}

/// The order aggregate created by one checkout
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckoutReceipt {
    pub order: Order,
    pub items: Vec<OrderItem>,
    pub payment: Payment,
}

/// Sum of `unit_price × quantity` over the lines
pub fn order_total(lines: &[CartLine]) -> Decimal {
    lines.iter().map(CartLine::line_total).sum()
}

pub struct CheckoutWorkflow<S: CommerceStore> {
    executor: TransactionExecutor<S>,
    publisher: Option<Arc<dyn TaskPublisher>>,
}

impl<S: CommerceStore> std::fmt::Debug for CheckoutWorkflow<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CheckoutWorkflow")
            .field("executor", &self.executor)
            .field("publishes", &self.publisher.is_some())
            .finish()
    }
}

impl<S: CommerceStore> CheckoutWorkflow<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self {
            executor: TransactionExecutor::new(store),
            publisher: None,
        }
    }

    /// Publish an order-confirmation task after each successful checkout
    pub fn with_publisher(mut self, publisher: Arc<dyn TaskPublisher>) -> Self {
        self.publisher = Some(publisher);
        self
    }

    #[instrument(skip(self, request), fields(user_id = request.user_id, cart_id = request.cart_id))]
    pub async fn checkout(&self, request: CheckoutRequest) -> CommerceResult<CheckoutReceipt> {
        if request.payment_method.trim().is_empty() {
            return Err(CommerceError::validation("payment method is required"));
        }

        let receipt = self
            .executor
            .execute_logged("checkout", move |tx| Box::pin(place_order(tx, request)))
            .await?;

        log_order_operation(
            "checkout",
            Some(receipt.order.id),
            Some(receipt.order.user_id),
            &receipt.order.status,
            Some(&format!(
                "{} items, total {}",
                receipt.items.len(),
                receipt.order.total_price
            )),
        );

        if let Some(publisher) = &self.publisher {
            match publisher.publish_order_confirmation(receipt.payment.id).await {
                Ok(task) => debug!(
                    order_id = receipt.order.id,
                    message_id = %task.message_id,
                    "Order confirmation enqueued"
                ),
                Err(e) => warn!(
                    order_id = receipt.order.id,
                    payment_id = receipt.payment.id,
                    error = %e,
                    "Failed to enqueue order confirmation; order is committed"
                ),
            }
        }

        Ok(receipt)
    }
}

async fn place_order<T: CommerceTx>(
    tx: &mut T,
    request: CheckoutRequest,
) -> CommerceResult<CheckoutReceipt> {
    let cart = tx
        .lock_cart(request.cart_id, request.user_id)
        .await?
        .ok_or_else(|| CommerceError::not_found("cart", request.cart_id))?;

    match tx.find_address(request.address_id).await? {
        Some(address) if address.user_id == request.user_id && !address.is_deleted => {}
        _ => return Err(CommerceError::not_found("address", request.address_id)),
    }

    let mut lines = tx.cart_lines(cart.id).await?;
    if lines.is_empty() {
        return Err(CommerceError::EmptyCart { cart_id: cart.id });
    }
    // Consistent lock order across concurrent checkouts
    lines.sort_by_key(|line| line.product_id);

    for line in &lines {
        if line.archived {
            return Err(CommerceError::ProductUnavailable {
                product_id: line.product_id,
            });
        }
        if tx.reserve_stock(line.product_id, line.quantity).await?.is_none() {
            let available = tx
                .find_product(line.product_id)
                .await?
                .ok_or_else(|| CommerceError::not_found("product", line.product_id))?
                .stock;
            return Err(CommerceError::InsufficientStock {
                product_id: line.product_id,
                requested: line.quantity,
                available,
            });
        }
    }

    let total = order_total(&lines);
    let order = tx
        .insert_order(&NewOrder {
            user_id: request.user_id,
            address_id: request.address_id,
            total_price: total,
        })
        .await?;

    let mut items = Vec::with_capacity(lines.len());
    for line in &lines {
        items.push(
            tx.insert_order_item(&NewOrderItem {
                order_id: order.id,
                product_id: line.product_id,
                quantity: line.quantity,
                price: line.unit_price,
            })
            .await?,
        );
    }

    let payment = tx
        .insert_payment(&NewPayment {
            order_id: order.id,
            amount: total,
            method: request.payment_method,
            status: payment_status::NOT_PAID.to_string(),
            cash_on_delivery: request.cash_on_delivery,
        })
        .await?;

    let cleared = tx.clear_cart(cart.id).await?;
    tx.mark_cart_checked_out(cart.id).await?;

    info!(
        order_id = order.id,
        cart_id = cart.id,
        cleared_items = cleared,
        total = %total,
        "Order placed"
    );

    Ok(CheckoutReceipt {
        order,
        items,
        payment,
    })
}
