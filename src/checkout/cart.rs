//! Cart mutation ahead of checkout.

use std::sync::Arc;

use tracing::debug;

use crate::database::{CommerceStore, CommerceTx, TransactionExecutor};
use crate::error::{CommerceError, CommerceResult};
use crate::models::{CartItem, CartLine};

#[derive(Debug)]
pub struct CartService<S: CommerceStore> {
    executor: TransactionExecutor<S>,
}

impl<S: CommerceStore> CartService<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self {
            executor: TransactionExecutor::new(store),
        }
    }

    /// Set the quantity of `product_id` in the user's cart, creating the cart on first use
    pub async fn add_item(
        &self,
        user_id: i64,
        product_id: i64,
        quantity: i32,
    ) -> CommerceResult<CartItem> {
        if quantity <= 0 {
            return Err(CommerceError::validation(format!(
                "quantity must be positive, got {quantity}"
            )));
        }

        let item = self
            .executor
            .execute(move |tx| {
                Box::pin(async move {
                    // Serializes first-cart creation per user
                    if !tx.lock_user(user_id).await? {
                        return Err(CommerceError::not_found("user", user_id));
                    }

                    let product = tx
                        .find_product(product_id)
                        .await?
                        .ok_or_else(|| CommerceError::not_found("product", product_id))?;
                    if product.archived {
                        return Err(CommerceError::ProductUnavailable { product_id });
                    }

                    let cart = match tx.find_cart_for_user(user_id).await? {
                        Some(cart) => cart,
                        None => tx.create_cart(user_id).await?,
                    };
                    tx.upsert_cart_item(cart.id, product_id, quantity).await
                })
            })
            .await?;

        debug!(
            user_id = user_id,
            cart_id = item.cart_id,
            product_id = product_id,
            quantity = quantity,
            "Cart item set"
        );
        Ok(item)
    }

    /// Remove `product_id` from the user's cart; `false` when it was not there
    pub async fn remove_item(&self, user_id: i64, product_id: i64) -> CommerceResult<bool> {
        self.executor
            .execute(move |tx| {
                Box::pin(async move {
                    match tx.find_cart_for_user(user_id).await? {
                        Some(cart) => tx.delete_cart_item(cart.id, product_id).await,
                        None => Ok(false),
                    }
                })
            })
            .await
    }

    /// Current lines of the user's cart, empty when no cart exists yet
    pub async fn items(&self, user_id: i64) -> CommerceResult<Vec<CartLine>> {
        let store = self.executor.store();
        match store.find_cart_for_user(user_id).await? {
            Some(cart) => store.cart_lines(cart.id).await,
            None => Ok(Vec::new()),
        }
    }
}
