//! # Store Capabilities
//!
//! The relational store as seen by the checkout, lifecycle and task code.
//!
//! [`CommerceStore`] is the shared, process-wide handle: it opens transactions
//! and serves the point reads the task handlers need. [`CommerceTx`] is one open
//! transaction; every multi-step write goes through it and ends in exactly one
//! `commit` or `rollback` (dropping an uncommitted transaction rolls it back).
//!
//! Two implementations exist: [`PgCommerceStore`](super::PgCommerceStore) on
//! PostgreSQL and [`InMemoryCommerceStore`](super::InMemoryCommerceStore) for
//! tests and local development.
//!
//! ## Isolation
//!
//! Transactions run at READ COMMITTED. The workflows that read-then-write take
//! explicit row locks (`lock_*`) on the owning row first, and stock decrements
//! are compare-and-swap updates, so neither depends on a stronger isolation level.

use async_trait::async_trait;

use crate::error::CommerceResult;
use crate::models::{
    Address, Cart, CartItem, CartLine, NewAddress, NewOrder, NewOrderItem, NewPayment,
    NewVerifyEmail, Order, OrderItem, OrderLine, Payment, Product, ProductImage, User,
    VerifyEmail,
};
use crate::state_machine::OrderStatus;

/// One open relational transaction
#[async_trait]
pub trait CommerceTx: Send + Sized + 'static {
    // Carts

    /// Lock the cart if it exists and belongs to `user_id`
    async fn lock_cart(&mut self, cart_id: i64, user_id: i64) -> CommerceResult<Option<Cart>>;

    async fn find_cart_for_user(&mut self, user_id: i64) -> CommerceResult<Option<Cart>>;

    async fn create_cart(&mut self, user_id: i64) -> CommerceResult<Cart>;

    /// Cart items joined with their products, in insertion order
    async fn cart_lines(&mut self, cart_id: i64) -> CommerceResult<Vec<CartLine>>;

    async fn upsert_cart_item(
        &mut self,
        cart_id: i64,
        product_id: i64,
        quantity: i32,
    ) -> CommerceResult<CartItem>;

    async fn delete_cart_item(&mut self, cart_id: i64, product_id: i64) -> CommerceResult<bool>;

    async fn clear_cart(&mut self, cart_id: i64) -> CommerceResult<u64>;

    async fn mark_cart_checked_out(&mut self, cart_id: i64) -> CommerceResult<()>;

    // Products

    async fn find_product(&mut self, product_id: i64) -> CommerceResult<Option<Product>>;

    /// Lock the product row; `false` when it does not exist
    async fn lock_product(&mut self, product_id: i64) -> CommerceResult<bool>;

    /// Decrement stock if at least `quantity` remains; `None` leaves stock untouched
    async fn reserve_stock(&mut self, product_id: i64, quantity: i32)
        -> CommerceResult<Option<i32>>;

    /// Add `quantity` to stock; `None` when the product does not exist
    async fn restock(&mut self, product_id: i64, quantity: i32) -> CommerceResult<Option<i32>>;

    // Orders and payments

    async fn insert_order(&mut self, order: &NewOrder) -> CommerceResult<Order>;

    async fn insert_order_item(&mut self, item: &NewOrderItem) -> CommerceResult<OrderItem>;

    async fn insert_payment(&mut self, payment: &NewPayment) -> CommerceResult<Payment>;

    async fn lock_order(&mut self, order_id: i64) -> CommerceResult<Option<Order>>;

    async fn update_order_status(
        &mut self,
        order_id: i64,
        status: OrderStatus,
    ) -> CommerceResult<Option<Order>>;

    async fn order_items(&mut self, order_id: i64) -> CommerceResult<Vec<OrderItem>>;

    // Users and addresses

    /// Lock the user row; `false` when it does not exist
    async fn lock_user(&mut self, user_id: i64) -> CommerceResult<bool>;

    async fn find_address(&mut self, address_id: i64) -> CommerceResult<Option<Address>>;

    async fn insert_address(
        &mut self,
        address: &NewAddress,
        is_primary: bool,
    ) -> CommerceResult<Address>;

    /// Non-deleted addresses of a user, newest first
    async fn active_addresses(&mut self, user_id: i64) -> CommerceResult<Vec<Address>>;

    async fn clear_primary_addresses(&mut self, user_id: i64) -> CommerceResult<u64>;

    async fn mark_address_primary(&mut self, address_id: i64) -> CommerceResult<bool>;

    async fn soft_delete_address(&mut self, address_id: i64) -> CommerceResult<bool>;

    // Product images

    async fn find_image(&mut self, image_id: i64) -> CommerceResult<Option<ProductImage>>;

    async fn clear_primary_images(&mut self, product_id: i64) -> CommerceResult<u64>;

    async fn mark_image_primary(&mut self, image_id: i64) -> CommerceResult<bool>;

    // Completion

    async fn commit(self) -> CommerceResult<()>;

    async fn rollback(self) -> CommerceResult<()>;
}

/// Shared handle to the relational store
#[async_trait]
pub trait CommerceStore: Send + Sync + 'static {
    type Tx: CommerceTx;

    async fn begin(&self) -> CommerceResult<Self::Tx>;

    async fn find_user(&self, user_id: i64) -> CommerceResult<Option<User>>;

    /// Issue a code; earlier unused codes of the same user stop being valid
    async fn create_verify_email(&self, record: &NewVerifyEmail) -> CommerceResult<VerifyEmail>;

    async fn find_live_verify_email(&self, user_id: i64) -> CommerceResult<Option<VerifyEmail>>;

    async fn find_payment(&self, payment_id: i64) -> CommerceResult<Option<Payment>>;

    async fn find_order(&self, order_id: i64) -> CommerceResult<Option<Order>>;

    /// Order items joined with product names
    async fn order_lines(&self, order_id: i64) -> CommerceResult<Vec<OrderLine>>;

    async fn find_address(&self, address_id: i64) -> CommerceResult<Option<Address>>;

    async fn find_product(&self, product_id: i64) -> CommerceResult<Option<Product>>;

    async fn find_cart_for_user(&self, user_id: i64) -> CommerceResult<Option<Cart>>;

    async fn cart_lines(&self, cart_id: i64) -> CommerceResult<Vec<CartLine>>;

    async fn product_images(&self, product_id: i64) -> CommerceResult<Vec<ProductImage>>;

    /// Non-deleted addresses of a user, newest first
    async fn active_addresses(&self, user_id: i64) -> CommerceResult<Vec<Address>>;

    /// Provider name for logging
    fn backend_name(&self) -> &'static str;

    /// Release connections; later calls fail
    async fn close(&self);
}
