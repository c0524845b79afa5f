//! PostgreSQL implementation of the store capabilities
//!
//! Thin delegation to the `models` query functions. Transactional calls run on
//! `&mut *tx` and read-only calls run directly on the pool.

use async_trait::async_trait;
use sqlx::{PgPool, Postgres, Transaction};

use super::store::{CommerceStore, CommerceTx};
use crate::error::CommerceResult;
use crate::models::{
    Address, Cart, CartItem, CartLine, NewAddress, NewOrder, NewOrderItem, NewPayment,
    NewVerifyEmail, Order, OrderItem, OrderLine, Payment, Product, ProductImage, User,
    VerifyEmail,
};
use crate::state_machine::OrderStatus;

#[derive(Debug, Clone)]
pub struct PgCommerceStore {
    pool: PgPool,
}

impl PgCommerceStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

/// An open PostgreSQL transaction; sqlx rolls it back when dropped uncommitted
pub struct PgCommerceTx {
    tx: Transaction<'static, Postgres>,
}

impl std::fmt::Debug for PgCommerceTx {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PgCommerceTx").finish_non_exhaustive()
    }
}

#[async_trait]
impl CommerceTx for PgCommerceTx {
    async fn lock_cart(&mut self, cart_id: i64, user_id: i64) -> CommerceResult<Option<Cart>> {
        Ok(Cart::lock_for_user(&mut *self.tx, cart_id, user_id).await?)
    }

    async fn find_cart_for_user(&mut self, user_id: i64) -> CommerceResult<Option<Cart>> {
        Ok(Cart::find_for_user(&mut *self.tx, user_id).await?)
    }

    async fn create_cart(&mut self, user_id: i64) -> CommerceResult<Cart> {
        Ok(Cart::create(&mut *self.tx, user_id).await?)
    }

    async fn cart_lines(&mut self, cart_id: i64) -> CommerceResult<Vec<CartLine>> {
        Ok(CartItem::lines_for_cart(&mut *self.tx, cart_id).await?)
    }

    async fn upsert_cart_item(
        &mut self,
        cart_id: i64,
        product_id: i64,
        quantity: i32,
    ) -> CommerceResult<CartItem> {
        Ok(CartItem::upsert(&mut *self.tx, cart_id, product_id, quantity).await?)
    }

    async fn delete_cart_item(&mut self, cart_id: i64, product_id: i64) -> CommerceResult<bool> {
        Ok(CartItem::delete(&mut *self.tx, cart_id, product_id).await?)
    }

    async fn clear_cart(&mut self, cart_id: i64) -> CommerceResult<u64> {
        Ok(CartItem::clear_for_cart(&mut *self.tx, cart_id).await?)
    }

    async fn mark_cart_checked_out(&mut self, cart_id: i64) -> CommerceResult<()> {
        Ok(Cart::mark_checked_out(&mut *self.tx, cart_id).await?)
    }

    async fn find_product(&mut self, product_id: i64) -> CommerceResult<Option<Product>> {
        Ok(Product::find_by_id(&mut *self.tx, product_id).await?)
    }

    async fn lock_product(&mut self, product_id: i64) -> CommerceResult<bool> {
        Ok(Product::lock_by_id(&mut *self.tx, product_id).await?)
    }

    async fn reserve_stock(
        &mut self,
        product_id: i64,
        quantity: i32,
    ) -> CommerceResult<Option<i32>> {
        Ok(Product::reserve_stock(&mut *self.tx, product_id, quantity).await?)
    }

    async fn restock(&mut self, product_id: i64, quantity: i32) -> CommerceResult<Option<i32>> {
        Ok(Product::restock(&mut *self.tx, product_id, quantity).await?)
    }

    async fn insert_order(&mut self, order: &NewOrder) -> CommerceResult<Order> {
        Ok(Order::create(&mut *self.tx, order).await?)
    }

    async fn insert_order_item(&mut self, item: &NewOrderItem) -> CommerceResult<OrderItem> {
        Ok(OrderItem::create(&mut *self.tx, item).await?)
    }

    async fn insert_payment(&mut self, payment: &NewPayment) -> CommerceResult<Payment> {
        Ok(Payment::create(&mut *self.tx, payment).await?)
    }

    async fn lock_order(&mut self, order_id: i64) -> CommerceResult<Option<Order>> {
        Ok(Order::lock_by_id(&mut *self.tx, order_id).await?)
    }

    async fn update_order_status(
        &mut self,
        order_id: i64,
        status: OrderStatus,
    ) -> CommerceResult<Option<Order>> {
        Ok(Order::update_status(&mut *self.tx, order_id, status).await?)
    }

    async fn order_items(&mut self, order_id: i64) -> CommerceResult<Vec<OrderItem>> {
        Ok(OrderItem::list_for_order(&mut *self.tx, order_id).await?)
    }

    async fn lock_user(&mut self, user_id: i64) -> CommerceResult<bool> {
        Ok(User::lock_by_id(&mut *self.tx, user_id).await?)
    }

    async fn find_address(&mut self, address_id: i64) -> CommerceResult<Option<Address>> {
        Ok(Address::find_by_id(&mut *self.tx, address_id).await?)
    }

    async fn insert_address(
        &mut self,
        address: &NewAddress,
        is_primary: bool,
    ) -> CommerceResult<Address> {
        Ok(Address::create(&mut *self.tx, address, is_primary).await?)
    }

    async fn active_addresses(&mut self, user_id: i64) -> CommerceResult<Vec<Address>> {
        Ok(Address::list_active_for_user(&mut *self.tx, user_id).await?)
    }

    async fn clear_primary_addresses(&mut self, user_id: i64) -> CommerceResult<u64> {
        Ok(Address::clear_primary_for_user(&mut *self.tx, user_id).await?)
    }

    async fn mark_address_primary(&mut self, address_id: i64) -> CommerceResult<bool> {
        Ok(Address::mark_primary(&mut *self.tx, address_id).await?)
    }

    async fn soft_delete_address(&mut self, address_id: i64) -> CommerceResult<bool> {
        Ok(Address::soft_delete(&mut *self.tx, address_id).await?)
    }

    async fn find_image(&mut self, image_id: i64) -> CommerceResult<Option<ProductImage>> {
        Ok(ProductImage::find_by_id(&mut *self.tx, image_id).await?)
    }

    async fn clear_primary_images(&mut self, product_id: i64) -> CommerceResult<u64> {
        Ok(ProductImage::clear_primary_for_product(&mut *self.tx, product_id).await?)
    }

    async fn mark_image_primary(&mut self, image_id: i64) -> CommerceResult<bool> {
        Ok(ProductImage::mark_primary(&mut *self.tx, image_id).await?)
    }

    async fn commit(self) -> CommerceResult<()> {
        Ok(self.tx.commit().await?)
    }

    async fn rollback(self) -> CommerceResult<()> {
        Ok(self.tx.rollback().await?)
    }
}

#[async_trait]
impl CommerceStore for PgCommerceStore {
    type Tx = PgCommerceTx;

    async fn begin(&self) -> CommerceResult<PgCommerceTx> {
        let tx = self.pool.begin().await?;
        Ok(PgCommerceTx { tx })
    }

    async fn find_user(&self, user_id: i64) -> CommerceResult<Option<User>> {
        Ok(User::find_by_id(&self.pool, user_id).await?)
    }

    async fn create_verify_email(&self, record: &NewVerifyEmail) -> CommerceResult<VerifyEmail> {
        Ok(VerifyEmail::create(&self.pool, record).await?)
    }

    async fn find_live_verify_email(&self, user_id: i64) -> CommerceResult<Option<VerifyEmail>> {
        Ok(VerifyEmail::find_live_for_user(&self.pool, user_id).await?)
    }

    async fn find_payment(&self, payment_id: i64) -> CommerceResult<Option<Payment>> {
        Ok(Payment::find_by_id(&self.pool, payment_id).await?)
    }

    async fn find_order(&self, order_id: i64) -> CommerceResult<Option<Order>> {
        Ok(Order::find_by_id(&self.pool, order_id).await?)
    }

    async fn order_lines(&self, order_id: i64) -> CommerceResult<Vec<OrderLine>> {
        Ok(OrderItem::lines_for_order(&self.pool, order_id).await?)
    }

    async fn find_address(&self, address_id: i64) -> CommerceResult<Option<Address>> {
        Ok(Address::find_by_id(&self.pool, address_id).await?)
    }

    async fn find_product(&self, product_id: i64) -> CommerceResult<Option<Product>> {
        Ok(Product::find_by_id(&self.pool, product_id).await?)
    }

    async fn find_cart_for_user(&self, user_id: i64) -> CommerceResult<Option<Cart>> {
        Ok(Cart::find_for_user(&self.pool, user_id).await?)
    }

    async fn cart_lines(&self, cart_id: i64) -> CommerceResult<Vec<CartLine>> {
        Ok(CartItem::lines_for_cart(&self.pool, cart_id).await?)
    }

    async fn product_images(&self, product_id: i64) -> CommerceResult<Vec<ProductImage>> {
        Ok(ProductImage::list_for_product(&self.pool, product_id).await?)
    }

    async fn active_addresses(&self, user_id: i64) -> CommerceResult<Vec<Address>> {
        Ok(Address::list_active_for_user(&self.pool, user_id).await?)
    }

    fn backend_name(&self) -> &'static str {
        "postgres"
    }

    async fn close(&self) {
        self.pool.close().await;
    }
}
