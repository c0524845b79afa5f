//! # In-Memory Store
//!
//! A [`CommerceStore`] backed by plain maps, for tests and local development.
//!
//! A transaction takes the store-wide lock for its whole lifetime and works on
//! a private copy of the state. `commit` writes the copy back; `rollback` or
//! dropping the transaction discards it. Transactions are therefore fully
//! serialized, which is at least as strong as the row locks the PostgreSQL
//! store relies on.
//!
//! Failures can be injected at named points ([`FailPoint`]), on rollback, and
//! on the non-transactional reads, to exercise abort and retry paths.

use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use rust_decimal::Decimal;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use super::store::{CommerceStore, CommerceTx};
use crate::error::{CommerceError, CommerceResult};
use crate::models::{
    Address, Cart, CartItem, CartLine, NewAddress, NewOrder, NewOrderItem, NewPayment,
    NewVerifyEmail, Order, OrderItem, OrderLine, Payment, Product, ProductImage, User,
    VerifyEmail,
};
use crate::state_machine::OrderStatus;

/// Transactional operations that can be made to fail
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailPoint {
    InsertOrder,
    InsertOrderItem,
    InsertPayment,
    ClearCart,
    Restock,
    UpdateOrderStatus,
    MarkAddressPrimary,
    MarkImagePrimary,
    Commit,
}

#[derive(Debug, Default)]
struct Faults {
    points: Mutex<HashSet<FailPoint>>,
    rollback: AtomicBool,
    reads: AtomicBool,
}

impl Faults {
    fn check(&self, point: FailPoint) -> CommerceResult<()> {
        if self.points.lock().contains(&point) {
            return Err(CommerceError::database(format!("injected failure at {point:?}")));
        }
        Ok(())
    }

    fn check_read(&self) -> CommerceResult<()> {
        if self.reads.load(Ordering::Acquire) {
            return Err(CommerceError::transient("injected read failure"));
        }
        Ok(())
    }
}

/// Full contents of the in-memory store
#[derive(Debug, Clone, Default)]
pub struct InMemoryState {
    next_id: i64,
    pub users: BTreeMap<i64, User>,
    pub verify_emails: BTreeMap<i64, VerifyEmail>,
    pub products: BTreeMap<i64, Product>,
    pub images: BTreeMap<i64, ProductImage>,
    pub addresses: BTreeMap<i64, Address>,
    pub carts: BTreeMap<i64, Cart>,
    pub cart_items: BTreeMap<i64, CartItem>,
    pub orders: BTreeMap<i64, Order>,
    pub order_items: BTreeMap<i64, OrderItem>,
    pub payments: BTreeMap<i64, Payment>,
}

impl InMemoryState {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    pub fn cart_item_count(&self, cart_id: i64) -> usize {
        self.cart_items.values().filter(|i| i.cart_id == cart_id).count()
    }

    pub fn product_stock(&self, product_id: i64) -> Option<i32> {
        self.products.get(&product_id).map(|p| p.stock)
    }

    pub fn primary_addresses(&self, user_id: i64) -> Vec<&Address> {
        self.addresses
            .values()
            .filter(|a| a.user_id == user_id && a.is_primary && !a.is_deleted)
            .collect()
    }

    pub fn primary_images(&self, product_id: i64) -> Vec<&ProductImage> {
        self.images
            .values()
            .filter(|i| i.product_id == product_id && i.is_primary)
            .collect()
    }

    fn cart_for_user(&self, user_id: i64) -> Option<Cart> {
        self.carts.values().find(|c| c.user_id == user_id).cloned()
    }

    fn cart_lines(&self, cart_id: i64) -> Vec<CartLine> {
        self.cart_items
            .values()
            .filter(|item| item.cart_id == cart_id)
            .filter_map(|item| {
                self.products.get(&item.product_id).map(|p| CartLine {
                    cart_item_id: item.id,
                    product_id: item.product_id,
                    quantity: item.quantity,
                    product_name: p.name.clone(),
                    unit_price: p.price,
                    stock: p.stock,
                    archived: p.archived,
                })
            })
            .collect()
    }

    fn order_lines(&self, order_id: i64) -> Vec<OrderLine> {
        self.order_items
            .values()
            .filter(|item| item.order_id == order_id)
            .filter_map(|item| {
                self.products.get(&item.product_id).map(|p| OrderLine {
                    product_id: item.product_id,
                    product_name: p.name.clone(),
                    quantity: item.quantity,
                    price: item.price,
                })
            })
            .collect()
    }

    fn active_addresses(&self, user_id: i64) -> Vec<Address> {
        let mut addresses: Vec<Address> = self
            .addresses
            .values()
            .filter(|a| a.user_id == user_id && !a.is_deleted)
            .cloned()
            .collect();
        addresses.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        addresses
    }

    fn insert_address(&mut self, new: &NewAddress, is_primary: bool) -> Address {
        let address = Address {
            id: self.next_id(),
            user_id: new.user_id,
            recipient: new.recipient.clone(),
            line: new.line.clone(),
            city: new.city.clone(),
            phone: new.phone.clone(),
            is_primary,
            is_deleted: false,
            created_at: Utc::now(),
        };
        self.addresses.insert(address.id, address.clone());
        address
    }

    fn create_cart(&mut self, user_id: i64) -> CommerceResult<Cart> {
        if self.cart_for_user(user_id).is_some() {
            return Err(CommerceError::Conflict(format!(
                "user {user_id} already has a cart"
            )));
        }
        let cart = Cart {
            id: self.next_id(),
            user_id,
            checked_out_at: None,
            created_at: Utc::now(),
        };
        self.carts.insert(cart.id, cart.clone());
        Ok(cart)
    }

    fn upsert_cart_item(&mut self, cart_id: i64, product_id: i64, quantity: i32) -> CommerceResult<CartItem> {
        if quantity <= 0 {
            return Err(CommerceError::database("cart_items.quantity must be positive"));
        }
        if let Some(item) = self
            .cart_items
            .values_mut()
            .find(|i| i.cart_id == cart_id && i.product_id == product_id)
        {
            item.quantity = quantity;
            return Ok(item.clone());
        }
        let item = CartItem {
            id: self.next_id(),
            cart_id,
            product_id,
            quantity,
        };
        self.cart_items.insert(item.id, item.clone());
        Ok(item)
    }
}

/// In-memory [`CommerceStore`] with fault injection and seeding helpers
#[derive(Debug, Clone, Default)]
pub struct InMemoryCommerceStore {
    state: Arc<AsyncMutex<InMemoryState>>,
    faults: Arc<Faults>,
    closed: Arc<AtomicBool>,
}

impl InMemoryCommerceStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every call at `point` fail until cleared
    pub fn fail_at(&self, point: FailPoint) {
        self.faults.points.lock().insert(point);
    }

    pub fn clear_failures(&self) {
        self.faults.points.lock().clear();
        self.faults.rollback.store(false, Ordering::Release);
        self.faults.reads.store(false, Ordering::Release);
    }

    /// Make rollbacks report an error (the work is still discarded)
    pub fn fail_rollbacks(&self, fail: bool) {
        self.faults.rollback.store(fail, Ordering::Release);
    }

    /// Make the non-transactional reads fail with a transient error
    pub fn fail_reads(&self, fail: bool) {
        self.faults.reads.store(fail, Ordering::Release);
    }

    /// Copy of the committed state
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub async fn snapshot(&self) -> InMemoryState {
        self.state.lock().await.clone()
    }

    pub async fn seed_user(&self, username: &str, email: &str) -> User {
        let mut state = self.state.lock().await;
        let user = User {
            id: state.next_id(),
            username: username.to_string(),
            full_name: username.to_string(),
            email: email.to_string(),
            is_email_verified: false,
            created_at: Utc::now(),
        };
        state.users.insert(user.id, user.clone());
        user
    }

    pub async fn seed_product(&self, name: &str, price: Decimal, stock: i32) -> Product {
        let mut state = self.state.lock().await;
        let now = Utc::now();
        let product = Product {
            id: state.next_id(),
            name: name.to_string(),
            price,
            stock,
            archived: false,
            created_at: now,
            updated_at: now,
        };
        state.products.insert(product.id, product.clone());
        product
    }

    pub async fn archive_product(&self, product_id: i64) {
        let mut state = self.state.lock().await;
        if let Some(product) = state.products.get_mut(&product_id) {
            product.archived = true;
            product.updated_at = Utc::now();
        }
    }

    pub async fn seed_image(&self, product_id: i64, url: &str, is_primary: bool) -> ProductImage {
        let mut state = self.state.lock().await;
        let image = ProductImage {
            id: state.next_id(),
            product_id,
            url: url.to_string(),
            is_primary,
            created_at: Utc::now(),
        };
        state.images.insert(image.id, image.clone());
        image
    }

    pub async fn seed_address(&self, user_id: i64, recipient: &str, is_primary: bool) -> Address {
        let new = NewAddress {
            user_id,
            recipient: recipient.to_string(),
            line: "1 Main Street".to_string(),
            city: "Springfield".to_string(),
            phone: "555-0100".to_string(),
        };
        self.state.lock().await.insert_address(&new, is_primary)
    }

    /// Get or create the user's cart and set `quantity` of `product_id` in it
    pub async fn seed_cart_item(&self, user_id: i64, product_id: i64, quantity: i32) -> CommerceResult<Cart> {
        let mut state = self.state.lock().await;
        let cart = match state.cart_for_user(user_id) {
            Some(cart) => cart,
            None => state.create_cart(user_id)?,
        };
        state.upsert_cart_item(cart.id, product_id, quantity)?;
        Ok(cart)
    }

    /// Force an order into `status`, bypassing transition rules
    pub async fn force_order_status(&self, order_id: i64, status: OrderStatus) {
        let mut state = self.state.lock().await;
        if let Some(order) = state.orders.get_mut(&order_id) {
            order.status = status.to_string();
            order.updated_at = Utc::now();
        }
    }

    async fn read(&self) -> CommerceResult<tokio::sync::MutexGuard<'_, InMemoryState>> {
        if self.closed.load(Ordering::Acquire) {
            return Err(CommerceError::transient("store is closed"));
        }
        self.faults.check_read()?;
        Ok(self.state.lock().await)
    }
}

/// Open in-memory transaction holding the store lock
pub struct InMemoryCommerceTx {
    guard: OwnedMutexGuard<InMemoryState>,
    working: InMemoryState,
    faults: Arc<Faults>,
}

impl std::fmt::Debug for InMemoryCommerceTx {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryCommerceTx").finish_non_exhaustive()
    }
}

#[async_trait]
impl CommerceTx for InMemoryCommerceTx {
    async fn lock_cart(&mut self, cart_id: i64, user_id: i64) -> CommerceResult<Option<Cart>> {
        Ok(self
            .working
            .carts
            .get(&cart_id)
            .filter(|c| c.user_id == user_id)
            .cloned())
    }

    async fn find_cart_for_user(&mut self, user_id: i64) -> CommerceResult<Option<Cart>> {
        Ok(self.working.cart_for_user(user_id))
    }

    async fn create_cart(&mut self, user_id: i64) -> CommerceResult<Cart> {
        self.working.create_cart(user_id)
    }

    async fn cart_lines(&mut self, cart_id: i64) -> CommerceResult<Vec<CartLine>> {
        Ok(self.working.cart_lines(cart_id))
    }

    async fn upsert_cart_item(
        &mut self,
        cart_id: i64,
        product_id: i64,
        quantity: i32,
    ) -> CommerceResult<CartItem> {
        self.working.upsert_cart_item(cart_id, product_id, quantity)
    }

    async fn delete_cart_item(&mut self, cart_id: i64, product_id: i64) -> CommerceResult<bool> {
        let before = self.working.cart_items.len();
        self.working
            .cart_items
            .retain(|_, i| !(i.cart_id == cart_id && i.product_id == product_id));
        Ok(self.working.cart_items.len() < before)
    }

    async fn clear_cart(&mut self, cart_id: i64) -> CommerceResult<u64> {
        self.faults.check(FailPoint::ClearCart)?;
        let before = self.working.cart_items.len();
        self.working.cart_items.retain(|_, i| i.cart_id != cart_id);
        Ok((before - self.working.cart_items.len()) as u64)
    }

    async fn mark_cart_checked_out(&mut self, cart_id: i64) -> CommerceResult<()> {
        if let Some(cart) = self.working.carts.get_mut(&cart_id) {
            cart.checked_out_at = Some(Utc::now());
        }
        Ok(())
    }

    async fn find_product(&mut self, product_id: i64) -> CommerceResult<Option<Product>> {
        Ok(self.working.products.get(&product_id).cloned())
    }

    async fn lock_product(&mut self, product_id: i64) -> CommerceResult<bool> {
        Ok(self.working.products.contains_key(&product_id))
    }

    async fn reserve_stock(
        &mut self,
        product_id: i64,
        quantity: i32,
    ) -> CommerceResult<Option<i32>> {
        Ok(match self.working.products.get_mut(&product_id) {
            Some(product) if product.stock >= quantity => {
                product.stock -= quantity;
                product.updated_at = Utc::now();
                Some(product.stock)
            }
            _ => None,
        })
    }

    async fn restock(&mut self, product_id: i64, quantity: i32) -> CommerceResult<Option<i32>> {
        self.faults.check(FailPoint::Restock)?;
        Ok(self.working.products.get_mut(&product_id).map(|product| {
            product.stock += quantity;
            product.updated_at = Utc::now();
            product.stock
        }))
    }

    async fn insert_order(&mut self, order: &NewOrder) -> CommerceResult<Order> {
        self.faults.check(FailPoint::InsertOrder)?;
        let now = Utc::now();
        let order = Order {
            id: self.working.next_id(),
            user_id: order.user_id,
            address_id: order.address_id,
            status: OrderStatus::WaitForConfirming.to_string(),
            total_price: order.total_price,
            confirmed_at: None,
            cancelled_at: None,
            delivered_at: None,
            created_at: now,
            updated_at: now,
        };
        self.working.orders.insert(order.id, order.clone());
        Ok(order)
    }

    async fn insert_order_item(&mut self, item: &NewOrderItem) -> CommerceResult<OrderItem> {
        self.faults.check(FailPoint::InsertOrderItem)?;
        let item = OrderItem {
            id: self.working.next_id(),
            order_id: item.order_id,
            product_id: item.product_id,
            quantity: item.quantity,
            price: item.price,
        };
        self.working.order_items.insert(item.id, item.clone());
        Ok(item)
    }

    async fn insert_payment(&mut self, payment: &NewPayment) -> CommerceResult<Payment> {
        self.faults.check(FailPoint::InsertPayment)?;
        if self
            .working
            .payments
            .values()
            .any(|p| p.order_id == payment.order_id)
        {
            return Err(CommerceError::Conflict(format!(
                "order {} already has a payment",
                payment.order_id
            )));
        }
        let payment = Payment {
            id: self.working.next_id(),
            order_id: payment.order_id,
            amount: payment.amount,
            method: payment.method.clone(),
            status: payment.status.clone(),
            cash_on_delivery: payment.cash_on_delivery,
            gateway_reference: None,
            created_at: Utc::now(),
        };
        self.working.payments.insert(payment.id, payment.clone());
        Ok(payment)
    }

    async fn lock_order(&mut self, order_id: i64) -> CommerceResult<Option<Order>> {
        Ok(self.working.orders.get(&order_id).cloned())
    }

    async fn update_order_status(
        &mut self,
        order_id: i64,
        status: OrderStatus,
    ) -> CommerceResult<Option<Order>> {
        self.faults.check(FailPoint::UpdateOrderStatus)?;
        Ok(self.working.orders.get_mut(&order_id).map(|order| {
            let now = Utc::now();
            order.status = status.to_string();
            match status {
                OrderStatus::Confirmed => order.confirmed_at = Some(now),
                OrderStatus::Cancelled => order.cancelled_at = Some(now),
                OrderStatus::Delivered => order.delivered_at = Some(now),
                _ => {}
            }
            order.updated_at = now;
            order.clone()
        }))
    }

    async fn order_items(&mut self, order_id: i64) -> CommerceResult<Vec<OrderItem>> {
        Ok(self
            .working
            .order_items
            .values()
            .filter(|i| i.order_id == order_id)
            .cloned()
            .collect())
    }

    async fn lock_user(&mut self, user_id: i64) -> CommerceResult<bool> {
        Ok(self.working.users.contains_key(&user_id))
    }

    async fn find_address(&mut self, address_id: i64) -> CommerceResult<Option<Address>> {
        Ok(self.working.addresses.get(&address_id).cloned())
    }

    async fn insert_address(
        &mut self,
        address: &NewAddress,
        is_primary: bool,
    ) -> CommerceResult<Address> {
        Ok(self.working.insert_address(address, is_primary))
    }

    async fn active_addresses(&mut self, user_id: i64) -> CommerceResult<Vec<Address>> {
        Ok(self.working.active_addresses(user_id))
    }

    async fn clear_primary_addresses(&mut self, user_id: i64) -> CommerceResult<u64> {
        let mut cleared = 0;
        for address in self
            .working
            .addresses
            .values_mut()
            .filter(|a| a.user_id == user_id && a.is_primary)
        {
            address.is_primary = false;
            cleared += 1;
        }
        Ok(cleared)
    }

    async fn mark_address_primary(&mut self, address_id: i64) -> CommerceResult<bool> {
        self.faults.check(FailPoint::MarkAddressPrimary)?;
        Ok(match self.working.addresses.get_mut(&address_id) {
            Some(address) if !address.is_deleted => {
                address.is_primary = true;
                true
            }
            _ => false,
        })
    }

    async fn soft_delete_address(&mut self, address_id: i64) -> CommerceResult<bool> {
        Ok(match self.working.addresses.get_mut(&address_id) {
            Some(address) if !address.is_deleted => {
                address.is_deleted = true;
                address.is_primary = false;
                true
            }
            _ => false,
        })
    }

    async fn find_image(&mut self, image_id: i64) -> CommerceResult<Option<ProductImage>> {
        Ok(self.working.images.get(&image_id).cloned())
    }

    async fn clear_primary_images(&mut self, product_id: i64) -> CommerceResult<u64> {
        let mut cleared = 0;
        for image in self
            .working
            .images
            .values_mut()
            .filter(|i| i.product_id == product_id && i.is_primary)
        {
            image.is_primary = false;
            cleared += 1;
        }
        Ok(cleared)
    }

    async fn mark_image_primary(&mut self, image_id: i64) -> CommerceResult<bool> {
        self.faults.check(FailPoint::MarkImagePrimary)?;
        Ok(match self.working.images.get_mut(&image_id) {
            Some(image) => {
                image.is_primary = true;
                true
            }
            None => false,
        })
    }

    async fn commit(mut self) -> CommerceResult<()> {
        self.faults.check(FailPoint::Commit)?;
        *self.guard = std::mem::take(&mut self.working);
        Ok(())
    }

    async fn rollback(self) -> CommerceResult<()> {
        if self.faults.rollback.load(Ordering::Acquire) {
            return Err(CommerceError::transient("injected rollback failure"));
        }
        Ok(())
    }
}

#[async_trait]
impl CommerceStore for InMemoryCommerceStore {
    type Tx = InMemoryCommerceTx;

    async fn begin(&self) -> CommerceResult<InMemoryCommerceTx> {
        if self.closed.load(Ordering::Acquire) {
            return Err(CommerceError::transient("store is closed"));
        }
        let guard = Arc::clone(&self.state).lock_owned().await;
        let working = guard.clone();
        Ok(InMemoryCommerceTx {
            guard,
            working,
            faults: Arc::clone(&self.faults),
        })
    }

    async fn find_user(&self, user_id: i64) -> CommerceResult<Option<User>> {
        Ok(self.read().await?.users.get(&user_id).cloned())
    }

    async fn create_verify_email(&self, record: &NewVerifyEmail) -> CommerceResult<VerifyEmail> {
        let mut state = self.read().await?;
        for earlier in state
            .verify_emails
            .values_mut()
            .filter(|v| v.user_id == record.user_id)
        {
            earlier.is_used = true;
        }
        let verify_email = VerifyEmail {
            id: state.next_id(),
            user_id: record.user_id,
            email: record.email.clone(),
            secret_code: record.secret_code.clone(),
            is_used: false,
            created_at: Utc::now(),
            expired_at: record.expired_at,
        };
        state.verify_emails.insert(verify_email.id, verify_email.clone());
        Ok(verify_email)
    }

    async fn find_live_verify_email(&self, user_id: i64) -> CommerceResult<Option<VerifyEmail>> {
        let now = Utc::now();
        Ok(self
            .read()
            .await?
            .verify_emails
            .values()
            .rev()
            .find(|v| v.user_id == user_id && v.is_live(now))
            .cloned())
    }

    async fn find_payment(&self, payment_id: i64) -> CommerceResult<Option<Payment>> {
        Ok(self.read().await?.payments.get(&payment_id).cloned())
    }

    async fn find_order(&self, order_id: i64) -> CommerceResult<Option<Order>> {
        Ok(self.read().await?.orders.get(&order_id).cloned())
    }

    async fn order_lines(&self, order_id: i64) -> CommerceResult<Vec<OrderLine>> {
        Ok(self.read().await?.order_lines(order_id))
    }

    async fn find_address(&self, address_id: i64) -> CommerceResult<Option<Address>> {
        Ok(self.read().await?.addresses.get(&address_id).cloned())
    }

    async fn find_product(&self, product_id: i64) -> CommerceResult<Option<Product>> {
        Ok(self.read().await?.products.get(&product_id).cloned())
    }

    async fn find_cart_for_user(&self, user_id: i64) -> CommerceResult<Option<Cart>> {
        Ok(self.read().await?.cart_for_user(user_id))
    }

    async fn cart_lines(&self, cart_id: i64) -> CommerceResult<Vec<CartLine>> {
        Ok(self.read().await?.cart_lines(cart_id))
    }

    async fn product_images(&self, product_id: i64) -> CommerceResult<Vec<ProductImage>> {
        Ok(self
            .read()
            .await?
            .images
            .values()
            .filter(|i| i.product_id == product_id)
            .cloned()
            .collect())
    }

    async fn active_addresses(&self, user_id: i64) -> CommerceResult<Vec<Address>> {
        Ok(self.read().await?.active_addresses(user_id))
    }

    fn backend_name(&self) -> &'static str {
        "in_memory"
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_commit_publishes_working_copy() {
        let store = InMemoryCommerceStore::new();
        let product = store.seed_product("Lamp", Decimal::new(1250, 2), 4).await;

        let mut tx = store.begin().await.unwrap();
        assert_eq!(tx.reserve_stock(product.id, 3).await.unwrap(), Some(1));
        tx.commit().await.unwrap();

        assert_eq!(store.snapshot().await.product_stock(product.id), Some(1));
    }

    #[tokio::test]
    async fn test_drop_without_commit_discards_changes() {
        let store = InMemoryCommerceStore::new();
        let product = store.seed_product("Lamp", Decimal::new(1250, 2), 4).await;

        {
            let mut tx = store.begin().await.unwrap();
            tx.restock(product.id, 10).await.unwrap();
        }

        assert_eq!(store.snapshot().await.product_stock(product.id), Some(4));
    }

    #[tokio::test]
    async fn test_reserve_stock_refuses_to_go_negative() {
        let store = InMemoryCommerceStore::new();
        let product = store.seed_product("Lamp", Decimal::new(1250, 2), 2).await;

        let mut tx = store.begin().await.unwrap();
        assert_eq!(tx.reserve_stock(product.id, 3).await.unwrap(), None);
        assert_eq!(tx.reserve_stock(product.id, 2).await.unwrap(), Some(0));
        tx.rollback().await.unwrap();
    }

    #[tokio::test]
    async fn test_fail_points_and_read_failures() {
        let store = InMemoryCommerceStore::new();
        let product = store.seed_product("Lamp", Decimal::new(1250, 2), 2).await;

        store.fail_at(FailPoint::Restock);
        let mut tx = store.begin().await.unwrap();
        assert!(tx.restock(product.id, 1).await.is_err());
        drop(tx);

        store.fail_reads(true);
        let err = store.find_product(product.id).await.unwrap_err();
        assert!(err.is_transient());

        store.clear_failures();
        assert!(store.find_product(product.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_closed_store_rejects_work() {
        let store = InMemoryCommerceStore::new();
        store.close().await;
        assert!(store.begin().await.is_err());
        assert!(store.find_user(1).await.is_err());
    }

    #[tokio::test]
    async fn test_new_verify_code_retires_earlier_codes() {
        let store = InMemoryCommerceStore::new();
        let user = store.seed_user("grace", "grace@example.com").await;
        let code = |secret: &str| NewVerifyEmail {
            user_id: user.id,
            email: user.email.clone(),
            secret_code: secret.to_string(),
            expired_at: Utc::now() + chrono::Duration::minutes(15),
        };

        let first = store.create_verify_email(&code("first")).await.unwrap();
        assert_eq!(store.find_live_verify_email(user.id).await.unwrap(), Some(first.clone()));

        let second = store.create_verify_email(&code("second")).await.unwrap();

        let state = store.snapshot().await;
        assert!(state.verify_emails[&first.id].is_used);
        assert!(!state.verify_emails[&second.id].is_used);
        assert_eq!(store.find_live_verify_email(user.id).await.unwrap(), Some(second));
        assert_eq!(store.find_live_verify_email(user.id + 1).await.unwrap(), None);
    }
}
