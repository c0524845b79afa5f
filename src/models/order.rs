//! # Order Model
//!
//! Orders and their line items. An order is created once per checkout together
//! with its items and its payment; item prices are snapshots taken at creation
//! and never change afterwards. Status changes go through `lifecycle`, which
//! checks them against `OrderStatus::can_transition_to`.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgExecutor};

use crate::error::{CommerceError, CommerceResult};
use crate::state_machine::OrderStatus;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Order {
    pub id: i64,
    pub user_id: i64,
    pub address_id: i64,
    pub status: String,
    pub total_price: Decimal,
    pub confirmed_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewOrder {
    pub user_id: i64,
    pub address_id: i64,
    pub total_price: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct OrderItem {
    pub id: i64,
    pub order_id: i64,
    pub product_id: i64,
    pub quantity: i32,
    /// Unit price at the moment of checkout
    pub price: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewOrderItem {
    pub order_id: i64,
    pub product_id: i64,
    pub quantity: i32,
    pub price: Decimal,
}

/// Order item joined with its product name, for notifications
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct OrderLine {
    pub product_id: i64,
    pub product_name: String,
    pub quantity: i32,
    pub price: Decimal,
}

impl OrderItem {
    pub fn line_total(&self) -> Decimal {
        self.price * Decimal::from(self.quantity)
    }
}

impl OrderLine {
    pub fn line_total(&self) -> Decimal {
        self.price * Decimal::from(self.quantity)
    }
}

impl Order {
    /// Parsed status; rows with unknown statuses are reported as database errors
    pub fn order_status(&self) -> CommerceResult<OrderStatus> {
        self.status.parse().map_err(CommerceError::database)
    }

    pub async fn create<'e, E>(executor: E, new: &NewOrder) -> Result<Order, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        sqlx::query_as::<_, Order>(
            r#"
            INSERT INTO orders (user_id, address_id, status, total_price)
            VALUES ($1, $2, $3, $4)
            RETURNING id, user_id, address_id, status, total_price,
                      confirmed_at, cancelled_at, delivered_at, created_at, updated_at
            "#,
        )
        .bind(new.user_id)
        .bind(new.address_id)
        .bind(OrderStatus::WaitForConfirming.as_str())
        .bind(new.total_price)
        .fetch_one(executor)
        .await
    }

    pub async fn find_by_id<'e, E>(executor: E, id: i64) -> Result<Option<Order>, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        sqlx::query_as::<_, Order>(
            r#"
            SELECT id, user_id, address_id, status, total_price,
                   confirmed_at, cancelled_at, delivered_at, created_at, updated_at
            FROM orders
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(executor)
        .await
    }

    /// Load and lock the order row for a status change
    pub async fn lock_by_id<'e, E>(executor: E, id: i64) -> Result<Option<Order>, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        sqlx::query_as::<_, Order>(
            r#"
            SELECT id, user_id, address_id, status, total_price,
                   confirmed_at, cancelled_at, delivered_at, created_at, updated_at
            FROM orders
            WHERE id = $1
            FOR UPDATE
            "#,
        )
        .bind(id)
        .fetch_optional(executor)
        .await
    }

    /// Set the status and stamp the matching lifecycle timestamp
    pub async fn update_status<'e, E>(
        executor: E,
        id: i64,
        status: OrderStatus,
    ) -> Result<Option<Order>, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        sqlx::query_as::<_, Order>(
            r#"
            UPDATE orders
            SET status = $2,
                confirmed_at = CASE WHEN $2 = 'confirmed' THEN NOW() ELSE confirmed_at END,
                cancelled_at = CASE WHEN $2 = 'cancelled' THEN NOW() ELSE cancelled_at END,
                delivered_at = CASE WHEN $2 = 'delivered' THEN NOW() ELSE delivered_at END,
                updated_at = NOW()
            WHERE id = $1
            RETURNING id, user_id, address_id, status, total_price,
                      confirmed_at, cancelled_at, delivered_at, created_at, updated_at
            "#,
        )
        .bind(id)
        .bind(status.as_str())
        .fetch_optional(executor)
        .await
    }
}

impl OrderItem {
    pub async fn create<'e, E>(executor: E, new: &NewOrderItem) -> Result<OrderItem, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        sqlx::query_as::<_, OrderItem>(
            r#"
            INSERT INTO order_items (order_id, product_id, quantity, price)
            VALUES ($1, $2, $3, $4)
            RETURNING id, order_id, product_id, quantity, price
            "#,
        )
        .bind(new.order_id)
        .bind(new.product_id)
        .bind(new.quantity)
        .bind(new.price)
        .fetch_one(executor)
        .await
    }

    pub async fn list_for_order<'e, E>(executor: E, order_id: i64) -> Result<Vec<OrderItem>, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        sqlx::query_as::<_, OrderItem>(
            r#"
            SELECT id, order_id, product_id, quantity, price
            FROM order_items
            WHERE order_id = $1
            ORDER BY id
            "#,
        )
        .bind(order_id)
        .fetch_all(executor)
        .await
    }

    pub async fn lines_for_order<'e, E>(executor: E, order_id: i64) -> Result<Vec<OrderLine>, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        sqlx::query_as::<_, OrderLine>(
            r#"
            SELECT oi.product_id, p.name AS product_name, oi.quantity, oi.price
            FROM order_items oi
            JOIN products p ON p.id = oi.product_id
            WHERE oi.order_id = $1
            ORDER BY oi.id
            "#,
        )
        .bind(order_id)
        .fetch_all(executor)
        .await
    }
}
