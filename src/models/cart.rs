//! # Cart Model
//!
//! A user's shopping cart and its items. Each user has at most one cart; the cart
//! row is never deleted and is reused after checkout, which only clears the items
//! and stamps `checked_out_at`.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgExecutor};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Cart {
    pub id: i64,
    pub user_id: i64,
    /// Most recent checkout of this cart
    pub checked_out_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct CartItem {
    pub id: i64,
    pub cart_id: i64,
    pub product_id: i64,
    pub quantity: i32,
}

/// Cart item joined with the product snapshot used for pricing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct CartLine {
    pub cart_item_id: i64,
    pub product_id: i64,
    pub quantity: i32,
    pub product_name: String,
    pub unit_price: Decimal,
    pub stock: i32,
    pub archived: bool,
}

impl CartLine {
    pub fn line_total(&self) -> Decimal {
        self.unit_price * Decimal::from(self.quantity)
    }
}

impl Cart {
    pub async fn create<'e, E>(executor: E, user_id: i64) -> Result<Cart, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        sqlx::query_as::<_, Cart>(
            r#"
            INSERT INTO carts (user_id)
            VALUES ($1)
            RETURNING id, user_id, checked_out_at, created_at
            "#,
        )
        .bind(user_id)
        .fetch_one(executor)
        .await
    }

    pub async fn find_for_user<'e, E>(executor: E, user_id: i64) -> Result<Option<Cart>, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        sqlx::query_as::<_, Cart>(
            r#"
            SELECT id, user_id, checked_out_at, created_at
            FROM carts
            WHERE user_id = $1
            "#,
        )
        .bind(user_id)
        .fetch_optional(executor)
        .await
    }

    /// Lock the cart owned by `user_id` so concurrent checkouts of it serialize
    pub async fn lock_for_user<'e, E>(
        executor: E,
        cart_id: i64,
        user_id: i64,
    ) -> Result<Option<Cart>, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        sqlx::query_as::<_, Cart>(
            r#"
            SELECT id, user_id, checked_out_at, created_at
            FROM carts
            WHERE id = $1 AND user_id = $2
            FOR UPDATE
            "#,
        )
        .bind(cart_id)
        .bind(user_id)
        .fetch_optional(executor)
        .await
    }

    pub async fn mark_checked_out<'e, E>(executor: E, cart_id: i64) -> Result<(), sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        sqlx::query("UPDATE carts SET checked_out_at = NOW() WHERE id = $1")
            .bind(cart_id)
            .execute(executor)
            .await?;
        Ok(())
    }
}

impl CartItem {
    /// Insert the item or replace its quantity
    pub async fn upsert<'e, E>(
        executor: E,
        cart_id: i64,
        product_id: i64,
        quantity: i32,
    ) -> Result<CartItem, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        sqlx::query_as::<_, CartItem>(
            r#"
            INSERT INTO cart_items (cart_id, product_id, quantity)
            VALUES ($1, $2, $3)
            ON CONFLICT (cart_id, product_id) DO UPDATE SET quantity = EXCLUDED.quantity
            RETURNING id, cart_id, product_id, quantity
            "#,
        )
        .bind(cart_id)
        .bind(product_id)
        .bind(quantity)
        .fetch_one(executor)
        .await
    }

    pub async fn delete<'e, E>(executor: E, cart_id: i64, product_id: i64) -> Result<bool, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        let result = sqlx::query("DELETE FROM cart_items WHERE cart_id = $1 AND product_id = $2")
            .bind(cart_id)
            .bind(product_id)
            .execute(executor)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn clear_for_cart<'e, E>(executor: E, cart_id: i64) -> Result<u64, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        let result = sqlx::query("DELETE FROM cart_items WHERE cart_id = $1")
            .bind(cart_id)
            .execute(executor)
            .await?;
        Ok(result.rows_affected())
    }

    /// Items of a cart joined with current product data, in insertion order
    pub async fn lines_for_cart<'e, E>(executor: E, cart_id: i64) -> Result<Vec<CartLine>, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        sqlx::query_as::<_, CartLine>(
            r#"
            SELECT ci.id AS cart_item_id,
                   ci.product_id,
                   ci.quantity,
                   p.name AS product_name,
                   p.price AS unit_price,
                   p.stock,
                   p.archived
            FROM cart_items ci
            JOIN products p ON p.id = ci.product_id
            WHERE ci.cart_id = $1
            ORDER BY ci.id
            "#,
        )
        .bind(cart_id)
        .fetch_all(executor)
        .await
    }
}
