//! # Product Model
//!
//! Catalog rows read during checkout pricing and mutated by stock reservation
//! and cancellation restock.
//!
//! Stock changes are always relative updates (`stock = stock ± n`) so concurrent
//! reservations and restocks compose instead of overwriting each other. The
//! reservation is a compare-and-swap: it only applies while enough stock remains.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgExecutor};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Product {
    pub id: i64,
    pub name: String,
    pub price: Decimal,
    pub stock: i32,
    pub archived: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewProduct {
    pub name: String,
    pub price: Decimal,
    pub stock: i32,
}

impl Product {
    pub async fn create<'e, E>(executor: E, new: &NewProduct) -> Result<Product, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        sqlx::query_as::<_, Product>(
            r#"
            INSERT INTO products (name, price, stock)
            VALUES ($1, $2, $3)
            RETURNING id, name, price, stock, archived, created_at, updated_at
            "#,
        )
        .bind(&new.name)
        .bind(new.price)
        .bind(new.stock)
        .fetch_one(executor)
        .await
    }

    pub async fn find_by_id<'e, E>(executor: E, id: i64) -> Result<Option<Product>, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        sqlx::query_as::<_, Product>(
            r#"
            SELECT id, name, price, stock, archived, created_at, updated_at
            FROM products
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(executor)
        .await
    }

    /// Lock the product row; serializes primary-image exchanges for the product
    pub async fn lock_by_id<'e, E>(executor: E, id: i64) -> Result<bool, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        let row: Option<(i64,)> =
            sqlx::query_as("SELECT id FROM products WHERE id = $1 FOR UPDATE")
                .bind(id)
                .fetch_optional(executor)
                .await?;
        Ok(row.is_some())
    }

    /// Decrement stock only if enough remains; returns the new stock level on success
    pub async fn reserve_stock<'e, E>(
        executor: E,
        id: i64,
        quantity: i32,
    ) -> Result<Option<i32>, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        let row: Option<(i32,)> = sqlx::query_as(
            r#"
            UPDATE products
            SET stock = stock - $2, updated_at = NOW()
            WHERE id = $1 AND stock >= $2
            RETURNING stock
            "#,
        )
        .bind(id)
        .bind(quantity)
        .fetch_optional(executor)
        .await?;
        Ok(row.map(|(stock,)| stock))
    }

    /// Return stock to the product; returns the new stock level, or `None` if the product is gone
    pub async fn restock<'e, E>(
        executor: E,
        id: i64,
        quantity: i32,
    ) -> Result<Option<i32>, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        let row: Option<(i32,)> = sqlx::query_as(
            r#"
            UPDATE products
            SET stock = stock + $2, updated_at = NOW()
            WHERE id = $1
            RETURNING stock
            "#,
        )
        .bind(id)
        .bind(quantity)
        .fetch_optional(executor)
        .await?;
        Ok(row.map(|(stock,)| stock))
    }

    pub async fn set_archived<'e, E>(executor: E, id: i64, archived: bool) -> Result<bool, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        let result = sqlx::query("UPDATE products SET archived = $2, updated_at = NOW() WHERE id = $1")
            .bind(id)
            .bind(archived)
            .execute(executor)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
