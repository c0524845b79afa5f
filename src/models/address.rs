//! # Address Model
//!
//! Shipping addresses owned by a user. Addresses are soft-deleted, never removed,
//! and exactly one non-deleted address per user carries `is_primary`.
//!
//! The single-primary invariant is maintained by the owning transaction (see
//! `lifecycle::AddressBook`), with a partial unique index as a backstop:
//!
//! ```sql
//! CREATE UNIQUE INDEX addresses_one_primary_per_user
//!     ON addresses (user_id) WHERE is_primary AND NOT is_deleted;
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgExecutor};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Address {
    pub id: i64,
    pub user_id: i64,
    pub recipient: String,
    pub line: String,
    pub city: String,
    pub phone: String,
    pub is_primary: bool,
    pub is_deleted: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewAddress {
    pub user_id: i64,
    pub recipient: String,
    pub line: String,
    pub city: String,
    pub phone: String,
}

impl Address {
    pub fn is_active(&self) -> bool {
        !self.is_deleted
    }

    pub async fn create<'e, E>(
        executor: E,
        new: &NewAddress,
        is_primary: bool,
    ) -> Result<Address, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        sqlx::query_as::<_, Address>(
            r#"
            INSERT INTO addresses (user_id, recipient, line, city, phone, is_primary)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING id, user_id, recipient, line, city, phone, is_primary, is_deleted, created_at
            "#,
        )
        .bind(new.user_id)
        .bind(&new.recipient)
        .bind(&new.line)
        .bind(&new.city)
        .bind(&new.phone)
        .bind(is_primary)
        .fetch_one(executor)
        .await
    }

    pub async fn find_by_id<'e, E>(executor: E, id: i64) -> Result<Option<Address>, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        sqlx::query_as::<_, Address>(
            r#"
            SELECT id, user_id, recipient, line, city, phone, is_primary, is_deleted, created_at
            FROM addresses
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(executor)
        .await
    }

    pub async fn list_active_for_user<'e, E>(
        executor: E,
        user_id: i64,
    ) -> Result<Vec<Address>, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        sqlx::query_as::<_, Address>(
            r#"
            SELECT id, user_id, recipient, line, city, phone, is_primary, is_deleted, created_at
            FROM addresses
            WHERE user_id = $1 AND NOT is_deleted
            ORDER BY created_at DESC, id DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(executor)
        .await
    }

    pub async fn clear_primary_for_user<'e, E>(executor: E, user_id: i64) -> Result<u64, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        let result =
            sqlx::query("UPDATE addresses SET is_primary = false WHERE user_id = $1 AND is_primary")
                .bind(user_id)
                .execute(executor)
                .await?;
        Ok(result.rows_affected())
    }

    pub async fn mark_primary<'e, E>(executor: E, id: i64) -> Result<bool, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        let result = sqlx::query(
            "UPDATE addresses SET is_primary = true WHERE id = $1 AND NOT is_deleted",
        )
        .bind(id)
        .execute(executor)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn soft_delete<'e, E>(executor: E, id: i64) -> Result<bool, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        let result = sqlx::query(
            "UPDATE addresses SET is_deleted = true, is_primary = false WHERE id = $1 AND NOT is_deleted",
        )
        .bind(id)
        .execute(executor)
        .await?;
        Ok(result.rows_affected() > 0)
    }
}
