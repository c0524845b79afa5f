use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgExecutor};

/// Payment record created with its order; one per order (`UNIQUE (order_id)`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Payment {
    pub id: i64,
    pub order_id: i64,
    pub amount: Decimal,
    pub method: String,
    pub status: String,
    pub cash_on_delivery: bool,
    /// Reference assigned by the payment gateway once it sees the payment
    pub gateway_reference: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewPayment {
    pub order_id: i64,
    pub amount: Decimal,
    pub method: String,
    pub status: String,
    pub cash_on_delivery: bool,
}

impl Payment {
    pub async fn create<'e, E>(executor: E, new: &NewPayment) -> Result<Payment, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        sqlx::query_as::<_, Payment>(
            r#"
            INSERT INTO payments (order_id, amount, method, status, cash_on_delivery)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id, order_id, amount, method, status, cash_on_delivery,
                      gateway_reference, created_at
            "#,
        )
        .bind(new.order_id)
        .bind(new.amount)
        .bind(&new.method)
        .bind(&new.status)
        .bind(new.cash_on_delivery)
        .fetch_one(executor)
        .await
    }

    pub async fn find_by_id<'e, E>(executor: E, id: i64) -> Result<Option<Payment>, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        sqlx::query_as::<_, Payment>(
            r#"
            SELECT id, order_id, amount, method, status, cash_on_delivery,
                   gateway_reference, created_at
            FROM payments
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(executor)
        .await
    }

    pub async fn find_by_order_id<'e, E>(executor: E, order_id: i64) -> Result<Option<Payment>, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        sqlx::query_as::<_, Payment>(
            r#"
            SELECT id, order_id, amount, method, status, cash_on_delivery,
                   gateway_reference, created_at
            FROM payments
            WHERE order_id = $1
            "#,
        )
        .bind(order_id)
        .fetch_optional(executor)
        .await
    }
}
