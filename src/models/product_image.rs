use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgExecutor};

/// Image attached to a product; exactly one per product carries `is_primary`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct ProductImage {
    pub id: i64,
    pub product_id: i64,
    pub url: String,
    pub is_primary: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewProductImage {
    pub product_id: i64,
    pub url: String,
    pub is_primary: bool,
}

impl ProductImage {
    pub async fn create<'e, E>(executor: E, new: &NewProductImage) -> Result<ProductImage, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        sqlx::query_as::<_, ProductImage>(
            r#"
            INSERT INTO product_images (product_id, url, is_primary)
            VALUES ($1, $2, $3)
            RETURNING id, product_id, url, is_primary, created_at
            "#,
        )
        .bind(new.product_id)
        .bind(&new.url)
        .bind(new.is_primary)
        .fetch_one(executor)
        .await
    }

    pub async fn find_by_id<'e, E>(executor: E, id: i64) -> Result<Option<ProductImage>, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        sqlx::query_as::<_, ProductImage>(
            r#"
            SELECT id, product_id, url, is_primary, created_at
            FROM product_images
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(executor)
        .await
    }

    pub async fn list_for_product<'e, E>(
        executor: E,
        product_id: i64,
    ) -> Result<Vec<ProductImage>, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        sqlx::query_as::<_, ProductImage>(
            r#"
            SELECT id, product_id, url, is_primary, created_at
            FROM product_images
            WHERE product_id = $1
            ORDER BY id
            "#,
        )
        .bind(product_id)
        .fetch_all(executor)
        .await
    }

    pub async fn clear_primary_for_product<'e, E>(
        executor: E,
        product_id: i64,
    ) -> Result<u64, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        let result = sqlx::query(
            "UPDATE product_images SET is_primary = false WHERE product_id = $1 AND is_primary",
        )
        .bind(product_id)
        .execute(executor)
        .await?;
        Ok(result.rows_affected())
    }

    pub async fn mark_primary<'e, E>(executor: E, id: i64) -> Result<bool, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        let result = sqlx::query("UPDATE product_images SET is_primary = true WHERE id = $1")
            .bind(id)
            .execute(executor)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
