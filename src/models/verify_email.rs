use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgExecutor};

/// Email verification code issued by the verify-email task
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct VerifyEmail {
    pub id: i64,
    pub user_id: i64,
    pub email: String,
    pub secret_code: String,
    pub is_used: bool,
    pub created_at: DateTime<Utc>,
    pub expired_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewVerifyEmail {
    pub user_id: i64,
    pub email: String,
    pub secret_code: String,
    pub expired_at: DateTime<Utc>,
}

impl VerifyEmail {
    /// Unused and not yet expired
    pub fn is_live(&self, now: DateTime<Utc>) -> bool {
        !self.is_used && self.expired_at > now
    }

    /// Insert a new code, retiring every earlier unused code of the same user
    pub async fn create<'e, E>(executor: E, new: &NewVerifyEmail) -> Result<VerifyEmail, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        sqlx::query_as::<_, VerifyEmail>(
            r#"
            WITH retired AS (
                UPDATE verify_emails SET is_used = TRUE
                WHERE user_id = $1 AND NOT is_used
            )
            INSERT INTO verify_emails (user_id, email, secret_code, expired_at)
            VALUES ($1, $2, $3, $4)
            RETURNING id, user_id, email, secret_code, is_used, created_at, expired_at
            "#,
        )
        .bind(new.user_id)
        .bind(&new.email)
        .bind(&new.secret_code)
        .bind(new.expired_at)
        .fetch_one(executor)
        .await
    }

    pub async fn find_live_for_user<'e, E>(
        executor: E,
        user_id: i64,
    ) -> Result<Option<VerifyEmail>, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        sqlx::query_as::<_, VerifyEmail>(
            r#"
            SELECT id, user_id, email, secret_code, is_used, created_at, expired_at
            FROM verify_emails
            WHERE user_id = $1 AND NOT is_used AND expired_at > NOW()
            ORDER BY id DESC
            LIMIT 1
            "#,
        )
        .bind(user_id)
        .fetch_optional(executor)
        .await
    }
}
