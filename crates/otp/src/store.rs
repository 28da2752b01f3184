//! Storage for one-time phone verification codes and phone bindings.

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use courier_common::types::{Channel, OtpCode};

const OTP_COLUMNS: &str =
    "id, user_id, phone, channel, code_hash, attempts, used, expires_at, created_at";

#[derive(Clone)]
pub struct OtpStore {
    pool: PgPool,
}

impl OtpStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn insert(
        &self,
        phone: &str,
        channel: Channel,
        code_hash: &str,
        user_id: Option<Uuid>,
        expires_at: DateTime<Utc>,
    ) -> Result<Uuid, sqlx::Error> {
        sqlx::query_scalar(
            r#"
            INSERT INTO phone_otps (user_id, phone, channel, code_hash, expires_at)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id
            "#,
        )
        .bind(user_id)
        .bind(phone)
        .bind(channel)
        .bind(code_hash)
        .bind(expires_at)
        .fetch_one(&self.pool)
        .await
    }

    /// Codes issued for a phone inside the rolling rate-limit window.
    pub async fn count_recent(
        &self,
        phone: &str,
        window_minutes: i64,
    ) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM phone_otps
            WHERE phone = $1
              AND created_at > now() - ($2 * interval '1 minute')
            "#,
        )
        .bind(phone)
        .bind(window_minutes)
        .fetch_one(&self.pool)
        .await
    }

    /// The newest unused code for a phone, expired or not.
    pub async fn latest_unused(&self, phone: &str) -> Result<Option<OtpCode>, sqlx::Error> {
        sqlx::query_as(&format!(
            r#"
            SELECT {OTP_COLUMNS} FROM phone_otps
            WHERE phone = $1 AND used = FALSE
            ORDER BY created_at DESC
            LIMIT 1
            "#
        ))
        .bind(phone)
        .fetch_optional(&self.pool)
        .await
    }

    /// Increment the attempt counter and return the new value.
    pub async fn bump_attempts(&self, id: Uuid) -> Result<i32, sqlx::Error> {
        sqlx::query_scalar(
            r#"
            UPDATE phone_otps SET attempts = attempts + 1
            WHERE id = $1
            RETURNING attempts
            "#,
        )
        .bind(id)
        .fetch_one(&self.pool)
        .await
    }

    pub async fn mark_used(&self, id: Uuid) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE phone_otps SET used = TRUE WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Drop a code that never reached the recipient.
    pub async fn delete(&self, id: Uuid) -> Result<(), sqlx::Error> {
        sqlx::query("DELETE FROM phone_otps WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Bind a verified phone to an account. Re-verifying the same account
    /// refreshes the timestamp.
    pub async fn bind_phone(&self, phone: &str, user_id: Uuid) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO phone_bindings (phone, user_id)
            VALUES ($1, $2)
            ON CONFLICT (phone) DO UPDATE
            SET user_id = EXCLUDED.user_id, verified_at = now()
            "#,
        )
        .bind(phone)
        .bind(user_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Account currently bound to a phone, if any.
    pub async fn bound_user(&self, phone: &str) -> Result<Option<Uuid>, sqlx::Error> {
        sqlx::query_scalar("SELECT user_id FROM phone_bindings WHERE phone = $1")
            .bind(phone)
            .fetch_optional(&self.pool)
            .await
    }
}
