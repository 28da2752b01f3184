//! Persisted notification queue.
//!
//! Jobs live in `notification_jobs` and move through
//! `pending → processing → {sent | pending | failed}`. Claiming is a
//! conditional UPDATE on `status = 'pending'`, so two workers can never own
//! the same row at the same time.

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use courier_common::types::{Channel, NotificationJob};

/// Keep stored error text bounded.
const MAX_ERROR_LEN: usize = 2000;

fn truncate_error(detail: &str) -> String {
    detail.chars().take(MAX_ERROR_LEN).collect()
}

/// Payload for enqueueing a new job.
#[derive(Debug, Clone, serde::Deserialize)]
pub struct NewJob {
    pub channel: Channel,
    pub recipient: String,
    #[serde(default)]
    pub template_key: Option<String>,
    #[serde(default)]
    pub template_language: Option<String>,
    #[serde(default)]
    pub vars: Option<serde_json::Value>,
    #[serde(default)]
    pub subject: Option<String>,
    #[serde(default)]
    pub html: Option<String>,
    #[serde(default)]
    pub metadata: Option<serde_json::Value>,
    /// Earliest dispatch time; immediate when absent.
    #[serde(default)]
    pub run_after: Option<DateTime<Utc>>,
}

/// Queue access over PostgreSQL.
#[derive(Clone)]
pub struct QueueStore {
    pool: PgPool,
}

impl QueueStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn enqueue(&self, job: &NewJob) -> Result<Uuid, sqlx::Error> {
        let id: Uuid = sqlx::query_scalar(
            r#"
            INSERT INTO notification_jobs
                (channel, recipient, template_key, template_language, vars,
                 subject, html, metadata, run_after)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, COALESCE($9, now()))
            RETURNING id
            "#,
        )
        .bind(job.channel)
        .bind(&job.recipient)
        .bind(&job.template_key)
        .bind(&job.template_language)
        .bind(&job.vars)
        .bind(&job.subject)
        .bind(&job.html)
        .bind(&job.metadata)
        .bind(job.run_after)
        .fetch_one(&self.pool)
        .await?;
        Ok(id)
    }

    /// Due jobs in run order. Rows are not reserved here; `claim` does that.
    pub async fn fetch_due(&self, limit: i64) -> Result<Vec<NotificationJob>, sqlx::Error> {
        sqlx::query_as(
            r#"
            SELECT id, channel, recipient, template_key, template_language, vars,
                   subject, html, metadata, status, attempts, run_after,
                   last_error, created_at, updated_at
            FROM notification_jobs
            WHERE status = 'pending' AND run_after <= now()
            ORDER BY run_after ASC
            LIMIT $1
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await
    }

    /// Atomically claim one pending job. Returns the attempt number this
    /// claim starts (1-based), or `None` when another worker got there first.
    pub async fn claim(&self, id: Uuid) -> Result<Option<i32>, sqlx::Error> {
        sqlx::query_scalar(
            r#"
            UPDATE notification_jobs
            SET status = 'processing', attempts = attempts + 1, updated_at = now()
            WHERE id = $1 AND status = 'pending'
            RETURNING attempts
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
    }

    pub async fn finalize_sent(&self, id: Uuid) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            UPDATE notification_jobs
            SET status = 'sent', last_error = NULL, updated_at = now()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Put the job back in `pending` with a future `run_after`.
    pub async fn finalize_retry(
        &self,
        id: Uuid,
        detail: &str,
        delay_ms: u64,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            UPDATE notification_jobs
            SET status = 'pending',
                run_after = now() + ($2 * interval '1 millisecond'),
                last_error = $3,
                updated_at = now()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(delay_ms as i64)
        .bind(truncate_error(detail))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Terminal failure. The row stays for inspection; nothing requeues it.
    pub async fn finalize_failed(&self, id: Uuid, detail: &str) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            UPDATE notification_jobs
            SET status = 'failed', last_error = $2, updated_at = now()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(truncate_error(detail))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Requeue jobs stuck in `processing`, e.g. after a worker crash.
    pub async fn sweep_stale(&self, timeout_secs: i64) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE notification_jobs
            SET status = 'pending', updated_at = now()
            WHERE status = 'processing'
              AND updated_at < now() - ($1 * interval '1 second')
            "#,
        )
        .bind(timeout_secs)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    pub async fn get(&self, id: Uuid) -> Result<Option<NotificationJob>, sqlx::Error> {
        sqlx::query_as(
            r#"
            SELECT id, channel, recipient, template_key, template_language, vars,
                   subject, html, metadata, status, attempts, run_after,
                   last_error, created_at, updated_at
            FROM notification_jobs
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_text_is_bounded() {
        let long = "x".repeat(5000);
        assert_eq!(truncate_error(&long).len(), MAX_ERROR_LEN);
        assert_eq!(truncate_error("short"), "short");
    }
}
