//! Delivery audit trail.
//!
//! Every delivery attempt produces one `message_audit` row. Inserts
//! deduplicate on `provider_message_id` via ON CONFLICT DO NOTHING, so
//! retrying callers can re-write the same attempt safely. Audit writes are
//! best-effort: failures are logged and never fail the send.

use std::sync::Arc;

use async_trait::async_trait;
use sqlx::PgPool;

use courier_common::types::{AuditLogEntry, MessageAuditRow};

/// Destination for audit rows; injectable for tests.
#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn record_delivery(&self, row: &MessageAuditRow) -> anyhow::Result<()>;
    async fn record_action(&self, entry: &AuditLogEntry) -> anyhow::Result<()>;
}

/// PostgreSQL audit sink.
pub struct PgAuditSink {
    pool: PgPool,
}

impl PgAuditSink {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AuditSink for PgAuditSink {
    async fn record_delivery(&self, row: &MessageAuditRow) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            INSERT INTO message_audit (channel, recipient, provider, provider_message_id, status, attempts, metadata)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (provider_message_id) DO NOTHING
            "#,
        )
        .bind(row.channel)
        .bind(&row.recipient)
        .bind(&row.provider)
        .bind(&row.provider_message_id)
        .bind(&row.status)
        .bind(row.attempts)
        .bind(&row.metadata)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn record_action(&self, entry: &AuditLogEntry) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            INSERT INTO audit_log (entity, entity_id, action, detail)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(&entry.entity)
        .bind(&entry.entity_id)
        .bind(&entry.action)
        .bind(&entry.detail)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

/// Best-effort wrapper over a sink.
#[derive(Clone)]
pub struct AuditWriter {
    sink: Arc<dyn AuditSink>,
}

impl AuditWriter {
    pub fn new(sink: Arc<dyn AuditSink>) -> Self {
        Self { sink }
    }

    /// Write a delivery row; log and swallow any sink failure.
    pub async fn write_delivery(&self, row: &MessageAuditRow) {
        if let Err(e) = self.sink.record_delivery(row).await {
            tracing::error!(
                recipient = %row.recipient,
                provider = %row.provider,
                error = %e,
                "Failed to insert message audit row"
            );
        }
    }

    /// Write a generalized action entry; log and swallow any sink failure.
    pub async fn write_action(&self, entry: &AuditLogEntry) {
        if let Err(e) = self.sink.record_action(entry).await {
            tracing::error!(entity = %entry.entity, action = %entry.action, error = %e,
                "Failed to insert audit log entry");
        }
    }
}
