use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Outbound delivery channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    Whatsapp,
    Email,
    Sms,
}

impl std::fmt::Display for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Channel::Whatsapp => write!(f, "whatsapp"),
            Channel::Email => write!(f, "email"),
            Channel::Sms => write!(f, "sms"),
        }
    }
}

/// Lifecycle state of a queued notification job.
///
/// Transitions are only `pending → processing → {sent | pending | failed}`;
/// `failed` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Processing,
    Sent,
    Failed,
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobStatus::Pending => write!(f, "pending"),
            JobStatus::Processing => write!(f, "processing"),
            JobStatus::Sent => write!(f, "sent"),
            JobStatus::Failed => write!(f, "failed"),
        }
    }
}

/// A queued unit of outbound communication.
///
/// For templated channels (`whatsapp`/`sms`) the payload is
/// `template_key` + `template_language` + `vars`; for `email` it is
/// `subject` + `html`.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct NotificationJob {
    pub id: Uuid,
    pub channel: Channel,
    pub recipient: String,
    pub template_key: Option<String>,
    pub template_language: Option<String>,
    pub vars: Option<serde_json::Value>,
    pub subject: Option<String>,
    pub html: Option<String>,
    pub metadata: Option<serde_json::Value>,
    pub status: JobStatus,
    pub attempts: i32,
    pub run_after: DateTime<Utc>,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One append-only delivery attempt record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageAuditRow {
    pub channel: Channel,
    pub recipient: String,
    pub provider: String,
    pub provider_message_id: Option<String>,
    pub status: String,
    pub attempts: i32,
    pub metadata: Option<serde_json::Value>,
}

/// Generalized entity/action audit entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditLogEntry {
    pub entity: String,
    pub entity_id: Option<String>,
    pub action: String,
    pub detail: Option<serde_json::Value>,
}

/// A stored one-time phone verification code. Only the HMAC of the
/// plaintext code is persisted.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct OtpCode {
    pub id: Uuid,
    pub user_id: Option<Uuid>,
    pub phone: String,
    pub channel: Channel,
    pub code_hash: String,
    pub attempts: i32,
    pub used: bool,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}
