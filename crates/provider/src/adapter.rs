//! Provider adapter boundary.
//!
//! Everything downstream of the dispatcher speaks `MessageSender`: one send
//! request in, a tagged outcome out. Adapters never throw raw HTTP errors at
//! callers; every failure is classified into a `SendErrorKind` so the worker
//! can decide between retry and permanent failure without inspecting provider
//! response bodies.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// A single outbound message, already resolved to its final shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendRequest {
    /// Recipient. Adapters normalize channel prefixes such as `whatsapp:+...`.
    pub to: String,
    pub body: MessageBody,
    pub metadata: Option<serde_json::Value>,
}

/// Channel-specific message content.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MessageBody {
    /// Pre-rendered provider template payload (see `template::render_payload`).
    Template {
        name: String,
        language: String,
        components: serde_json::Value,
    },
    /// Free-form text. When `otp` is set the adapter must mask the body in
    /// its logs.
    Text {
        body: Option<String>,
        otp: Option<String>,
    },
    /// Email content.
    Email {
        subject: String,
        html: String,
        from: Option<String>,
        bcc: Option<String>,
    },
}

impl MessageBody {
    /// True when the body carries a one-time code that must never be logged.
    pub fn is_sensitive(&self) -> bool {
        matches!(self, MessageBody::Text { otp: Some(_), .. })
    }
}

/// Successful delivery outcome.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Delivery {
    pub provider: String,
    pub message_id: Option<String>,
    pub raw_response: serde_json::Value,
    /// Attempts consumed inside the adapter (>= 1; > 1 under the retry wrapper).
    pub attempts: u32,
}

/// Classified send failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SendErrorKind {
    /// Downstream call exceeded its deadline.
    Timeout,
    /// HTTP 429 or provider-signalled throttling.
    RateLimited,
    /// HTTP 5xx or transport failure.
    Server,
    /// Provider accepted the request but rejected it semantically, or
    /// returned a non-retryable 4xx.
    Rejected,
    /// Recipient failed normalization/validation.
    InvalidRecipient,
    /// Template unknown to the registry or the provider.
    TemplateNotFound,
    /// Adapter is missing required credentials.
    Config,
}

#[derive(Debug, Clone, thiserror::Error)]
#[error("{provider} send failed ({kind:?}): {detail}")]
pub struct SendError {
    pub provider: String,
    pub kind: SendErrorKind,
    pub detail: String,
    pub attempts: u32,
}

impl SendError {
    pub fn new(provider: &str, kind: SendErrorKind, detail: impl Into<String>) -> Self {
        Self {
            provider: provider.to_string(),
            kind,
            detail: detail.into(),
            attempts: 1,
        }
    }

    /// Only transient transport failures are worth retrying.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.kind,
            SendErrorKind::Timeout | SendErrorKind::RateLimited | SendErrorKind::Server
        )
    }
}

/// Outbound transport abstraction.
#[async_trait]
pub trait MessageSender: Send + Sync {
    /// Short provider name recorded in audit rows (e.g. "meta", "resend").
    fn provider(&self) -> &'static str;

    async fn send(&self, request: &SendRequest) -> Result<Delivery, SendError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_kinds() {
        for kind in [
            SendErrorKind::Timeout,
            SendErrorKind::RateLimited,
            SendErrorKind::Server,
        ] {
            assert!(SendError::new("meta", kind, "x").is_retryable());
        }
        for kind in [
            SendErrorKind::Rejected,
            SendErrorKind::InvalidRecipient,
            SendErrorKind::TemplateNotFound,
            SendErrorKind::Config,
        ] {
            assert!(!SendError::new("meta", kind, "x").is_retryable());
        }
    }

    #[test]
    fn otp_bodies_are_sensitive() {
        let body = MessageBody::Text {
            body: None,
            otp: Some("123456".to_string()),
        };
        assert!(body.is_sensitive());

        let plain = MessageBody::Text {
            body: Some("hello".to_string()),
            otp: None,
        };
        assert!(!plain.is_sensitive());
    }
}
