//! Meta (WhatsApp Business) Graph API adapter.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Value, json};

use courier_common::config::AppConfig;

use crate::adapter::{Delivery, MessageBody, MessageSender, SendError, SendErrorKind, SendRequest};

const GRAPH_API_BASE: &str = "https://graph.facebook.com/v20.0";
const PROVIDER: &str = "meta";

/// WhatsApp sender backed by the Meta Graph API.
pub struct MetaSender {
    http: reqwest::Client,
    phone_number_id: String,
    access_token: String,
    api_base: String,
}

impl MetaSender {
    pub fn new(
        phone_number_id: String,
        access_token: String,
        timeout: Duration,
    ) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            phone_number_id,
            access_token,
            api_base: GRAPH_API_BASE.to_string(),
        })
    }

    /// Build from app config; errors when Meta credentials are absent.
    pub fn from_config(config: &AppConfig) -> anyhow::Result<Self> {
        let phone_number_id = config
            .meta_phone_number_id
            .clone()
            .ok_or_else(|| anyhow::anyhow!("META_PHONE_NUMBER_ID is required for WhatsApp sends"))?;
        let access_token = config
            .meta_access_token
            .clone()
            .ok_or_else(|| anyhow::anyhow!("META_ACCESS_TOKEN is required for WhatsApp sends"))?;
        Self::new(
            phone_number_id,
            access_token,
            Duration::from_millis(config.dispatch_timeout_ms),
        )
    }

    /// Point the adapter at a different API base (tests).
    pub fn with_api_base(mut self, api_base: String) -> Self {
        self.api_base = api_base;
        self
    }

    /// Accept either `whatsapp:+123...` or `+123...`.
    fn normalize_recipient(to: &str) -> Result<String, SendError> {
        let to = to.strip_prefix("whatsapp:").unwrap_or(to).trim();
        if !to.starts_with('+') || !to[1..].chars().all(|c| c.is_ascii_digit()) {
            return Err(SendError::new(
                PROVIDER,
                SendErrorKind::InvalidRecipient,
                format!("recipient is not an E.164 number: {}", to),
            ));
        }
        Ok(to.to_string())
    }

    fn build_body(to: &str, body: &MessageBody) -> Result<Value, SendError> {
        match body {
            MessageBody::Template {
                components, ..
            } => Ok(json!({
                "messaging_product": "whatsapp",
                "to": to,
                "type": "template",
                "template": components,
            })),
            MessageBody::Text { body, otp } => {
                let text = match (body, otp) {
                    (Some(b), _) => b.clone(),
                    (None, Some(code)) => format!("Your verification code is {}", code),
                    (None, None) => String::new(),
                };
                Ok(json!({
                    "messaging_product": "whatsapp",
                    "to": to,
                    "type": "text",
                    "text": { "body": text },
                }))
            }
            MessageBody::Email { .. } => Err(SendError::new(
                PROVIDER,
                SendErrorKind::Config,
                "meta adapter cannot deliver email",
            )),
        }
    }
}

#[async_trait]
impl MessageSender for MetaSender {
    fn provider(&self) -> &'static str {
        PROVIDER
    }

    async fn send(&self, request: &SendRequest) -> Result<Delivery, SendError> {
        let to = Self::normalize_recipient(&request.to)?;
        let payload = Self::build_body(&to, &request.body)?;

        // OTP payloads are masked; the access token is never logged.
        if request.body.is_sensitive() {
            tracing::debug!(to = %to, "Sending WhatsApp text (body masked)");
        } else {
            tracing::debug!(to = %to, payload = %payload, "Sending WhatsApp message");
        }

        let url = format!("{}/{}/messages", self.api_base, self.phone_number_id);
        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.access_token)
            .json(&payload)
            .send()
            .await
            .map_err(|e| {
                let kind = if e.is_timeout() {
                    SendErrorKind::Timeout
                } else {
                    SendErrorKind::Server
                };
                SendError::new(PROVIDER, kind, e.to_string())
            })?;

        let status = response.status();
        let body: Value = response.json().await.unwrap_or(Value::Null);

        // An HTTP 200 alone is not success; the Graph API reports semantic
        // failures through an `error` object in the body.
        if status.is_success() && body.get("error").is_none() {
            let message_id = body["messages"][0]["id"].as_str().map(String::from);
            tracing::info!(to = %to, message_id = ?message_id, "WhatsApp message accepted");
            return Ok(Delivery {
                provider: PROVIDER.to_string(),
                message_id,
                raw_response: body,
                attempts: 1,
            });
        }

        let kind = match status.as_u16() {
            429 => SendErrorKind::RateLimited,
            s if s >= 500 => SendErrorKind::Server,
            _ => SendErrorKind::Rejected,
        };
        let detail = body["error"]["message"]
            .as_str()
            .map(String::from)
            .unwrap_or_else(|| format!("graph api status {}", status));
        tracing::warn!(to = %to, status = %status, detail = %detail, "WhatsApp send failed");
        Err(SendError::new(PROVIDER, kind, detail))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_whatsapp_prefix() {
        let to = MetaSender::normalize_recipient("whatsapp:+15551234567").unwrap();
        assert_eq!(to, "+15551234567");
    }

    #[test]
    fn accepts_bare_e164() {
        let to = MetaSender::normalize_recipient("+4915112345678").unwrap();
        assert_eq!(to, "+4915112345678");
    }

    #[test]
    fn rejects_malformed_recipient() {
        let err = MetaSender::normalize_recipient("not-a-number").unwrap_err();
        assert_eq!(err.kind, SendErrorKind::InvalidRecipient);
        assert!(!err.is_retryable());
    }

    #[test]
    fn text_body_falls_back_to_otp_message() {
        let body = MetaSender::build_body(
            "+15551234567",
            &MessageBody::Text {
                body: None,
                otp: Some("123456".to_string()),
            },
        )
        .unwrap();
        assert_eq!(body["type"], "text");
        assert_eq!(body["text"]["body"], "Your verification code is 123456");
    }

    #[test]
    fn template_body_embeds_rendered_payload() {
        let rendered = serde_json::json!({
            "name": "demo", "language": {"code": "en"}, "components": []
        });
        let body = MetaSender::build_body(
            "+15551234567",
            &MessageBody::Template {
                name: "demo".to_string(),
                language: "en".to_string(),
                components: rendered.clone(),
            },
        )
        .unwrap();
        assert_eq!(body["type"], "template");
        assert_eq!(body["template"], rendered);
    }

    #[test]
    fn email_body_is_a_config_error() {
        let err = MetaSender::build_body(
            "+15551234567",
            &MessageBody::Email {
                subject: "s".to_string(),
                html: "<p>h</p>".to_string(),
                from: None,
                bcc: None,
            },
        )
        .unwrap_err();
        assert_eq!(err.kind, SendErrorKind::Config);
    }
}
