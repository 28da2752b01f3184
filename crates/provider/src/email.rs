//! Resend email adapter.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Value, json};

use courier_common::config::AppConfig;

use crate::adapter::{Delivery, MessageBody, MessageSender, SendError, SendErrorKind, SendRequest};

const RESEND_API_URL: &str = "https://api.resend.com/emails";
const PROVIDER: &str = "resend";

/// Email sender backed by the Resend HTTP API.
pub struct ResendSender {
    http: reqwest::Client,
    api_key: String,
    default_from: String,
    api_url: String,
}

impl ResendSender {
    pub fn new(api_key: String, default_from: String, timeout: Duration) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            api_key,
            default_from,
            api_url: RESEND_API_URL.to_string(),
        })
    }

    /// Build from app config; errors when Resend credentials are absent.
    pub fn from_config(config: &AppConfig) -> anyhow::Result<Self> {
        let api_key = config
            .resend_api_key
            .clone()
            .ok_or_else(|| anyhow::anyhow!("RESEND_API_KEY is required for email sends"))?;
        let default_from = config
            .email_from
            .clone()
            .ok_or_else(|| anyhow::anyhow!("EMAIL_FROM is required for email sends"))?;
        Self::new(
            api_key,
            default_from,
            Duration::from_millis(config.dispatch_timeout_ms),
        )
    }

    pub fn with_api_url(mut self, api_url: String) -> Self {
        self.api_url = api_url;
        self
    }
}

#[async_trait]
impl MessageSender for ResendSender {
    fn provider(&self) -> &'static str {
        PROVIDER
    }

    async fn send(&self, request: &SendRequest) -> Result<Delivery, SendError> {
        let MessageBody::Email {
            subject,
            html,
            from,
            bcc,
        } = &request.body
        else {
            return Err(SendError::new(
                PROVIDER,
                SendErrorKind::Config,
                "resend adapter only delivers email bodies",
            ));
        };

        let mut payload = json!({
            "from": from.as_deref().unwrap_or(&self.default_from),
            "to": [request.to],
            "subject": subject,
            "html": html,
        });
        if let Some(bcc) = bcc {
            payload["bcc"] = json!([bcc]);
        }

        tracing::debug!(to = %request.to, subject = %subject, "Sending email via Resend");

        let response = self
            .http
            .post(&self.api_url)
            .bearer_auth(&self.api_key)
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

        if status.is_success() {
            let message_id = body["id"].as_str().map(String::from);
            tracing::info!(to = %request.to, message_id = ?message_id, "Email accepted");
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
        let detail = body["message"]
            .as_str()
            .map(String::from)
            .unwrap_or_else(|| format!("resend status {}", status));
        tracing::warn!(to = %request.to, status = %status, detail = %detail, "Email send failed");
        Err(SendError::new(PROVIDER, kind, detail))
    }
}
