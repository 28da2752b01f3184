//! Monitoring webhook alerts.
//!
//! Fired when a job crosses the retry alert threshold and when it fails
//! terminally. Delivery is best-effort; a dead webhook must never stall the
//! queue.

use serde_json::json;

use courier_common::types::NotificationJob;

const MAX_ALERT_ERROR_LEN: usize = 500;

pub struct MonitoringAlerter {
    http: reqwest::Client,
    webhook_url: Option<String>,
}

impl MonitoringAlerter {
    pub fn new(webhook_url: Option<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            webhook_url,
        }
    }

    /// Post one alert event; log and swallow any failure.
    pub async fn notify(&self, event: &str, job: &NotificationJob, attempt: i32, detail: &str) {
        let Some(url) = &self.webhook_url else {
            return;
        };

        let detail: String = detail.chars().take(MAX_ALERT_ERROR_LEN).collect();
        let payload = json!({
            "event": event,
            "job_id": job.id,
            "channel": job.channel,
            "recipient": job.recipient,
            "attempt": attempt,
            "error": detail,
        });

        match self.http.post(url).json(&payload).send().await {
            Ok(response) if !response.status().is_success() => {
                tracing::warn!(
                    event,
                    status = %response.status(),
                    "Monitoring webhook rejected alert"
                );
            }
            Ok(_) => {
                tracing::debug!(event, job_id = %job.id, "Monitoring alert delivered");
            }
            Err(e) => {
                tracing::warn!(event, error = %e, "Monitoring webhook unreachable");
            }
        }
    }
}
