//! Channel dispatcher.
//!
//! Takes one send request, routes it by channel, resolves template variables
//! into canonical positional order, and hands the final payload to the
//! provider adapter. Every real attempt, successful or not, is followed by a
//! best-effort audit write.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use courier_common::types::{AuditLogEntry, Channel, MessageAuditRow, NotificationJob};
use courier_provider::adapter::{Delivery, MessageBody, MessageSender, SendError, SendRequest};
use courier_provider::template;

use crate::audit::AuditWriter;
use crate::registry::TemplateSource;
use crate::vars::TemplateVars;

const DEFAULT_LANGUAGE: &str = "en";

/// One send request, as accepted by the dispatch endpoint and produced from
/// queued jobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchRequest {
    pub to: String,
    pub channel: Channel,
    #[serde(default, rename = "templateKey")]
    pub template_key: Option<String>,
    #[serde(default, rename = "templateLanguage")]
    pub template_language: Option<String>,
    #[serde(default)]
    pub vars: Option<TemplateVars>,
    #[serde(default)]
    pub subject: Option<String>,
    #[serde(default)]
    pub html: Option<String>,
    #[serde(default)]
    pub metadata: Option<Value>,
    #[serde(default)]
    pub dry_run: bool,
}

impl DispatchRequest {
    /// Build the dispatch request for a claimed queue row.
    pub fn from_job(job: &NotificationJob) -> Self {
        Self {
            to: job.recipient.clone(),
            channel: job.channel,
            template_key: job.template_key.clone(),
            template_language: job.template_language.clone(),
            vars: job.vars.as_ref().and_then(TemplateVars::from_value),
            subject: job.subject.clone(),
            html: job.html.clone(),
            metadata: job.metadata.clone(),
            dry_run: false,
        }
    }
}

/// Result of a dispatch.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum DispatchOutcome {
    Delivered(Delivery),
    /// Rendered outbound payload, nothing transmitted.
    DryRun { rendered: Value },
}

#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("validation: {0}")]
    Validation(String),

    #[error("template_not_found: ({key}, {language})")]
    TemplateNotFound { key: String, language: String },

    #[error("configuration: {0}")]
    Config(String),

    #[error(transparent)]
    Send(#[from] SendError),

    #[error("registry error: {0}")]
    Registry(#[from] anyhow::Error),
}

impl DispatchError {
    /// Whether the worker should reschedule the job instead of failing it.
    pub fn is_retryable(&self) -> bool {
        match self {
            DispatchError::Send(e) => e.is_retryable(),
            // Store hiccups during template lookup are worth another pass.
            DispatchError::Registry(_) => true,
            DispatchError::Validation(_)
            | DispatchError::TemplateNotFound { .. }
            | DispatchError::Config(_) => false,
        }
    }
}

/// Routes send requests to the right provider adapter.
pub struct Dispatcher {
    registry: Arc<dyn TemplateSource>,
    audit: AuditWriter,
    wa_sender: Arc<dyn MessageSender>,
    email_sender: Option<Arc<dyn MessageSender>>,
}

impl Dispatcher {
    pub fn new(
        registry: Arc<dyn TemplateSource>,
        audit: AuditWriter,
        wa_sender: Arc<dyn MessageSender>,
        email_sender: Option<Arc<dyn MessageSender>>,
    ) -> Self {
        Self {
            registry,
            audit,
            wa_sender,
            email_sender,
        }
    }

    pub async fn dispatch(
        &self,
        request: &DispatchRequest,
    ) -> Result<DispatchOutcome, DispatchError> {
        match request.channel {
            Channel::Email => self.dispatch_email(request).await,
            Channel::Whatsapp | Channel::Sms => self.dispatch_templated(request).await,
        }
    }

    async fn dispatch_email(
        &self,
        request: &DispatchRequest,
    ) -> Result<DispatchOutcome, DispatchError> {
        let (Some(subject), Some(html)) = (&request.subject, &request.html) else {
            return Err(DispatchError::Validation(
                "email requires: to, subject, html".to_string(),
            ));
        };

        let send = SendRequest {
            to: request.to.clone(),
            body: MessageBody::Email {
                subject: subject.clone(),
                html: html.clone(),
                from: None,
                bcc: None,
            },
            metadata: request.metadata.clone(),
        };

        if request.dry_run {
            return Ok(DispatchOutcome::DryRun {
                rendered: json!({ "to": send.to, "subject": subject, "html": html }),
            });
        }

        let sender = self
            .email_sender
            .as_ref()
            .ok_or_else(|| DispatchError::Config("email sender not configured".to_string()))?;

        let result = sender.send(&send).await;
        self.write_audit(request, sender.provider(), &result).await;
        Ok(DispatchOutcome::Delivered(result?))
    }

    async fn dispatch_templated(
        &self,
        request: &DispatchRequest,
    ) -> Result<DispatchOutcome, DispatchError> {
        let key = request
            .template_key
            .as_deref()
            .ok_or_else(|| {
                DispatchError::Validation("templateKey is required for whatsapp/sms".to_string())
            })?;
        let language = request
            .template_language
            .as_deref()
            .unwrap_or(DEFAULT_LANGUAGE);

        let row = self
            .registry
            .lookup(key, language)
            .await?
            .ok_or_else(|| DispatchError::TemplateNotFound {
                key: key.to_string(),
                language: language.to_string(),
            })?;

        let var_order = row.var_order();
        let vars = request
            .vars
            .as_ref()
            .map(|v| v.resolve(var_order.as_deref()))
            .unwrap_or_default();

        let rendered =
            template::render_payload(&row.meta_name, &row.language, &row.components, &vars)
                .map_err(|e| DispatchError::Validation(e.to_string()))?;

        if request.dry_run {
            return Ok(DispatchOutcome::DryRun { rendered });
        }

        let send = SendRequest {
            to: request.to.clone(),
            body: MessageBody::Template {
                name: row.meta_name.clone(),
                language: row.language.clone(),
                components: rendered,
            },
            metadata: request.metadata.clone(),
        };

        let result = self.wa_sender.send(&send).await;
        self.write_audit(request, self.wa_sender.provider(), &result)
            .await;
        Ok(DispatchOutcome::Delivered(result?))
    }

    /// Best-effort audit after every real attempt, regardless of outcome.
    async fn write_audit(
        &self,
        request: &DispatchRequest,
        provider: &str,
        result: &Result<Delivery, SendError>,
    ) {
        let (status, message_id, attempts) = match result {
            Ok(d) => ("sent", d.message_id.clone(), d.attempts as i32),
            Err(e) => ("failed", None, e.attempts as i32),
        };

        self.audit
            .write_delivery(&MessageAuditRow {
                channel: request.channel,
                recipient: request.to.clone(),
                provider: provider.to_string(),
                provider_message_id: message_id.clone(),
                status: status.to_string(),
                attempts,
                metadata: request.metadata.clone(),
            })
            .await;

        self.audit
            .write_action(&AuditLogEntry {
                entity: "notification".to_string(),
                entity_id: message_id,
                action: format!("send_{}", status),
                detail: Some(json!({
                    "channel": request.channel.to_string(),
                    "provider": provider,
                })),
            })
            .await;
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use serde_json::json;

    use courier_provider::adapter::SendErrorKind;

    use super::*;
    use crate::registry::TemplateRow;

    struct MapRegistry(HashMap<(String, String), TemplateRow>);

    #[async_trait]
    impl TemplateSource for MapRegistry {
        async fn lookup(&self, key: &str, language: &str) -> anyhow::Result<Option<TemplateRow>> {
            Ok(self.0.get(&(key.to_string(), language.to_string())).cloned())
        }
    }

    #[derive(Default)]
    struct RecordingSink {
        deliveries: Mutex<Vec<MessageAuditRow>>,
        fail: bool,
    }

    #[async_trait]
    impl crate::audit::AuditSink for RecordingSink {
        async fn record_delivery(&self, row: &MessageAuditRow) -> anyhow::Result<()> {
            if self.fail {
                anyhow::bail!("sink unavailable");
            }
            self.deliveries.lock().unwrap().push(row.clone());
            Ok(())
        }

        async fn record_action(&self, _entry: &AuditLogEntry) -> anyhow::Result<()> {
            if self.fail {
                anyhow::bail!("sink unavailable");
            }
            Ok(())
        }
    }

    /// Captures requests; succeeds or fails on demand.
    #[derive(Default)]
    struct CapturingSender {
        requests: Mutex<Vec<SendRequest>>,
        fail_with: Option<SendErrorKind>,
    }

    #[async_trait]
    impl MessageSender for CapturingSender {
        fn provider(&self) -> &'static str {
            "stub"
        }

        async fn send(&self, request: &SendRequest) -> Result<Delivery, SendError> {
            self.requests.lock().unwrap().push(request.clone());
            if let Some(kind) = self.fail_with {
                return Err(SendError::new("stub", kind, "stub failure"));
            }
            Ok(Delivery {
                provider: "stub".to_string(),
                message_id: Some("wamid.TEST".to_string()),
                raw_response: Value::Null,
                attempts: 1,
            })
        }
    }

    fn demo_registry() -> Arc<MapRegistry> {
        let mut map = HashMap::new();
        map.insert(
            ("demo".to_string(), "en".to_string()),
            TemplateRow {
                key: "demo".to_string(),
                language: "en".to_string(),
                meta_name: "demo_en".to_string(),
                components: json!([{ "type": "BODY", "text": "Hi {{1}}, due {{2}}" }]),
                var_order: Some(json!(["name", "amount"])),
            },
        );
        Arc::new(MapRegistry(map))
    }

    fn dispatcher_with(
        sender: Arc<CapturingSender>,
        sink: Arc<RecordingSink>,
    ) -> Dispatcher {
        Dispatcher::new(
            demo_registry(),
            AuditWriter::new(sink),
            sender,
            None,
        )
    }

    fn wa_request(vars: TemplateVars, dry_run: bool) -> DispatchRequest {
        DispatchRequest {
            to: "whatsapp:+15551234567".to_string(),
            channel: Channel::Whatsapp,
            template_key: Some("demo".to_string()),
            template_language: Some("en".to_string()),
            vars: Some(vars),
            subject: None,
            html: None,
            metadata: None,
            dry_run,
        }
    }

    #[tokio::test]
    async fn email_without_subject_rejected() {
        let sender = Arc::new(CapturingSender::default());
        let dispatcher = dispatcher_with(sender, Arc::new(RecordingSink::default()));

        let request = DispatchRequest {
            to: "user@example.com".to_string(),
            channel: Channel::Email,
            template_key: None,
            template_language: None,
            vars: None,
            subject: None,
            html: Some("<p>hi</p>".to_string()),
            metadata: None,
            dry_run: false,
        };
        let err = dispatcher.dispatch(&request).await.unwrap_err();
        assert!(matches!(err, DispatchError::Validation(_)));
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn templated_without_key_rejected() {
        let sender = Arc::new(CapturingSender::default());
        let dispatcher = dispatcher_with(sender.clone(), Arc::new(RecordingSink::default()));

        let mut request = wa_request(TemplateVars::Positional(vec!["x".to_string()]), false);
        request.template_key = None;
        let err = dispatcher.dispatch(&request).await.unwrap_err();
        assert!(matches!(err, DispatchError::Validation(_)));
        assert!(sender.requests.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn unknown_template_not_sent() {
        let sender = Arc::new(CapturingSender::default());
        let dispatcher = dispatcher_with(sender.clone(), Arc::new(RecordingSink::default()));

        let mut request = wa_request(TemplateVars::Positional(vec![]), false);
        request.template_key = Some("missing".to_string());
        let err = dispatcher.dispatch(&request).await.unwrap_err();
        assert!(matches!(err, DispatchError::TemplateNotFound { .. }));
        assert!(!err.is_retryable());
        assert!(sender.requests.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn named_vars_ordered_by_registry() {
        let sender = Arc::new(CapturingSender::default());
        let sink = Arc::new(RecordingSink::default());
        let dispatcher = dispatcher_with(sender.clone(), sink);

        let vars = TemplateVars::from_value(&json!({
            "amount": "250", "name": "Alice"
        }))
        .unwrap();
        dispatcher
            .dispatch(&wa_request(vars, false))
            .await
            .unwrap();

        let sent = sender.requests.lock().unwrap();
        let MessageBody::Template { components, .. } = &sent[0].body else {
            panic!("expected template body");
        };
        let params = components["components"][0]["parameters"].as_array().unwrap();
        assert_eq!(params[0]["text"], "Alice");
        assert_eq!(params[1]["text"], "250");
    }

    #[tokio::test]
    async fn dry_run_renders_without_sending_or_auditing() {
        let sender = Arc::new(CapturingSender::default());
        let sink = Arc::new(RecordingSink::default());
        let dispatcher = dispatcher_with(sender.clone(), sink.clone());

        let outcome = dispatcher
            .dispatch(&wa_request(
                TemplateVars::Positional(vec!["Alice".to_string(), "250".to_string()]),
                true,
            ))
            .await
            .unwrap();

        let DispatchOutcome::DryRun { rendered } = outcome else {
            panic!("expected dry run");
        };
        assert_eq!(rendered["name"], "demo_en");
        assert!(sender.requests.lock().unwrap().is_empty());
        assert!(sink.deliveries.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn success_writes_audit_row_with_message_id() {
        let sender = Arc::new(CapturingSender::default());
        let sink = Arc::new(RecordingSink::default());
        let dispatcher = dispatcher_with(sender, sink.clone());

        dispatcher
            .dispatch(&wa_request(
                TemplateVars::Positional(vec!["Alice".to_string(), "250".to_string()]),
                false,
            ))
            .await
            .unwrap();

        let rows = sink.deliveries.lock().unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].status, "sent");
        assert_eq!(rows[0].provider_message_id.as_deref(), Some("wamid.TEST"));
    }

    #[tokio::test]
    async fn failure_still_audited_and_propagates() {
        let sender = Arc::new(CapturingSender {
            requests: Mutex::new(vec![]),
            fail_with: Some(SendErrorKind::Server),
        });
        let sink = Arc::new(RecordingSink::default());
        let dispatcher = dispatcher_with(sender, sink.clone());

        let err = dispatcher
            .dispatch(&wa_request(
                TemplateVars::Positional(vec!["Alice".to_string(), "250".to_string()]),
                false,
            ))
            .await
            .unwrap_err();

        assert!(err.is_retryable());
        let rows = sink.deliveries.lock().unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].status, "failed");
        assert!(rows[0].provider_message_id.is_none());
    }

    #[tokio::test]
    async fn audit_sink_failure_never_fails_the_send() {
        let sender = Arc::new(CapturingSender::default());
        let sink = Arc::new(RecordingSink {
            deliveries: Mutex::new(vec![]),
            fail: true,
        });
        let dispatcher = dispatcher_with(sender, sink);

        let outcome = dispatcher
            .dispatch(&wa_request(
                TemplateVars::Positional(vec!["Alice".to_string(), "250".to_string()]),
                false,
            ))
            .await;
        assert!(outcome.is_ok());
    }
}
