//! Notification enqueue and synchronous dispatch routes.

use axum::extract::State;
use axum::routing::post;
use axum::{Json, Router};
use serde_json::json;

use courier_common::error::AppError;
use courier_common::types::Channel;
use courier_dispatch::{DispatchError, DispatchOutcome, DispatchRequest};
use courier_worker::queue::NewJob;

use crate::middleware::auth::SchedulerAuth;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/notifications", post(enqueue_notification))
        .route("/api/notifications/dispatch", post(dispatch_notification))
}

/// Channel-specific required fields, checked before the row is written.
fn validate(job: &NewJob) -> Result<(), AppError> {
    if job.recipient.trim().is_empty() {
        return Err(AppError::Validation("recipient is required".to_string()));
    }
    match job.channel {
        Channel::Whatsapp | Channel::Sms => {
            if job.template_key.as_deref().map_or(true, str::is_empty) {
                return Err(AppError::Validation(
                    "templateKey is required for whatsapp/sms".to_string(),
                ));
            }
        }
        Channel::Email => {
            if job.subject.is_none() || job.html.is_none() {
                return Err(AppError::Validation(
                    "email requires: recipient, subject, html".to_string(),
                ));
            }
        }
    }
    Ok(())
}

fn map_dispatch_error(e: DispatchError) -> AppError {
    match e {
        DispatchError::Validation(msg) => AppError::Validation(msg),
        DispatchError::TemplateNotFound { key, language } => {
            AppError::NotFound(format!("template ({}, {}) not found", key, language))
        }
        DispatchError::Config(msg) => AppError::Config(msg),
        DispatchError::Send(e) => AppError::Provider(e.to_string()),
        DispatchError::Registry(e) => AppError::Internal(e.to_string()),
    }
}

/// POST /api/notifications — Enqueue a job for asynchronous delivery.
async fn enqueue_notification(
    State(state): State<AppState>,
    Json(job): Json<NewJob>,
) -> Result<Json<serde_json::Value>, AppError> {
    validate(&job)?;
    let id = state.queue.enqueue(&job).await?;
    tracing::info!(job_id = %id, channel = %job.channel, "Notification enqueued");
    Ok(Json(json!({ "ok": true, "id": id })))
}

/// POST /api/notifications/dispatch — Send immediately, bypassing the queue.
///
/// With `dry_run: true` the rendered payload is returned and nothing is
/// transmitted.
async fn dispatch_notification(
    State(state): State<AppState>,
    _auth: SchedulerAuth,
    Json(request): Json<DispatchRequest>,
) -> Result<Json<serde_json::Value>, AppError> {
    let outcome = state
        .dispatcher
        .dispatch(&request)
        .await
        .map_err(map_dispatch_error)?;

    let body = match outcome {
        DispatchOutcome::Delivered(delivery) => json!({
            "ok": true,
            "status": "sent",
            "result": {
                "provider": delivery.provider,
                "messageId": delivery.message_id,
            },
        }),
        DispatchOutcome::DryRun { rendered } => json!({
            "ok": true,
            "status": "dry_run",
            "result": rendered,
        }),
    };
    Ok(Json(body))
}
