//! Scheduler-triggered worker runs.

use std::time::Duration;

use axum::extract::State;
use axum::routing::post;
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;

use courier_common::error::AppError;

use crate::middleware::auth::SchedulerAuth;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/api/worker/run", post(run_worker))
}

#[derive(Debug, Default, Deserialize)]
struct RunParams {
    limit: Option<i64>,
    budget_ms: Option<u64>,
}

/// POST /api/worker/run — Run one worker pass over the due queue.
///
/// The cron scheduler calls this on a fixed cadence; limit and budget
/// default to the configured values.
async fn run_worker(
    State(state): State<AppState>,
    _auth: SchedulerAuth,
    params: Option<Json<RunParams>>,
) -> Result<Json<serde_json::Value>, AppError> {
    let Json(params) = params.unwrap_or_default();
    let limit = params.limit.unwrap_or(state.config.worker_limit);
    let budget = Duration::from_millis(params.budget_ms.unwrap_or(state.config.worker_budget_ms));

    let processed = state
        .worker
        .run_once(limit, budget)
        .await
        .map_err(|e| AppError::Internal(e.to_string()))?;

    Ok(Json(json!({ "ok": true, "processed": processed })))
}
