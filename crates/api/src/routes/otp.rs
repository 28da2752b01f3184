//! Phone OTP routes.

use axum::extract::State;
use axum::routing::post;
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use courier_common::error::AppError;
use courier_otp::service::{OtpError, VerifyOutcome};

use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/otp/send", post(send_otp))
        .route("/api/otp/verify", post(verify_otp))
}

fn map_otp_error(e: OtpError) -> AppError {
    match e {
        OtpError::InvalidPhone(msg) => AppError::Validation(msg),
        OtpError::RateLimited => {
            AppError::RateLimited("too many codes requested for this phone".to_string())
        }
        OtpError::Delivery(e) => AppError::Provider(e.to_string()),
        OtpError::Database(e) => AppError::Database(e),
    }
}

#[derive(Debug, Deserialize)]
struct SendOtpParams {
    phone: String,
    #[serde(default)]
    user_id: Option<Uuid>,
}

/// POST /api/otp/send — Issue and deliver a verification code.
///
/// A phone already verified by another account cannot request codes for a
/// different one.
async fn send_otp(
    State(state): State<AppState>,
    Json(params): Json<SendOtpParams>,
) -> Result<Json<serde_json::Value>, AppError> {
    if let Some(user_id) = params.user_id {
        let bound = state
            .otp
            .store()
            .bound_user(&params.phone)
            .await
            .map_err(AppError::Database)?;
        if bound.is_some_and(|existing| existing != user_id) {
            return Err(AppError::Validation(
                "phone_in_use_by_other_account".to_string(),
            ));
        }
    }

    state
        .otp
        .send(&params.phone, params.user_id)
        .await
        .map_err(map_otp_error)?;

    Ok(Json(json!({ "ok": true })))
}

#[derive(Debug, Deserialize)]
struct VerifyOtpParams {
    phone: String,
    code: String,
    #[serde(default)]
    user_id: Option<Uuid>,
}

/// POST /api/otp/verify — Check a submitted code.
///
/// Rejections are part of the normal flow and come back as 200 with
/// `ok: false` and a machine-readable reason; a phone owned by a different
/// account rejects with `phone_in_use_by_other_account`.
async fn verify_otp(
    State(state): State<AppState>,
    Json(params): Json<VerifyOtpParams>,
) -> Result<Json<serde_json::Value>, AppError> {
    let outcome = state
        .otp
        .verify(&params.phone, &params.code, params.user_id)
        .await
        .map_err(map_otp_error)?;

    let body = match outcome {
        VerifyOutcome::Verified { user_id } => json!({
            "ok": true,
            "userId": user_id,
        }),
        VerifyOutcome::Rejected(reason) => json!({
            "ok": false,
            "reason": reason.as_str(),
        }),
    };
    Ok(Json(body))
}
