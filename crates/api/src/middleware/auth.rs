//! Scheduler shared-secret authentication.
//!
//! Internal endpoints (manual dispatch, worker runs) are called by a cron
//! scheduler that presents a shared secret in a configurable header. The
//! comparison is constant-time. When no secret is configured the check is
//! disabled, which is only acceptable in local development.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use subtle::ConstantTimeEq;

use courier_common::error::AppError;

use crate::state::AppState;

const DEFAULT_HEADER: &str = "x-scheduler-secret";

/// Extractor that authenticates scheduler-only routes.
#[derive(Debug, Clone, Copy)]
pub struct SchedulerAuth;

fn secret_matches(presented: Option<&str>, expected: &str) -> bool {
    let Some(presented) = presented else {
        return false;
    };
    presented.as_bytes().ct_eq(expected.as_bytes()).into()
}

impl FromRequestParts<AppState> for SchedulerAuth {
    type Rejection = AppError;

    fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> impl std::future::Future<Output = Result<Self, Self::Rejection>> + Send {
        let expected = state.config.scheduler_secret_token.clone();
        let header_name = state
            .config
            .scheduler_secret_header
            .clone()
            .unwrap_or_else(|| DEFAULT_HEADER.to_string());

        let presented = parts
            .headers
            .get(header_name.as_str())
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string());

        async move {
            let Some(expected) = expected else {
                tracing::warn!("Scheduler secret not configured, allowing request");
                return Ok(SchedulerAuth);
            };

            if secret_matches(presented.as_deref(), &expected) {
                Ok(SchedulerAuth)
            } else {
                Err(AppError::Auth("Invalid or missing scheduler secret".to_string()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matches_only_exact_secret() {
        assert!(secret_matches(Some("s3cret"), "s3cret"));
        assert!(!secret_matches(Some("s3cret "), "s3cret"));
        assert!(!secret_matches(Some("other"), "s3cret"));
        assert!(!secret_matches(None, "s3cret"));
    }
}
