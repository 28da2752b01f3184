//! Phone OTP issuance and verification.
//!
//! Codes are six digits from a CSPRNG. Only `HMAC-SHA256(secret, phone || code)`
//! is persisted, so a leaked table row cannot be replayed against another
//! phone. Verification always burns an attempt before comparing, and the
//! comparison itself is constant-time.

use std::sync::Arc;

use chrono::{Duration, Utc};
use hmac::{Hmac, Mac};
use rand::Rng;
use serde::Serialize;
use sha2::Sha256;
use subtle::ConstantTimeEq;
use uuid::Uuid;

use courier_common::config::AppConfig;
use courier_common::types::Channel;
use courier_provider::adapter::{MessageBody, MessageSender, SendError, SendRequest};

use crate::store::OtpStore;

type HmacSha256 = Hmac<Sha256>;

const CODE_DIGITS: u32 = 6;

#[derive(Debug, thiserror::Error)]
pub enum OtpError {
    #[error("invalid_phone: {0}")]
    InvalidPhone(String),

    #[error("rate_limited: too many codes requested for this phone")]
    RateLimited,

    #[error("delivery failed: {0}")]
    Delivery(#[from] SendError),

    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

/// Why a verification was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum VerifyRejection {
    /// No outstanding code for this phone.
    NoOtp,
    /// The newest code has expired.
    Expired,
    /// The attempt cap was reached; the code is burned.
    MaxAttempts,
    /// The code did not match.
    Invalid,
    /// The phone is already bound to a different account.
    PhoneInUseByOtherAccount,
}

impl VerifyRejection {
    pub fn as_str(&self) -> &'static str {
        match self {
            VerifyRejection::NoOtp => "no_otp",
            VerifyRejection::Expired => "expired",
            VerifyRejection::MaxAttempts => "max_attempts",
            VerifyRejection::Invalid => "invalid",
            VerifyRejection::PhoneInUseByOtherAccount => "phone_in_use_by_other_account",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerifyOutcome {
    Verified { user_id: Option<Uuid> },
    Rejected(VerifyRejection),
}

#[derive(Clone)]
pub struct OtpSettings {
    pub hash_secret: String,
    pub ttl_seconds: i64,
    pub max_attempts: i32,
    pub rate_limit_window_minutes: i64,
    pub rate_limit_max: i64,
}

impl OtpSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            hash_secret: config.otp_hash_secret.clone(),
            ttl_seconds: config.otp_ttl_seconds,
            max_attempts: config.otp_max_attempts,
            rate_limit_window_minutes: config.otp_rate_limit_window_minutes,
            rate_limit_max: config.otp_rate_limit_max,
        }
    }
}

/// Normalize a phone to E.164: strip formatting characters, then require
/// `+` followed by 8 to 15 digits.
pub fn normalize_phone(input: &str) -> Result<String, OtpError> {
    let cleaned: String = input
        .chars()
        .filter(|c| !matches!(c, ' ' | '(' | ')' | '-'))
        .collect();

    let digits = cleaned.strip_prefix('+').unwrap_or("");
    if digits.len() < 8 || digits.len() > 15 || !digits.chars().all(|c| c.is_ascii_digit()) {
        return Err(OtpError::InvalidPhone(format!(
            "not an E.164 number: {}",
            input
        )));
    }
    Ok(cleaned)
}

/// Keyed hash over phone and code, so a hash is only valid for the phone it
/// was issued to.
fn hash_code(secret: &str, phone: &str, code: &str) -> String {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).unwrap_or_else(|_| unreachable!());
    mac.update(phone.as_bytes());
    mac.update(code.as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

fn generate_code() -> String {
    let n: u32 = rand::thread_rng().gen_range(0..10u32.pow(CODE_DIGITS));
    format!("{:06}", n)
}

pub struct OtpService {
    store: OtpStore,
    sender: Arc<dyn MessageSender>,
    settings: OtpSettings,
}

impl OtpService {
    pub fn new(store: OtpStore, sender: Arc<dyn MessageSender>, settings: OtpSettings) -> Self {
        Self {
            store,
            sender,
            settings,
        }
    }

    pub fn store(&self) -> &OtpStore {
        &self.store
    }

    /// Issue and deliver a fresh code. The stored row is removed again when
    /// the outbound send fails, so undeliverable codes never count against
    /// the recipient.
    pub async fn send(&self, phone: &str, user_id: Option<Uuid>) -> Result<(), OtpError> {
        let phone = normalize_phone(phone)?;

        let recent = self
            .store
            .count_recent(&phone, self.settings.rate_limit_window_minutes)
            .await?;
        if recent >= self.settings.rate_limit_max {
            tracing::warn!(phone = %phone, recent, "OTP issuance rate limit hit");
            return Err(OtpError::RateLimited);
        }

        let code = generate_code();
        let code_hash = hash_code(&self.settings.hash_secret, &phone, &code);
        let expires_at = Utc::now() + Duration::seconds(self.settings.ttl_seconds);

        let id = self
            .store
            .insert(&phone, Channel::Whatsapp, &code_hash, user_id, expires_at)
            .await?;

        let request = SendRequest {
            to: phone.clone(),
            body: MessageBody::Text {
                body: None,
                otp: Some(code),
            },
            metadata: None,
        };

        if let Err(e) = self.sender.send(&request).await {
            self.store.delete(id).await?;
            return Err(OtpError::Delivery(e));
        }

        tracing::info!(phone = %phone, otp_id = %id, "OTP issued");
        Ok(())
    }

    /// Verify a submitted code against the newest outstanding one.
    ///
    /// Every call consumes an attempt; once the cap is reached the code is
    /// rejected even if the submission matches. `user_id` identifies the
    /// account claiming the phone; when absent it falls back to the account
    /// the code was issued for. A phone already bound to a different account
    /// is rejected after the match, before anything is consumed or rebound.
    pub async fn verify(
        &self,
        phone: &str,
        code: &str,
        user_id: Option<Uuid>,
    ) -> Result<VerifyOutcome, OtpError> {
        let phone = normalize_phone(phone)?;

        let Some(row) = self.store.latest_unused(&phone).await? else {
            return Ok(VerifyOutcome::Rejected(VerifyRejection::NoOtp));
        };

        if row.expires_at < Utc::now() {
            return Ok(VerifyOutcome::Rejected(VerifyRejection::Expired));
        }

        let attempts = self.store.bump_attempts(row.id).await?;
        if attempts >= self.settings.max_attempts {
            tracing::warn!(phone = %phone, attempts, "OTP attempt cap reached");
            return Ok(VerifyOutcome::Rejected(VerifyRejection::MaxAttempts));
        }

        let submitted = hash_code(&self.settings.hash_secret, &phone, code);
        if submitted.as_bytes().ct_eq(row.code_hash.as_bytes()).into() {
            let claimant = user_id.or(row.user_id);
            if let Some(owner) = self.store.bound_user(&phone).await? {
                if claimant != Some(owner) {
                    tracing::warn!(phone = %phone, "phone already bound to another account");
                    return Ok(VerifyOutcome::Rejected(
                        VerifyRejection::PhoneInUseByOtherAccount,
                    ));
                }
            }
            self.store.mark_used(row.id).await?;
            if let Some(claimant) = claimant {
                self.store.bind_phone(&phone, claimant).await?;
            }
            tracing::info!(phone = %phone, "OTP verified");
            return Ok(VerifyOutcome::Verified { user_id: claimant });
        }

        Ok(VerifyOutcome::Rejected(VerifyRejection::Invalid))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_is_deterministic() {
        let a = hash_code("secret", "+4915112345678", "123456");
        let b = hash_code("secret", "+4915112345678", "123456");
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn hash_binds_to_phone() {
        let a = hash_code("secret", "+4915112345678", "123456");
        let b = hash_code("secret", "+4915112345679", "123456");
        assert_ne!(a, b);
    }

    #[test]
    fn hash_binds_to_secret() {
        let a = hash_code("secret-a", "+4915112345678", "123456");
        let b = hash_code("secret-b", "+4915112345678", "123456");
        assert_ne!(a, b);
    }

    #[test]
    fn codes_are_six_digits() {
        for _ in 0..100 {
            let code = generate_code();
            assert_eq!(code.len(), 6);
            assert!(code.chars().all(|c| c.is_ascii_digit()));
        }
    }

    #[test]
    fn phone_normalization_strips_formatting() {
        assert_eq!(
            normalize_phone("+49 (151) 123-45678").unwrap(),
            "+4915112345678"
        );
        assert_eq!(normalize_phone("+15551234567").unwrap(), "+15551234567");
    }

    #[test]
    fn phone_normalization_rejects_garbage() {
        assert!(normalize_phone("15551234567").is_err());
        assert!(normalize_phone("+123").is_err());
        assert!(normalize_phone("+1234567890123456").is_err());
        assert!(normalize_phone("+49abc1234567").is_err());
        assert!(normalize_phone("").is_err());
    }
}
