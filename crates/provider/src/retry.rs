//! Retry wrapper around a `MessageSender`.
//!
//! Retries only transient transport failures (timeout, 5xx, 429) with
//! exponential backoff; permanent rejections short-circuit immediately. The
//! attempt count is recorded on both outcomes.

use std::time::Duration;

use async_trait::async_trait;

use crate::adapter::{Delivery, MessageSender, SendError, SendRequest};

/// Exponential backoff with a cap: `min(max, base * 2^(attempt-1))`.
///
/// `attempt` is 1-based; attempt 1 waits `base`.
pub fn backoff_ms(base_ms: u64, max_ms: u64, attempt: u32) -> u64 {
    let exp = attempt.saturating_sub(1).min(32);
    base_ms.saturating_mul(1u64 << exp).min(max_ms)
}

/// Wraps any sender with bounded retries.
pub struct RetryingSender<S> {
    inner: S,
    max_attempts: u32,
    base_backoff: Duration,
    max_backoff: Duration,
}

impl<S: MessageSender> RetryingSender<S> {
    pub fn new(inner: S, max_attempts: u32, base_backoff: Duration, max_backoff: Duration) -> Self {
        Self {
            inner,
            max_attempts: max_attempts.max(1),
            base_backoff,
            max_backoff,
        }
    }
}

#[async_trait]
impl<S: MessageSender> MessageSender for RetryingSender<S> {
    fn provider(&self) -> &'static str {
        self.inner.provider()
    }

    async fn send(&self, request: &SendRequest) -> Result<Delivery, SendError> {
        let mut attempt = 1u32;
        loop {
            match self.inner.send(request).await {
                Ok(mut delivery) => {
                    delivery.attempts = attempt;
                    return Ok(delivery);
                }
                Err(mut error) => {
                    error.attempts = attempt;
                    if !error.is_retryable() || attempt >= self.max_attempts {
                        return Err(error);
                    }
                    let delay = backoff_ms(
                        self.base_backoff.as_millis() as u64,
                        self.max_backoff.as_millis() as u64,
                        attempt,
                    );
                    tracing::debug!(
                        provider = self.inner.provider(),
                        attempt,
                        delay_ms = delay,
                        kind = ?error.kind,
                        "Transient send failure, retrying"
                    );
                    tokio::time::sleep(Duration::from_millis(delay)).await;
                    attempt += 1;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use serde_json::Value;

    use super::*;
    use crate::adapter::{MessageBody, SendErrorKind};

    /// Fails with `fail_kind` for the first `failures` calls, then succeeds.
    struct FlakySender {
        calls: AtomicU32,
        failures: u32,
        fail_kind: SendErrorKind,
    }

    #[async_trait]
    impl MessageSender for FlakySender {
        fn provider(&self) -> &'static str {
            "stub"
        }

        async fn send(&self, _request: &SendRequest) -> Result<Delivery, SendError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if call <= self.failures {
                return Err(SendError::new("stub", self.fail_kind, "boom"));
            }
            Ok(Delivery {
                provider: "stub".to_string(),
                message_id: Some(format!("msg-{}", call)),
                raw_response: Value::Null,
                attempts: 1,
            })
        }
    }

    fn request() -> SendRequest {
        SendRequest {
            to: "+15551234567".to_string(),
            body: MessageBody::Text {
                body: Some("hi".to_string()),
                otp: None,
            },
            metadata: None,
        }
    }

    #[test]
    fn backoff_doubles_and_caps() {
        assert_eq!(backoff_ms(1000, 600_000, 1), 1000);
        assert_eq!(backoff_ms(1000, 600_000, 2), 2000);
        assert_eq!(backoff_ms(1000, 600_000, 3), 4000);
        assert_eq!(backoff_ms(1000, 600_000, 11), 600_000);
        assert_eq!(backoff_ms(1000, 600_000, 60), 600_000);
    }

    #[tokio::test]
    async fn retries_transient_failures_until_success() {
        let sender = RetryingSender::new(
            FlakySender {
                calls: AtomicU32::new(0),
                failures: 2,
                fail_kind: SendErrorKind::Server,
            },
            5,
            Duration::from_millis(1),
            Duration::from_millis(4),
        );

        let delivery = sender.send(&request()).await.unwrap();
        assert_eq!(delivery.attempts, 3);
        assert_eq!(delivery.message_id.as_deref(), Some("msg-3"));
    }

    #[tokio::test]
    async fn permanent_rejection_short_circuits() {
        let sender = RetryingSender::new(
            FlakySender {
                calls: AtomicU32::new(0),
                failures: 10,
                fail_kind: SendErrorKind::Rejected,
            },
            5,
            Duration::from_millis(1),
            Duration::from_millis(4),
        );

        let error = sender.send(&request()).await.unwrap_err();
        assert_eq!(error.attempts, 1);
        assert_eq!(error.kind, SendErrorKind::Rejected);
    }

    #[tokio::test]
    async fn gives_up_after_max_attempts() {
        let sender = RetryingSender::new(
            FlakySender {
                calls: AtomicU32::new(0),
                failures: 10,
                fail_kind: SendErrorKind::RateLimited,
            },
            3,
            Duration::from_millis(1),
            Duration::from_millis(4),
        );

        let error = sender.send(&request()).await.unwrap_err();
        assert_eq!(error.attempts, 3);
        assert!(error.is_retryable());
    }
}
