//! Queue worker.
//!
//! One pass claims due jobs, dispatches each under a per-job deadline and
//! finalizes the row. A row failure never aborts the pass: the job is either
//! rescheduled with exponential backoff or failed terminally, and the loop
//! moves on.

use std::sync::Arc;
use std::time::{Duration, Instant};

use courier_common::config::AppConfig;
use courier_common::types::NotificationJob;
use courier_dispatch::{DispatchRequest, Dispatcher};
use courier_provider::retry::backoff_ms;

use crate::alert::MonitoringAlerter;
use crate::queue::QueueStore;

#[derive(Debug, Clone)]
pub struct WorkerSettings {
    pub max_attempts: i32,
    pub base_backoff_ms: u64,
    pub max_backoff_ms: u64,
    /// Fire a monitoring alert once a job reaches this attempt count.
    pub alert_after: i32,
    pub dispatch_timeout: Duration,
    pub stale_processing_timeout_secs: i64,
}

impl WorkerSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            max_attempts: config.max_attempts,
            base_backoff_ms: config.base_backoff_ms,
            max_backoff_ms: config.max_backoff_ms,
            alert_after: config.alert_after,
            dispatch_timeout: Duration::from_millis(config.dispatch_timeout_ms),
            stale_processing_timeout_secs: config.stale_processing_timeout_secs,
        }
    }
}

fn should_retry(retryable: bool, attempt: i32, max_attempts: i32) -> bool {
    retryable && attempt < max_attempts
}

pub struct Worker {
    queue: QueueStore,
    dispatcher: Arc<Dispatcher>,
    alerter: MonitoringAlerter,
    settings: WorkerSettings,
}

impl Worker {
    pub fn new(
        queue: QueueStore,
        dispatcher: Arc<Dispatcher>,
        alerter: MonitoringAlerter,
        settings: WorkerSettings,
    ) -> Self {
        Self {
            queue,
            dispatcher,
            alerter,
            settings,
        }
    }

    /// Run one worker pass. Returns the number of jobs claimed and processed.
    pub async fn run_once(&self, limit: i64, budget: Duration) -> anyhow::Result<usize> {
        let started = Instant::now();

        let requeued = self
            .queue
            .sweep_stale(self.settings.stale_processing_timeout_secs)
            .await?;
        if requeued > 0 {
            tracing::warn!(requeued, "Requeued jobs stuck in processing");
        }

        let due = self.queue.fetch_due(limit).await?;
        let mut processed = 0usize;

        for job in due {
            if started.elapsed() >= budget {
                tracing::info!(processed, "Worker budget exhausted, ending pass early");
                break;
            }

            let attempt = match self.queue.claim(job.id).await {
                Ok(Some(attempt)) => attempt,
                // Another worker won the row.
                Ok(None) => continue,
                Err(e) => {
                    tracing::error!(job_id = %job.id, error = %e, "Failed to claim job");
                    continue;
                }
            };

            processed += 1;
            self.process(&job, attempt).await;
        }

        Ok(processed)
    }

    async fn process(&self, job: &NotificationJob, attempt: i32) {
        let request = DispatchRequest::from_job(job);
        let result = tokio::time::timeout(
            self.settings.dispatch_timeout,
            self.dispatcher.dispatch(&request),
        )
        .await;

        let (detail, retryable) = match result {
            Ok(Ok(_)) => {
                if let Err(e) = self.queue.finalize_sent(job.id).await {
                    tracing::error!(job_id = %job.id, error = %e, "Failed to mark job sent");
                    return;
                }
                tracing::info!(job_id = %job.id, channel = %job.channel, attempt, "Job delivered");
                return;
            }
            Ok(Err(e)) => (e.to_string(), e.is_retryable()),
            Err(_) => ("dispatch timed out".to_string(), true),
        };

        if should_retry(retryable, attempt, self.settings.max_attempts) {
            let delay = backoff_ms(
                self.settings.base_backoff_ms,
                self.settings.max_backoff_ms,
                attempt as u32,
            );
            tracing::warn!(
                job_id = %job.id,
                attempt,
                delay_ms = delay,
                error = %detail,
                "Job dispatch failed, rescheduling"
            );
            if let Err(e) = self.queue.finalize_retry(job.id, &detail, delay).await {
                tracing::error!(job_id = %job.id, error = %e, "Failed to reschedule job");
            }
            if attempt >= self.settings.alert_after {
                self.alerter
                    .notify("notification_retrying", job, attempt, &detail)
                    .await;
            }
        } else {
            tracing::error!(
                job_id = %job.id,
                attempt,
                retryable,
                error = %detail,
                "Job failed terminally"
            );
            if let Err(e) = self.queue.finalize_failed(job.id, &detail).await {
                tracing::error!(job_id = %job.id, error = %e, "Failed to mark job failed");
            }
            self.alerter
                .notify("notification_failed", job, attempt, &detail)
                .await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retries_only_transient_errors_under_cap() {
        assert!(should_retry(true, 1, 5));
        assert!(should_retry(true, 4, 5));
        assert!(!should_retry(true, 5, 5));
        assert!(!should_retry(false, 1, 5));
    }
}
