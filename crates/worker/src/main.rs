use std::sync::Arc;
use std::time::Duration;

use courier_common::config::AppConfig;
use courier_common::db;
use courier_dispatch::Dispatcher;
use courier_dispatch::audit::{AuditWriter, PgAuditSink};
use courier_dispatch::registry::PgTemplateRegistry;
use courier_provider::adapter::MessageSender;
use courier_provider::email::ResendSender;
use courier_provider::meta::MetaSender;
use courier_provider::retry::RetryingSender;
use courier_worker::alert::MonitoringAlerter;
use courier_worker::queue::QueueStore;
use courier_worker::worker::{Worker, WorkerSettings};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "courier_worker=info,courier_dispatch=info".into()),
        )
        .json()
        .init();

    tracing::info!("Courier worker starting...");

    // Load configuration
    let config = AppConfig::from_env()?;

    // Connect to database
    let pool = db::create_pool(&config.database_url, config.db_max_connections).await?;

    // Run migrations
    sqlx::migrate!("../../migrations").run(&pool).await?;
    tracing::info!("Database migrations applied");

    let wa_sender: Arc<dyn MessageSender> = Arc::new(RetryingSender::new(
        MetaSender::from_config(&config)?,
        config.provider_retry_attempts,
        Duration::from_millis(config.base_backoff_ms),
        Duration::from_millis(config.max_backoff_ms),
    ));

    // Email is optional; WhatsApp-only deployments skip the Resend key.
    let email_sender: Option<Arc<dyn MessageSender>> = match ResendSender::from_config(&config) {
        Ok(sender) => Some(Arc::new(sender)),
        Err(e) => {
            tracing::warn!(error = %e, "Email sender not configured, email jobs will fail");
            None
        }
    };

    let dispatcher = Arc::new(Dispatcher::new(
        Arc::new(PgTemplateRegistry::new(pool.clone())),
        AuditWriter::new(Arc::new(PgAuditSink::new(pool.clone()))),
        wa_sender,
        email_sender,
    ));

    let worker = Worker::new(
        QueueStore::new(pool),
        dispatcher,
        MonitoringAlerter::new(config.monitoring_webhook_url.clone()),
        WorkerSettings::from_config(&config),
    );

    let budget = Duration::from_millis(config.worker_budget_ms);
    let mut interval = tokio::time::interval(Duration::from_millis(config.worker_poll_interval_ms));

    tracing::info!(
        poll_interval_ms = config.worker_poll_interval_ms,
        limit = config.worker_limit,
        "Worker loop started"
    );

    loop {
        tokio::select! {
            _ = interval.tick() => {
                match worker.run_once(config.worker_limit, budget).await {
                    Ok(0) => {}
                    Ok(processed) => tracing::info!(processed, "Worker pass complete"),
                    Err(e) => tracing::error!(error = %e, "Worker pass failed"),
                }
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Received shutdown signal, stopping gracefully...");
                break;
            }
        }
    }

    tracing::info!("Courier worker stopped.");
    Ok(())
}
