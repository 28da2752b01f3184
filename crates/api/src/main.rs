//! Courier API server binary entrypoint.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use courier_common::config::AppConfig;
use courier_common::db::create_pool;
use courier_dispatch::Dispatcher;
use courier_dispatch::audit::{AuditWriter, PgAuditSink};
use courier_dispatch::registry::PgTemplateRegistry;
use courier_otp::service::{OtpService, OtpSettings};
use courier_otp::store::OtpStore;
use courier_provider::adapter::MessageSender;
use courier_provider::email::ResendSender;
use courier_provider::meta::MetaSender;
use courier_provider::retry::RetryingSender;
use courier_worker::alert::MonitoringAlerter;
use courier_worker::queue::QueueStore;
use courier_worker::worker::{Worker, WorkerSettings};

use courier_api::routes::create_router;
use courier_api::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new("courier_api=debug,courier_dispatch=debug,tower_http=debug")
        }))
        .init();

    tracing::info!("Starting Courier API server...");

    // Load configuration
    let config = AppConfig::from_env()?;

    // Create database connection pool
    let pool = create_pool(&config.database_url, config.db_max_connections).await?;
    tracing::info!("Database pool created");

    // Run migrations
    sqlx::migrate!("../../migrations").run(&pool).await?;
    tracing::info!("Database migrations applied");

    let wa_sender: Arc<dyn MessageSender> = Arc::new(RetryingSender::new(
        MetaSender::from_config(&config)?,
        config.provider_retry_attempts,
        Duration::from_millis(config.base_backoff_ms),
        Duration::from_millis(config.max_backoff_ms),
    ));

    let email_sender: Option<Arc<dyn MessageSender>> = match ResendSender::from_config(&config) {
        Ok(sender) => Some(Arc::new(sender)),
        Err(e) => {
            tracing::warn!(error = %e, "Email sender not configured, email sends will fail");
            None
        }
    };

    let dispatcher = Arc::new(Dispatcher::new(
        Arc::new(PgTemplateRegistry::new(pool.clone())),
        AuditWriter::new(Arc::new(PgAuditSink::new(pool.clone()))),
        wa_sender.clone(),
        email_sender,
    ));

    let worker = Arc::new(Worker::new(
        QueueStore::new(pool.clone()),
        dispatcher.clone(),
        MonitoringAlerter::new(config.monitoring_webhook_url.clone()),
        WorkerSettings::from_config(&config),
    ));

    let otp = Arc::new(OtpService::new(
        OtpStore::new(pool.clone()),
        wa_sender,
        OtpSettings::from_config(&config),
    ));

    // Build application state
    let state = AppState::new(pool, config, dispatcher, worker, otp);

    // Build router
    let app = create_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    // Start server
    let addr = SocketAddr::from(([0, 0, 0, 0], 3000));
    tracing::info!("API server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
