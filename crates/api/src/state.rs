//! Shared application state for the Axum API server.

use std::sync::Arc;

use sqlx::PgPool;

use courier_common::config::AppConfig;
use courier_dispatch::Dispatcher;
use courier_otp::OtpService;
use courier_worker::queue::QueueStore;
use courier_worker::worker::Worker;

/// Application state shared across all route handlers via Axum `State`.
#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub config: AppConfig,
    pub queue: QueueStore,
    pub dispatcher: Arc<Dispatcher>,
    pub worker: Arc<Worker>,
    pub otp: Arc<OtpService>,
}

impl AppState {
    pub fn new(
        pool: PgPool,
        config: AppConfig,
        dispatcher: Arc<Dispatcher>,
        worker: Arc<Worker>,
        otp: Arc<OtpService>,
    ) -> Self {
        Self {
            queue: QueueStore::new(pool.clone()),
            pool,
            config,
            dispatcher,
            worker,
            otp,
        }
    }
}
