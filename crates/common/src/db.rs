use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;

/// Open the shared PostgreSQL pool used by the API, worker and OTP service.
///
/// `max_connections` comes from `AppConfig::db_max_connections`; acquisition
/// waits at most five seconds before surfacing an error to the caller.
pub async fn create_pool(database_url: &str, max_connections: u32) -> anyhow::Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(max_connections)
        .acquire_timeout(std::time::Duration::from_secs(5))
        .connect(database_url)
        .await?;

    tracing::info!(max_connections, "PostgreSQL pool ready");
    Ok(pool)
}
