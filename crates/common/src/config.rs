use serde::Deserialize;

/// Global application configuration loaded from environment variables.
///
/// Built once at process start and injected into the worker, dispatcher and
/// provider adapters; nothing reads the environment at call sites.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// PostgreSQL connection string
    pub database_url: String,

    /// Maximum number of PostgreSQL connections in the pool (default: 20)
    pub db_max_connections: u32,

    /// Meta (WhatsApp Business) phone number id
    pub meta_phone_number_id: Option<String>,

    /// Meta Graph API access token
    pub meta_access_token: Option<String>,

    /// Resend API key for email delivery
    pub resend_api_key: Option<String>,

    /// Default email sender address
    pub email_from: Option<String>,

    /// Monitoring webhook URL for retry/failure alerts
    pub monitoring_webhook_url: Option<String>,

    /// Header name carrying the scheduler shared secret
    pub scheduler_secret_header: Option<String>,

    /// Expected scheduler shared secret value
    pub scheduler_secret_token: Option<String>,

    /// Maximum rows a single worker pass may claim (default: 10)
    pub worker_limit: i64,

    /// Wall-clock budget for a single worker pass in ms (default: 25000)
    pub worker_budget_ms: u64,

    /// Poll interval for the standalone worker binary in ms (default: 5000)
    pub worker_poll_interval_ms: u64,

    /// Per-job downstream dispatch timeout in ms (default: 5000)
    pub dispatch_timeout_ms: u64,

    /// Maximum delivery attempts before a job is failed (default: 5)
    pub max_attempts: i32,

    /// Base retry backoff in ms (default: 1000)
    pub base_backoff_ms: u64,

    /// Backoff cap in ms (default: 600000 = 10 min)
    pub max_backoff_ms: u64,

    /// Fire a monitoring alert once attempts reach this count (default: 3)
    pub alert_after: i32,

    /// Per-attempt retries inside the provider adapter (default: 3)
    pub provider_retry_attempts: u32,

    /// Requeue jobs stuck in `processing` longer than this (default: 300s)
    pub stale_processing_timeout_secs: i64,

    /// Secret keying the HMAC over OTP codes
    pub otp_hash_secret: String,

    /// OTP code lifetime in seconds (default: 600)
    pub otp_ttl_seconds: i64,

    /// Maximum verification attempts per code (default: 5)
    pub otp_max_attempts: i32,

    /// Rolling rate-limit window for OTP issuance in minutes (default: 15)
    pub otp_rate_limit_window_minutes: i64,

    /// Maximum codes per phone within the window (default: 3)
    pub otp_rate_limit_max: i64,
}

fn env_or<T: std::str::FromStr>(name: &str, default: &str) -> anyhow::Result<T> {
    std::env::var(name)
        .unwrap_or_else(|_| default.to_string())
        .parse()
        .map_err(|_| anyhow::anyhow!("{} must be a valid {}", name, std::any::type_name::<T>()))
}

impl AppConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        Ok(Self {
            database_url: std::env::var("DATABASE_URL")
                .map_err(|_| anyhow::anyhow!("DATABASE_URL environment variable is required"))?,
            db_max_connections: env_or("DB_MAX_CONNECTIONS", "20")?,
            meta_phone_number_id: std::env::var("META_PHONE_NUMBER_ID").ok(),
            meta_access_token: std::env::var("META_ACCESS_TOKEN").ok(),
            resend_api_key: std::env::var("RESEND_API_KEY").ok(),
            email_from: std::env::var("EMAIL_FROM").ok(),
            monitoring_webhook_url: std::env::var("MONITORING_WEBHOOK_URL").ok(),
            scheduler_secret_header: std::env::var("SCHEDULER_SECRET_HEADER").ok(),
            scheduler_secret_token: std::env::var("SCHEDULER_SECRET_TOKEN").ok(),
            worker_limit: env_or("WORKER_LIMIT", "10")?,
            worker_budget_ms: env_or("WORKER_BUDGET_MS", "25000")?,
            worker_poll_interval_ms: env_or("WORKER_POLL_INTERVAL_MS", "5000")?,
            dispatch_timeout_ms: env_or("DISPATCH_TIMEOUT_MS", "5000")?,
            max_attempts: env_or("NOTIFICATION_MAX_ATTEMPTS", "5")?,
            base_backoff_ms: env_or("NOTIFICATION_BASE_BACKOFF_MS", "1000")?,
            max_backoff_ms: env_or("NOTIFICATION_MAX_BACKOFF_MS", "600000")?,
            alert_after: env_or("NOTIFICATION_ALERT_AFTER", "3")?,
            provider_retry_attempts: env_or("PROVIDER_RETRY_ATTEMPTS", "3")?,
            stale_processing_timeout_secs: env_or("STALE_PROCESSING_TIMEOUT_SECS", "300")?,
            otp_hash_secret: std::env::var("OTP_HASH_SECRET")
                .map_err(|_| anyhow::anyhow!("OTP_HASH_SECRET environment variable is required"))?,
            otp_ttl_seconds: env_or("OTP_TTL_SECONDS", "600")?,
            otp_max_attempts: env_or("OTP_MAX_ATTEMPTS", "5")?,
            otp_rate_limit_window_minutes: env_or("OTP_RATE_LIMIT_WINDOW_MINUTES", "15")?,
            otp_rate_limit_max: env_or("OTP_RATE_LIMIT_MAX", "3")?,
        })
    }
}
