//! beautybook-service: HTTP entry point. Parses configuration, builds the
//! in-memory `AppState`, spawns the background sweepers, and serves the
//! router built in `lib.rs`.

use beautybook_core::CoreConfig;
use beautybook_service::state::AppState;
use beautybook_service::{build_router, sweepers};
use clap::Parser;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// CLI surface for the configuration table in §6 of the route/config spec.
/// Every tunable is settable by flag or `BEAUTYBOOK_`-prefixed env var;
/// defaults mirror `CoreConfig::default()`.
#[derive(Parser)]
#[command(name = "beautybook-service")]
#[command(about = "Multi-tenant HTTP backend for the beauty-services marketplace", long_about = None)]
#[command(version)]
struct Cli {
    #[arg(long, env = "BEAUTYBOOK_BIND_ADDR", default_value = "0.0.0.0:8080")]
    bind_addr: String,

    #[arg(long, env = "BEAUTYBOOK_LOG_LEVEL", default_value = "info")]
    log_level: String,

    #[arg(long, env = "BEAUTYBOOK_DATABASE_URL")]
    database_url: Option<String>,

    #[arg(long, env = "BEAUTYBOOK_DB_MAX_CONNECTIONS", default_value_t = 10)]
    db_max_connections: u32,

    #[arg(long, env = "BEAUTYBOOK_TOKEN_SECRET")]
    token_secret: String,

    #[arg(long, env = "BEAUTYBOOK_WEBHOOK_SECRET")]
    webhook_secret: String,

    #[arg(long, env = "BEAUTYBOOK_GATEWAY_MERCHANT_ID", default_value = "beautybook-mock-merchant")]
    gateway_merchant_id: String,

    #[arg(long, env = "BEAUTYBOOK_ACCESS_TOKEN_TTL_SEC", default_value_t = 24 * 3600)]
    access_token_ttl_sec: u64,

    #[arg(long, env = "BEAUTYBOOK_REFRESH_TOKEN_TTL_SEC", default_value_t = 7 * 24 * 3600)]
    refresh_token_ttl_sec: u64,

    #[arg(long, env = "BEAUTYBOOK_MAX_SESSIONS_PER_USER", default_value_t = 5)]
    max_sessions_per_user: usize,

    #[arg(long, env = "BEAUTYBOOK_RATE_LIMIT_WINDOW_SEC", default_value_t = 15 * 60)]
    rate_limit_window_sec: u64,

    #[arg(long, env = "BEAUTYBOOK_RATE_LIMIT_MAX_REQUESTS", default_value_t = 100)]
    rate_limit_max_requests: u32,

    /// Comma-separated IPs exempt from the rate limiter and allowed onto
    /// `/api/admin/*` from outside the loopback/private ranges.
    #[arg(long, env = "BEAUTYBOOK_ADMIN_IP_ALLOWLIST", value_delimiter = ',')]
    admin_ip_allowlist: Vec<String>,

    #[arg(long, env = "BEAUTYBOOK_RESERVATION_SLOT_GRANULARITY_MIN", default_value_t = 30)]
    reservation_slot_granularity_min: u64,

    #[arg(long, env = "BEAUTYBOOK_RESERVATION_EXPIRE_AFTER_MIN", default_value_t = 30)]
    reservation_expire_after_min: u64,

    #[arg(long, env = "BEAUTYBOOK_RESERVATION_NO_SHOW_GRACE_MIN", default_value_t = 15)]
    reservation_no_show_grace_min: u64,

    #[arg(long, env = "BEAUTYBOOK_PAYMENT_GATEWAY_TIMEOUT_MS", default_value_t = 10_000)]
    payment_gateway_timeout_ms: u64,

    #[arg(long, env = "BEAUTYBOOK_PAYMENT_WEBHOOK_CLOCK_SKEW_SEC", default_value_t = 300)]
    payment_webhook_clock_skew_sec: u64,

    #[arg(long, env = "BEAUTYBOOK_POINTS_DEFAULT_EXPIRY_DAYS", default_value_t = 365)]
    points_default_expiry_days: u64,

    #[arg(long, env = "BEAUTYBOOK_POINTS_REFERRAL_WINDOW_MIN", default_value_t = 10)]
    points_referral_window_min: u64,

    #[arg(long, env = "BEAUTYBOOK_REFERRAL_STANDARD_RATE", default_value_t = 0.05)]
    referral_standard_rate: f64,

    #[arg(long, env = "BEAUTYBOOK_REFERRAL_INFLUENCER_RATE", default_value_t = 0.10)]
    referral_influencer_rate: f64,

    #[arg(long, env = "BEAUTYBOOK_REFERRAL_INFLUENCER_THRESHOLD", default_value_t = 20)]
    referral_influencer_threshold: u32,

    #[arg(long, env = "BEAUTYBOOK_NOTIFICATIONS_MAX_RETRIES", default_value_t = 5)]
    notifications_max_retries: u32,

    #[arg(long, env = "BEAUTYBOOK_NOTIFICATIONS_BACKOFF_BASE_MS", default_value_t = 500)]
    notifications_backoff_base_ms: u64,
}

impl Cli {
    fn core_config(&self) -> CoreConfig {
        CoreConfig {
            access_token_ttl: Duration::from_secs(self.access_token_ttl_sec),
            refresh_token_ttl: Duration::from_secs(self.refresh_token_ttl_sec),
            max_sessions_per_user: self.max_sessions_per_user,

            rate_limit_window: Duration::from_secs(self.rate_limit_window_sec),
            rate_limit_max_requests: self.rate_limit_max_requests,
            admin_ip_allowlist: self.admin_ip_allowlist.clone(),

            reservation_slot_granularity: Duration::from_secs(self.reservation_slot_granularity_min * 60),
            reservation_expire_after: Duration::from_secs(self.reservation_expire_after_min * 60),
            reservation_no_show_grace: Duration::from_secs(self.reservation_no_show_grace_min * 60),

            payment_gateway_timeout: Duration::from_millis(self.payment_gateway_timeout_ms),
            payment_webhook_clock_skew: Duration::from_secs(self.payment_webhook_clock_skew_sec),

            points_default_expiry: Duration::from_secs(self.points_default_expiry_days * 24 * 3600),
            points_referral_window: Duration::from_secs(self.points_referral_window_min * 60),

            referral_standard_rate: self.referral_standard_rate,
            referral_influencer_rate: self.referral_influencer_rate,
            referral_influencer_threshold: self.referral_influencer_threshold,

            notifications_max_retries: self.notifications_max_retries,
            notifications_backoff_base: Duration::from_millis(self.notifications_backoff_base_ms),
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let env_filter =
        tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| cli.log_level.clone().into());
    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    if let Some(database_url) = &cli.database_url {
        // Bootstraps the schema and validates connectivity up front; the
        // pool itself is not yet threaded through the in-memory engines
        // (see DESIGN.md), so a configured database only proves reachable
        // here.
        let _ = beautybook_core::PostgresStore::connect(database_url, cli.db_max_connections).await?;
        tracing::info!("connected to postgres backend");
    } else {
        tracing::info!("running with in-memory storage backend");
    }

    let config = cli.core_config();
    let state = AppState::new(
        config,
        cli.token_secret.into_bytes(),
        cli.webhook_secret.into_bytes(),
        cli.gateway_merchant_id,
    );

    sweepers::spawn_all(&state);

    let app = build_router(state);
    let listener = tokio::net::TcpListener::bind(&cli.bind_addr).await?;
    tracing::info!(addr = %cli.bind_addr, "beautybook-service listening");
    axum::serve(listener, app).await?;

    Ok(())
}
