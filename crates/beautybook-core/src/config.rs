use std::time::Duration;

/// Tunables named in the external interface configuration table. Owned by
/// the service binary's CLI parser; passed down into the core by value so
/// none of the engines below read environment state directly.
#[derive(Debug, Clone)]
pub struct CoreConfig {
    pub access_token_ttl: Duration,
    pub refresh_token_ttl: Duration,
    pub max_sessions_per_user: usize,

    pub rate_limit_window: Duration,
    pub rate_limit_max_requests: u32,
    pub admin_ip_allowlist: Vec<String>,

    pub reservation_slot_granularity: Duration,
    pub reservation_expire_after: Duration,
    pub reservation_no_show_grace: Duration,

    pub payment_gateway_timeout: Duration,
    pub payment_webhook_clock_skew: Duration,

    pub points_default_expiry: Duration,
    pub points_referral_window: Duration,

    pub referral_standard_rate: f64,
    pub referral_influencer_rate: f64,
    pub referral_influencer_threshold: u32,

    pub notifications_max_retries: u32,
    pub notifications_backoff_base: Duration,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            access_token_ttl: Duration::from_secs(24 * 3600),
            refresh_token_ttl: Duration::from_secs(7 * 24 * 3600),
            max_sessions_per_user: 5,

            rate_limit_window: Duration::from_secs(15 * 60),
            rate_limit_max_requests: 100,
            admin_ip_allowlist: Vec::new(),

            reservation_slot_granularity: Duration::from_secs(30 * 60),
            reservation_expire_after: Duration::from_secs(30 * 60),
            reservation_no_show_grace: Duration::from_secs(15 * 60),

            payment_gateway_timeout: Duration::from_millis(10_000),
            payment_webhook_clock_skew: Duration::from_secs(300),

            points_default_expiry: Duration::from_secs(365 * 24 * 3600),
            points_referral_window: Duration::from_secs(10 * 60),

            referral_standard_rate: 0.05,
            referral_influencer_rate: 0.10,
            referral_influencer_threshold: 20,

            notifications_max_retries: 5,
            notifications_backoff_base: Duration::from_millis(500),
        }
    }
}
