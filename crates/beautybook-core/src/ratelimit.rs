//! C13 Rate Limiter: fixed-window counters per `(principal, route family)`
//! and per `(ip, route family)`, with an escalating block window on repeat
//! offenders and an allowlist bypass for admin/internal traffic.

use crate::error::CoreError;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::net::IpAddr;
use std::time::Duration as StdDuration;

#[derive(Debug, Clone)]
struct Window {
    started_at: DateTime<Utc>,
    count: u32,
    blocked_until: Option<DateTime<Utc>>,
    violations: u32,
}

impl Window {
    fn fresh(now: DateTime<Utc>) -> Self {
        Self {
            started_at: now,
            count: 0,
            blocked_until: None,
            violations: 0,
        }
    }
}

/// Sharded on the key tuple so a hot route family for one principal never
/// starves bookkeeping for another; a single `Mutex<RateLimiter>` held by
/// the service is enough at this scale (no cross-process coordination, per
/// SPEC_FULL.md's shared-resources note).
pub struct RateLimiter {
    by_principal: HashMap<(String, String), Window>,
    by_ip: HashMap<(String, String), Window>,
    allowlist: Vec<String>,
}

impl RateLimiter {
    pub fn new(admin_ip_allowlist: Vec<String>) -> Self {
        Self {
            by_principal: HashMap::new(),
            by_ip: HashMap::new(),
            allowlist: admin_ip_allowlist,
        }
    }

    fn is_allowlisted(&self, ip: &str) -> bool {
        if self.allowlist.iter().any(|a| a == ip) {
            return true;
        }
        match ip.parse::<IpAddr>() {
            Ok(addr) => is_loopback_or_private(&addr),
            Err(_) => false,
        }
    }

    /// Checks and records one request. `principal_id` is `None` for
    /// unauthenticated traffic (e.g. login), in which case only the
    /// per-ip bucket applies.
    pub fn check(
        &mut self,
        principal_id: Option<&str>,
        ip: &str,
        route_family: &str,
        window: StdDuration,
        max_requests: u32,
        now: DateTime<Utc>,
    ) -> Result<(), CoreError> {
        if self.is_allowlisted(ip) {
            return Ok(());
        }

        let window = Duration::from_std(window).unwrap_or(Duration::seconds(900));

        if let Some(principal_id) = principal_id {
            check_bucket(
                &mut self.by_principal,
                (principal_id.to_string(), route_family.to_string()),
                window,
                max_requests,
                now,
            )?;
        }
        check_bucket(
            &mut self.by_ip,
            (ip.to_string(), route_family.to_string()),
            window,
            max_requests,
            now,
        )
    }
}

fn check_bucket(
    buckets: &mut HashMap<(String, String), Window>,
    key: (String, String),
    window: Duration,
    max_requests: u32,
    now: DateTime<Utc>,
) -> Result<(), CoreError> {
    let entry = buckets.entry(key).or_insert_with(|| Window::fresh(now));

    if let Some(blocked_until) = entry.blocked_until {
        if now < blocked_until {
            return Err(CoreError::RateLimited);
        }
        entry.blocked_until = None;
    }

    if now - entry.started_at > window {
        entry.started_at = now;
        entry.count = 0;
    }

    entry.count += 1;
    if entry.count > max_requests {
        entry.violations += 1;
        let escalation = 2i64.saturating_pow(entry.violations.min(16));
        let block_for = std::cmp::min(window * escalation as i32, Duration::hours(1));
        entry.blocked_until = Some(now + block_for);
        return Err(CoreError::RateLimited);
    }

    Ok(())
}

fn is_loopback_or_private(addr: &IpAddr) -> bool {
    match addr {
        IpAddr::V4(v4) => v4.is_loopback() || v4.is_private(),
        IpAddr::V6(v6) => v6.is_loopback(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allows_requests_under_the_limit() {
        let mut limiter = RateLimiter::new(vec![]);
        let now = Utc::now();
        for _ in 0..5 {
            limiter
                .check(Some("u1"), "203.0.113.1", "reservations", StdDuration::from_secs(900), 5, now)
                .unwrap();
        }
    }

    #[test]
    fn rejects_once_over_the_limit() {
        let mut limiter = RateLimiter::new(vec![]);
        let now = Utc::now();
        for _ in 0..5 {
            limiter
                .check(Some("u1"), "203.0.113.1", "reservations", StdDuration::from_secs(900), 5, now)
                .unwrap();
        }
        let err = limiter
            .check(Some("u1"), "203.0.113.1", "reservations", StdDuration::from_secs(900), 5, now)
            .unwrap_err();
        assert!(matches!(err, CoreError::RateLimited));
    }

    #[test]
    fn repeated_violation_escalates_the_block_window() {
        let mut limiter = RateLimiter::new(vec![]);
        let now = Utc::now();
        for _ in 0..5 {
            limiter
                .check(Some("u1"), "203.0.113.1", "reservations", StdDuration::from_secs(60), 5, now)
                .unwrap();
        }
        limiter
            .check(Some("u1"), "203.0.113.1", "reservations", StdDuration::from_secs(60), 5, now)
            .unwrap_err();

        let still_blocked = now + Duration::seconds(90);
        let err = limiter
            .check(Some("u1"), "203.0.113.1", "reservations", StdDuration::from_secs(60), 5, still_blocked)
            .unwrap_err();
        assert!(matches!(err, CoreError::RateLimited));
    }

    #[test]
    fn loopback_ip_bypasses_the_limit() {
        let mut limiter = RateLimiter::new(vec![]);
        let now = Utc::now();
        for _ in 0..50 {
            limiter
                .check(Some("u1"), "127.0.0.1", "reservations", StdDuration::from_secs(900), 5, now)
                .unwrap();
        }
    }

    #[test]
    fn distinct_route_families_have_independent_buckets() {
        let mut limiter = RateLimiter::new(vec![]);
        let now = Utc::now();
        for _ in 0..5 {
            limiter
                .check(Some("u1"), "203.0.113.1", "reservations", StdDuration::from_secs(900), 5, now)
                .unwrap();
        }
        limiter
            .check(Some("u1"), "203.0.113.1", "payments", StdDuration::from_secs(900), 5, now)
            .unwrap();
    }
}
