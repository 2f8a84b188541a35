//! Per-request helpers composing the C3/C4/C13 checks ahead of a handler's
//! business logic. Kept as plain async functions the handlers call
//! explicitly rather than axum extractors, since several of them (tenancy,
//! rate limiting) need a locked engine and a fallible outcome that still
//! must record a `SecurityEvent` before returning.

use axum::http::HeaderMap;
use beautybook_core::{check_tenancy, CoreError, Principal, Shop, TenancyDenial};
use std::net::IpAddr;
use std::time::Duration;

use crate::error::ApiError;
use crate::state::AppState;

pub async fn authenticate(state: &AppState, headers: &HeaderMap) -> Result<Principal, ApiError> {
    let token_service = beautybook_core::TokenService::new(state.token_secret.as_ref().clone(), state.config.as_ref());
    let credentials = state.credentials.lock().await;
    let header = headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok());
    let principal = beautybook_core::resolve_principal(&token_service, &credentials, header)?;
    Ok(principal)
}

/// Client IP for rate-limiting and audit purposes. This service sits behind
/// a reverse proxy in every deployment shape the corpus uses, so the
/// leftmost `X-Forwarded-For` hop is trusted the way the proxy intends;
/// there is no `ConnectInfo` extractor wired in since nothing upstream in
/// this workspace relies on the raw socket peer.
pub fn client_ip(headers: &HeaderMap) -> String {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "127.0.0.1".to_string())
}

pub async fn enforce_rate_limit(
    state: &AppState,
    principal_id: Option<&str>,
    ip: &str,
    route_family: &str,
) -> Result<(), ApiError> {
    let mut limiter = state.rate_limiter.lock().await;
    limiter.check(
        principal_id,
        ip,
        route_family,
        state.config.rate_limit_window,
        state.config.rate_limit_max_requests,
        chrono::Utc::now(),
    )?;
    Ok(())
}

/// Admin routes additionally require the source IP in the configured
/// allowlist; localhost and private ranges are always allowed (§4.C13).
pub fn enforce_admin_ip(state: &AppState, ip: &str) -> Result<(), ApiError> {
    if state.config.admin_ip_allowlist.iter().any(|a| a == ip) {
        return Ok(());
    }
    if let Ok(addr) = ip.parse::<IpAddr>() {
        let allowed = match addr {
            IpAddr::V4(v4) => v4.is_loopback() || v4.is_private(),
            IpAddr::V6(v6) => v6.is_loopback(),
        };
        if allowed {
            return Ok(());
        }
    }
    Err(ApiError::from(CoreError::ForbiddenCrossShop))
}

pub async fn enforce_tenancy(
    state: &AppState,
    shop_id: &str,
    principal: &Principal,
    path: &str,
    method: &str,
) -> Result<Shop, ApiError> {
    let shop = {
        let shops = state.shops.lock().await;
        check_tenancy(shop_id, principal, |id| shops.get_shop(id), path, method)
    };
    match shop {
        Ok(decision) => Ok(decision.shop),
        Err(denial) => {
            if let TenancyDenial::CrossShopAccess { ref security_event } = denial {
                let mut audit = state.audit.lock().await;
                let _ = audit.record_security(security_event.clone());
            }
            Err(ApiError::from(CoreError::from(denial)))
        }
    }
}

pub fn std_duration(d: Duration) -> chrono::Duration {
    chrono::Duration::from_std(d).unwrap_or(chrono::Duration::seconds(900))
}
