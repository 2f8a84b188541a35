use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::Response;
use axum::Json;
use beautybook_core::{AuditEvent, CoreError, PrincipalStatus};
use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::envelope::ok;
use crate::error::ApiError;
use crate::middleware::{authenticate, client_ip, enforce_admin_ip, enforce_rate_limit};
use crate::state::AppState;

async fn require_admin(state: &AppState, headers: &HeaderMap) -> Result<beautybook_core::Principal, ApiError> {
    let principal = authenticate(state, headers).await?;
    if !principal.role.is_platform_admin() {
        return Err(CoreError::ForbiddenCrossShop.into());
    }
    let ip = client_ip(headers);
    enforce_admin_ip(state, &ip)?;
    enforce_rate_limit(state, Some(&principal.id), &ip, "admin").await?;
    Ok(principal)
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApproveShopRequest {
    commission_rate: u8,
    shop_type: Option<String>,
}

/// `PUT /api/admin/shops/{id}/approve`.
pub async fn approve_shop(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(shop_id): Path<String>,
    Json(req): Json<ApproveShopRequest>,
) -> Result<Response, ApiError> {
    let admin = require_admin(&state, &headers).await?;

    let before = {
        let shops = state.shops.lock().await;
        shops.get_shop(&shop_id)
    };
    let shop = {
        let mut shops = state.shops.lock().await;
        shops.approve_shop(&shop_id, req.commission_rate, req.shop_type.clone())?
    };

    let mut audit = state.audit.lock().await;
    audit.record_audit(AuditEvent {
        actor_id: admin.id,
        action: "approve_shop".to_string(),
        resource_type: "shop".to_string(),
        resource_id: shop_id,
        before: before.map(|s| serde_json::to_value(s).unwrap_or_default()),
        after: Some(serde_json::to_value(&shop).unwrap_or_default()),
        ip: None,
        at: Utc::now(),
    })?;

    Ok(ok(StatusCode::OK, shop))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkUserAction {
    user_ids: Vec<String>,
    action: String,
}

/// `POST /api/admin/users/bulk-action`. Bounded batch; each user's status
/// change is recorded as its own `AuditEvent`, and a role/status change
/// revokes every active session for that user so C2's "mass-revoke on role
/// change" contract holds without the principal needing to re-authenticate
/// through a separate endpoint.
pub async fn bulk_user_action(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<BulkUserAction>,
) -> Result<Response, ApiError> {
    const MAX_BATCH: usize = 100;
    let admin = require_admin(&state, &headers).await?;

    if req.user_ids.len() > MAX_BATCH {
        return Err(CoreError::Validation(format!("bulk action limited to {MAX_BATCH} users")).into());
    }

    let status = match req.action.as_str() {
        "suspend" => PrincipalStatus::Suspended,
        "reactivate" => PrincipalStatus::Active,
        "delete" => PrincipalStatus::Deleted,
        other => return Err(CoreError::Validation(format!("unknown bulk action: {other}")).into()),
    };

    let mut results = Vec::with_capacity(req.user_ids.len());
    for user_id in &req.user_ids {
        let mut credentials = state.credentials.lock().await;
        match credentials.update_status(user_id, status) {
            Ok(principal) => {
                credentials.revoke_all_for_user(user_id);
                drop(credentials);
                let mut audit = state.audit.lock().await;
                audit.record_audit(AuditEvent {
                    actor_id: admin.id.clone(),
                    action: format!("bulk_{}", req.action),
                    resource_type: "principal".to_string(),
                    resource_id: user_id.clone(),
                    before: None,
                    after: Some(serde_json::to_value(&principal).unwrap_or_default()),
                    ip: None,
                    at: Utc::now(),
                })?;
                results.push(serde_json::json!({ "userId": user_id, "ok": true }));
            }
            Err(err) => {
                results.push(serde_json::json!({ "userId": user_id, "ok": false, "error": err.code() }));
            }
        }
    }

    Ok(ok(StatusCode::OK, serde_json::json!({ "results": results })))
}

#[derive(Deserialize)]
pub struct AuditQuery {
    #[serde(rename = "actorId")]
    actor_id: Option<String>,
    #[serde(rename = "resourceType")]
    resource_type: Option<String>,
    from: Option<DateTime<Utc>>,
    to: Option<DateTime<Utc>>,
}

/// `GET /api/admin/audit-events`.
pub async fn audit_events(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<AuditQuery>,
) -> Result<Response, ApiError> {
    require_admin(&state, &headers).await?;
    let audit = state.audit.lock().await;
    Ok(ok(
        StatusCode::OK,
        audit.audit_events(
            query.actor_id.as_deref(),
            query.resource_type.as_deref(),
            query.from,
            query.to,
        ),
    ))
}

/// `GET /api/admin/security-events`.
pub async fn security_events(State(state): State<AppState>, headers: HeaderMap) -> Result<Response, ApiError> {
    require_admin(&state, &headers).await?;
    let audit = state.audit.lock().await;
    Ok(ok(StatusCode::OK, audit.security_events(None)))
}
