use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::Response;
use axum::Json;
use beautybook_core::{CoreError, Role};
use serde::Deserialize;

use crate::envelope::ok;
use crate::error::ApiError;
use crate::middleware::{authenticate, client_ip, enforce_rate_limit, enforce_tenancy};
use crate::state::AppState;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateShopRequest {
    shop_type: String,
}

/// Shop-owner onboarding: registers a shop pending admin approval. Not in
/// §6's route table, but §4.C3/C4 both presuppose a shop exists before any
/// tenancy check can run, and nothing else in this system creates one.
pub async fn create_shop(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<CreateShopRequest>,
) -> Result<Response, ApiError> {
    let principal = authenticate(&state, &headers).await?;
    let ip = client_ip(&headers);
    enforce_rate_limit(&state, Some(&principal.id), &ip, "shops").await?;

    if !principal.role.is_shop_role() && !principal.role.is_platform_admin() {
        return Err(CoreError::Validation("only shop roles may register a shop".to_string()).into());
    }

    let mut shops = state.shops.lock().await;
    let shop = shops.create_shop(&principal.id, &req.shop_type);
    Ok(ok(StatusCode::CREATED, shop))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateServiceRequest {
    price_min: i64,
    price_max: i64,
    duration_minutes: i64,
}

pub async fn create_service(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(shop_id): Path<String>,
    Json(req): Json<CreateServiceRequest>,
) -> Result<Response, ApiError> {
    let principal = authenticate(&state, &headers).await?;
    let ip = client_ip(&headers);
    enforce_rate_limit(&state, Some(&principal.id), &ip, "shops").await?;
    enforce_tenancy(&state, &shop_id, &principal, "/api/shops/:shopId/services", "POST").await?;

    let mut shops = state.shops.lock().await;
    let service = shops.create_service(&shop_id, req.price_min, req.price_max, req.duration_minutes)?;
    Ok(ok(StatusCode::CREATED, service))
}

pub async fn list_services(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(shop_id): Path<String>,
) -> Result<Response, ApiError> {
    let principal = authenticate(&state, &headers).await?;
    enforce_tenancy(&state, &shop_id, &principal, "/api/shops/:shopId/services", "GET").await?;

    let shops = state.shops.lock().await;
    Ok(ok(StatusCode::OK, shops.list_services_for_shop(&shop_id)))
}

pub async fn get_shop(
    State(state): State<AppState>,
    Path(shop_id): Path<String>,
) -> Result<Response, ApiError> {
    let shops = state.shops.lock().await;
    let shop = shops
        .get_shop(&shop_id)
        .ok_or_else(|| CoreError::not_found("shop", &shop_id))?;
    Ok(ok(StatusCode::OK, shop))
}

pub fn only_admin(role: Role) -> Result<(), ApiError> {
    if role.is_platform_admin() {
        Ok(())
    } else {
        Err(CoreError::ForbiddenCrossShop.into())
    }
}
