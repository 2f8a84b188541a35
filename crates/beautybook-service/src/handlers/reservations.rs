use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::Response;
use axum::Json;
use beautybook_core::{CoreError, ReservationActor, ReservationStatus};
use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::envelope::ok;
use crate::error::ApiError;
use crate::middleware::{authenticate, client_ip, enforce_rate_limit, enforce_tenancy};
use crate::state::AppState;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateReservationRequest {
    customer_id: Option<String>,
    service_ids: Vec<String>,
    datetime: DateTime<Utc>,
    points_to_apply: Option<i64>,
}

/// `POST /api/shops/{shopId}/reservations`. Shop-scoped, so the Tenancy
/// Gate runs first; a shop principal books on behalf of `customerId` in the
/// body, a customer principal books for themselves and `customerId` (if
/// present) must match their own id.
pub async fn create(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(shop_id): Path<String>,
    Json(req): Json<CreateReservationRequest>,
) -> Result<Response, ApiError> {
    let principal = authenticate(&state, &headers).await?;
    let ip = client_ip(&headers);
    enforce_rate_limit(&state, Some(&principal.id), &ip, "reservations").await?;
    let shop = enforce_tenancy(
        &state,
        &shop_id,
        &principal,
        "/api/shops/:shopId/reservations",
        "POST",
    )
    .await?;

    let customer_id = match req.customer_id.clone() {
        Some(id) if principal.role.is_shop_role() || principal.role.is_platform_admin() => id,
        Some(id) if id == principal.id => id,
        Some(_) => return Err(CoreError::ForbiddenCrossShop.into()),
        None => principal.id.clone(),
    };

    let services = {
        let shops = state.shops.lock().await;
        shops.services_by_ids(&req.service_ids)
    };

    let points_to_apply = req.points_to_apply.unwrap_or(0);
    if points_to_apply > 0 {
        let points = state.points.lock().await;
        let balance = points.balance(&customer_id);
        if points_to_apply > balance {
            return Err(CoreError::InsufficientPoints.into());
        }
    }

    let mut reservations = state.reservations.lock().await;
    let reservation = reservations.create(
        &shop,
        &customer_id,
        &services,
        req.datetime,
        points_to_apply,
        Utc::now(),
    )?;
    Ok(ok(StatusCode::CREATED, reservation))
}

/// `GET /api/shops/{shopId}/reservations`.
pub async fn list(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(shop_id): Path<String>,
) -> Result<Response, ApiError> {
    let principal = authenticate(&state, &headers).await?;
    enforce_tenancy(&state, &shop_id, &principal, "/api/shops/:shopId/reservations", "GET").await?;

    let reservations = state.reservations.lock().await;
    let list: Vec<_> = reservations.list_for_shop(&shop_id).into_iter().cloned().collect();
    Ok(ok(StatusCode::OK, list))
}

/// `GET /api/shops/{shopId}/reservations/{id}`.
pub async fn get(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path((shop_id, reservation_id)): Path<(String, String)>,
) -> Result<Response, ApiError> {
    let principal = authenticate(&state, &headers).await?;
    enforce_tenancy(
        &state,
        &shop_id,
        &principal,
        "/api/shops/:shopId/reservations/:id",
        "GET",
    )
    .await?;

    let reservations = state.reservations.lock().await;
    let reservation = reservations
        .get(&reservation_id)
        .cloned()
        .ok_or_else(|| CoreError::not_found("reservation", &reservation_id))?;
    Ok(ok(StatusCode::OK, reservation))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransitionRequest {
    to: ReservationStatus,
    reason: Option<String>,
}

fn actor_for(role: beautybook_core::Role) -> ReservationActor {
    if role.is_shop_role() {
        ReservationActor::Shop
    } else {
        ReservationActor::Customer
    }
}

/// `PATCH /api/shops/{shopId}/reservations/{id}`.
pub async fn transition(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path((shop_id, reservation_id)): Path<(String, String)>,
    Json(req): Json<TransitionRequest>,
) -> Result<Response, ApiError> {
    let principal = authenticate(&state, &headers).await?;
    enforce_tenancy(
        &state,
        &shop_id,
        &principal,
        "/api/shops/:shopId/reservations/:id",
        "PATCH",
    )
    .await?;

    let actor = actor_for(principal.role);
    let mut reservations = state.reservations.lock().await;
    let reservation = reservations.transition(&reservation_id, req.to, actor, req.reason, Utc::now())?;
    Ok(ok(StatusCode::OK, reservation))
}
