use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::Response;
use axum::Json;
use beautybook_core::CoreError;
use serde::Deserialize;

use crate::envelope::ok;
use crate::error::ApiError;
use crate::middleware::authenticate;
use crate::state::AppState;

/// `GET /api/referral/profile`.
pub async fn profile(State(state): State<AppState>, headers: HeaderMap) -> Result<Response, ApiError> {
    let principal = authenticate(&state, &headers).await?;
    let referrals = state.referrals.lock().await;
    let profile = referrals
        .profile(&principal.id)
        .cloned()
        .ok_or_else(|| CoreError::not_found("referral_profile", &principal.id))?;
    Ok(ok(StatusCode::OK, profile))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetReferredByRequest {
    referral_code: String,
}

/// `POST /api/referral/referred-by`. Onboarding-time, one-shot; rejected
/// once already set or on a cyclic chain (C9).
pub async fn set_referred_by(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<SetReferredByRequest>,
) -> Result<Response, ApiError> {
    let principal = authenticate(&state, &headers).await?;
    let mut referrals = state.referrals.lock().await;
    referrals.set_referred_by_code(&principal.id, &req.referral_code)?;
    let profile = referrals.profile(&principal.id).cloned();
    Ok(ok(StatusCode::OK, profile))
}
