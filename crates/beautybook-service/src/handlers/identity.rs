use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::Response;
use axum::Json;
use beautybook_core::{CoreError, VerificationRestrictions};
use serde::Deserialize;

use crate::envelope::ok;
use crate::error::ApiError;
use crate::middleware::{authenticate, client_ip, enforce_rate_limit};
use crate::state::AppState;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrepareRequest {
    verification_id: String,
    min_age: Option<u8>,
    #[serde(default)]
    allowed_carriers: Vec<String>,
}

/// `POST /api/identity-verification/prepare`.
pub async fn prepare(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<PrepareRequest>,
) -> Result<Response, ApiError> {
    let principal = authenticate(&state, &headers).await?;
    let ip = client_ip(&headers);
    enforce_rate_limit(&state, Some(&principal.id), &ip, "identity").await?;

    let restrictions = VerificationRestrictions {
        min_age: req.min_age,
        allowed_carriers: req.allowed_carriers,
    };
    let mut identity = state.identity.lock().await;
    let token = identity.prepare(
        state.identity_broker.as_ref(),
        &req.verification_id,
        &restrictions,
        chrono::Utc::now(),
    );
    Ok(ok(
        StatusCode::OK,
        serde_json::json!({ "verificationId": req.verification_id, "brokerToken": token }),
    ))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyRequest {
    verification_id: String,
    min_age: Option<u8>,
}

/// `POST /api/identity-verification/verify`.
pub async fn verify(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<VerifyRequest>,
) -> Result<Response, ApiError> {
    let principal = authenticate(&state, &headers).await?;
    let ip = client_ip(&headers);
    enforce_rate_limit(&state, Some(&principal.id), &ip, "identity").await?;

    let mut identity = state.identity.lock().await;
    let snapshot = identity.snapshot();
    let record = identity.verify(
        state.identity_broker.as_ref(),
        &req.verification_id,
        &principal.id,
        req.min_age,
        |ci| {
            snapshot
                .iter()
                .find(|r| r.ci.as_deref() == Some(ci) && r.user_id.is_some())
                .and_then(|r| r.user_id.clone())
        },
        chrono::Utc::now(),
    )?;
    Ok(ok(StatusCode::OK, record))
}

/// `GET /api/identity-verification/status/{id}`.
pub async fn status(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(verification_id): Path<String>,
) -> Result<Response, ApiError> {
    authenticate(&state, &headers).await?;
    let identity = state.identity.lock().await;
    let record = identity
        .get(&verification_id)
        .cloned()
        .ok_or_else(|| CoreError::not_found("identity_verification", &verification_id))?;
    Ok(ok(StatusCode::OK, record))
}
