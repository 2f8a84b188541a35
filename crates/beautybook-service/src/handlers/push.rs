use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::Response;
use axum::Json;
use beautybook_core::PushToken;
use serde::Deserialize;

use crate::envelope::ok;
use crate::error::ApiError;
use crate::middleware::authenticate;
use crate::state::AppState;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterTokenRequest {
    token: String,
    platform: beautybook_core::PushPlatform,
    device_id: String,
}

/// `POST /api/push-tokens`. Registered on login; superseded by a later
/// registration for the same device.
pub async fn register(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<RegisterTokenRequest>,
) -> Result<Response, ApiError> {
    let principal = authenticate(&state, &headers).await?;
    let mut notifications = state.notifications.lock().await;
    notifications.register_token(PushToken {
        user_id: principal.id,
        token: req.token,
        platform: req.platform,
        device_id: req.device_id,
        active: true,
        created_at: chrono::Utc::now(),
    });
    Ok(ok(StatusCode::CREATED, serde_json::json!({ "registered": true })))
}
