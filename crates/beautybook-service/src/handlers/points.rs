use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::Response;
use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::envelope::ok;
use crate::error::ApiError;
use crate::middleware::authenticate;
use crate::state::AppState;

/// `GET /api/points/summary`.
pub async fn summary(State(state): State<AppState>, headers: HeaderMap) -> Result<Response, ApiError> {
    let principal = authenticate(&state, &headers).await?;
    let points = state.points.lock().await;
    Ok(ok(StatusCode::OK, points.summary(&principal.id, Utc::now())))
}

#[derive(Deserialize)]
pub struct HistoryQuery {
    from: Option<DateTime<Utc>>,
    to: Option<DateTime<Utc>>,
}

/// `GET /api/points/history?from=&to=`.
pub async fn history(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<HistoryQuery>,
) -> Result<Response, ApiError> {
    let principal = authenticate(&state, &headers).await?;
    let points = state.points.lock().await;
    Ok(ok(StatusCode::OK, points.history(&principal.id, query.from, query.to)))
}
