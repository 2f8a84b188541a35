//! Success side of the `{success, data, message?}` response envelope; the
//! error side lives in `error::ApiError`.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use serde_json::json;

pub fn ok<T: Serialize>(status: StatusCode, data: T) -> Response {
    (status, Json(json!({ "success": true, "data": data }))).into_response()
}

pub fn ok_with_message<T: Serialize>(status: StatusCode, data: T, message: impl Into<String>) -> Response {
    (
        status,
        Json(json!({ "success": true, "data": data, "message": message.into() })),
    )
        .into_response()
}
