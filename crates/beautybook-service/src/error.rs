//! HTTP-edge error mapping: `CoreError` → status code + the documented
//! `{success:false, error:{...}}` envelope.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use beautybook_core::CoreError;
use serde_json::json;

pub struct ApiError(CoreError);

impl From<CoreError> for ApiError {
    fn from(err: CoreError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let err = self.0;
        let status = status_for(&err);
        let code = err.code();

        if status == StatusCode::INTERNAL_SERVER_ERROR {
            let correlation_id = uuid::Uuid::new_v4().to_string();
            tracing::error!(correlation_id = %correlation_id, error = %err, "internal error");
            let body = Json(json!({
                "success": false,
                "error": {
                    "code": code,
                    "message": "internal error",
                    "details": { "correlationId": correlation_id },
                    "timestamp": chrono::Utc::now().to_rfc3339(),
                }
            }));
            return (status, body).into_response();
        }

        let body = Json(json!({
            "success": false,
            "error": {
                "code": code,
                "message": err.to_string(),
                "timestamp": chrono::Utc::now().to_rfc3339(),
            }
        }));
        (status, body).into_response()
    }
}

/// `Validation("suspended")` is the one `CoreError` whose HTTP status does
/// not follow from its variant alone — §4.C3 maps a suspended principal to
/// 403, not the 400 every other validation failure gets.
fn status_for(err: &CoreError) -> StatusCode {
    match err {
        CoreError::Validation(msg) if msg == "suspended" => StatusCode::FORBIDDEN,
        CoreError::Validation(_) => StatusCode::BAD_REQUEST,
        CoreError::AuthRequired => StatusCode::UNAUTHORIZED,
        CoreError::AuthInvalid(_) => StatusCode::UNAUTHORIZED,
        CoreError::ForbiddenCrossShop => StatusCode::FORBIDDEN,
        CoreError::NotFound { .. } => StatusCode::NOT_FOUND,
        CoreError::ConflictState(_) => StatusCode::CONFLICT,
        CoreError::ConflictSlot => StatusCode::CONFLICT,
        CoreError::ConflictIdempotent => StatusCode::CONFLICT,
        CoreError::InsufficientPoints => StatusCode::CONFLICT,
        CoreError::DuplicateUser(_) => StatusCode::CONFLICT,
        CoreError::GatewayUnavailable(_) => StatusCode::BAD_GATEWAY,
        CoreError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
        CoreError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn suspended_validation_maps_to_forbidden() {
        let err = CoreError::Validation("suspended".to_string());
        assert_eq!(status_for(&err), StatusCode::FORBIDDEN);
    }

    #[test]
    fn generic_validation_maps_to_bad_request() {
        let err = CoreError::Validation("invalid_services".to_string());
        assert_eq!(status_for(&err), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn rate_limited_maps_to_too_many_requests() {
        assert_eq!(status_for(&CoreError::RateLimited), StatusCode::TOO_MANY_REQUESTS);
    }
}
