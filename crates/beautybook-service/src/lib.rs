//! HTTP edge for the beauty-services marketplace backend: routing, request
//! envelope mapping, and the background sweepers that drive time-based
//! state transitions. The domain logic itself lives in `beautybook-core`;
//! this crate only wires it to axum.

pub mod directory;
pub mod envelope;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod password;
pub mod state;
pub mod sweepers;

use axum::routing::{get, patch, post, put};
use axum::Router;

use state::AppState;

/// Builds the full route table against a constructed `AppState`. Kept
/// separate from `main.rs` so integration tests can mount the router over
/// an in-memory state without going through the CLI/bootstrap path.
pub fn build_router(state: AppState) -> Router {
    let api_routes = Router::new()
        // Auth (C1/C2)
        .route("/auth/signup", post(handlers::auth::signup))
        .route("/auth/login", post(handlers::auth::login))
        .route("/auth/refresh", post(handlers::auth::refresh))
        .route("/auth/social-login", post(handlers::auth::social_login))
        .route("/auth/logout", post(handlers::auth::logout))
        // Shops & services (onboarding surface feeding C6/C13)
        .route("/shops", post(handlers::shops::create_shop))
        .route("/shops/:shopId", get(handlers::shops::get_shop))
        .route("/shops/:shopId/services", post(handlers::shops::create_service))
        .route("/shops/:shopId/services", get(handlers::shops::list_services))
        // Reservations (C6)
        .route(
            "/shops/:shopId/reservations",
            post(handlers::reservations::create),
        )
        .route(
            "/shops/:shopId/reservations",
            get(handlers::reservations::list),
        )
        .route(
            "/shops/:shopId/reservations/:reservationId",
            get(handlers::reservations::get),
        )
        .route(
            "/shops/:shopId/reservations/:reservationId",
            patch(handlers::reservations::transition),
        )
        // Payments (C7)
        .route(
            "/payments/:reservationId/initiate",
            post(handlers::payments::initiate),
        )
        .route("/webhooks/payments", post(handlers::payments::webhook))
        // Identity verification (C10)
        .route(
            "/identity-verification/prepare",
            post(handlers::identity::prepare),
        )
        .route(
            "/identity-verification/verify",
            post(handlers::identity::verify),
        )
        .route(
            "/identity-verification/status/:verificationId",
            get(handlers::identity::status),
        )
        // Points (C8)
        .route("/points/summary", get(handlers::points::summary))
        .route("/points/history", get(handlers::points::history))
        // Referral (C9)
        .route("/referral/profile", get(handlers::referral::profile))
        .route(
            "/referral/referred-by",
            post(handlers::referral::set_referred_by),
        )
        // Push tokens (C11)
        .route("/push-tokens", post(handlers::push::register))
        // Admin (C13)
        .route(
            "/admin/shops/:shopId/approve",
            put(handlers::admin::approve_shop),
        )
        .route(
            "/admin/users/bulk-action",
            post(handlers::admin::bulk_user_action),
        )
        .route("/admin/audit-events", get(handlers::admin::audit_events))
        .route(
            "/admin/security-events",
            get(handlers::admin::security_events),
        );

    Router::new()
        .route("/health", get(health))
        .nest("/api", api_routes)
        .with_state(state)
}

async fn health() -> &'static str {
    "ok"
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    fn test_state() -> AppState {
        AppState::new(
            beautybook_core::CoreConfig::default(),
            b"test-token-secret".to_vec(),
            b"test-webhook-secret".to_vec(),
            "test-merchant".to_string(),
        )
    }

    #[tokio::test]
    async fn health_check_responds_ok() {
        let app = build_router(test_state());
        let response = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), axum::http::StatusCode::OK);
    }

    #[tokio::test]
    async fn unauthenticated_reservation_list_is_rejected() {
        let app = build_router(test_state());
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api/shops/shop-1/reservations")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), axum::http::StatusCode::UNAUTHORIZED);
    }
}
