use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::Response;
use axum::Json;
use beautybook_core::{
    verify_webhook_signature, CoreError, GatewayWebhookEvent, PaymentMethod, PointTransactionType,
    ReservationActor, ReservationStatus, WebhookOutcome,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::envelope::ok;
use crate::error::ApiError;
use crate::middleware::{authenticate, client_ip, enforce_rate_limit};
use crate::state::AppState;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitiateRequest {
    method: PaymentMethod,
    amount: i64,
    points_to_apply: Option<i64>,
}

/// `POST /api/payments/{reservationId}/initiate`.
pub async fn initiate(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(reservation_id): Path<String>,
    Json(req): Json<InitiateRequest>,
) -> Result<Response, ApiError> {
    let principal = authenticate(&state, &headers).await?;
    let ip = client_ip(&headers);
    enforce_rate_limit(&state, Some(&principal.id), &ip, "payments").await?;

    let reservation = {
        let reservations = state.reservations.lock().await;
        reservations
            .get(&reservation_id)
            .cloned()
            .ok_or_else(|| CoreError::not_found("reservation", &reservation_id))?
    };
    if reservation.customer_id != principal.id {
        return Err(CoreError::ForbiddenCrossShop.into());
    }

    let points_to_apply = req.points_to_apply.unwrap_or(0);
    let available = {
        let points = state.points.lock().await;
        points.balance(&principal.id)
    };

    let payment = {
        let mut payments = state.payments.lock().await;
        payments.initiate(
            &reservation_id,
            &reservation.shop_id,
            &principal.id,
            req.method,
            req.amount,
            points_to_apply,
            available,
            Utc::now(),
        )?
    };

    let client_parameters = state
        .payment_gateway
        .create_client_parameters(&payment.id, req.amount, req.method);

    Ok(ok(
        StatusCode::CREATED,
        serde_json::json!({ "payment": payment, "clientParameters": client_parameters }),
    ))
}

#[derive(Deserialize)]
struct WebhookPayload {
    #[serde(rename = "gatewayTxId")]
    gateway_tx_id: String,
    event: beautybook_core::GatewayEventKind,
    amount: i64,
    #[serde(default)]
    metadata: std::collections::BTreeMap<String, String>,
}

/// `POST /api/webhooks/payments`. Verifies the HMAC signature over the raw
/// body before any deserialization, per §6's webhook contract.
pub async fn webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, ApiError> {
    let signature = headers
        .get("x-gateway-signature")
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| CoreError::AuthInvalid("missing signature header".to_string()))?;
    let timestamp: DateTime<Utc> = headers
        .get("x-gateway-timestamp")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<DateTime<Utc>>().ok())
        .ok_or_else(|| CoreError::AuthInvalid("missing or invalid timestamp header".to_string()))?;

    verify_webhook_signature(
        &body,
        signature,
        &state.webhook_secret,
        timestamp,
        Utc::now(),
        chrono::Duration::from_std(state.config.payment_webhook_clock_skew).unwrap(),
    )?;

    let payload: WebhookPayload = serde_json::from_slice(&body)?;
    let event = GatewayWebhookEvent {
        gateway_tx_id: payload.gateway_tx_id,
        event: payload.event,
        amount: payload.amount,
        metadata: payload.metadata,
    };

    let outcome = {
        let mut payments = state.payments.lock().await;
        payments.apply_webhook_event(&event, Utc::now())?
    };

    apply_webhook_side_effects(&state, &outcome).await?;

    Ok(ok(StatusCode::OK, serde_json::json!({ "outcome": format!("{outcome:?}") })))
}

async fn apply_webhook_side_effects(state: &AppState, outcome: &WebhookOutcome) -> Result<(), ApiError> {
    match outcome {
        WebhookOutcome::AlreadyProcessed => {}
        WebhookOutcome::Approved {
            payment,
            commit_points_spent,
            enqueue_referral_commission,
            confirm_reservation,
        } => {
            if *commit_points_spent {
                let mut points = state.points.lock().await;
                points.debit(
                    &payment.user_id,
                    payment.points_used,
                    PointTransactionType::Spent,
                    Some(payment.id.clone()),
                )?;
            }
            {
                let eligible = payment.amount;
                let mut points = state.points.lock().await;
                points.credit(
                    &payment.user_id,
                    (eligible as f64 * 0.01) as i64,
                    PointTransactionType::EarnedPurchase,
                    Some(payment.id.clone()),
                    None,
                    Some(Utc::now() + chrono::Duration::from_std(state.config.points_default_expiry).unwrap()),
                )
                .ok();
            }
            if *enqueue_referral_commission {
                let commission = {
                    let referrals = state.referrals.lock().await;
                    referrals.commission_for_payment(
                        &payment.user_id,
                        payment.amount,
                        state.config.referral_standard_rate,
                        state.config.referral_influencer_rate,
                    )
                };
                if let Some((referrer_id, bonus)) = commission {
                    {
                        let mut points = state.points.lock().await;
                        points.credit(
                            &referrer_id,
                            bonus,
                            PointTransactionType::EarnedReferral,
                            Some(payment.id.clone()),
                            Some(payment.user_id.clone()),
                            None,
                        )?;
                    }
                    {
                        let mut referrals = state.referrals.lock().await;
                        referrals.record_commission(
                            &referrer_id,
                            bonus,
                            state.config.referral_influencer_threshold,
                            Utc::now(),
                        )?;
                    }
                    let mut notifications = state.notifications.lock().await;
                    notifications.enqueue(
                        &referrer_id,
                        "referral_commission",
                        &payment.id,
                        "포인트 적립",
                        &format!("{} 님 덕분에 +{bonus} point", payment.user_id),
                        Utc::now(),
                    );
                }
            }
            if *confirm_reservation {
                let mut reservations = state.reservations.lock().await;
                let _ = reservations.transition(
                    &payment.reservation_id,
                    ReservationStatus::Confirmed,
                    ReservationActor::System,
                    Some("payment_approved".to_string()),
                    Utc::now(),
                );
            }
        }
        WebhookOutcome::FailedOrCancelled {
            payment,
            release_reserved_points,
        } => {
            if *release_reserved_points {
                let mut points = state.points.lock().await;
                let _ = points.reverse_by_payment(&payment.id);
            }
        }
        WebhookOutcome::Refunded {
            reverse_points_for_original,
            cancel_reservation_as,
            refund_payment,
        } => {
            {
                let mut points = state.points.lock().await;
                points.reverse_by_payment(reverse_points_for_original)?;
            }
            if let Some(actor) = cancel_reservation_as {
                let mut reservations = state.reservations.lock().await;
                let _ = reservations.transition(
                    &refund_payment.reservation_id,
                    ReservationStatus::CancelledByShop,
                    *actor,
                    Some("refunded".to_string()),
                    Utc::now(),
                );
            }
        }
        WebhookOutcome::Disputed { .. } => {}
    }
    Ok(())
}
