//! C7 Payment Orchestrator: initiation, idempotent webhook intake, and the
//! payment status state machine.
//!
//! The engine only owns payment rows and webhook idempotency bookkeeping. It
//! never calls into the point ledger, reservation engine, or referral
//! engine directly — `apply_webhook_event` instead returns a
//! `WebhookOutcome` describing exactly which side effects the caller must
//! apply in the same transaction as the status update, per §4.C7's
//! ordering guarantee. This keeps each engine testable in isolation while
//! preserving the "all post-approval side effects commit together" rule.

use crate::error::CoreError;
use crate::types::{GatewayEventKind, GatewayWebhookEvent, Payment, PaymentMethod, PaymentStatus};
use chrono::{DateTime, Duration, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::collections::HashSet;
use uuid::Uuid;

/// Port the gateway adapter implements. `create_client_parameters` never
/// touches the payment row; it only returns the opaque blob the client SDK
/// needs to open a gateway session.
pub trait PaymentGateway: Send + Sync {
    fn create_client_parameters(
        &self,
        payment_id: &str,
        amount: i64,
        method: PaymentMethod,
    ) -> serde_json::Value;
}

/// HMAC-SHA-256 over the raw body using the shared webhook secret, with a
/// timestamp-skew check. `timestamp` and `signature` both arrive as request
/// headers; `raw_body` must be the exact bytes the gateway signed.
pub fn verify_webhook_signature(
    raw_body: &[u8],
    signature_hex: &str,
    secret: &[u8],
    timestamp: DateTime<Utc>,
    now: DateTime<Utc>,
    max_skew: Duration,
) -> Result<(), CoreError> {
    if (now - timestamp).abs() > max_skew {
        return Err(CoreError::AuthInvalid("webhook_timestamp_skew".to_string()));
    }

    let mut mac = Hmac::<Sha256>::new_from_slice(secret)
        .map_err(|e| CoreError::Internal(format!("invalid hmac key: {e}")))?;
    mac.update(raw_body);
    let expected = mac.finalize().into_bytes();
    let expected_hex = expected.iter().map(|b| format!("{b:02x}")).collect::<String>();

    if expected_hex.len() != signature_hex.len() {
        return Err(CoreError::AuthInvalid("webhook_signature_mismatch".to_string()));
    }
    let mut diff = 0u8;
    for (a, b) in expected_hex.bytes().zip(signature_hex.bytes()) {
        diff |= a ^ b;
    }
    if diff != 0 {
        return Err(CoreError::AuthInvalid("webhook_signature_mismatch".to_string()));
    }
    Ok(())
}

/// Side effects `apply_webhook_event` determined are required; the caller
/// (the webhook handler, inside its short transaction) executes each one
/// against the point ledger, reservation engine, and notification
/// dispatcher before committing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebhookOutcome {
    /// Already processed this exact `(gatewayTxId, event)`; no-op.
    AlreadyProcessed,
    Approved {
        payment: Payment,
        commit_points_spent: bool,
        enqueue_referral_commission: bool,
        confirm_reservation: bool,
    },
    FailedOrCancelled {
        payment: Payment,
        release_reserved_points: bool,
    },
    Refunded {
        refund_payment: Payment,
        reverse_points_for_original: String,
        cancel_reservation_as: Option<crate::types::ReservationActor>,
    },
    Disputed {
        payment: Payment,
    },
}

pub struct PaymentEngine {
    payments: Vec<Payment>,
    processed_events: HashSet<(String, String)>,
}

impl PaymentEngine {
    pub fn new() -> Self {
        Self {
            payments: Vec::new(),
            processed_events: HashSet::new(),
        }
    }

    pub fn get(&self, payment_id: &str) -> Option<&Payment> {
        self.payments.iter().find(|p| p.id == payment_id)
    }

    /// `initiate(reservationId, method, amount, pointsToApply)`. Validates
    /// `pointsToApply` against the caller-supplied available balance (the
    /// caller looked this up from the point ledger) and persists a `pending`
    /// payment whose server-generated id is the sole idempotency key until
    /// a `gatewayTxId` is attached on approval.
    pub fn initiate(
        &mut self,
        reservation_id: &str,
        shop_id: &str,
        user_id: &str,
        method: PaymentMethod,
        amount: i64,
        points_to_apply: i64,
        available_points_balance: i64,
        now: DateTime<Utc>,
    ) -> Result<Payment, CoreError> {
        if points_to_apply > available_points_balance {
            return Err(CoreError::InsufficientPoints);
        }
        if points_to_apply < 0 || amount <= 0 {
            return Err(CoreError::Validation("amount and pointsToApply must be non-negative".to_string()));
        }
        let payment = Payment {
            id: Uuid::new_v4().to_string(),
            reservation_id: reservation_id.to_string(),
            shop_id: shop_id.to_string(),
            user_id: user_id.to_string(),
            amount,
            points_used: points_to_apply,
            method,
            status: PaymentStatus::Pending,
            gateway_tx_id: None,
            paid_at: None,
            refunded_from: None,
            dispute_evidence_deadline: None,
            created_at: now,
        };
        self.payments.push(payment.clone());
        Ok(payment)
    }

    /// Processes one gateway webhook event idempotently, keyed on
    /// `(gatewayTxId, event)`. The signature and clock-skew checks happen at
    /// the HTTP edge before this is called; this method only applies the
    /// state transition and reports required side effects.
    pub fn apply_webhook_event(
        &mut self,
        event: &GatewayWebhookEvent,
        now: DateTime<Utc>,
    ) -> Result<WebhookOutcome, CoreError> {
        let key = (event.gateway_tx_id.clone(), format!("{:?}", event.event));
        if self.processed_events.contains(&key) {
            return Ok(WebhookOutcome::AlreadyProcessed);
        }

        let outcome = match event.event {
            GatewayEventKind::Approved => self.apply_approved(event, now)?,
            GatewayEventKind::Failed | GatewayEventKind::Cancelled => {
                self.apply_failed_or_cancelled(event)?
            }
            GatewayEventKind::Refund => self.apply_refund(event, now)?,
            GatewayEventKind::Dispute => self.apply_dispute(event, now)?,
        };

        self.processed_events.insert(key);
        Ok(outcome)
    }

    fn apply_approved(&mut self, event: &GatewayWebhookEvent, now: DateTime<Utc>) -> Result<WebhookOutcome, CoreError> {
        let idx = self
            .pending_index_for(event)
            .ok_or_else(|| CoreError::not_found("payment", &event.gateway_tx_id))?;

        // The threshold a captured amount is judged against is the pending
        // payment's own expected amount, not the event's — the event only
        // reports what the gateway actually captured.
        let deposit_threshold = self.payments[idx].amount;
        let new_status = if event.amount >= deposit_threshold {
            PaymentStatus::FullyPaid
        } else {
            PaymentStatus::DepositPaid
        };
        self.payments[idx].status = new_status;
        self.payments[idx].gateway_tx_id = Some(event.gateway_tx_id.clone());
        self.payments[idx].paid_at = Some(now);

        Ok(WebhookOutcome::Approved {
            payment: self.payments[idx].clone(),
            commit_points_spent: self.payments[idx].points_used > 0,
            enqueue_referral_commission: true,
            confirm_reservation: true,
        })
    }

    fn apply_failed_or_cancelled(&mut self, event: &GatewayWebhookEvent) -> Result<WebhookOutcome, CoreError> {
        let idx = self
            .pending_index_for(event)
            .ok_or_else(|| CoreError::not_found("payment", &event.gateway_tx_id))?;
        self.payments[idx].status = if matches!(event.event, GatewayEventKind::Failed) {
            PaymentStatus::Failed
        } else {
            PaymentStatus::Cancelled
        };
        self.payments[idx].gateway_tx_id = Some(event.gateway_tx_id.clone());
        Ok(WebhookOutcome::FailedOrCancelled {
            payment: self.payments[idx].clone(),
            release_reserved_points: self.payments[idx].points_used > 0,
        })
    }

    fn apply_refund(&mut self, event: &GatewayWebhookEvent, now: DateTime<Utc>) -> Result<WebhookOutcome, CoreError> {
        let original_idx = self
            .payments
            .iter()
            .position(|p| p.gateway_tx_id.as_deref() == Some(event.gateway_tx_id.as_str()))
            .ok_or_else(|| CoreError::not_found("payment", &event.gateway_tx_id))?;
        let original = self.payments[original_idx].clone();
        self.payments[original_idx].status = PaymentStatus::Refunded;

        let refund = Payment {
            id: Uuid::new_v4().to_string(),
            reservation_id: original.reservation_id.clone(),
            shop_id: original.shop_id.clone(),
            user_id: original.user_id.clone(),
            amount: -event.amount,
            points_used: 0,
            method: original.method,
            status: PaymentStatus::Refunded,
            gateway_tx_id: Some(format!("{}-refund", event.gateway_tx_id)),
            paid_at: Some(now),
            refunded_from: Some(original.id.clone()),
            dispute_evidence_deadline: None,
            created_at: now,
        };
        self.payments.push(refund.clone());

        let cancel_as = if original.status.is_terminal() {
            None
        } else {
            Some(crate::types::ReservationActor::System)
        };

        Ok(WebhookOutcome::Refunded {
            refund_payment: refund,
            reverse_points_for_original: original.id,
            cancel_reservation_as: cancel_as,
        })
    }

    fn apply_dispute(&mut self, event: &GatewayWebhookEvent, now: DateTime<Utc>) -> Result<WebhookOutcome, CoreError> {
        let idx = self
            .payments
            .iter()
            .position(|p| p.gateway_tx_id.as_deref() == Some(event.gateway_tx_id.as_str()))
            .ok_or_else(|| CoreError::not_found("payment", &event.gateway_tx_id))?;
        self.payments[idx].status = PaymentStatus::Disputed;
        self.payments[idx].dispute_evidence_deadline = Some(now + chrono::Duration::days(14));
        Ok(WebhookOutcome::Disputed {
            payment: self.payments[idx].clone(),
        })
    }

    fn pending_index_for(&self, event: &GatewayWebhookEvent) -> Option<usize> {
        self.payments.iter().position(|p| {
            p.status == PaymentStatus::Pending
                && (p.gateway_tx_id.as_deref() == Some(event.gateway_tx_id.as_str())
                    || p.gateway_tx_id.is_none())
        })
    }
}

impl Default for PaymentEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn event(gateway_tx_id: &str, kind: GatewayEventKind, amount: i64) -> GatewayWebhookEvent {
        GatewayWebhookEvent {
            gateway_tx_id: gateway_tx_id.to_string(),
            event: kind,
            amount,
            metadata: BTreeMap::new(),
        }
    }

    #[test]
    fn duplicate_approved_delivery_is_a_no_op() {
        let mut engine = PaymentEngine::new();
        engine
            .initiate("r1", "shop-1", "u1", PaymentMethod::Card, 50_000, 0, 0, Utc::now())
            .unwrap();

        let e = event("gt-9", GatewayEventKind::Approved, 50_000);
        let first = engine.apply_webhook_event(&e, Utc::now()).unwrap();
        assert!(matches!(first, WebhookOutcome::Approved { .. }));

        let second = engine.apply_webhook_event(&e, Utc::now()).unwrap();
        assert_eq!(second, WebhookOutcome::AlreadyProcessed);

        assert_eq!(
            engine
                .payments
                .iter()
                .filter(|p| p.status == PaymentStatus::FullyPaid)
                .count(),
            1
        );
    }

    #[test]
    fn partial_amount_lands_in_deposit_paid() {
        let mut engine = PaymentEngine::new();
        engine
            .initiate("r1", "shop-1", "u1", PaymentMethod::Card, 50_000, 0, 0, Utc::now())
            .unwrap();
        let e = event("gt-1", GatewayEventKind::Approved, 10_000);
        let outcome = engine.apply_webhook_event(&e, Utc::now()).unwrap();
        match outcome {
            WebhookOutcome::Approved { payment, .. } => {
                assert_eq!(payment.status, PaymentStatus::DepositPaid);
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[test]
    fn points_to_apply_above_balance_is_rejected() {
        let mut engine = PaymentEngine::new();
        let err = engine
            .initiate("r1", "shop-1", "u1", PaymentMethod::Card, 50_000, 500, 100, Utc::now())
            .unwrap_err();
        assert!(matches!(err, CoreError::InsufficientPoints));
    }

    #[test]
    fn webhook_signature_with_stale_timestamp_is_rejected() {
        let secret = b"shared-secret";
        let body = b"{\"gatewayTxId\":\"gt-1\"}";
        let mut mac = Hmac::<Sha256>::new_from_slice(secret).unwrap();
        mac.update(body);
        let signature = mac.finalize().into_bytes().iter().map(|b| format!("{b:02x}")).collect::<String>();

        let signed_at = Utc::now() - chrono::Duration::minutes(30);
        let err = verify_webhook_signature(body, &signature, secret, signed_at, Utc::now(), chrono::Duration::seconds(300))
            .unwrap_err();
        assert!(matches!(err, CoreError::AuthInvalid(_)));
    }

    #[test]
    fn webhook_signature_within_skew_is_accepted() {
        let secret = b"shared-secret";
        let body = b"{\"gatewayTxId\":\"gt-1\"}";
        let mut mac = Hmac::<Sha256>::new_from_slice(secret).unwrap();
        mac.update(body);
        let signature = mac.finalize().into_bytes().iter().map(|b| format!("{b:02x}")).collect::<String>();

        let now = Utc::now();
        verify_webhook_signature(body, &signature, secret, now, now, chrono::Duration::seconds(300)).unwrap();
    }

    #[test]
    fn refund_links_to_original_payment() {
        let mut engine = PaymentEngine::new();
        engine
            .initiate("r1", "shop-1", "u1", PaymentMethod::Card, 50_000, 0, 0, Utc::now())
            .unwrap();
        engine
            .apply_webhook_event(&event("gt-1", GatewayEventKind::Approved, 50_000), Utc::now())
            .unwrap();
        let outcome = engine
            .apply_webhook_event(&event("gt-1", GatewayEventKind::Refund, 50_000), Utc::now())
            .unwrap();
        match outcome {
            WebhookOutcome::Refunded { refund_payment, .. } => {
                assert_eq!(refund_payment.refunded_from.as_deref(), Some(engine.payments[0].id.as_str()));
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }
}
