//! Deterministic mock connectors for the four external collaborators the
//! domain core only knows by contract: OAuth providers, the payment
//! gateway, the identity-verification broker, and push delivery.
//!
//! None of these call out to a network. Each derives its response
//! deterministically from its input so tests and local runs are
//! reproducible without a sandbox account for every upstream.

#![deny(unsafe_code)]

use beautybook_core::error::CoreError;
use beautybook_core::identity::{BrokerResult, IdentityBroker, VerificationRestrictions};
use beautybook_core::notification::{DeliveryError, PushSender};
use beautybook_core::oauth::{OAuthIdentity, OAuthProvider, OAuthProviderKind};
use beautybook_core::payment::PaymentGateway;
use beautybook_core::types::{PaymentMethod, PushPlatform};
use serde_json::json;

/// Exchanges a provider token for a stable identity by hashing the token:
/// the same token always resolves to the same `providerUserId`, matching
/// what a real OAuth provider's "one account, one subject" guarantee would
/// give a caller.
pub struct MockOAuthProvider {
    kind: OAuthProviderKind,
}

impl MockOAuthProvider {
    pub fn new(kind: OAuthProviderKind) -> Self {
        Self { kind }
    }
}

impl OAuthProvider for MockOAuthProvider {
    fn kind(&self) -> OAuthProviderKind {
        self.kind
    }

    fn exchange(&self, provider_token: &str) -> Result<OAuthIdentity, CoreError> {
        if provider_token.is_empty() {
            return Err(CoreError::AuthInvalid("empty_provider_token".to_string()));
        }
        let digest = blake3::hash(provider_token.as_bytes());
        let subject = digest.to_hex()[..16].to_string();
        Ok(OAuthIdentity {
            provider_user_id: format!("{}-{subject}", self.kind.as_str()),
            email: Some(format!("{subject}@{}.example", self.kind.as_str())),
            name: None,
        })
    }
}

/// Mirrors a PortOne/Danal-style gateway: `clientParameters` is an opaque
/// blob the client SDK forwards verbatim to open a payment session. The
/// webhook side of the gateway is not modeled here — that event arrives at
/// `beautybook-service`'s webhook endpoint and is verified with
/// `beautybook_core::payment::verify_webhook_signature` directly, since a
/// mock gateway has no real redelivery channel to simulate.
pub struct MockPaymentGateway {
    merchant_id: String,
}

impl MockPaymentGateway {
    pub fn new(merchant_id: impl Into<String>) -> Self {
        Self {
            merchant_id: merchant_id.into(),
        }
    }
}

impl PaymentGateway for MockPaymentGateway {
    fn create_client_parameters(
        &self,
        payment_id: &str,
        amount: i64,
        method: PaymentMethod,
    ) -> serde_json::Value {
        json!({
            "merchantId": self.merchant_id,
            "paymentId": payment_id,
            "amount": amount,
            "method": method_label(method),
            "sessionToken": format!("mock-session-{payment_id}"),
        })
    }
}

fn method_label(method: PaymentMethod) -> &'static str {
    match method {
        PaymentMethod::Card => "card",
        PaymentMethod::TransferBank => "transfer_bank",
        PaymentMethod::SimplePay => "simple_pay",
    }
}

/// Deterministic identity-verification broker. `verification_id`s prefixed
/// `fail-` always come back unverified; otherwise the broker derives a
/// stable `ci`/`di` from the id so repeated verification attempts against
/// the same `verification_id` are idempotent, and two different ids that
/// happen to encode the same real person (tests simulate this by reusing a
/// `ci-*` suffix) collide the way a real CI would.
pub struct MockIdentityBroker {
    default_birth_date: String,
}

impl MockIdentityBroker {
    pub fn new() -> Self {
        Self {
            default_birth_date: "2000-01-01".to_string(),
        }
    }
}

impl Default for MockIdentityBroker {
    fn default() -> Self {
        Self::new()
    }
}

impl IdentityBroker for MockIdentityBroker {
    fn prepare(&self, verification_id: &str, _restrictions: &VerificationRestrictions) -> String {
        format!("mock-broker-token-{verification_id}")
    }

    fn fetch_result(&self, verification_id: &str) -> BrokerResult {
        if verification_id.starts_with("fail-") {
            return BrokerResult {
                verified: false,
                ci: None,
                di: None,
                name: None,
                birth_date: None,
                gender: None,
                operator: None,
            };
        }
        let digest = blake3::hash(verification_id.as_bytes());
        BrokerResult {
            verified: true,
            ci: Some(format!("ci-{}", &digest.to_hex()[..20])),
            di: Some(format!("di-{}", &digest.to_hex()[20..32])),
            name: Some("Hong Gildong".to_string()),
            birth_date: Some(self.default_birth_date.clone()),
            gender: Some("M".to_string()),
            operator: Some("SKT".to_string()),
        }
    }
}

/// Deterministic push delivery sender, keyed entirely off the token string
/// so unit and integration tests can exercise every retry/classification
/// path without mocking network state: tokens prefixed `invalid-` report
/// `InvalidToken`, `timeout-` report `Timeout`, `ratelimited-` report
/// `RateLimited`, `permanent-` report `Permanent`; anything else succeeds.
pub struct MockPushSender;

impl PushSender for MockPushSender {
    fn send(&self, token: &str, _platform: PushPlatform, _title: &str, _body: &str) -> Result<(), DeliveryError> {
        if token.starts_with("invalid-") {
            Err(DeliveryError::InvalidToken)
        } else if token.starts_with("timeout-") {
            Err(DeliveryError::Timeout)
        } else if token.starts_with("ratelimited-") {
            Err(DeliveryError::RateLimited)
        } else if token.starts_with("permanent-") {
            Err(DeliveryError::Permanent)
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn oauth_exchange_is_deterministic_per_token() {
        let provider = MockOAuthProvider::new(OAuthProviderKind::Kakao);
        let a = provider.exchange("tok-1").unwrap();
        let b = provider.exchange("tok-1").unwrap();
        assert_eq!(a.provider_user_id, b.provider_user_id);
    }

    #[test]
    fn oauth_exchange_rejects_empty_token() {
        let provider = MockOAuthProvider::new(OAuthProviderKind::Apple);
        assert!(provider.exchange("").is_err());
    }

    #[test]
    fn identity_broker_fail_prefix_is_unverified() {
        let broker = MockIdentityBroker::new();
        let result = broker.fetch_result("fail-123");
        assert!(!result.verified);
    }

    #[test]
    fn identity_broker_same_verification_id_yields_same_ci() {
        let broker = MockIdentityBroker::new();
        let a = broker.fetch_result("v-1");
        let b = broker.fetch_result("v-1");
        assert_eq!(a.ci, b.ci);
    }

    #[test]
    fn push_sender_classifies_by_token_prefix() {
        let sender = MockPushSender;
        assert_eq!(
            sender.send("invalid-abc", PushPlatform::Ios, "t", "b"),
            Err(DeliveryError::InvalidToken)
        );
        assert_eq!(sender.send("good-abc", PushPlatform::Ios, "t", "b"), Ok(()));
    }

    #[test]
    fn payment_gateway_embeds_payment_id_and_amount() {
        let gateway = MockPaymentGateway::new("merchant-1");
        let params = gateway.create_client_parameters("pay-1", 10_000, PaymentMethod::Card);
        assert_eq!(params["paymentId"], "pay-1");
        assert_eq!(params["amount"], 10_000);
    }
}
