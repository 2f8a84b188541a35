//! Shared application state. Every domain engine in `beautybook-core` is a
//! plain synchronous struct over in-memory state; this is where they get
//! wrapped in `Arc<Mutex<_>>` for cross-request sharing, per that crate's
//! top-level doc comment.

use beautybook_adapters::{MockIdentityBroker, MockOAuthProvider, MockPaymentGateway, MockPushSender};
use beautybook_core::{
    AuditLog, CoreConfig, CredentialStore, IdentityBroker, IdentityVerificationEngine,
    NotificationDispatcher, OAuthProvider, OAuthProviderKind, PaymentEngine, PaymentGateway,
    PointLedger, PushSender, RateLimiter, ReferralEngine, ReservationEngine,
};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::directory::ShopRegistry;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<CoreConfig>,
    pub token_secret: Arc<Vec<u8>>,
    pub webhook_secret: Arc<Vec<u8>>,

    pub credentials: Arc<Mutex<CredentialStore>>,
    pub shops: Arc<Mutex<ShopRegistry>>,
    pub reservations: Arc<Mutex<ReservationEngine>>,
    pub payments: Arc<Mutex<PaymentEngine>>,
    pub points: Arc<Mutex<PointLedger>>,
    pub referrals: Arc<Mutex<ReferralEngine>>,
    pub identity: Arc<Mutex<IdentityVerificationEngine>>,
    pub notifications: Arc<Mutex<NotificationDispatcher>>,
    pub audit: Arc<Mutex<AuditLog>>,
    pub rate_limiter: Arc<Mutex<RateLimiter>>,

    pub oauth_providers: Arc<HashMap<OAuthProviderKind, Box<dyn OAuthProvider>>>,
    pub payment_gateway: Arc<dyn PaymentGateway>,
    pub identity_broker: Arc<dyn IdentityBroker>,
    pub push_sender: Arc<dyn PushSender>,
}

impl AppState {
    pub fn new(config: CoreConfig, token_secret: Vec<u8>, webhook_secret: Vec<u8>, merchant_id: String) -> Self {
        let mut oauth_providers: HashMap<OAuthProviderKind, Box<dyn OAuthProvider>> = HashMap::new();
        for kind in [
            OAuthProviderKind::Kakao,
            OAuthProviderKind::Apple,
            OAuthProviderKind::Google,
            OAuthProviderKind::Naver,
        ] {
            oauth_providers.insert(kind, Box::new(MockOAuthProvider::new(kind)));
        }

        let rate_limiter = RateLimiter::new(config.admin_ip_allowlist.clone());

        Self {
            config: Arc::new(config),
            token_secret: Arc::new(token_secret),
            webhook_secret: Arc::new(webhook_secret),

            credentials: Arc::new(Mutex::new(CredentialStore::new())),
            shops: Arc::new(Mutex::new(ShopRegistry::new())),
            reservations: Arc::new(Mutex::new(ReservationEngine::new())),
            payments: Arc::new(Mutex::new(PaymentEngine::new())),
            points: Arc::new(Mutex::new(PointLedger::new())),
            referrals: Arc::new(Mutex::new(ReferralEngine::new())),
            identity: Arc::new(Mutex::new(IdentityVerificationEngine::new())),
            notifications: Arc::new(Mutex::new(NotificationDispatcher::new())),
            audit: Arc::new(Mutex::new(AuditLog::new())),
            rate_limiter: Arc::new(Mutex::new(rate_limiter)),

            oauth_providers: Arc::new(oauth_providers),
            payment_gateway: Arc::new(MockPaymentGateway::new(merchant_id)),
            identity_broker: Arc::new(MockIdentityBroker::new()),
            push_sender: Arc::new(MockPushSender),
        }
    }
}
