//! Domain core for the beauty-services marketplace backend.
//!
//! Every engine in this crate is a plain synchronous struct over in-memory
//! state; the service crate wraps each in `Arc<Mutex<_>>` for cross-request
//! sharing and owns all I/O (HTTP, Postgres, the gateway/broker/push
//! adapters). Keeping the domain logic synchronous and storage-agnostic is
//! what makes it exhaustively unit-testable without a database or an
//! executor.

#![deny(unsafe_code)]

pub mod audit;
pub mod config;
pub mod credentials;
pub mod error;
pub mod identity;
pub mod ledger;
pub mod notification;
pub mod oauth;
pub mod payment;
pub mod points;
pub mod principal;
pub mod ratelimit;
pub mod referral;
pub mod reservation;
pub mod storage;
pub mod tenancy;
pub mod token;
pub mod types;

pub use audit::{unauthorized_shop_access, AuditLog};
pub use config::CoreConfig;
pub use credentials::CredentialStore;
pub use error::CoreError;
pub use identity::{BrokerResult, IdentityBroker, IdentityVerificationEngine, VerificationRestrictions};
pub use ledger::{AppendOnlyLog, LogEntry, LogEntryKind};
pub use notification::{DeliveryError, NotificationDispatcher, PushSender, QueuedNotification};
pub use oauth::{OAuthIdentity, OAuthProvider, OAuthProviderKind};
pub use payment::{verify_webhook_signature, PaymentEngine, PaymentGateway, WebhookOutcome};
pub use points::PointLedger;
pub use principal::{check_principal_active, resolve_principal};
pub use ratelimit::RateLimiter;
pub use referral::ReferralEngine;
pub use reservation::ReservationEngine;
pub use storage::{slot_lock_key, DbSession, PostgresStore, StoreConfig};
pub use tenancy::{check_tenancy, TenancyDecision, TenancyDenial};
pub use token::TokenService;
pub use types::{
    AccessTokenClaims, AuditEvent, DeviceInfo, GatewayEventKind, GatewayWebhookEvent,
    IdentityVerification, IdentityVerificationStatus, Payment, PaymentMethod, PaymentStatus,
    PointTransaction, PointTransactionType, PointsSummary, Principal, PrincipalId, PrincipalStatus,
    PushPlatform, PushToken, Referral, ReferralProfile, ReferralStatus, ReferralTier,
    RefreshTokenRecord, RequestContext, Reservation, ReservationActor, ReservationStatus,
    ReservationStatusLogEntry, Role, SecurityEvent, SecurityEventKind, Service, Shop, ShopId,
    ShopStatus, ShopVerification, TokenPair,
};
