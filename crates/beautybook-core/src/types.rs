use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub type PrincipalId = String;
pub type ShopId = String;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Customer,
    ShopOwner,
    ShopManager,
    ShopStaff,
    Admin,
    SuperAdmin,
}

impl Role {
    pub fn is_platform_admin(self) -> bool {
        matches!(self, Role::Admin | Role::SuperAdmin)
    }

    pub fn is_shop_role(self) -> bool {
        matches!(self, Role::ShopOwner | Role::ShopManager | Role::ShopStaff)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrincipalStatus {
    Active,
    Suspended,
    Deleted,
}

/// A resolved, authenticated actor. Re-hydrated on every request from the
/// credential store, never trusted solely from token claims.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Principal {
    pub id: PrincipalId,
    pub email: String,
    pub role: Role,
    pub shop_id: Option<ShopId>,
    pub status: PrincipalStatus,
}

impl Principal {
    /// Invariant: `shop_id` is non-null iff role is a shop_* role.
    pub fn is_consistent(&self) -> bool {
        self.role.is_shop_role() == self.shop_id.is_some()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShopStatus {
    Pending,
    Active,
    Suspended,
    Deleted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShopVerification {
    Pending,
    Verified,
    Rejected,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Shop {
    pub id: ShopId,
    pub owner_id: PrincipalId,
    pub status: ShopStatus,
    pub verification: ShopVerification,
    pub commission_rate: u8,
    pub shop_type: String,
    /// Simultaneous in-progress reservations the shop can hold; see
    /// the capacity-model open question resolved in DESIGN.md.
    pub capacity: u32,
}

impl Shop {
    pub fn is_bookable(&self) -> bool {
        self.status == ShopStatus::Active && self.verification == ShopVerification::Verified
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Service {
    pub id: String,
    pub shop_id: ShopId,
    pub price_min: i64,
    pub price_max: i64,
    pub duration_minutes: i64,
    pub available: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReservationStatus {
    Requested,
    Confirmed,
    InProgress,
    Completed,
    CancelledByUser,
    CancelledByShop,
    NoShow,
    Expired,
}

impl ReservationStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            ReservationStatus::Completed
                | ReservationStatus::CancelledByUser
                | ReservationStatus::CancelledByShop
                | ReservationStatus::NoShow
                | ReservationStatus::Expired
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reservation {
    pub id: String,
    pub shop_id: ShopId,
    pub customer_id: PrincipalId,
    pub datetime: DateTime<Utc>,
    pub duration_minutes: i64,
    pub service_ids: Vec<String>,
    pub total_amount: i64,
    pub deposit_amount: i64,
    pub status: ReservationStatus,
    pub points_used: i64,
    pub created_at: DateTime<Utc>,
}

impl Reservation {
    pub fn end_time(&self) -> DateTime<Utc> {
        self.datetime + chrono::Duration::minutes(self.duration_minutes)
    }

    pub fn overlaps(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> bool {
        self.datetime < end && start < self.end_time()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReservationActor {
    Customer,
    Shop,
    System,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReservationStatusLogEntry {
    pub reservation_id: String,
    pub from: ReservationStatus,
    pub to: ReservationStatus,
    pub actor: ReservationActor,
    pub reason: Option<String>,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    Card,
    TransferBank,
    SimplePay,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    DepositPaid,
    FullyPaid,
    Failed,
    Cancelled,
    Refunded,
    Disputed,
}

impl PaymentStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            PaymentStatus::Failed | PaymentStatus::Cancelled | PaymentStatus::Refunded
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Payment {
    pub id: String,
    pub reservation_id: String,
    pub shop_id: ShopId,
    pub user_id: PrincipalId,
    pub amount: i64,
    pub points_used: i64,
    pub method: PaymentMethod,
    pub status: PaymentStatus,
    pub gateway_tx_id: Option<String>,
    pub paid_at: Option<DateTime<Utc>>,
    pub refunded_from: Option<String>,
    pub dispute_evidence_deadline: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PointTransactionType {
    EarnedPurchase,
    EarnedReferral,
    Spent,
    Refunded,
    Expired,
    Adjusted,
}

/// Append-only point ledger entry. Never updated after creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PointTransaction {
    pub id: String,
    pub user_id: PrincipalId,
    /// Signed: positive for credits, negative for debits.
    pub amount: i64,
    pub tx_type: PointTransactionType,
    pub payment_id: Option<String>,
    pub referrer_user_id: Option<PrincipalId>,
    pub created_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
    /// For an inverse entry (`refunded`/`expired`), the id of the original
    /// row it reverses. `None` for original grants and debits.
    pub source_tx_id: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReferralStatus {
    Active,
    Cancelled,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Referral {
    pub referrer_id: PrincipalId,
    pub referred_id: PrincipalId,
    pub status: ReferralStatus,
    pub bonus_amount: i64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReferralTier {
    Standard,
    Influencer,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReferralProfile {
    pub user_id: PrincipalId,
    pub referral_code: String,
    pub referred_by_code: Option<String>,
    pub tier: ReferralTier,
    pub successful_referrals: u32,
    pub lifetime_commission: i64,
    pub influencer_qualified_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdentityVerificationStatus {
    Ready,
    Verified,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentityVerification {
    pub id: String,
    pub verification_id: String,
    pub user_id: Option<PrincipalId>,
    pub status: IdentityVerificationStatus,
    pub ci: Option<String>,
    pub di: Option<String>,
    pub name: Option<String>,
    pub birth_date: Option<String>,
    pub gender: Option<String>,
    pub operator: Option<String>,
    pub verified_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PushPlatform {
    Ios,
    Android,
    Web,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PushToken {
    pub user_id: PrincipalId,
    pub token: String,
    pub platform: PushPlatform,
    pub device_id: String,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    pub actor_id: PrincipalId,
    pub action: String,
    pub resource_type: String,
    pub resource_id: String,
    pub before: Option<serde_json::Value>,
    pub after: Option<serde_json::Value>,
    pub ip: Option<String>,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SecurityEventKind {
    UnauthorizedShopAccessAttempt,
    RateLimitExceeded,
    AuthFailed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityEvent {
    pub actor_id: Option<PrincipalId>,
    pub kind: SecurityEventKind,
    pub details: serde_json::Value,
    pub at: DateTime<Utc>,
}

/// Implied by C2's "persisted with" language: a refresh token record held by
/// the credential store, rotated on every `refresh()` call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshTokenRecord {
    pub id: String,
    pub user_id: PrincipalId,
    pub token: String,
    pub device_fingerprint: String,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub revoked_at: Option<DateTime<Utc>>,
}

impl RefreshTokenRecord {
    pub fn is_usable(&self, now: DateTime<Utc>) -> bool {
        self.revoked_at.is_none() && self.expires_at > now
    }
}

/// Claims encoded into a signed access token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessTokenClaims {
    pub sub: PrincipalId,
    pub role: Role,
    pub shop_id: Option<ShopId>,
    pub issued_at: DateTime<Utc>,
    pub exp: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    pub refresh_expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct DeviceInfo {
    pub device_fingerprint: String,
}

/// Per-request tenancy and identity context threaded through handlers,
/// replacing ambient request-scoped globals.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub principal: Principal,
    pub shop: Option<Shop>,
    pub started_at: DateTime<Utc>,
    pub correlation_id: String,
    pub client_ip: Option<String>,
}

impl RequestContext {
    pub fn new(principal: Principal) -> Self {
        Self {
            principal,
            shop: None,
            started_at: Utc::now(),
            correlation_id: uuid::Uuid::new_v4().to_string(),
            client_ip: None,
        }
    }

    pub fn with_shop(mut self, shop: Shop) -> Self {
        self.shop = Some(shop);
        self
    }

    pub fn with_ip(mut self, ip: impl Into<String>) -> Self {
        self.client_ip = Some(ip.into());
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PointsSummary {
    pub balance: i64,
    pub total_earned: i64,
    pub total_spent: i64,
    pub today_earned: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayWebhookEvent {
    pub gateway_tx_id: String,
    pub event: GatewayEventKind,
    pub amount: i64,
    pub metadata: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GatewayEventKind {
    Approved,
    Failed,
    Cancelled,
    Refund,
    Dispute,
}
