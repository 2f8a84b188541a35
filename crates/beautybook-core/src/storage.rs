//! C5 DB Session Manager.
//!
//! `DbSession` owns a pooled connection for the lifetime of one request: on
//! `begin` it opens a transaction and sets three session-scoped variables
//! (`current_user_id`, `current_user_role`, `current_user_shop_id`) that the
//! storage-layer row policies read. Transaction-local `SET LOCAL` scope is
//! what guarantees the variables can never leak onto a connection handed
//! back to the pool between requests.
//!
//! The engines in `reservation`, `payment`, `points`, `audit`, `referral`,
//! and `identity` hold their domain state as in-memory structures (the same
//! shape as the append-only ledger) so they can be exercised without a live
//! database; `PostgresStore` below is the schema and advisory-lock surface a
//! full SQL-backed mirror would sit behind.

use crate::error::CoreError;
use crate::types::{Principal, Role};
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Postgres, Transaction};

/// Persistence backend selection, mirroring the ledger's memory/Postgres
/// split: tests and local runs use `Memory`, deployments use `Postgres`.
#[derive(Debug, Clone)]
pub enum StoreConfig {
    Memory,
    Postgres {
        database_url: String,
        max_connections: u32,
    },
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self::Memory
    }
}

impl StoreConfig {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Memory => "memory",
            Self::Postgres { .. } => "postgres",
        }
    }
}

/// A pooled Postgres connection with request-scoped session variables set.
/// Storage policies (row-level security) read these to restrict visibility:
/// admins see all rows, shop roles see only their own shop's rows.
pub struct DbSession<'a> {
    tx: Transaction<'a, Postgres>,
}

impl<'a> DbSession<'a> {
    pub async fn begin(pool: &'a PgPool, principal: &Principal) -> Result<Self, CoreError> {
        let mut tx = pool.begin().await?;
        sqlx::query("SELECT set_config('app.current_user_id', $1, true)")
            .bind(&principal.id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("SELECT set_config('app.current_user_role', $1, true)")
            .bind(role_label(principal.role))
            .execute(&mut *tx)
            .await?;
        sqlx::query("SELECT set_config('app.current_user_shop_id', $1, true)")
            .bind(principal.shop_id.clone().unwrap_or_default())
            .execute(&mut *tx)
            .await?;
        Ok(Self { tx })
    }

    pub fn transaction(&mut self) -> &mut Transaction<'a, Postgres> {
        &mut self.tx
    }

    pub async fn commit(self) -> Result<(), CoreError> {
        self.tx.commit().await?;
        Ok(())
    }

    pub async fn rollback(self) -> Result<(), CoreError> {
        self.tx.rollback().await?;
        Ok(())
    }
}

fn role_label(role: Role) -> &'static str {
    match role {
        Role::Customer => "customer",
        Role::ShopOwner => "shop_owner",
        Role::ShopManager => "shop_manager",
        Role::ShopStaff => "shop_staff",
        Role::Admin => "admin",
        Role::SuperAdmin => "super_admin",
    }
}

/// Connection pool wrapper used by the service crate to hand out
/// `DbSession`s and to run schema bootstrap once at startup.
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, CoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;
        let store = Self { pool };
        store.ensure_schema().await?;
        Ok(store)
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Creates the tables the engines' in-memory state mirrors when run
    /// against Postgres. Every domain table carries `shop_id` where
    /// applicable and soft-deletion via `deleted_at`.
    async fn ensure_schema(&self) -> Result<(), CoreError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS shops (
                id TEXT PRIMARY KEY,
                owner_id TEXT NOT NULL,
                status TEXT NOT NULL,
                verification TEXT NOT NULL,
                commission_rate SMALLINT NOT NULL,
                shop_type TEXT NOT NULL,
                capacity INTEGER NOT NULL DEFAULT 1,
                created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
                updated_at TIMESTAMPTZ NOT NULL DEFAULT now(),
                deleted_at TIMESTAMPTZ
            );
            CREATE TABLE IF NOT EXISTS services (
                id TEXT PRIMARY KEY,
                shop_id TEXT NOT NULL REFERENCES shops(id),
                price_min BIGINT NOT NULL,
                price_max BIGINT NOT NULL,
                duration_minutes BIGINT NOT NULL,
                available BOOLEAN NOT NULL,
                deleted_at TIMESTAMPTZ
            );
            CREATE TABLE IF NOT EXISTS reservations (
                id TEXT PRIMARY KEY,
                shop_id TEXT NOT NULL REFERENCES shops(id),
                customer_id TEXT NOT NULL,
                datetime TIMESTAMPTZ NOT NULL,
                duration_minutes BIGINT NOT NULL,
                total_amount BIGINT NOT NULL,
                deposit_amount BIGINT NOT NULL,
                status TEXT NOT NULL,
                points_used BIGINT NOT NULL DEFAULT 0,
                created_at TIMESTAMPTZ NOT NULL DEFAULT now()
            );
            CREATE TABLE IF NOT EXISTS reservation_services (
                reservation_id TEXT NOT NULL REFERENCES reservations(id),
                service_id TEXT NOT NULL REFERENCES services(id)
            );
            CREATE TABLE IF NOT EXISTS reservation_status_log (
                reservation_id TEXT NOT NULL REFERENCES reservations(id),
                from_status TEXT NOT NULL,
                to_status TEXT NOT NULL,
                actor TEXT NOT NULL,
                reason TEXT,
                at TIMESTAMPTZ NOT NULL DEFAULT now()
            );
            CREATE TABLE IF NOT EXISTS payments (
                id TEXT PRIMARY KEY,
                reservation_id TEXT NOT NULL,
                shop_id TEXT NOT NULL,
                user_id TEXT NOT NULL,
                amount BIGINT NOT NULL,
                points_used BIGINT NOT NULL DEFAULT 0,
                method TEXT NOT NULL,
                status TEXT NOT NULL,
                gateway_tx_id TEXT,
                paid_at TIMESTAMPTZ,
                refunded_from TEXT,
                dispute_evidence_deadline TIMESTAMPTZ,
                created_at TIMESTAMPTZ NOT NULL DEFAULT now()
            );
            CREATE UNIQUE INDEX IF NOT EXISTS payments_gateway_tx_id_idx
                ON payments (gateway_tx_id) WHERE gateway_tx_id IS NOT NULL;
            CREATE TABLE IF NOT EXISTS processed_webhook_events (
                gateway_tx_id TEXT NOT NULL,
                event TEXT NOT NULL,
                processed_at TIMESTAMPTZ NOT NULL DEFAULT now(),
                PRIMARY KEY (gateway_tx_id, event)
            );
            CREATE TABLE IF NOT EXISTS referral_profiles (
                user_id TEXT PRIMARY KEY,
                referral_code TEXT NOT NULL UNIQUE,
                referred_by_code TEXT,
                tier TEXT NOT NULL DEFAULT 'standard',
                successful_referrals INTEGER NOT NULL DEFAULT 0,
                lifetime_commission BIGINT NOT NULL DEFAULT 0,
                influencer_qualified_at TIMESTAMPTZ
            );
            CREATE TABLE IF NOT EXISTS identity_verifications (
                id TEXT PRIMARY KEY,
                verification_id TEXT NOT NULL UNIQUE,
                user_id TEXT,
                status TEXT NOT NULL,
                ci TEXT,
                di TEXT,
                name TEXT,
                birth_date TEXT,
                gender TEXT,
                operator TEXT,
                verified_at TIMESTAMPTZ,
                created_at TIMESTAMPTZ NOT NULL DEFAULT now()
            );
            CREATE UNIQUE INDEX IF NOT EXISTS identity_ci_unique_idx
                ON identity_verifications (ci) WHERE ci IS NOT NULL AND status = 'verified';
            CREATE TABLE IF NOT EXISTS push_tokens (
                user_id TEXT NOT NULL,
                token TEXT NOT NULL,
                platform TEXT NOT NULL,
                device_id TEXT NOT NULL,
                active BOOLEAN NOT NULL DEFAULT true,
                created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
                PRIMARY KEY (user_id, device_id)
            );
            "#,
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Acquires the deterministic advisory lock C6 uses to serialize slot
    /// decisions for a `(shopId, dateBucket)` pair. Held for the lifetime of
    /// the transaction; Postgres releases it automatically on commit or
    /// rollback.
    pub async fn acquire_slot_lock(
        tx: &mut Transaction<'_, Postgres>,
        shop_id: &str,
        date_bucket: &str,
    ) -> Result<(), CoreError> {
        let key = slot_lock_key(shop_id, date_bucket);
        sqlx::query("SELECT pg_advisory_xact_lock($1)")
            .bind(key)
            .execute(&mut **tx)
            .await?;
        Ok(())
    }
}

/// Deterministic 64-bit advisory lock key derived from `(shopId,
/// dateBucket)`. Two overlapping `create` calls for the same shop-day hash
/// to the same key and are serialized by Postgres; see the capacity-model
/// decision in DESIGN.md for why the bucket is shop-day rather than
/// shop-staff.
pub fn slot_lock_key(shop_id: &str, date_bucket: &str) -> i64 {
    let hash = blake3::hash(format!("{shop_id}:{date_bucket}").as_bytes());
    let bytes: [u8; 8] = hash.as_bytes()[..8].try_into().expect("8 bytes");
    i64::from_le_bytes(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slot_lock_key_is_deterministic_and_shop_scoped() {
        let a = slot_lock_key("shop-1", "2026-02-10");
        let b = slot_lock_key("shop-1", "2026-02-10");
        let c = slot_lock_key("shop-2", "2026-02-10");
        assert_eq!(a, b);
        assert_ne!(a, c);
    }
}
