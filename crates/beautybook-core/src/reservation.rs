//! C6 Reservation Engine: slot conflict detection, advisory-locked create,
//! and the reservation status state machine.

use crate::error::CoreError;
use crate::storage::slot_lock_key;
use crate::types::{
    Reservation, ReservationActor, ReservationStatus, ReservationStatusLogEntry, Service, Shop,
};
use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

/// Holds reservations and their status-transition log. The `Arc<Mutex<..>>`
/// the service crate wraps this in at construction time is itself the
/// serialization boundary for `(shopId, dateBucket)` slot decisions: the
/// deterministic key computed by `slot_lock_key` is what the Postgres
/// backend turns into a real `pg_advisory_xact_lock`, and is exposed here so
/// callers and tests can assert two bookings for the same shop-day hash to
/// the same lock.
pub struct ReservationEngine {
    reservations: Vec<Reservation>,
    status_log: Vec<ReservationStatusLogEntry>,
}

impl ReservationEngine {
    pub fn new() -> Self {
        Self {
            reservations: Vec::new(),
            status_log: Vec::new(),
        }
    }

    pub fn status_log(&self) -> &[ReservationStatusLogEntry] {
        &self.status_log
    }

    pub fn get(&self, reservation_id: &str) -> Option<&Reservation> {
        self.reservations.iter().find(|r| r.id == reservation_id)
    }

    pub fn list_for_shop(&self, shop_id: &str) -> Vec<&Reservation> {
        self.reservations.iter().filter(|r| r.shop_id == shop_id).collect()
    }

    /// Lock key for the shop-day bucket this `datetime` falls into; two
    /// `create` calls computing the same key MUST be serialized.
    pub fn lock_key_for(shop_id: &str, datetime: DateTime<Utc>) -> i64 {
        slot_lock_key(shop_id, &datetime.format("%Y-%m-%d").to_string())
    }

    /// `create(shopId, customerId, serviceIds, datetime, depositIntent)`.
    /// Validates services belong to the shop and are available, computes
    /// totals, re-checks for overlap against confirmed/in-progress
    /// reservations up to the shop's capacity, and inserts in `requested`.
    pub fn create(
        &mut self,
        shop: &Shop,
        customer_id: &str,
        services: &[Service],
        datetime: DateTime<Utc>,
        points_used: i64,
        now: DateTime<Utc>,
    ) -> Result<Reservation, CoreError> {
        if datetime < now {
            return Err(CoreError::Validation("datetime must not be in the past".to_string()));
        }
        if services.is_empty() {
            return Err(CoreError::Validation("invalid_services".to_string()));
        }
        if services.iter().any(|s| s.shop_id != shop.id || !s.available) {
            return Err(CoreError::Validation("invalid_services".to_string()));
        }
        if !shop.is_bookable() {
            return Err(CoreError::ConflictState("shop_unavailable".to_string()));
        }

        let duration_minutes: i64 = services.iter().map(|s| s.duration_minutes).sum();
        let total_amount: i64 = services.iter().map(|s| s.price_min).sum::<i64>() - points_used;
        if total_amount < 0 {
            return Err(CoreError::Validation(
                "pointsUsed exceeds the reservation total".to_string(),
            ));
        }
        let end = datetime + Duration::minutes(duration_minutes);

        let overlapping = self.overlapping(&shop.id, datetime, end);
        if overlapping.len() as u32 >= shop.capacity {
            return Err(CoreError::ConflictSlot);
        }

        let reservation = Reservation {
            id: Uuid::new_v4().to_string(),
            shop_id: shop.id.clone(),
            customer_id: customer_id.to_string(),
            datetime,
            duration_minutes,
            service_ids: services.iter().map(|s| s.id.clone()).collect(),
            total_amount,
            deposit_amount: total_amount / 2,
            status: ReservationStatus::Requested,
            points_used,
            created_at: now,
        };
        self.reservations.push(reservation.clone());
        self.status_log.push(ReservationStatusLogEntry {
            reservation_id: reservation.id.clone(),
            from: ReservationStatus::Requested,
            to: ReservationStatus::Requested,
            actor: ReservationActor::Customer,
            reason: Some("created".to_string()),
            at: now,
        });
        Ok(reservation)
    }

    fn overlapping(&self, shop_id: &str, start: DateTime<Utc>, end: DateTime<Utc>) -> Vec<&Reservation> {
        self.reservations
            .iter()
            .filter(|r| r.shop_id == shop_id)
            .filter(|r| matches!(r.status, ReservationStatus::Confirmed | ReservationStatus::InProgress))
            .filter(|r| r.overlaps(start, end))
            .collect()
    }

    /// `transition(reservationId, to, actor)`. Only the tabular transitions
    /// in §4.C6 are allowed; everything else fails `invalid_transition`.
    pub fn transition(
        &mut self,
        reservation_id: &str,
        to: ReservationStatus,
        actor: ReservationActor,
        reason: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<Reservation, CoreError> {
        let idx = self
            .reservations
            .iter()
            .position(|r| r.id == reservation_id)
            .ok_or_else(|| CoreError::not_found("reservation", reservation_id))?;
        let from = self.reservations[idx].status;

        if !is_allowed_transition(from, to) {
            return Err(CoreError::invalid_transition(&format!("{from:?}"), &format!("{to:?}")));
        }

        self.reservations[idx].status = to;
        self.status_log.push(ReservationStatusLogEntry {
            reservation_id: reservation_id.to_string(),
            from,
            to,
            actor,
            reason,
            at: now,
        });
        Ok(self.reservations[idx].clone())
    }

    /// Periodic sweep (`autoProgress`): ages out stale `requested`
    /// reservations past `expire_after`, and marks past `confirmed`
    /// reservations whose start+grace has elapsed without check-in as
    /// `no_show`.
    pub fn auto_progress(
        &mut self,
        now: DateTime<Utc>,
        expire_after: Duration,
        no_show_grace: Duration,
    ) -> Vec<Reservation> {
        let mut changed = Vec::new();
        let ids_to_expire: Vec<String> = self
            .reservations
            .iter()
            .filter(|r| r.status == ReservationStatus::Requested)
            .filter(|r| now - r.created_at > expire_after)
            .map(|r| r.id.clone())
            .collect();
        for id in ids_to_expire {
            if let Ok(r) = self.transition(
                &id,
                ReservationStatus::Expired,
                ReservationActor::System,
                Some("auto_expired".to_string()),
                now,
            ) {
                changed.push(r);
            }
        }

        let ids_to_no_show: Vec<String> = self
            .reservations
            .iter()
            .filter(|r| r.status == ReservationStatus::Confirmed)
            .filter(|r| now - r.datetime > no_show_grace)
            .map(|r| r.id.clone())
            .collect();
        for id in ids_to_no_show {
            if let Ok(r) = self.transition(
                &id,
                ReservationStatus::NoShow,
                ReservationActor::System,
                Some("auto_no_show".to_string()),
                now,
            ) {
                changed.push(r);
            }
        }
        changed
    }
}

impl Default for ReservationEngine {
    fn default() -> Self {
        Self::new()
    }
}

fn is_allowed_transition(from: ReservationStatus, to: ReservationStatus) -> bool {
    use ReservationStatus::*;
    matches!(
        (from, to),
        (Requested, Confirmed)
            | (Requested, CancelledByUser)
            | (Requested, CancelledByShop)
            | (Requested, Expired)
            | (Confirmed, InProgress)
            | (Confirmed, CancelledByUser)
            | (Confirmed, CancelledByShop)
            | (Confirmed, NoShow)
            | (InProgress, Completed)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ShopStatus, ShopVerification};

    fn shop() -> Shop {
        Shop {
            id: "shop-1".to_string(),
            owner_id: "owner-1".to_string(),
            status: ShopStatus::Active,
            verification: ShopVerification::Verified,
            commission_rate: 10,
            shop_type: "salon".to_string(),
            capacity: 1,
        }
    }

    fn service() -> Service {
        Service {
            id: "sv-1".to_string(),
            shop_id: "shop-1".to_string(),
            price_min: 10_000,
            price_max: 15_000,
            duration_minutes: 60,
            available: true,
        }
    }

    #[test]
    fn create_succeeds_for_valid_services_and_slot() {
        let mut engine = ReservationEngine::new();
        let now = Utc::now();
        let datetime = now + Duration::hours(1);
        let reservation = engine
            .create(&shop(), "cust-1", &[service()], datetime, 0, now)
            .unwrap();
        assert_eq!(reservation.shop_id, "shop-1");
        assert_eq!(reservation.status, ReservationStatus::Requested);
    }

    #[test]
    fn second_overlapping_create_fails_slot_conflict_once_confirmed() {
        let mut engine = ReservationEngine::new();
        let now = Utc::now();
        let datetime = now + Duration::hours(1);
        let first = engine
            .create(&shop(), "cust-1", &[service()], datetime, 0, now)
            .unwrap();
        engine
            .transition(&first.id, ReservationStatus::Confirmed, ReservationActor::Shop, None, now)
            .unwrap();

        let second = engine.create(&shop(), "cust-2", &[service()], datetime, 0, now);
        assert!(matches!(second, Err(CoreError::ConflictSlot)));
    }

    #[test]
    fn services_from_another_shop_are_rejected() {
        let mut engine = ReservationEngine::new();
        let now = Utc::now();
        let mut foreign = service();
        foreign.shop_id = "shop-2".to_string();
        let result = engine.create(&shop(), "cust-1", &[foreign], now + Duration::hours(1), 0, now);
        assert!(matches!(result, Err(CoreError::Validation(_))));
    }

    #[test]
    fn terminal_status_rejects_further_transitions() {
        let mut engine = ReservationEngine::new();
        let now = Utc::now();
        let r = engine
            .create(&shop(), "cust-1", &[service()], now + Duration::hours(1), 0, now)
            .unwrap();
        engine
            .transition(&r.id, ReservationStatus::CancelledByUser, ReservationActor::Customer, None, now)
            .unwrap();
        let result = engine.transition(&r.id, ReservationStatus::Confirmed, ReservationActor::Shop, None, now);
        assert!(matches!(result, Err(CoreError::ConflictState(_))));
    }

    #[test]
    fn auto_progress_expires_stale_requested_reservations() {
        let mut engine = ReservationEngine::new();
        let created_at = Utc::now() - Duration::hours(2);
        let mut r = engine
            .create(&shop(), "cust-1", &[service()], created_at + Duration::hours(3), 0, created_at)
            .unwrap();
        r.created_at = created_at;
        engine.reservations[0].created_at = created_at;

        let changed = engine.auto_progress(Utc::now(), Duration::minutes(30), Duration::minutes(15));
        assert_eq!(changed.len(), 1);
        assert_eq!(changed[0].status, ReservationStatus::Expired);
    }
}
