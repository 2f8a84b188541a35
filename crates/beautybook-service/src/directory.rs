//! Shop/service directory.
//!
//! `beautybook-core` deliberately has no notion of "every shop that exists"
//! — `ReservationEngine` only knows the reservations it is handed a `Shop`
//! for, and `tenancy::check_tenancy` takes a `shop_lookup` closure rather
//! than owning a directory itself. Something upstream of the core has to be
//! that directory; this is the service crate's, following the same
//! in-memory-state-behind-a-mutex shape as the engines it wraps.

use beautybook_core::{CoreError, Service, Shop, ShopStatus, ShopVerification};
use std::collections::HashMap;
use uuid::Uuid;

#[derive(Default)]
pub struct ShopRegistry {
    shops: HashMap<String, Shop>,
    services: HashMap<String, Service>,
}

impl ShopRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_shop(&self, id: &str) -> Option<Shop> {
        self.shops.get(id).cloned()
    }

    /// Onboarding: a shop owner registers a new shop, pending admin approval.
    pub fn create_shop(&mut self, owner_id: &str, shop_type: &str) -> Shop {
        let shop = Shop {
            id: Uuid::new_v4().to_string(),
            owner_id: owner_id.to_string(),
            status: ShopStatus::Pending,
            verification: ShopVerification::Pending,
            commission_rate: 0,
            shop_type: shop_type.to_string(),
            capacity: 1,
        };
        self.shops.insert(shop.id.clone(), shop.clone());
        shop
    }

    /// `PUT /api/admin/shops/{id}/approve`. Idempotent on current
    /// verification status: re-approving an already-active, already-verified
    /// shop with the same commission rate leaves state unchanged.
    pub fn approve_shop(
        &mut self,
        shop_id: &str,
        commission_rate: u8,
        shop_type: Option<String>,
    ) -> Result<Shop, CoreError> {
        let shop = self
            .shops
            .get_mut(shop_id)
            .ok_or_else(|| CoreError::not_found("shop", shop_id))?;
        shop.status = ShopStatus::Active;
        shop.verification = ShopVerification::Verified;
        shop.commission_rate = commission_rate;
        if let Some(shop_type) = shop_type {
            shop.shop_type = shop_type;
        }
        Ok(shop.clone())
    }

    pub fn set_shop_status(&mut self, shop_id: &str, status: ShopStatus) -> Result<Shop, CoreError> {
        let shop = self
            .shops
            .get_mut(shop_id)
            .ok_or_else(|| CoreError::not_found("shop", shop_id))?;
        shop.status = status;
        Ok(shop.clone())
    }

    pub fn create_service(
        &mut self,
        shop_id: &str,
        price_min: i64,
        price_max: i64,
        duration_minutes: i64,
    ) -> Result<Service, CoreError> {
        if !self.shops.contains_key(shop_id) {
            return Err(CoreError::not_found("shop", shop_id));
        }
        let service = Service {
            id: Uuid::new_v4().to_string(),
            shop_id: shop_id.to_string(),
            price_min,
            price_max,
            duration_minutes,
            available: true,
        };
        self.services.insert(service.id.clone(), service.clone());
        Ok(service)
    }

    pub fn get_service(&self, id: &str) -> Option<Service> {
        self.services.get(id).cloned()
    }

    pub fn services_by_ids(&self, ids: &[String]) -> Vec<Service> {
        ids.iter().filter_map(|id| self.services.get(id).cloned()).collect()
    }

    pub fn list_services_for_shop(&self, shop_id: &str) -> Vec<Service> {
        self.services
            .values()
            .filter(|s| s.shop_id == shop_id)
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn approve_shop_makes_it_bookable() {
        let mut registry = ShopRegistry::new();
        let shop = registry.create_shop("owner-1", "salon");
        assert!(!shop.is_bookable());
        let approved = registry.approve_shop(&shop.id, 10, None).unwrap();
        assert!(approved.is_bookable());
    }

    #[test]
    fn approve_is_idempotent() {
        let mut registry = ShopRegistry::new();
        let shop = registry.create_shop("owner-1", "salon");
        registry.approve_shop(&shop.id, 10, None).unwrap();
        let again = registry.approve_shop(&shop.id, 10, None).unwrap();
        assert_eq!(again.commission_rate, 10);
        assert!(again.is_bookable());
    }

    #[test]
    fn services_are_scoped_to_their_shop() {
        let mut registry = ShopRegistry::new();
        let shop = registry.create_shop("owner-1", "salon");
        registry.create_service(&shop.id, 10_000, 15_000, 60).unwrap();
        assert_eq!(registry.list_services_for_shop(&shop.id).len(), 1);
        assert_eq!(registry.list_services_for_shop("other").len(), 0);
    }
}
