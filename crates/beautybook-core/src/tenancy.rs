//! C4 Tenancy Gate: applied to routes of shape `/shops/{shopId}/...`.

use crate::audit::unauthorized_shop_access;
use crate::error::CoreError;
use crate::types::{Principal, Shop, ShopStatus};

/// Matches `^[A-Za-z0-9_-]+$`: rejects injection and path traversal in the
/// `shopId` path segment.
fn is_valid_shop_id(shop_id: &str) -> bool {
    !shop_id.is_empty()
        && shop_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

pub struct TenancyDecision {
    pub shop: Shop,
}

/// Outcome of a denied gate check, carrying the `SecurityEvent` the caller
/// MUST persist via the audit log before returning 403.
pub enum TenancyDenial {
    InvalidShopId,
    ShopNotFound,
    CrossShopAccess {
        security_event: crate::types::SecurityEvent,
    },
    ShopUnavailable,
}

pub fn check_tenancy(
    shop_id: &str,
    principal: &Principal,
    shop_lookup: impl FnOnce(&str) -> Option<Shop>,
    path: &str,
    method: &str,
) -> Result<TenancyDecision, TenancyDenial> {
    if !is_valid_shop_id(shop_id) {
        return Err(TenancyDenial::InvalidShopId);
    }

    let shop = shop_lookup(shop_id).ok_or(TenancyDenial::ShopNotFound)?;

    let authorized = principal.role.is_platform_admin()
        || principal.shop_id.as_deref() == Some(shop_id);

    if !authorized {
        let event = unauthorized_shop_access(
            Some(principal.id.clone()),
            shop_id,
            principal.shop_id.as_deref(),
            path,
            method,
        );
        return Err(TenancyDenial::CrossShopAccess {
            security_event: event,
        });
    }

    if matches!(shop.status, ShopStatus::Suspended | ShopStatus::Deleted) {
        return Err(TenancyDenial::ShopUnavailable);
    }

    Ok(TenancyDecision { shop })
}

impl From<TenancyDenial> for CoreError {
    fn from(denial: TenancyDenial) -> Self {
        match denial {
            TenancyDenial::InvalidShopId => {
                CoreError::Validation("shopId must match ^[A-Za-z0-9_-]+$".to_string())
            }
            TenancyDenial::ShopNotFound => CoreError::not_found("shop", "unknown"),
            TenancyDenial::CrossShopAccess { .. } => CoreError::ForbiddenCrossShop,
            TenancyDenial::ShopUnavailable => CoreError::ForbiddenCrossShop,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{PrincipalStatus, Role, ShopVerification};

    fn shop(id: &str) -> Shop {
        Shop {
            id: id.to_string(),
            owner_id: "owner-1".to_string(),
            status: ShopStatus::Active,
            verification: ShopVerification::Verified,
            commission_rate: 10,
            shop_type: "salon".to_string(),
            capacity: 1,
        }
    }

    fn shop_owner(shop_id: &str) -> Principal {
        Principal {
            id: "owner-1".to_string(),
            email: "owner@example.com".to_string(),
            role: Role::ShopOwner,
            shop_id: Some(shop_id.to_string()),
            status: PrincipalStatus::Active,
        }
    }

    #[test]
    fn rejects_invalid_shop_id_characters() {
        let principal = shop_owner("shop-1");
        let result = check_tenancy("shop/1", &principal, |_| Some(shop("shop/1")), "/x", "GET");
        assert!(matches!(result, Err(TenancyDenial::InvalidShopId)));
    }

    #[test]
    fn cross_shop_access_is_denied_with_security_event() {
        let principal = shop_owner("shop-1");
        let result = check_tenancy(
            "shop-2",
            &principal,
            |id| Some(shop(id)),
            "/api/shops/shop-2/reservations",
            "GET",
        );
        match result {
            Err(TenancyDenial::CrossShopAccess { security_event }) => {
                assert_eq!(
                    security_event.kind,
                    crate::types::SecurityEventKind::UnauthorizedShopAccessAttempt
                );
            }
            _ => panic!("expected cross-shop denial"),
        }
    }

    #[test]
    fn platform_admin_bypasses_shop_match() {
        let admin = Principal {
            id: "admin-1".to_string(),
            email: "admin@example.com".to_string(),
            role: Role::Admin,
            shop_id: None,
            status: PrincipalStatus::Active,
        };
        let result = check_tenancy("shop-2", &admin, |id| Some(shop(id)), "/x", "GET");
        assert!(result.is_ok());
    }

    #[test]
    fn suspended_shop_is_unavailable_even_for_owner() {
        let principal = shop_owner("shop-1");
        let mut s = shop("shop-1");
        s.status = ShopStatus::Suspended;
        let result = check_tenancy("shop-1", &principal, move |_| Some(s.clone()), "/x", "GET");
        assert!(matches!(result, Err(TenancyDenial::ShopUnavailable)));
    }
}
